//! Publish/observe call records on the shared store.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use aula_shared::constants::CALLS_ROOT;
use aula_shared::{CallId, StorePath, UserId};
use aula_store::{SharedStore, StoreError, Watcher};

use crate::record::{CallRecord, CallStatus};

/// Thin wrapper over the store for everything call-signaling.
#[derive(Clone)]
pub struct SignalingChannel {
    store: Arc<dyn SharedStore>,
}

impl SignalingChannel {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    fn record_path(call_id: &CallId) -> StorePath {
        StorePath::new(CALLS_ROOT).child(call_id.to_string())
    }

    /// Write (or overwrite) the record at its well-known path.
    pub async fn publish(&self, record: &CallRecord) -> Result<(), StoreError> {
        let doc = serde_json::to_value(record)?;
        self.store.put(&Self::record_path(&record.id), doc).await?;
        debug!(call = %record.id, seq = record.seq, "Call record published");
        Ok(())
    }

    /// Best-effort removal of a dead record.
    pub async fn retract(&self, call_id: &CallId) -> Result<(), StoreError> {
        self.store.remove(&Self::record_path(call_id)).await
    }

    /// Observe changes (including removal) of one specific record.
    pub async fn watch_record(&self, call_id: &CallId) -> Result<RecordWatcher, StoreError> {
        let watcher = self.store.subscribe(&Self::record_path(call_id)).await?;
        Ok(RecordWatcher { watcher })
    }

    /// Observe all records targeting `recipient` that are still pending.
    pub async fn watch_incoming(&self, recipient: UserId) -> Result<IncomingCalls, StoreError> {
        let watcher = self.store.subscribe(&StorePath::new(CALLS_ROOT)).await?;
        Ok(IncomingCalls {
            watcher,
            recipient,
            seen: HashSet::new(),
        })
    }
}

/// Subscription to one call record.
pub struct RecordWatcher {
    watcher: Watcher,
}

impl RecordWatcher {
    /// Next observed state: `Some(record)` on a change, `None` when the
    /// record was removed from the store. Yields until the feed closes.
    pub async fn next(&mut self) -> Option<Option<CallRecord>> {
        loop {
            let update = self.watcher.next().await?;
            match update.value {
                None => return Some(None),
                Some(doc) => match serde_json::from_value::<CallRecord>(doc) {
                    Ok(record) => return Some(Some(record)),
                    Err(error) => {
                        warn!(path = %update.path, %error, "Malformed call record, skipping update");
                    }
                },
            }
        }
    }
}

/// Scans the calls subtree for newly appearing pending calls addressed to
/// the local user.
///
/// Every surfaced call id goes into a seen set, as does any id first
/// observed in a non-pending state; neither fires again even if a stale
/// writer later resets the record to pending. This keeps handled or
/// resolved calls from ringing twice.
pub struct IncomingCalls {
    watcher: Watcher,
    recipient: UserId,
    seen: HashSet<CallId>,
}

impl IncomingCalls {
    /// Next unseen pending call for the recipient, or `None` once the
    /// underlying feed closes.
    pub async fn next(&mut self) -> Option<CallRecord> {
        loop {
            let update = self.watcher.next().await?;
            let Some(serde_json::Value::Object(map)) = update.value else {
                continue;
            };

            for (key, doc) in map {
                let record: CallRecord = match serde_json::from_value(doc) {
                    Ok(record) => record,
                    Err(error) => {
                        warn!(key = %key, %error, "Malformed call record in calls subtree");
                        continue;
                    }
                };

                if record.recipient != self.recipient {
                    continue;
                }

                if record.status != CallStatus::Pending {
                    // Resolved before we ever rang: remember it as handled.
                    self.seen.insert(record.id);
                    continue;
                }

                if self.seen.insert(record.id.clone()) {
                    return Some(record);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aula_shared::CallKind;
    use aula_store::MemoryStore;
    use std::time::Duration;

    fn channel() -> (Arc<MemoryStore>, SignalingChannel) {
        let store = Arc::new(MemoryStore::new());
        let channel = SignalingChannel::new(store.clone());
        (store, channel)
    }

    fn outgoing() -> CallRecord {
        CallRecord::outgoing(UserId::new("maya"), UserId::new("leo"), CallKind::Voice)
    }

    #[tokio::test]
    async fn record_watcher_sees_updates_and_removal() {
        let (_, channel) = channel();
        let record = outgoing();
        channel.publish(&record).await.unwrap();

        let mut watcher = channel.watch_record(&record.id).await.unwrap();
        assert_eq!(watcher.next().await.unwrap(), Some(record.clone()));

        let accepted = record.advanced(CallStatus::Accepted);
        channel.publish(&accepted).await.unwrap();
        assert_eq!(watcher.next().await.unwrap(), Some(accepted));

        channel.retract(&record.id).await.unwrap();
        assert_eq!(watcher.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn incoming_fires_once_per_pending_call() {
        let (_, channel) = channel();
        let mut incoming = channel.watch_incoming(UserId::new("leo")).await.unwrap();

        let record = outgoing();
        channel.publish(&record).await.unwrap();

        let rang = incoming.next().await.unwrap();
        assert_eq!(rang.id, record.id);

        // Accepting (a new snapshot of the subtree) must not ring again;
        // a second genuine call must.
        channel
            .publish(&record.advanced(CallStatus::Accepted))
            .await
            .unwrap();
        let second = outgoing();
        channel.publish(&second).await.unwrap();

        let rang = incoming.next().await.unwrap();
        assert_eq!(rang.id, second.id);
    }

    #[tokio::test]
    async fn resolved_records_never_ring() {
        let (_, channel) = channel();

        // Already accepted before the observer subscribes.
        let record = outgoing().advanced(CallStatus::Accepted);
        channel.publish(&record).await.unwrap();

        let mut incoming = channel.watch_incoming(UserId::new("leo")).await.unwrap();

        // Even a bogus regression back to pending must not resurrect it.
        let regressed = CallRecord {
            status: CallStatus::Pending,
            seq: 0,
            ..record.clone()
        };
        channel.publish(&regressed).await.unwrap();

        let fresh = outgoing();
        channel.publish(&fresh).await.unwrap();
        assert_eq!(incoming.next().await.unwrap().id, fresh.id);
    }

    #[tokio::test]
    async fn calls_for_other_recipients_are_ignored() {
        let (_, channel) = channel();
        let mut incoming = channel.watch_incoming(UserId::new("zoe")).await.unwrap();

        channel.publish(&outgoing()).await.unwrap();

        let result =
            tokio::time::timeout(Duration::from_millis(100), incoming.next()).await;
        assert!(result.is_err(), "no call should ring for zoe");
    }
}
