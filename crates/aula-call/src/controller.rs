//! The call-session state machine.
//!
//! One controller task per client. Local actions (start/accept/reject/end)
//! arrive as commands with oneshot replies; record observations from the
//! signaling channel are folded into the same `select!` loop. The task
//! publishes the current phase on a watch channel and emits [`CallEvent`]s
//! for the layer that drives media setup and teardown.
//!
//! At most one non-terminal call is tracked at a time. A `start_call` while
//! a call is active fails with `InvalidState`; it is never queued.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use aula_shared::{CallKind, UserId};
use aula_store::SharedStore;

use crate::error::{CallError, Result};
use crate::record::{CallRecord, CallStatus};
use crate::signaling::{IncomingCalls, RecordWatcher, SignalingChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    PendingOutgoing,
    PendingIncoming,
    Accepted,
    Rejected,
    Ended,
}

impl CallPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallPhase::Rejected | CallPhase::Ended)
    }
}

/// Notifications for the media-driving layer and the UI.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// A foreign pending call targeting the local user appeared.
    IncomingRinging { record: CallRecord },
    /// The call reached `Accepted` (either side); media should join the
    /// record's transport channel now.
    Established { record: CallRecord },
    /// The call reached a terminal state; media must be torn down.
    Closed {
        phase: CallPhase,
        record: Option<CallRecord>,
    },
}

#[derive(Debug)]
enum CallCommand {
    Start {
        peer: UserId,
        kind: CallKind,
        reply: oneshot::Sender<Result<CallRecord>>,
    },
    Accept {
        reply: oneshot::Sender<Result<CallRecord>>,
    },
    Reject {
        reply: oneshot::Sender<Result<()>>,
    },
    End {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to a running controller task.
#[derive(Clone)]
pub struct CallSession {
    cmd_tx: mpsc::Sender<CallCommand>,
    phase_rx: watch::Receiver<CallPhase>,
}

impl CallSession {
    pub async fn start_call(&self, peer: UserId, kind: CallKind) -> Result<CallRecord> {
        self.request(|reply| CallCommand::Start { peer, kind, reply })
            .await
    }

    pub async fn accept_call(&self) -> Result<CallRecord> {
        self.request(|reply| CallCommand::Accept { reply }).await
    }

    pub async fn reject_call(&self) -> Result<()> {
        self.request(|reply| CallCommand::Reject { reply }).await
    }

    pub async fn end_call(&self) -> Result<()> {
        self.request(|reply| CallCommand::End { reply }).await
    }

    pub fn phase(&self) -> CallPhase {
        *self.phase_rx.borrow()
    }

    pub fn phase_watch(&self) -> watch::Receiver<CallPhase> {
        self.phase_rx.clone()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> CallCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(command(tx))
            .await
            .map_err(|_| CallError::SessionClosed)?;
        rx.await.map_err(|_| CallError::SessionClosed)?
    }
}

/// Spawn the controller task for `local`.
///
/// Returns the command handle and the event stream. Fails if the incoming
/// call subscription cannot be established.
pub async fn spawn_call_session(
    local: UserId,
    store: Arc<dyn SharedStore>,
) -> Result<(CallSession, mpsc::Receiver<CallEvent>)> {
    let signaling = SignalingChannel::new(store);
    let incoming = signaling.watch_incoming(local.clone()).await?;

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(32);
    let (phase_tx, phase_rx) = watch::channel(CallPhase::Idle);

    tokio::spawn(run(local, signaling, incoming, cmd_rx, event_tx, phase_tx));

    Ok((CallSession { cmd_tx, phase_rx }, event_rx))
}

struct ActiveCall {
    record: CallRecord,
    watcher: RecordWatcher,
    outgoing: bool,
}

impl ActiveCall {
    fn is_pending(&self) -> bool {
        self.record.status == CallStatus::Pending
    }
}

async fn run(
    local: UserId,
    signaling: SignalingChannel,
    incoming: IncomingCalls,
    mut cmd_rx: mpsc::Receiver<CallCommand>,
    event_tx: mpsc::Sender<CallEvent>,
    phase_tx: watch::Sender<CallPhase>,
) {
    let mut incoming = Some(incoming);
    let mut active: Option<ActiveCall> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                handle_command(cmd, &local, &signaling, &mut active, &event_tx, &phase_tx).await;
            }

            ring = next_incoming(&mut incoming) => {
                if let Some(record) = ring {
                    handle_incoming(record, &signaling, &mut active, &event_tx, &phase_tx).await;
                }
            }

            observed = next_observed(&mut active) => {
                handle_observation(observed, &mut active, &event_tx, &phase_tx).await;
            }
        }
    }

    // Handle dropped with a call still live: close the record out so the
    // peer does not ring or stay connected forever.
    if let Some(call) = active.take() {
        if !call.record.status.is_terminal() {
            if let Err(error) = signaling.publish(&call.record.ended_now()).await {
                warn!(%error, "Failed to end call while shutting down");
            }
        }
    }
    info!(user = %local.short(), "Call session loop terminated");
}

async fn next_incoming(incoming: &mut Option<IncomingCalls>) -> Option<CallRecord> {
    match incoming {
        Some(feed) => match feed.next().await {
            Some(record) => Some(record),
            None => {
                *incoming = None;
                None
            }
        },
        None => std::future::pending().await,
    }
}

/// `None` means the record disappeared (or its feed closed). Never
/// resolves while no call is active.
async fn next_observed(active: &mut Option<ActiveCall>) -> Option<CallRecord> {
    match active {
        Some(call) => call.watcher.next().await.unwrap_or(None),
        None => std::future::pending().await,
    }
}

async fn handle_command(
    cmd: CallCommand,
    local: &UserId,
    signaling: &SignalingChannel,
    active: &mut Option<ActiveCall>,
    event_tx: &mpsc::Sender<CallEvent>,
    phase_tx: &watch::Sender<CallPhase>,
) {
    match cmd {
        CallCommand::Start { peer, kind, reply } => {
            if active.is_some() {
                let _ = reply.send(Err(CallError::InvalidState));
                return;
            }

            let record = CallRecord::outgoing(local.clone(), peer, kind);
            if let Err(error) = signaling.publish(&record).await {
                let _ = reply.send(Err(error.into()));
                return;
            }

            match signaling.watch_record(&record.id).await {
                Ok(watcher) => {
                    info!(call = %record.id, peer = %record.recipient.short(), "Outgoing call started");
                    *active = Some(ActiveCall {
                        record: record.clone(),
                        watcher,
                        outgoing: true,
                    });
                    phase_tx.send_replace(CallPhase::PendingOutgoing);
                    let _ = reply.send(Ok(record));
                }
                Err(error) => {
                    // The record was written but cannot be observed; close
                    // it out rather than leaving the peer ringing.
                    if let Err(retract) = signaling.publish(&record.ended_now()).await {
                        warn!(error = %retract, "Failed to end unobservable call record");
                    }
                    let _ = reply.send(Err(error.into()));
                }
            }
        }

        CallCommand::Accept { reply } => {
            let valid = matches!(&active, Some(c) if !c.outgoing && c.is_pending());
            if !valid {
                let _ = reply.send(Err(CallError::InvalidState));
                return;
            }

            let call = active.as_mut().expect("validated above");
            let accepted = call.record.advanced(CallStatus::Accepted);
            match signaling.publish(&accepted).await {
                Ok(()) => {
                    info!(call = %accepted.id, "Call accepted");
                    call.record = accepted.clone();
                    phase_tx.send_replace(CallPhase::Accepted);
                    let _ = event_tx
                        .send(CallEvent::Established {
                            record: accepted.clone(),
                        })
                        .await;
                    let _ = reply.send(Ok(accepted));
                }
                Err(error) => {
                    // The record exists and the peer is waiting: close out
                    // best-effort, then clean up locally no matter what.
                    let closing = call.record.ended_now();
                    if let Err(retract) = signaling.publish(&closing).await {
                        warn!(error = %retract, "Failed to write ended status after accept failure");
                    }
                    let record = active.take().map(|c| c.record);
                    emit_closed(CallPhase::Ended, record, event_tx, phase_tx).await;
                    let _ = reply.send(Err(error.into()));
                }
            }
        }

        CallCommand::Reject { reply } => {
            let valid = matches!(&active, Some(c) if !c.outgoing && c.is_pending());
            if !valid {
                let _ = reply.send(Err(CallError::InvalidState));
                return;
            }

            let call = active.as_ref().expect("validated above");
            let rejected = call.record.advanced(CallStatus::Rejected);
            let write = signaling.publish(&rejected).await;
            if let Err(error) = &write {
                warn!(%error, "Failed to write rejected status, cleaning up locally");
            }

            let _ = active.take();
            emit_closed(CallPhase::Rejected, Some(rejected), event_tx, phase_tx).await;
            let _ = reply.send(write.map_err(Into::into));
        }

        CallCommand::End { reply } => {
            let valid = matches!(
                &active,
                Some(c) if c.record.status == CallStatus::Accepted || (c.outgoing && c.is_pending())
            );
            if !valid {
                let _ = reply.send(Err(CallError::InvalidState));
                return;
            }

            let call = active.as_ref().expect("validated above");
            let ended = call.record.ended_now();
            let write = signaling.publish(&ended).await;
            if let Err(error) = &write {
                warn!(%error, "Failed to write ended status, cleaning up locally");
            }

            let _ = active.take();
            emit_closed(CallPhase::Ended, Some(ended), event_tx, phase_tx).await;
            let _ = reply.send(write.map_err(Into::into));
        }
    }
}

async fn handle_incoming(
    record: CallRecord,
    signaling: &SignalingChannel,
    active: &mut Option<ActiveCall>,
    event_tx: &mpsc::Sender<CallEvent>,
    phase_tx: &watch::Sender<CallPhase>,
) {
    if active.is_some() {
        debug!(call = %record.id, "Incoming call while busy, leaving it pending");
        return;
    }

    match signaling.watch_record(&record.id).await {
        Ok(watcher) => {
            info!(call = %record.id, from = %record.initiator.short(), "Incoming call");
            *active = Some(ActiveCall {
                record: record.clone(),
                watcher,
                outgoing: false,
            });
            phase_tx.send_replace(CallPhase::PendingIncoming);
            let _ = event_tx.send(CallEvent::IncomingRinging { record }).await;
        }
        Err(error) => {
            warn!(call = %record.id, %error, "Could not observe incoming call record");
        }
    }
}

async fn handle_observation(
    observed: Option<CallRecord>,
    active: &mut Option<ActiveCall>,
    event_tx: &mpsc::Sender<CallEvent>,
    phase_tx: &watch::Sender<CallPhase>,
) {
    let Some(call) = active.as_mut() else {
        return;
    };

    let Some(update) = observed else {
        // Removed (or the feed died): unconditional cancellation.
        debug!(call = %call.record.id, "Call record disappeared");
        let record = active.take().map(|c| c.record);
        emit_closed(CallPhase::Ended, record, event_tx, phase_tx).await;
        return;
    };

    if !update.supersedes(&call.record) {
        return;
    }
    let outgoing = call.outgoing;
    call.record = update.clone();

    match update.status {
        CallStatus::Pending => {}
        CallStatus::Accepted => {
            // Only meaningful for the initiator; the recipient entered
            // `Accepted` when its own write succeeded.
            if outgoing {
                info!(call = %update.id, "Call accepted by peer");
                phase_tx.send_replace(CallPhase::Accepted);
                let _ = event_tx.send(CallEvent::Established { record: update }).await;
            }
        }
        CallStatus::Rejected => {
            info!(call = %update.id, "Call rejected by peer");
            let _ = active.take();
            emit_closed(CallPhase::Rejected, Some(update), event_tx, phase_tx).await;
        }
        CallStatus::Ended { .. } => {
            info!(call = %update.id, "Call ended by peer");
            let _ = active.take();
            emit_closed(CallPhase::Ended, Some(update), event_tx, phase_tx).await;
        }
    }
}

async fn emit_closed(
    phase: CallPhase,
    record: Option<CallRecord>,
    event_tx: &mpsc::Sender<CallEvent>,
    phase_tx: &watch::Sender<CallPhase>,
) {
    phase_tx.send_replace(phase);
    let _ = event_tx.send(CallEvent::Closed { phase, record }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use aula_shared::constants::CALLS_ROOT;
    use aula_shared::StorePath;
    use aula_store::MemoryStore;
    use std::time::Duration;

    fn maya() -> UserId {
        UserId::new("maya")
    }

    fn leo() -> UserId {
        UserId::new("leo")
    }

    async fn sessions(
        store: &Arc<MemoryStore>,
    ) -> (
        CallSession,
        mpsc::Receiver<CallEvent>,
        CallSession,
        mpsc::Receiver<CallEvent>,
    ) {
        let (a, a_events) = spawn_call_session(maya(), store.clone())
            .await
            .unwrap();
        let (b, b_events) = spawn_call_session(leo(), store.clone())
            .await
            .unwrap();
        (a, a_events, b, b_events)
    }

    async fn next_event(events: &mut mpsc::Receiver<CallEvent>) -> CallEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event in time")
            .expect("event stream open")
    }

    async fn wait_phase(session: &CallSession, want: CallPhase) {
        let mut rx = session.phase_watch();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if *rx.borrow() == want {
                    return;
                }
                rx.changed().await.expect("phase feed open");
            }
        })
        .await
        .unwrap_or_else(|_| panic!("phase never reached {want:?}"));
    }

    #[tokio::test]
    async fn outgoing_call_accepted_by_peer() {
        let store = Arc::new(MemoryStore::new());
        let (a, mut a_events, b, mut b_events) = sessions(&store).await;

        let record = a.start_call(leo(), CallKind::Video).await.unwrap();
        assert_eq!(a.phase(), CallPhase::PendingOutgoing);

        let CallEvent::IncomingRinging { record: ringing } = next_event(&mut b_events).await
        else {
            panic!("expected ring");
        };
        assert_eq!(ringing.id, record.id);
        assert_eq!(b.phase(), CallPhase::PendingIncoming);

        let accepted = b.accept_call().await.unwrap();
        assert_eq!(accepted.status, CallStatus::Accepted);

        let CallEvent::Established { record: b_rec } = next_event(&mut b_events).await else {
            panic!("expected established on recipient");
        };
        let CallEvent::Established { record: a_rec } = next_event(&mut a_events).await else {
            panic!("expected established on initiator");
        };
        assert_eq!(a_rec.channel, b_rec.channel);

        wait_phase(&a, CallPhase::Accepted).await;
        wait_phase(&b, CallPhase::Accepted).await;
    }

    #[tokio::test]
    async fn second_start_while_active_is_invalid() {
        let store = Arc::new(MemoryStore::new());
        let (a, _a_events, _b, _b_events) = sessions(&store).await;

        a.start_call(leo(), CallKind::Voice).await.unwrap();
        let err = a.start_call(leo(), CallKind::Voice).await.unwrap_err();
        assert!(matches!(err, CallError::InvalidState));
    }

    #[tokio::test]
    async fn accept_without_pending_incoming_is_invalid() {
        let store = Arc::new(MemoryStore::new());
        let (a, _a_events, _b, _b_events) = sessions(&store).await;

        // From Idle.
        assert!(matches!(
            a.accept_call().await.unwrap_err(),
            CallError::InvalidState
        ));
        assert!(matches!(
            a.reject_call().await.unwrap_err(),
            CallError::InvalidState
        ));
        assert!(matches!(
            a.end_call().await.unwrap_err(),
            CallError::InvalidState
        ));

        // From PendingOutgoing: the initiator cannot accept its own call.
        a.start_call(leo(), CallKind::Voice).await.unwrap();
        assert!(matches!(
            a.accept_call().await.unwrap_err(),
            CallError::InvalidState
        ));
    }

    #[tokio::test]
    async fn rejection_reaches_the_initiator() {
        let store = Arc::new(MemoryStore::new());
        let (a, mut a_events, b, mut b_events) = sessions(&store).await;

        a.start_call(leo(), CallKind::Voice).await.unwrap();
        next_event(&mut b_events).await; // ring

        b.reject_call().await.unwrap();
        wait_phase(&b, CallPhase::Rejected).await;

        let CallEvent::Closed { phase, .. } = next_event(&mut a_events).await else {
            panic!("expected closed on initiator");
        };
        assert_eq!(phase, CallPhase::Rejected);
        wait_phase(&a, CallPhase::Rejected).await;
    }

    #[tokio::test]
    async fn unanswered_call_ended_by_initiator_never_connects() {
        let store = Arc::new(MemoryStore::new());
        let (a, _a_events, b, mut b_events) = sessions(&store).await;

        let record = a.start_call(leo(), CallKind::Video).await.unwrap();
        next_event(&mut b_events).await; // ring
        a.end_call().await.unwrap();
        wait_phase(&a, CallPhase::Ended).await;

        // The recipient goes straight to Ended, never Accepted.
        let CallEvent::Closed { phase, record: closed } = next_event(&mut b_events).await else {
            panic!("expected closed, not established");
        };
        assert_eq!(phase, CallPhase::Ended);
        assert_eq!(closed.unwrap().id, record.id);
        wait_phase(&b, CallPhase::Ended).await;

        // A late joiner never rings for the dead record either.
        let (_c, mut c_events) = spawn_call_session(leo(), store.clone())
            .await
            .unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(100), c_events.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn record_removal_is_unconditional_cancellation() {
        let store = Arc::new(MemoryStore::new());
        let (a, mut a_events, b, mut b_events) = sessions(&store).await;

        let record = a.start_call(leo(), CallKind::Voice).await.unwrap();
        next_event(&mut b_events).await; // ring
        b.accept_call().await.unwrap();
        next_event(&mut b_events).await; // established
        next_event(&mut a_events).await; // established

        let path = StorePath::new(CALLS_ROOT).child(record.id.to_string());
        store.remove(&path).await.unwrap();

        for events in [&mut a_events, &mut b_events] {
            let CallEvent::Closed { phase, .. } = next_event(events).await else {
                panic!("expected closed after removal");
            };
            assert_eq!(phase, CallPhase::Ended);
        }
        wait_phase(&a, CallPhase::Ended).await;
        wait_phase(&b, CallPhase::Ended).await;
    }

    #[tokio::test]
    async fn new_call_possible_after_terminal_phase() {
        let store = Arc::new(MemoryStore::new());
        let (a, _a_events, b, mut b_events) = sessions(&store).await;

        a.start_call(leo(), CallKind::Voice).await.unwrap();
        next_event(&mut b_events).await;
        a.end_call().await.unwrap();
        wait_phase(&b, CallPhase::Ended).await;

        let second = a.start_call(leo(), CallKind::Voice).await.unwrap();
        let CallEvent::IncomingRinging { record } = next_event(&mut b_events).await else {
            panic!("expected second ring");
        };
        assert_eq!(record.id, second.id);
    }

    #[tokio::test]
    async fn start_fails_cleanly_when_store_is_offline() {
        let store = Arc::new(MemoryStore::new());
        let (a, _a_events, _b, _b_events) = sessions(&store).await;

        store.set_offline(true);
        let err = a.start_call(leo(), CallKind::Voice).await.unwrap_err();
        assert!(matches!(err, CallError::Store(_)));
        assert_eq!(a.phase(), CallPhase::Idle);

        store.set_offline(false);
        a.start_call(leo(), CallKind::Voice).await.unwrap();
    }

    #[tokio::test]
    async fn end_still_cleans_up_when_store_is_offline() {
        let store = Arc::new(MemoryStore::new());
        let (a, mut a_events, b, mut b_events) = sessions(&store).await;

        a.start_call(leo(), CallKind::Voice).await.unwrap();
        next_event(&mut b_events).await;
        b.accept_call().await.unwrap();
        next_event(&mut a_events).await; // established

        store.set_offline(true);
        let err = a.end_call().await.unwrap_err();
        assert!(matches!(err, CallError::Store(_)));

        // Local cleanup proceeded regardless of the failed write.
        assert_eq!(a.phase(), CallPhase::Ended);
        let CallEvent::Closed { phase, .. } = next_event(&mut a_events).await else {
            panic!("expected closed");
        };
        assert_eq!(phase, CallPhase::Ended);
    }
}
