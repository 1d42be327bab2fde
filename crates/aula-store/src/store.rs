//! The [`SharedStore`] trait and subscription plumbing.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use aula_shared::StorePath;

use crate::error::Result;

/// One delivery on a subscription: the current snapshot of the subscribed
/// path. `None` means the path no longer holds any value.
#[derive(Debug, Clone)]
pub struct StoreUpdate {
    pub path: StorePath,
    pub value: Option<Value>,
}

/// Path-addressed shared mutable store.
///
/// Writes always replace the full value at a path; there are no partial
/// merges. Each observer of a path sees a monotonically advancing sequence
/// of snapshots, but there is no cross-client transaction or lock.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Read the value at `path`, if any.
    async fn get(&self, path: &StorePath) -> Result<Option<Value>>;

    /// Write `value` at `path`, replacing whatever was there.
    async fn put(&self, path: &StorePath, value: Value) -> Result<()>;

    /// Remove the value at `path` (no-op if absent).
    async fn remove(&self, path: &StorePath) -> Result<()>;

    /// Subscribe to `path`. The watcher immediately receives the current
    /// snapshot, then one update per mutation at or beneath the path.
    async fn subscribe(&self, path: &StorePath) -> Result<Watcher>;

    /// Generate a unique child key, ordered by creation time.
    fn push_key(&self) -> String;
}

/// A live subscription to one store path.
///
/// Dropping the watcher unsubscribes; no updates are delivered afterwards.
pub struct Watcher {
    path: StorePath,
    rx: mpsc::UnboundedReceiver<StoreUpdate>,
    _unsub: UnsubscribeOnDrop,
}

impl Watcher {
    pub fn new(
        path: StorePath,
        rx: mpsc::UnboundedReceiver<StoreUpdate>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            path,
            rx,
            _unsub: UnsubscribeOnDrop(Some(Box::new(on_drop))),
        }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Next snapshot, or `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<StoreUpdate> {
        self.rx.recv().await
    }
}

struct UnsubscribeOnDrop(Option<Box<dyn FnOnce() + Send>>);

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        if let Some(unsub) = self.0.take() {
            unsub();
        }
    }
}
