//! In-process implementation of [`SharedStore`].
//!
//! Holds a single JSON tree behind a mutex and fans snapshot notifications
//! out to subscribers over unbounded mpsc channels. Mirrors the hosted
//! store's observable behavior closely enough to back local development and
//! the test suites: snapshot-on-subscribe, subtree-scoped notifications,
//! pruning of empty parent nodes, and a switchable offline mode for
//! exercising unavailability paths.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use aula_shared::StorePath;

use crate::error::{Result, StoreError};
use crate::push::PushKeyGen;
use crate::store::{SharedStore, StoreUpdate, Watcher};

struct Subscriber {
    id: u64,
    path: StorePath,
    tx: tokio::sync::mpsc::UnboundedSender<StoreUpdate>,
}

struct Inner {
    root: Value,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    offline: bool,
    push_keys: PushKeyGen,
}

/// In-memory shared store. Cloning shares the same tree and subscribers.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                root: Value::Object(Map::new()),
                subscribers: Vec::new(),
                next_subscriber: 0,
                offline: false,
                push_keys: PushKeyGen::new(),
            })),
        }
    }

    /// Simulate losing (or regaining) connectivity. While offline every
    /// operation fails with [`StoreError::Unavailable`]; existing
    /// subscriptions stay registered and resume once back online.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().expect("store lock").offline = offline;
    }

    /// Number of live subscriptions (dropped watchers are deregistered).
    pub fn watcher_count(&self) -> usize {
        self.inner.lock().expect("store lock").subscribers.len()
    }

    fn unsubscribe(inner: &Arc<Mutex<Inner>>, id: u64) {
        let mut guard = inner.lock().expect("store lock");
        guard.subscribers.retain(|s| s.id != id);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn value_at(&self, path: &StorePath) -> Option<Value> {
        let mut node = &self.root;
        for segment in path.segments() {
            node = node.as_object()?.get(segment)?;
        }
        Some(node.clone())
    }

    fn write_at(&mut self, path: &StorePath, value: Option<Value>) {
        let segments = path.segments();
        if segments.is_empty() {
            self.root = value.unwrap_or(Value::Object(Map::new()));
            return;
        }

        match value {
            Some(value) => {
                let mut node = &mut self.root;
                for segment in &segments[..segments.len() - 1] {
                    if !node.is_object() {
                        *node = Value::Object(Map::new());
                    }
                    node = node
                        .as_object_mut()
                        .expect("just ensured object")
                        .entry(segment.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                }
                if !node.is_object() {
                    *node = Value::Object(Map::new());
                }
                node.as_object_mut()
                    .expect("just ensured object")
                    .insert(segments[segments.len() - 1].clone(), value);
            }
            None => {
                remove_and_prune(&mut self.root, segments);
            }
        }
    }

    /// Deliver the current snapshot of every subscription that overlaps the
    /// changed path (ancestor, self, or descendant).
    fn notify(&mut self, changed: &StorePath) {
        let snapshots: Vec<(usize, StoreUpdate)> = self
            .subscribers
            .iter()
            .enumerate()
            .filter(|(_, s)| s.path.starts_with(changed) || changed.starts_with(&s.path))
            .map(|(i, s)| {
                (
                    i,
                    StoreUpdate {
                        path: s.path.clone(),
                        value: self.value_at(&s.path),
                    },
                )
            })
            .collect();

        let mut dead = Vec::new();
        for (index, update) in snapshots {
            if self.subscribers[index].tx.send(update).is_err() {
                dead.push(self.subscribers[index].id);
            }
        }
        if !dead.is_empty() {
            self.subscribers.retain(|s| !dead.contains(&s.id));
        }
    }
}

/// Remove the leaf at `segments`, then drop parent objects left empty.
fn remove_and_prune(node: &mut Value, segments: &[String]) -> bool {
    let Some(map) = node.as_object_mut() else {
        return false;
    };

    match segments {
        [] => false,
        [leaf] => map.remove(leaf).is_some(),
        [head, rest @ ..] => {
            let Some(child) = map.get_mut(head) else {
                return false;
            };
            let removed = remove_and_prune(child, rest);
            if removed && child.as_object().is_some_and(|m| m.is_empty()) {
                map.remove(head);
            }
            removed
        }
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>> {
        let guard = self.inner.lock().expect("store lock");
        if guard.offline {
            return Err(StoreError::Unavailable);
        }
        Ok(guard.value_at(path))
    }

    async fn put(&self, path: &StorePath, value: Value) -> Result<()> {
        let mut guard = self.inner.lock().expect("store lock");
        if guard.offline {
            return Err(StoreError::Unavailable);
        }
        guard.write_at(path, Some(value));
        guard.notify(path);
        Ok(())
    }

    async fn remove(&self, path: &StorePath) -> Result<()> {
        let mut guard = self.inner.lock().expect("store lock");
        if guard.offline {
            return Err(StoreError::Unavailable);
        }
        guard.write_at(path, None);
        guard.notify(path);
        Ok(())
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Watcher> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let mut guard = self.inner.lock().expect("store lock");
        if guard.offline {
            return Err(StoreError::Unavailable);
        }

        let id = guard.next_subscriber;
        guard.next_subscriber += 1;

        // Initial snapshot so observers need no separate read.
        let initial = StoreUpdate {
            path: path.clone(),
            value: guard.value_at(path),
        };
        let _ = tx.send(initial);

        guard.subscribers.push(Subscriber {
            id,
            path: path.clone(),
            tx,
        });
        debug!(path = %path, id, "store subscription added");

        let inner = Arc::clone(&self.inner);
        Ok(Watcher::new(path.clone(), rx, move || {
            MemoryStore::unsubscribe(&inner, id);
        }))
    }

    fn push_key(&self) -> String {
        self.inner.lock().expect("store lock").push_keys.next_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> StorePath {
        StorePath::parse(p)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let store = MemoryStore::new();
        store.put(&path("a/b/c"), json!({"x": 1})).await.unwrap();

        assert_eq!(store.get(&path("a/b/c")).await.unwrap(), Some(json!({"x": 1})));
        // Ancestors materialize as objects.
        assert_eq!(
            store.get(&path("a")).await.unwrap(),
            Some(json!({"b": {"c": {"x": 1}}}))
        );
        assert_eq!(store.get(&path("missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_prunes_empty_parents() {
        let store = MemoryStore::new();
        store.put(&path("a/b/c"), json!(1)).await.unwrap();
        store.remove(&path("a/b/c")).await.unwrap();

        assert_eq!(store.get(&path("a")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_keeps_non_empty_parents() {
        let store = MemoryStore::new();
        store.put(&path("a/b"), json!(1)).await.unwrap();
        store.put(&path("a/c"), json!(2)).await.unwrap();
        store.remove(&path("a/b")).await.unwrap();

        assert_eq!(store.get(&path("a")).await.unwrap(), Some(json!({"c": 2})));
    }

    #[tokio::test]
    async fn subscriber_sees_snapshot_then_updates() {
        let store = MemoryStore::new();
        store.put(&path("room/m1"), json!("hello")).await.unwrap();

        let mut watcher = store.subscribe(&path("room")).await.unwrap();
        let first = watcher.next().await.unwrap();
        assert_eq!(first.value, Some(json!({"m1": "hello"})));

        store.put(&path("room/m2"), json!("again")).await.unwrap();
        let second = watcher.next().await.unwrap();
        assert_eq!(second.value, Some(json!({"m1": "hello", "m2": "again"})));

        store.remove(&path("room/m1")).await.unwrap();
        store.remove(&path("room/m2")).await.unwrap();
        watcher.next().await.unwrap();
        let gone = watcher.next().await.unwrap();
        assert_eq!(gone.value, None);
    }

    #[tokio::test]
    async fn ancestor_writes_reach_descendant_subscribers() {
        let store = MemoryStore::new();
        let mut watcher = store.subscribe(&path("a/b")).await.unwrap();
        watcher.next().await.unwrap(); // initial (absent)

        store.put(&path("a"), json!({"b": 7})).await.unwrap();
        assert_eq!(watcher.next().await.unwrap().value, Some(json!(7)));
    }

    #[tokio::test]
    async fn dropping_watcher_unsubscribes() {
        let store = MemoryStore::new();
        let watcher = store.subscribe(&path("x")).await.unwrap();
        assert_eq!(store.watcher_count(), 1);

        drop(watcher);
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn offline_store_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_offline(true);

        assert!(matches!(
            store.put(&path("a"), json!(1)).await,
            Err(StoreError::Unavailable)
        ));
        assert!(matches!(store.get(&path("a")).await, Err(StoreError::Unavailable)));
        assert!(matches!(store.remove(&path("a")).await, Err(StoreError::Unavailable)));
        assert!(store.subscribe(&path("a")).await.is_err());

        store.set_offline(false);
        store.put(&path("a"), json!(1)).await.unwrap();
    }

    #[test]
    fn push_keys_come_from_one_sequence() {
        let store = MemoryStore::new();
        let first = store.push_key();
        let second = store.push_key();
        assert!(first < second);
    }
}
