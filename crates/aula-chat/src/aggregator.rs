//! Merged, ordered message feed per conversation.
//!
//! One forwarding task per source path pushes store snapshots into a single
//! fold task, which applies them to a [`MergeState`] and publishes the
//! ordered view on a watch channel. A source whose subscription fails is
//! skipped with a warning; the remaining sources keep merging.

use std::collections::HashMap;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use aula_shared::{Conversation, ConversationRegistry, Message, MessageId};
use aula_store::SharedStore;

use crate::error::{ChatError, Result};
use crate::merge::MergeState;

/// Live merged view of one conversation's messages.
///
/// Dropping the feed stops all underlying subscriptions and tasks.
pub struct MessageFeed {
    rx: watch::Receiver<Vec<Message>>,
    tasks: Vec<JoinHandle<()>>,
}

impl MessageFeed {
    /// A watch handle for consumers that want change notifications.
    pub fn watch(&self) -> watch::Receiver<Vec<Message>> {
        self.rx.clone()
    }

    /// The current ordered message sequence.
    pub fn current(&self) -> Vec<Message> {
        self.rx.borrow().clone()
    }
}

impl Drop for MessageFeed {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Subscribe to every source path of `conversation` and start merging.
///
/// Fails only if *no* source path could be subscribed; individual failures
/// degrade that path and leave the rest of the feed working.
pub async fn spawn_feed(
    store: Arc<dyn SharedStore>,
    registry: &ConversationRegistry,
    conversation: &Conversation,
) -> Result<MessageFeed> {
    let paths = registry.source_paths(conversation);
    let source_count = paths.len();

    let (fold_tx, mut fold_rx) = mpsc::unbounded_channel::<(usize, Option<Value>)>();
    let mut tasks = Vec::new();
    let mut subscribed = 0usize;

    for (index, path) in paths.into_iter().enumerate() {
        let mut watcher = match store.subscribe(&path).await {
            Ok(watcher) => watcher,
            Err(error) => {
                warn!(
                    path = %path,
                    %error,
                    "Chat source subscription failed, merging the remaining sources"
                );
                continue;
            }
        };
        subscribed += 1;

        let tx = fold_tx.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(update) = watcher.next().await {
                if tx.send((index, update.value)).is_err() {
                    break;
                }
            }
            debug!(path = %watcher.path(), "Chat source feed ended");
        }));
    }
    drop(fold_tx);

    if subscribed == 0 {
        return Err(ChatError::AllSourcesFailed);
    }

    let (view_tx, view_rx) = watch::channel(Vec::new());
    tasks.push(tokio::spawn(async move {
        let mut state = MergeState::new(source_count);
        while let Some((index, value)) = fold_rx.recv().await {
            state.apply(index, parse_snapshot(value));
            view_tx.send_replace(state.ordered());
        }
    }));

    Ok(MessageFeed {
        rx: view_rx,
        tasks,
    })
}

/// Decode a path snapshot (a key → document map) into messages.
/// Malformed documents are skipped rather than poisoning the feed.
fn parse_snapshot(value: Option<Value>) -> HashMap<MessageId, Message> {
    let Some(Value::Object(map)) = value else {
        return HashMap::new();
    };

    map.into_iter()
        .filter_map(|(key, doc)| match serde_json::from_value::<Message>(doc) {
            Ok(message) => Some((MessageId::new(key), message)),
            Err(error) => {
                warn!(key = %key, %error, "Skipping malformed message document");
                None
            }
        })
        .collect()
}
