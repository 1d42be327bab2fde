//! Pure fold of per-source snapshots into one message view.

use std::collections::HashMap;

use aula_shared::{Message, MessageId};

/// Accumulates the latest snapshot of every source path and maintains the
/// merged id → message map.
///
/// Merging is last-write-wins per id: whatever snapshot delivered an id most
/// recently owns its fields. An id that disappears from a source is dropped
/// from the merged view unless another source still carries it.
#[derive(Debug)]
pub struct MergeState {
    sources: Vec<HashMap<MessageId, Message>>,
    merged: HashMap<MessageId, Message>,
}

impl MergeState {
    pub fn new(source_count: usize) -> Self {
        Self {
            sources: vec![HashMap::new(); source_count],
            merged: HashMap::new(),
        }
    }

    /// Fold in a fresh snapshot from source `index`.
    pub fn apply(&mut self, index: usize, snapshot: HashMap<MessageId, Message>) {
        let removed: Vec<MessageId> = self.sources[index]
            .keys()
            .filter(|id| !snapshot.contains_key(*id))
            .cloned()
            .collect();

        for id in removed {
            let elsewhere = self
                .sources
                .iter()
                .enumerate()
                .any(|(i, source)| i != index && source.contains_key(&id));
            if !elsewhere {
                self.merged.remove(&id);
            }
        }

        for (id, message) in &snapshot {
            self.merged.insert(id.clone(), message.clone());
        }

        self.sources[index] = snapshot;
    }

    /// The merged view, ascending by `(timestamp, id)`.
    ///
    /// The id tiebreak keeps the order deterministic when two messages carry
    /// the same timestamp.
    pub fn ordered(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = self.merged.values().cloned().collect();
        messages.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        messages
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }
}
