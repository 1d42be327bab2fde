//! Message write operations.
//!
//! All writes target the conversation's canonical path; legacy alias paths
//! are read-only history. Every write replaces the full message document;
//! the store never sees partial merges.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use aula_shared::constants::MAX_MESSAGE_CHARS;
use aula_shared::{Conversation, Message, MessageId, UserId};
use aula_store::SharedStore;

use crate::error::{ChatError, Result};

pub struct ChatService {
    store: Arc<dyn SharedStore>,
    sender: UserId,
}

impl ChatService {
    /// `sender` is the local account on whose behalf all writes are made.
    pub fn new(store: Arc<dyn SharedStore>, sender: UserId) -> Self {
        Self { store, sender }
    }

    pub async fn send(&self, conversation: &Conversation, text: &str) -> Result<Message> {
        check_length(text)?;

        let id = MessageId::new(self.store.push_key());
        let message = Message {
            id: id.clone(),
            conversation_id: conversation.id.clone(),
            sender: self.sender.clone(),
            text: text.to_string(),
            timestamp: Utc::now(),
        };

        let path = conversation.messages_path().child(id.as_str());
        let doc = serde_json::to_value(&message).map_err(aula_store::StoreError::from)?;
        self.store.put(&path, doc).await?;

        info!(msg_id = %id, conversation = %conversation.id, "Message sent");
        Ok(message)
    }

    /// Rewrite an existing message with new text and a fresh timestamp.
    /// The id is kept; readers see the edit as a replacement.
    pub async fn edit(
        &self,
        conversation: &Conversation,
        id: &MessageId,
        text: &str,
    ) -> Result<Message> {
        check_length(text)?;

        let path = conversation.messages_path().child(id.as_str());
        let existing = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| ChatError::UnknownMessage(id.clone()))?;
        let mut message: Message =
            serde_json::from_value(existing).map_err(aula_store::StoreError::from)?;

        message.text = text.to_string();
        message.timestamp = Utc::now();

        let doc = serde_json::to_value(&message).map_err(aula_store::StoreError::from)?;
        self.store.put(&path, doc).await?;

        info!(msg_id = %id, conversation = %conversation.id, "Message edited");
        Ok(message)
    }

    /// Remove a message. No tombstone is kept; the id simply disappears
    /// from the conversation's merged view.
    pub async fn delete(&self, conversation: &Conversation, id: &MessageId) -> Result<()> {
        let path = conversation.messages_path().child(id.as_str());
        if self.store.get(&path).await?.is_none() {
            return Err(ChatError::UnknownMessage(id.clone()));
        }
        self.store.remove(&path).await?;

        info!(msg_id = %id, conversation = %conversation.id, "Message deleted");
        Ok(())
    }
}

fn check_length(text: &str) -> Result<()> {
    let len = text.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(ChatError::MessageTooLong {
            len,
            max: MAX_MESSAGE_CHARS,
        });
    }
    Ok(())
}
