use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, UserId};

/// A single chat message as stored in the shared record store.
///
/// The id doubles as the store key under the conversation's message path.
/// An edit rewrites the whole document under the same id with new text and
/// timestamp; a delete removes the id entirely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}
