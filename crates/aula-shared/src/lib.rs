//! # aula-shared
//!
//! Identifier types, the conversation registry, and domain models shared by
//! every crate in the Aula realtime layer.

pub mod constants;
pub mod conversation;
pub mod message;
pub mod path;
pub mod types;

pub use conversation::{Conversation, ConversationKind, ConversationRegistry};
pub use message::Message;
pub use path::StorePath;
pub use types::{CallId, CallKind, ChannelRef, ConversationId, MessageId, UserId};
