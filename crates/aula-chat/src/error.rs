use thiserror::Error;

use aula_shared::MessageId;
use aula_store::StoreError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Edit or delete addressed a message the store does not hold.
    #[error("Unknown message: {0}")]
    UnknownMessage(MessageId),

    #[error("Message too long: {len} chars (max {max})")]
    MessageTooLong { len: usize, max: usize },

    /// Every source path of the conversation failed to subscribe.
    #[error("No message source reachable")]
    AllSourcesFailed,
}

pub type Result<T> = std::result::Result<T, ChatError>;
