use thiserror::Error;

use aula_call::CallError;
use aula_chat::ChatError;
use aula_media::MediaError;
use aula_store::StoreError;

/// Umbrella error for the client facade.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Call error: {0}")]
    Call(#[from] CallError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
