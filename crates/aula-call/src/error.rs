use thiserror::Error;

use aula_store::StoreError;

#[derive(Error, Debug)]
pub enum CallError {
    /// The operation is not valid in the current call phase, e.g. accepting
    /// with nothing pending or starting a second concurrent call.
    #[error("Operation not valid in the current call state")]
    InvalidState,

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The controller task is no longer running.
    #[error("Call session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, CallError>;
