use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached (transient connectivity).
    #[error("Store unavailable")]
    Unavailable,

    /// A record failed to serialize or deserialize.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The subscription feed was closed by the store.
    #[error("Subscription closed")]
    SubscriptionClosed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
