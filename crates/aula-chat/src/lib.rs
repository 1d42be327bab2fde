//! # aula-chat
//!
//! Message writes and the merged per-conversation message stream.
//!
//! A conversation's history may be spread across several store paths (the
//! canonical path plus legacy aliases). The aggregator subscribes to every
//! resolved path and folds the snapshots into one deduplicated,
//! time-ordered view, published through a `tokio::sync::watch` feed.

pub mod aggregator;
pub mod merge;
pub mod service;

mod error;

pub use aggregator::{spawn_feed, MessageFeed};
pub use error::{ChatError, Result};
pub use merge::MergeState;
pub use service::ChatService;
