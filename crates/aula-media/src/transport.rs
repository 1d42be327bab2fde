//! The peer media transport seam.
//!
//! The actual transport (codecs, networking, remote rendering) is an
//! external library; this crate only drives its session lifecycle.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use aula_shared::{ChannelRef, UserId};

use crate::track::{LocalTrack, TrackKind};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to join media channel: {0}")]
    Join(String),

    #[error("Publish rejected: {0}")]
    Publish(String),

    #[error("Session closed")]
    Closed,
}

/// Remote participant activity within a joined channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    TrackPublished { user: UserId, kind: TrackKind },
    TrackUnpublished { user: UserId, kind: TrackKind },
    ParticipantLeft { user: UserId },
}

#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Join the channel and return a live session for it.
    async fn join(
        &self,
        channel: &ChannelRef,
        user: &UserId,
    ) -> Result<Box<dyn TransportSession>, TransportError>;
}

#[async_trait]
pub trait TransportSession: Send {
    async fn publish(&mut self, tracks: &[LocalTrack]) -> Result<(), TransportError>;

    async fn unpublish(&mut self, tracks: &[LocalTrack]) -> Result<(), TransportError>;

    /// Leave the channel. Implementations must also release the session on
    /// drop, but an explicit leave reports errors.
    async fn leave(&mut self) -> Result<(), TransportError>;

    /// Take the remote event feed. Yields `None` after the first call.
    fn remote_events(&mut self) -> Option<mpsc::UnboundedReceiver<RemoteEvent>>;
}
