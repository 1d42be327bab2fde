use std::sync::Arc;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackKind {
    Microphone,
    Camera,
    Screen,
}

/// A local capture track.
///
/// Enablement is a cheap toggle that keeps the track attached to the
/// session (no renegotiation); `stop` releases the underlying device handle
/// and is idempotent.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> Uuid;
    fn kind(&self) -> TrackKind;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    fn stop(&self);
    fn is_stopped(&self) -> bool;
}

pub type LocalTrack = Arc<dyn MediaTrack>;
