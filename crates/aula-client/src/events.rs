use aula_call::{CallPhase, CallRecord};
use aula_media::RemoteEvent;

/// Notifications surfaced to the presentation layer.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A pending call targeting the local user appeared.
    IncomingCall { record: CallRecord },

    /// The call is accepted and local media is joined and published.
    CallConnected { record: CallRecord },

    /// The call reached a terminal phase and local media was released.
    CallClosed {
        phase: CallPhase,
        record: Option<CallRecord>,
    },

    /// Media setup failed after acceptance; the call was closed out.
    CallFailed { reason: String },

    /// Remote participant activity in the joined media channel.
    Remote(RemoteEvent),
}
