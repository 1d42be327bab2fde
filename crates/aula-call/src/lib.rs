//! # aula-call
//!
//! Call signaling over the shared record store and the call-session state
//! machine.
//!
//! Both parties of a call coordinate exclusively through one
//! [`CallRecord`] stored at a well-known path. The controller runs as a
//! tokio task: local commands arrive on an mpsc channel, store observations
//! are folded into the same `select!` loop, and the resulting phase
//! transitions are published over a watch channel alongside media
//! directives for the layer that owns devices and transport.

pub mod controller;
pub mod record;
pub mod signaling;

mod error;

pub use controller::{spawn_call_session, CallEvent, CallPhase, CallSession};
pub use error::{CallError, Result};
pub use record::{CallRecord, CallStatus};
pub use signaling::{IncomingCalls, RecordWatcher, SignalingChannel};
