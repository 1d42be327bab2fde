//! # aula-client
//!
//! The realtime layer's facade: wires the chat service, the call-session
//! controller, and the media session manager together behind one client
//! handle, and drives media setup/teardown from call-session events.
//!
//! The rest of the platform (dashboards, grading, enrollment, all outside
//! this workspace) talks to [`RealtimeClient`] only.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod events;

pub use client::RealtimeClient;
pub use config::ClientConfig;
pub use context::ClientContext;
pub use error::ClientError;
pub use events::ClientEvent;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the tracing subscriber with an env-filtered format layer.
///
/// Call once at application startup; `RUST_LOG` overrides the defaults.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("aula_client=debug,aula_call=debug,aula_chat=debug,aula_store=info,aula_media=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
