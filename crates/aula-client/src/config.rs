//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the realtime layer starts with zero
//! configuration in development.

use aula_shared::UserId;

/// Facade configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The singleton advisor account id, if the deployment has one.
    /// Conversations with this account also read the legacy
    /// `advisor_chats/{student}` message path.
    /// Env: `AULA_ADVISOR_ID`
    /// Default: none.
    pub advisor: Option<UserId>,

    /// Capacity of the client event channel.
    /// Env: `AULA_EVENT_CAPACITY`
    /// Default: `32`
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            advisor: None,
            event_capacity: 32,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("AULA_ADVISOR_ID") {
            if !id.is_empty() {
                config.advisor = Some(UserId::new(id));
            }
        }

        if let Ok(value) = std::env::var("AULA_EVENT_CAPACITY") {
            match value.parse::<usize>() {
                Ok(capacity) if capacity > 0 => config.event_capacity = capacity,
                _ => {
                    tracing::warn!(value = %value, "Invalid AULA_EVENT_CAPACITY, using default");
                }
            }
        }

        config
    }
}
