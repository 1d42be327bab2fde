use aula_shared::UserId;

/// The local session identity, passed explicitly into every component that
/// needs it rather than read from ambient state.
#[derive(Debug, Clone)]
pub struct ClientContext {
    /// The signed-in platform account.
    pub user: UserId,
    /// Optional display name, for presentation layers.
    pub display_name: Option<String>,
}

impl ClientContext {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}
