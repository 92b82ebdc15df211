/// Viewer identity established once at session start and passed explicitly
/// into the components that need it. Components never re-derive identity from
/// ambient credential state.
#[derive(Debug, Clone)]
pub struct Identity {
    display_name: String,
    bearer: Option<String>,
}

impl Identity {
    /// A signed-in viewer with a bearer credential for the real-time channels.
    pub fn new(display_name: impl Into<String>, bearer: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            bearer: Some(bearer.into()),
        }
    }

    /// An anonymous viewer. Broadcasts may still be received where the
    /// backend permits unauthenticated subscribers.
    pub fn anonymous(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            bearer: None,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer.is_some()
    }
}
