use std::sync::Arc;

/// Identity of a running agent, stable for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentId(uuid::Uuid);

impl AgentId {
    pub(crate) fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The reason an agent exited. `None` (in the `Option<ExitCause>` the runtime
/// passes around) means it completed normally.
#[derive(Debug, Clone)]
pub enum ExitCause {
    /// A handler returned an error.
    Error(Arc<anyhow::Error>),
    /// Forced down by a one-for-all supervisor rebuilding its child set.
    Restart,
    /// A supervisor's restart-intensity window was exceeded.
    TooManyRestarts,
}

impl std::fmt::Display for ExitCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCause::Error(e) => write!(f, "error: {e}"),
            ExitCause::Restart => write!(f, "restart"),
            ExitCause::TooManyRestarts => write!(f, "too many restarts"),
        }
    }
}
