use std::time::Duration;

/// Restart policy for a supervisor's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Children are independent: only the one that exited is rebuilt.
    OneForOne,
    /// Any exit tears down and rebuilds the whole child set together.
    OneForAll,
}

/// `(max_restarts, period)`: more than `max_restarts` failures within
/// `period` exhausts the supervisor. Only consulted under [`Policy::OneForOne`];
/// one-for-all uses a fixed cap instead (see [`crate::supervisor::ONE_FOR_ALL_MAX_RESTARTS`]).
#[derive(Debug, Clone, Copy)]
pub struct Intensity {
    pub max_restarts: u32,
    pub period: Duration,
}

impl Intensity {
    pub fn new(max_restarts: u32, period: Duration) -> Self {
        Self { max_restarts, period }
    }
}
