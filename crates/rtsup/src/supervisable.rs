use std::any::Any;
use std::sync::Arc;

use agent::{Agent, AgentId, Core, ExitCause, HasCore};

/// Anything a supervisor can own as a child: agents directly, or wrapper
/// types built on top of an agent (a [`chatclient::ChatClient`], a
/// nick-and-auth machine) that want their domain methods visible to callers
/// who fetch them back out of the supervisor by name.
pub trait Supervisable: Send + Sync + 'static {
    fn id(&self) -> AgentId;
    fn is_alive(&self) -> bool;
    fn exit(&self, cause: Option<ExitCause>);
    fn core(&self) -> &Arc<Core>;
    fn as_any(&self) -> &dyn Any;
    fn clone_box(&self) -> Box<dyn Supervisable>;
}

impl<T: Send + 'static> Supervisable for Agent<T> {
    fn id(&self) -> AgentId {
        Agent::id(self)
    }

    fn is_alive(&self) -> bool {
        Agent::is_alive(self)
    }

    fn exit(&self, cause: Option<ExitCause>) {
        Agent::exit(self, cause)
    }

    fn core(&self) -> &Arc<Core> {
        <Self as HasCore>::core(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Supervisable> {
        Box::new(self.clone())
    }
}

/// Bridges the type-erased [`Supervisable`] set back onto [`HasCore`] so a
/// supervisor (itself an ordinary agent) can `monitor`/`bidirectional_link`
/// a `dyn Supervisable` the same way it would a concrete `Agent<T>`.
impl HasCore for dyn Supervisable {
    fn core(&self) -> &Arc<Core> {
        Supervisable::core(self)
    }
}

impl Clone for Box<dyn Supervisable> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
