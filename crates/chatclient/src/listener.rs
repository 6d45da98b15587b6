use std::sync::Arc;

use agent::{Agent, AgentId};
use wireproto::Packet;

/// A registered recipient of every inbound packet. Held by [`crate::ClientState`]
/// for as long as it reports itself alive; stale entries are swept out
/// lazily the next time the listener set is traversed, the idiomatic
/// replacement for a `WeakSet`.
pub trait PacketListener: Send + Sync {
    fn id(&self) -> AgentId;
    fn is_alive(&self) -> bool;
    fn deliver(&self, packet: Packet);
}

/// Adapts an [`Agent<T>`] plus a handler closure into a [`PacketListener`],
/// delivering each packet via a `cast` onto the listening agent's own
/// mailbox.
pub struct AgentListener<T, F> {
    agent: Agent<T>,
    handler: Arc<F>,
}

impl<T, F> AgentListener<T, F>
where
    T: Send + 'static,
    F: for<'a> Fn(&'a mut T, Packet) -> agent::BoxFuture<'a, ()> + Send + Sync + 'static,
{
    pub fn new(agent: Agent<T>, handler: F) -> Self {
        Self {
            agent,
            handler: Arc::new(handler),
        }
    }
}

impl<T, F> PacketListener for AgentListener<T, F>
where
    T: Send + 'static,
    F: for<'a> Fn(&'a mut T, Packet) -> agent::BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn id(&self) -> AgentId {
        self.agent.id()
    }

    fn is_alive(&self) -> bool {
        self.agent.is_alive()
    }

    fn deliver(&self, packet: Packet) {
        let handler = self.handler.clone();
        self.agent
            .cast(move |state| handler(state, packet));
    }
}
