use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::id::{AgentId, ExitCause};

type WatcherFn = Box<dyn Fn(AgentId, Option<ExitCause>) + Send + Sync>;

/// The type-erased half of an agent: identity, liveness, and the link and
/// watcher sets. Kept separate from `Agent<T>` so that agents of different
/// state types can link to and monitor one another without either side
/// knowing the other's concrete type.
pub struct Core {
    id: AgentId,
    inner: Mutex<Inner>,
    pub(crate) exit_signal: Notify,
}

struct Inner {
    alive: bool,
    /// The cause most recently delivered, meaningful only once `!alive`.
    /// Lets a `monitor()` registered after the target has already exited
    /// still observe the cause it exited with, instead of silently missing
    /// the notification.
    exit_cause: Option<ExitCause>,
    links: Vec<Arc<Core>>,
    watchers: Vec<WatcherFn>,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            alive: true,
            exit_cause: None,
            links: Vec::new(),
            watchers: Vec::new(),
        }
    }
}

impl Core {
    pub(crate) fn new() -> Arc<Core> {
        Arc::new(Core {
            id: AgentId::new(),
            inner: Mutex::new(Inner::default()),
            exit_signal: Notify::new(),
        })
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.inner.lock().unwrap().alive
    }

    pub(crate) fn add_link(&self, peer: Arc<Core>) {
        self.inner.lock().unwrap().links.push(peer);
    }

    pub(crate) fn remove_link(&self, peer: &Arc<Core>) {
        self.inner
            .lock()
            .unwrap()
            .links
            .retain(|c| !Arc::ptr_eq(c, peer));
    }

    /// Registers `watcher` to run the next time this agent exits. If it has
    /// already exited, fires `watcher` immediately with the recorded cause
    /// instead of dropping the notification on the floor.
    pub(crate) fn add_watcher(&self, watcher: WatcherFn) {
        let already_exited = {
            let mut inner = self.inner.lock().unwrap();
            if inner.alive {
                inner.watchers.push(watcher);
                None
            } else {
                Some(inner.exit_cause.clone())
            }
        };
        if let Some(cause) = already_exited {
            watcher(self.id, cause);
        }
    }

    /// Idempotent exit: propagates to every currently-linked peer with the
    /// same cause and notifies every watcher exactly once, then clears both
    /// sets so a later traversal finds nothing.
    pub fn deliver_exit(self: &Arc<Core>, cause: Option<ExitCause>) {
        let (links, watchers) = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.alive {
                return;
            }
            inner.alive = false;
            inner.exit_cause = cause.clone();
            (
                std::mem::take(&mut inner.links),
                std::mem::take(&mut inner.watchers),
            )
        };
        for peer in &links {
            peer.deliver_exit(cause.clone());
        }
        for watcher in &watchers {
            watcher(self.id, cause.clone());
        }
        self.exit_signal.notify_waiters();
    }
}

/// Implemented by anything that can be linked or monitored: just `Agent<T>`.
/// Object-unsafe methods live on `Agent<T>` itself; this trait only exposes
/// the type-erased core so the runtime can support heterogeneous children
/// under one supervisor.
pub trait HasCore {
    fn core(&self) -> &Arc<Core>;
}
