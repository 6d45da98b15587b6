use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::core::{Core, HasCore};
use crate::id::{AgentId, ExitCause};

/// A boxed future borrowing for (at most) lifetime `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A unit of mailbox work: given exclusive access to the agent's state for
/// the duration of the returned future, run to completion. Handlers are
/// free to hold `&mut T` across `.await` points (e.g. to write to a socket
/// owned by the state) since the borrow and the future share one lifetime.
pub(crate) type Thunk<T> =
    Box<dyn for<'a> FnOnce(&'a mut T) -> BoxFuture<'a, ()> + Send>;

/// A handle to a running actor: a private mailbox draining in strict FIFO
/// order on its own Tokio task, plus the link/monitor bookkeeping shared
/// with every other agent via [`Core`].
pub struct Agent<T> {
    core: Arc<Core>,
    mailbox: mpsc::UnboundedSender<Thunk<T>>,
}

impl<T> Clone for Agent<T> {
    fn clone(&self) -> Self {
        Agent {
            core: self.core.clone(),
            mailbox: self.mailbox.clone(),
        }
    }
}

impl<T> HasCore for Agent<T> {
    fn core(&self) -> &Arc<Core> {
        &self.core
    }
}

/// Spawn a new agent owning `state`, returning its handle. The task drains
/// the mailbox until `exit` is called (on this agent, or propagated from a
/// linked peer), at which point any items still queued are discarded.
pub fn spawn<T: Send + 'static>(state: T) -> Agent<T> {
    let (tx, rx) = mpsc::unbounded_channel::<Thunk<T>>();
    let core = Core::new();
    let agent = Agent {
        core: core.clone(),
        mailbox: tx,
    };
    tokio::spawn(run(core, state, rx));
    agent
}

async fn run<T: Send + 'static>(
    core: Arc<Core>,
    mut state: T,
    mut rx: mpsc::UnboundedReceiver<Thunk<T>>,
) {
    loop {
        if !core.is_alive() {
            break;
        }
        tokio::select! {
            biased;
            _ = core.exit_signal.notified() => break,
            item = rx.recv() => match item {
                Some(thunk) => {
                    if core.is_alive() {
                        // Race the handler against an exit delivered while it
                        // is suspended mid-`.await` (a linked peer exiting,
                        // or a direct `exit()` from another task): dropping
                        // the handler future here cancels it at that
                        // suspension point, per the runtime's documented
                        // cancellation contract.
                        tokio::select! {
                            biased;
                            _ = core.exit_signal.notified() => {
                                trace!(agent = %core.id(), "handler cancelled by exit");
                            }
                            _ = thunk(&mut state) => {}
                        }
                    }
                }
                None => break,
            },
        }
    }
    trace!(agent = %core.id(), "mailbox task exiting");
}

impl<T: Send + 'static> Agent<T> {
    pub fn id(&self) -> AgentId {
        self.core.id()
    }

    pub fn is_alive(&self) -> bool {
        self.core.is_alive()
    }

    /// Enqueue fire-and-forget work. Silently dropped if the agent has
    /// already exited.
    pub fn cast<F>(&self, f: F)
    where
        F: for<'a> FnOnce(&'a mut T) -> BoxFuture<'a, ()> + Send + 'static,
    {
        if self.mailbox.send(Box::new(f)).is_err() {
            trace!(agent = %self.id(), "cast dropped, mailbox closed");
        }
    }

    /// Enqueue work whose result resolves the returned future. Resolves to
    /// `None` if the agent has already exited, immediately or while the
    /// call was in flight.
    pub fn call<F, R>(&self, f: F) -> impl Future<Output = Option<R>> + 'static
    where
        F: for<'a> FnOnce(&'a mut T) -> BoxFuture<'a, R> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<R>();
        let thunk: Thunk<T> = Box::new(move |state| {
            Box::pin(async move {
                let value = f(state).await;
                let _ = tx.send(value);
            })
        });
        let sent = self.mailbox.send(thunk).is_ok();
        async move {
            if !sent {
                return None;
            }
            rx.await.ok()
        }
    }

    /// After this call, either agent's exit (with any cause) delivers
    /// `exit(cause)` to the other exactly once.
    pub fn bidirectional_link<H: HasCore + ?Sized>(&self, other: &H) {
        self.core.add_link(other.core().clone());
        other.core().add_link(self.core.clone());
    }

    /// Remove a previously established bidirectional link in both
    /// directions, without affecting either agent's liveness.
    pub fn unlink<H: HasCore + ?Sized>(&self, other: &H) {
        self.core.remove_link(other.core());
        other.core().remove_link(&self.core);
    }

    /// Subscribe to a single death notification from `target`. `handler`
    /// runs on this agent's own mailbox (so it is properly serialized with
    /// everything else this agent does) the moment `target` exits.
    pub fn monitor<H, F>(&self, target: &H, handler: F)
    where
        H: HasCore + ?Sized,
        F: for<'a> Fn(&'a mut T, AgentId, Option<ExitCause>) -> BoxFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        let mailbox = self.mailbox.clone();
        let handler = Arc::new(handler);
        target.core().add_watcher(Box::new(move |who, cause| {
            let handler = handler.clone();
            let thunk: Thunk<T> = Box::new(move |state| handler(state, who, cause));
            let _ = mailbox.send(thunk);
        }));
    }

    /// Idempotent termination: propagates to every linked peer, notifies
    /// every monitor, then stops draining the mailbox.
    pub fn exit(&self, cause: Option<ExitCause>) {
        self.core.deliver_exit(cause);
    }

    /// Schedule a one-shot unit of work as a bidirectionally-linked child.
    /// If `unlink_on_success` and the work finishes without error, the
    /// child unlinks from `self` before exiting normally; otherwise it
    /// exits with the work's error (or, if `unlink_on_success` is false,
    /// exits normally but still takes `self` down via the still-live
    /// link) and `self` follows.
    pub fn spawn_linked_task<F, Fut>(&self, work: F, unlink_on_success: bool)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let child = spawn(());
        self.bidirectional_link(&child);
        let parent = self.clone();
        let child_handle = child.clone();
        tokio::spawn(async move {
            match work().await {
                Ok(()) => {
                    if unlink_on_success {
                        child_handle.unlink(&parent);
                    }
                    child_handle.exit(None);
                }
                Err(e) => {
                    child_handle.exit(Some(ExitCause::Error(Arc::new(e))));
                }
            }
        });
    }
}
