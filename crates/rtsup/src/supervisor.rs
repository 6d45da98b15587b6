use std::sync::Arc;

use agent::{Agent, AgentId, BoxFuture, ExitCause, HasCore};
use thiserror::Error;

use crate::policy::{Intensity, Policy};
use crate::supervisable::Supervisable;

/// A fixed restart cap for one-for-all supervisors; the policy has no
/// configurable intensity window, only this constant.
pub const ONE_FOR_ALL_MAX_RESTARTS: u32 = 3;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no child named {0:?}")]
    NoSuchChild(String),
    #[error("child {0:?} is not of the requested type")]
    WrongChildType(String),
    #[error("supervisor has already exited")]
    Gone,
}

struct Child {
    name: String,
    factory: Arc<dyn Fn() -> Box<dyn Supervisable> + Send + Sync>,
    current: Box<dyn Supervisable>,
    restart_count: u32,
}

pub struct SupervisorState {
    policy: Policy,
    intensity: Intensity,
    global_restart_count: u32,
    reset_generation: u64,
    children: Vec<Child>,
    self_handle: Option<Agent<SupervisorState>>,
}

/// An agent whose children are other agents (or agent-backed wrapper types),
/// restarted per [`Policy`] whenever a monitored one exits.
#[derive(Clone)]
pub struct Supervisor {
    agent: Agent<SupervisorState>,
}

impl Supervisor {
    /// Spawn a supervisor. `intensity` governs one-for-one only; one-for-all
    /// ignores it in favor of [`ONE_FOR_ALL_MAX_RESTARTS`].
    pub fn spawn(policy: Policy, intensity: Intensity) -> Supervisor {
        let state = SupervisorState {
            policy,
            intensity,
            global_restart_count: 0,
            reset_generation: 0,
            children: Vec::new(),
            self_handle: None,
        };
        let agent = agent::spawn(state);
        let self_handle = agent.clone();
        agent.cast(move |state| {
            state.self_handle = Some(self_handle);
            Box::pin(async {})
        });
        Supervisor { agent }
    }

    pub fn id(&self) -> AgentId {
        self.agent.id()
    }

    pub fn is_alive(&self) -> bool {
        self.agent.is_alive()
    }

    pub fn exit(&self, cause: Option<ExitCause>) {
        self.agent.exit(cause);
    }

    /// Register and start a child under `name`. `factory` is kept for every
    /// future rebuild; it must be able to produce a fresh, independently
    /// runnable child every time it is called.
    pub async fn add_child<C, F>(&self, name: impl Into<String>, factory: F)
    where
        C: Supervisable + Clone,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let name = name.into();
        let boxed_factory: Arc<dyn Fn() -> Box<dyn Supervisable> + Send + Sync> =
            Arc::new(move || -> Box<dyn Supervisable> { Box::new(factory()) });
        let self_handle = self.agent.clone();
        self.agent
            .call(move |state: &mut SupervisorState| {
                Box::pin(async move {
                    let current = (boxed_factory)();
                    self_handle.monitor(&*current, on_child_exit);
                    state.children.push(Child {
                        name,
                        factory: boxed_factory,
                        current,
                        restart_count: 0,
                    });
                })
            })
            .await;
    }

    /// Fetch the currently-live child registered under `name`, downcast to
    /// its concrete type.
    pub async fn get<C: Supervisable + Clone>(&self, name: &str) -> Result<C, SupervisorError> {
        let name = name.to_string();
        let outcome = self
            .agent
            .call(move |state: &mut SupervisorState| {
                let result = match state.children.iter().find(|c| c.name == name) {
                    None => Err(SupervisorError::NoSuchChild(name.clone())),
                    Some(child) => child
                        .current
                        .as_any()
                        .downcast_ref::<C>()
                        .cloned()
                        .ok_or_else(|| SupervisorError::WrongChildType(name.clone())),
                };
                Box::pin(async move { result })
            })
            .await;
        outcome.unwrap_or(Err(SupervisorError::Gone))
    }
}

impl Supervisable for Supervisor {
    fn id(&self) -> AgentId {
        self.agent.id()
    }

    fn is_alive(&self) -> bool {
        self.agent.is_alive()
    }

    fn exit(&self, cause: Option<ExitCause>) {
        self.agent.exit(cause);
    }

    fn core(&self) -> &Arc<agent::Core> {
        HasCore::core(&self.agent)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Supervisable> {
        Box::new(self.clone())
    }
}

fn on_child_exit(
    state: &mut SupervisorState,
    who: AgentId,
    cause: Option<ExitCause>,
) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        match state.policy {
            Policy::OneForOne => one_for_one_restart(state, who, cause).await,
            Policy::OneForAll => one_for_all_restart(state, who, cause).await,
        }
    })
}

async fn one_for_one_restart(state: &mut SupervisorState, who: AgentId, cause: Option<ExitCause>) {
    let Some(idx) = state.children.iter().position(|c| c.current.id() == who) else {
        tracing::debug!(%who, "stale child-exit notification, ignoring");
        return;
    };
    let self_handle = state
        .self_handle
        .clone()
        .expect("self_handle set before any child can exit");

    state.children[idx].restart_count += 1;
    bump_intensity_window(state, &self_handle);

    if state.global_restart_count > state.intensity.max_restarts {
        tracing::warn!(
            restarts = state.global_restart_count,
            max = state.intensity.max_restarts,
            "supervisor exceeded restart intensity, exiting"
        );
        self_handle.exit(Some(ExitCause::TooManyRestarts));
        return;
    }

    let name = state.children[idx].name.clone();
    tracing::info!(child = %name, ?cause, "restarting child");
    let rebuilt = (state.children[idx].factory)();
    self_handle.monitor(&*rebuilt, on_child_exit);
    state.children[idx].current = rebuilt;
}

async fn one_for_all_restart(state: &mut SupervisorState, who: AgentId, cause: Option<ExitCause>) {
    if !state.children.iter().any(|c| c.current.id() == who) {
        tracing::debug!(%who, "stale child-exit notification, ignoring");
        return;
    }
    let self_handle = state
        .self_handle
        .clone()
        .expect("self_handle set before any child can exit");

    state.global_restart_count += 1;
    if state.global_restart_count > ONE_FOR_ALL_MAX_RESTARTS {
        tracing::warn!("one-for-all supervisor exceeded fixed restart cap, exiting");
        self_handle.exit(Some(ExitCause::TooManyRestarts));
        return;
    }

    tracing::info!(trigger = %who, ?cause, "one-for-all restart, rebuilding every child");
    for child in state.children.iter() {
        if child.current.id() != who && child.current.is_alive() {
            child.current.exit(Some(ExitCause::Restart));
        }
    }
    for child in state.children.iter_mut() {
        let rebuilt = (child.factory)();
        self_handle.monitor(&*rebuilt, on_child_exit);
        child.current = rebuilt;
        child.restart_count += 1;
    }
}

/// Each failure bumps a generation token and schedules a delayed reset of
/// the global counter; a stale timer (superseded by a later failure) finds
/// its generation doesn't match on wake and becomes a no-op, the effect of
/// "cancel and reschedule" without an actual cancellation handle.
fn bump_intensity_window(state: &mut SupervisorState, self_handle: &Agent<SupervisorState>) {
    state.global_restart_count += 1;
    state.reset_generation += 1;
    let generation = state.reset_generation;
    let period = state.intensity.period;
    let handle = self_handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(period).await;
        handle.cast(move |state: &mut SupervisorState| {
            if state.reset_generation == generation {
                state.global_restart_count = 0;
            }
            Box::pin(async {})
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn counting_child(count: Arc<AtomicU32>, fail_first_n: u32) -> Agent<AtomicU32> {
        let agent = agent::spawn(AtomicU32::new(0));
        count.fetch_add(1, Ordering::SeqCst);
        let attempt = count.load(Ordering::SeqCst);
        if attempt <= fail_first_n {
            agent.exit(Some(ExitCause::Error(Arc::new(anyhow::anyhow!("boom")))));
        }
        agent
    }

    #[tokio::test]
    async fn one_for_one_restarts_failed_child_only() {
        let sup = Supervisor::spawn(
            Policy::OneForOne,
            Intensity::new(5, Duration::from_millis(200)),
        );
        let spawns = Arc::new(AtomicU32::new(0));
        let spawns_for_factory = spawns.clone();
        sup.add_child("flaky", move || counting_child(spawns_for_factory.clone(), 1))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(spawns.load(Ordering::SeqCst) >= 2);
        assert!(sup.is_alive());
    }

    #[tokio::test]
    async fn one_for_one_exhausts_intensity_window() {
        let sup = Supervisor::spawn(
            Policy::OneForOne,
            Intensity::new(1, Duration::from_millis(150)),
        );
        let spawns = Arc::new(AtomicU32::new(0));
        let spawns_for_factory = spawns.clone();
        sup.add_child("flaky", move || counting_child(spawns_for_factory.clone(), 10))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!sup.is_alive());
    }

    #[tokio::test]
    async fn one_for_one_survives_failures_spaced_beyond_period() {
        let sup = Supervisor::spawn(
            Policy::OneForOne,
            Intensity::new(1, Duration::from_millis(60)),
        );
        let spawns = Arc::new(AtomicU32::new(0));
        let spawns_for_factory = spawns.clone();
        sup.add_child("flaky", move || counting_child(spawns_for_factory.clone(), 1))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sup.is_alive());

        // Let the intensity window reset, then fail the rebuilt child once
        // more from outside: still only one failure inside any one window.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let child: Agent<AtomicU32> = sup.get("flaky").await.unwrap();
        child.exit(Some(ExitCause::Error(Arc::new(anyhow::anyhow!(
            "boom again"
        )))));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sup.is_alive());
    }

    #[tokio::test]
    async fn one_for_all_restarts_every_sibling() {
        let sup = Supervisor::spawn(Policy::OneForAll, Intensity::new(3, Duration::from_secs(1)));
        sup.add_child("a", || agent::spawn(0u32)).await;
        sup.add_child("b", || agent::spawn(0u32)).await;

        let first_a: Agent<u32> = sup.get("a").await.unwrap();
        let first_b: Agent<u32> = sup.get("b").await.unwrap();
        first_a.exit(None);
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!first_b.is_alive());
        let second_a: Agent<u32> = sup.get("a").await.unwrap();
        let second_b: Agent<u32> = sup.get("b").await.unwrap();
        assert!(second_a.is_alive());
        assert!(second_b.is_alive());
        assert!(sup.is_alive());
    }

    #[tokio::test]
    async fn get_returns_no_such_child_for_unknown_name() {
        let sup = Supervisor::spawn(Policy::OneForOne, Intensity::new(3, Duration::from_secs(1)));
        let missing = sup.get::<Agent<u32>>("nope").await;
        assert!(matches!(missing, Err(SupervisorError::NoSuchChild(_))));
    }
}
