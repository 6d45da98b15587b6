//! Mailbox actors with cast/call semantics, bidirectional linking,
//! unidirectional monitoring, and linked one-shot subtasks.
//!
//! An agent is a private mailbox drained in strict FIFO order by a single
//! Tokio task. Two agents can be bidirectionally linked (either's exit
//! delivers `exit` to the other) or one can monitor another (a one-way
//! death notification). Both relations survive across agents of unrelated
//! state types, since the bookkeeping lives in a type-erased [`Core`]
//! rather than on the mailbox itself.

mod core;
mod handle;
mod id;

pub use core::{Core, HasCore};
pub use handle::{spawn, Agent, BoxFuture};
pub use id::{AgentId, ExitCause};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn cast_mutates_state_in_order() {
        let agent = spawn(Vec::<u32>::new());
        for i in 0..5u32 {
            agent.cast(move |state| {
                state.push(i);
                Box::pin(async {})
            });
        }
        let seen = agent
            .call(|state| {
                let copy = state.clone();
                Box::pin(async move { copy })
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn call_resolves_none_after_exit() {
        let agent = spawn(0u32);
        agent.exit(None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = agent.call(|_| Box::pin(async { 1u32 })).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn bidirectional_link_propagates_exit_both_ways() {
        let a = spawn(());
        let b = spawn(());
        a.bidirectional_link(&b);
        a.exit(None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!a.is_alive());
        assert!(!b.is_alive());
    }

    #[tokio::test]
    async fn exit_is_idempotent() {
        let a = spawn(());
        a.exit(None);
        a.exit(None);
        assert!(!a.is_alive());
    }

    #[tokio::test]
    async fn monitor_delivers_exactly_one_notification() {
        let target = spawn(());
        let observer_seen = Arc::new(AtomicU32::new(0));
        let observer = spawn(observer_seen.clone());
        observer.monitor(&target, |seen, _who, _cause| {
            seen.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        });
        target.exit(None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(observer_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn spawn_linked_task_success_unlinks_parent_survives() {
        let parent = spawn(());
        parent.spawn_linked_task(|| async { Ok(()) }, true);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(parent.is_alive());
    }

    #[tokio::test]
    async fn spawn_linked_task_failure_kills_parent() {
        let parent = spawn(());
        parent.spawn_linked_task(|| async { Err(anyhow::anyhow!("boom")) }, true);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!parent.is_alive());
    }
}
