//! Reactive state machine maintaining "current nick equals desired nick"
//! and "authorized to speak" across reconnects and server-initiated
//! bounces, by listening to one [`chatclient::ChatClient`].

mod state;

use std::sync::Arc;

use agent::{Agent, ExitCause, HasCore};
use chatclient::ChatClient;

pub use state::NickAndAuthState;

/// A listener on a [`ChatClient`] that keeps the session's displayed nick
/// matched to a desired one and re-authenticates through passcode bounces.
#[derive(Clone)]
pub struct NickAndAuth {
    agent: Agent<NickAndAuthState>,
}

impl NickAndAuth {
    /// Spawn the machine and register it as a listener on `client`.
    pub fn spawn(client: ChatClient, desired_nick: impl Into<String>) -> NickAndAuth {
        let state = NickAndAuthState::new(client.clone(), desired_nick.into());
        let agent = agent::spawn(state);
        client.add_listener(&agent, state::dispatch_packet);
        NickAndAuth { agent }
    }

    pub fn id(&self) -> agent::AgentId {
        self.agent.id()
    }

    pub fn is_alive(&self) -> bool {
        self.agent.is_alive()
    }

    pub fn exit(&self, cause: Option<ExitCause>) {
        state::exit_with(&self.agent, cause);
    }

    /// Update the goal nick and attempt a `nick` command. Resolves to
    /// `None` on success (including "nothing to do, already authorized and
    /// matching"), or an error string on failure.
    pub async fn set_desired_nick(&self, new_nick: impl Into<String>) -> Option<String> {
        let new_nick = new_nick.into();
        self.agent
            .call(state::set_desired_nick_thunk(new_nick))
            .await
            .flatten()
    }

    /// Update the passcode and, if not currently authorized, attempt auth
    /// with it (re-attempting the desired nick on success). Resolves to
    /// `None` on success, or an error string on failure.
    pub async fn set_passcode(&self, new_passcode: impl Into<String>) -> Option<String> {
        let new_passcode = new_passcode.into();
        self.agent
            .call(state::set_passcode_thunk(new_passcode))
            .await
            .flatten()
    }

    /// The session's currently displayed nick, if known.
    pub async fn current_nick(&self) -> Option<String> {
        self.agent
            .call(|state: &mut NickAndAuthState| {
                let nick = state.current_nick.clone();
                Box::pin(async move { nick })
            })
            .await
            .flatten()
    }

    /// Whether the room currently considers this session authorized.
    pub async fn is_authorized(&self) -> bool {
        self.agent
            .call(|state: &mut NickAndAuthState| {
                let authorized = state.authorized;
                Box::pin(async move { authorized })
            })
            .await
            .unwrap_or(false)
    }
}

impl rtsup::Supervisable for NickAndAuth {
    fn id(&self) -> agent::AgentId {
        self.agent.id()
    }

    fn is_alive(&self) -> bool {
        self.agent.is_alive()
    }

    fn exit(&self, cause: Option<ExitCause>) {
        self.agent.exit(cause);
    }

    fn core(&self) -> &Arc<agent::Core> {
        self.agent.core()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn clone_box(&self) -> Box<dyn rtsup::Supervisable> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatclient::fake;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn hello_with_public_room_authorizes_and_sets_nick() {
        let ((_writer, mut sent), (_reader, inbound)) = fake::pair();
        let client = ChatClient::from_transport(_writer, _reader, false);
        let nick_and_auth = NickAndAuth::spawn(client, "bob");

        inbound
            .send(
                json!({
                    "type": "hello-event",
                    "data": {
                        "id": "agent:1",
                        "session": {"id":"agent:1","name":"guest123","server_id":"s","server_era":"e","session_id":"sess1"},
                        "room_is_private": false,
                        "version": "v1"
                    }
                })
                .to_string(),
            )
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_millis(200), sent.recv())
            .await
            .unwrap()
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope["type"], "nick");
        assert_eq!(envelope["data"]["name"], "bob");

        let id = envelope["id"].as_str().unwrap().to_string();
        inbound
            .send(
                json!({
                    "id": id,
                    "type": "nick-reply",
                    "data": {"session_id":"sess1","id":"agent:1","from":"guest123","to":"bob"}
                })
                .to_string(),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(nick_and_auth.current_nick().await.as_deref(), Some("bob"));
        assert!(nick_and_auth.is_authorized().await);
    }

    #[tokio::test]
    async fn bounce_then_successful_auth_reattempts_nick() {
        let ((_writer, mut sent), (_reader, inbound)) = fake::pair();
        let client = ChatClient::from_transport(_writer, _reader, false);
        let nick_and_auth = NickAndAuth::spawn(client, "bob");

        // `set_passcode` itself attempts auth inline since the room isn't
        // authorized yet, so it can't be awaited directly here —
        // doing so would block this task on the very reply this test still
        // has to manufacture. Run it in the background and await it only
        // after both replies are in.
        let set_passcode_call = tokio::spawn({
            let nick_and_auth = nick_and_auth.clone();
            async move { nick_and_auth.set_passcode("open").await }
        });

        inbound
            .send(
                json!({"type":"bounce-event","data":{"auth_options":["passcode"]}}).to_string(),
            )
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_millis(200), sent.recv())
            .await
            .unwrap()
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope["type"], "auth");
        assert_eq!(envelope["data"]["passcode"], "open");
        let id = envelope["id"].as_str().unwrap().to_string();

        inbound
            .send(json!({"id": id, "type":"auth-reply", "data": {"success": true}}).to_string())
            .unwrap();

        let nick_frame = tokio::time::timeout(Duration::from_millis(200), sent.recv())
            .await
            .unwrap()
            .unwrap();
        let nick_envelope: serde_json::Value = serde_json::from_str(&nick_frame).unwrap();
        assert_eq!(nick_envelope["type"], "nick");
        let nick_id = nick_envelope["id"].as_str().unwrap().to_string();

        inbound
            .send(
                json!({
                    "id": nick_id,
                    "type": "nick-reply",
                    "data": {"session_id":"sess1","id":"agent:1","from":"bob","to":"bob"}
                })
                .to_string(),
            )
            .unwrap();

        assert_eq!(
            tokio::time::timeout(Duration::from_millis(200), set_passcode_call)
                .await
                .unwrap()
                .unwrap(),
            None
        );
        assert!(nick_and_auth.is_authorized().await);
    }

    #[tokio::test]
    async fn bounce_without_passcode_marks_auth_failed_and_does_not_retry() {
        let ((_writer, mut sent), (_reader, inbound)) = fake::pair();
        let client = ChatClient::from_transport(_writer, _reader, false);
        let nick_and_auth = NickAndAuth::spawn(client, "bob");

        inbound
            .send(json!({"type":"bounce-event","data":{"auth_options":["passcode"]}}).to_string())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!nick_and_auth.is_authorized().await);
        assert!(tokio::time::timeout(Duration::from_millis(30), sent.recv())
            .await
            .is_err());
    }
}
