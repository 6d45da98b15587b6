//! `!ping @nick`, `!uptime @nick`, `!kill @nick`, `!restart @nick`, gated on
//! the mention matching the bot's current nick.

use agent::{Agent, BoxFuture, ExitCause};
use regex::{Captures, Regex};
use wireproto::{Packet, Payload};

use crate::bot::BotContext;

struct State {
    ctx: BotContext,
    ping_re: Regex,
    uptime_re: Regex,
    kill_re: Regex,
    restart_re: Regex,
}

pub fn spawn(ctx: BotContext) -> Agent<State> {
    let state = State {
        ctx: ctx.clone(),
        ping_re: Regex::new(r"^!ping @(.+)$").unwrap(),
        uptime_re: Regex::new(r"^!uptime @(.+)$").unwrap(),
        kill_re: Regex::new(r"^!kill @(.+)$").unwrap(),
        restart_re: Regex::new(r"^!restart @(.+)$").unwrap(),
    };
    let agent = agent::spawn(state);
    ctx.client.add_listener(&agent, on_packet);
    agent
}

async fn is_mentioned(state: &State, caps: &Captures<'_>) -> bool {
    let mentioned = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    state.ctx.nick_and_auth.current_nick().await.as_deref() == Some(mentioned)
}

/// Formats as `H:MM:SS`, with no leading zero on the hour count.
fn format_uptime(elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs();
    let (hours, rem) = (secs / 3600, secs % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    format!("{hours}:{minutes:02}:{seconds:02}")
}

fn on_packet(state: &mut State, packet: Packet) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let Ok(Payload::SendEvent(message)) = packet.payload() else {
            return;
        };
        let parent = message.id.clone();
        let content = message.content.clone();

        if let Some(caps) = state.ping_re.captures(&content) {
            if is_mentioned(state, &caps).await {
                let _ = state.ctx.client.send_content("pong!", Some(parent)).await;
            }
            return;
        }

        if let Some(caps) = state.uptime_re.captures(&content) {
            if is_mentioned(state, &caps).await {
                let uptime = format_uptime(state.ctx.start_time.elapsed());
                let msg = format!(
                    "/me has been up since {} ({})",
                    state.ctx.started_at.to_rfc2822(),
                    uptime
                );
                let _ = state.ctx.client.send_content(msg, Some(parent)).await;
            }
            return;
        }

        if let Some(caps) = state.kill_re.captures(&content) {
            if is_mentioned(state, &caps).await {
                state.ctx.bot.exit(None);
            }
            return;
        }

        if let Some(caps) = state.restart_re.captures(&content) {
            if is_mentioned(state, &caps).await {
                // Taking the whole bot down with `Restart` lets the
                // top-level restart loop in `main.rs` rebuild it; a service
                // has no direct handle to that outer supervisor.
                state.ctx.bot.exit(Some(ExitCause::Restart));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatclient::{fake, ChatClient};
    use nickauth::NickAndAuth;
    use rtsup::{Intensity, Policy, Supervisor};
    use serde_json::json;
    use std::time::Duration;

    async fn test_ctx() -> (
        BotContext,
        tokio::sync::mpsc::UnboundedReceiver<String>,
        tokio::sync::mpsc::UnboundedSender<String>,
    ) {
        let ((writer, sent), (reader, inbound)) = fake::pair();
        let client = ChatClient::from_transport(writer, reader, false);
        let nick_and_auth = NickAndAuth::spawn(client.clone(), "bob");
        let services = Supervisor::spawn(Policy::OneForOne, Intensity::new(3, Duration::from_secs(1)));
        let sentinel = agent::spawn(());
        let bot = crate::bot::Bot::for_test(sentinel, client.clone(), nick_and_auth.clone(), services);
        let ctx = BotContext {
            client,
            nick_and_auth,
            bot,
            start_time: std::time::Instant::now(),
            started_at: chrono::Utc::now(),
        };
        (ctx, sent, inbound)
    }

    #[tokio::test]
    async fn ping_replies_only_when_mentioned_nick_matches() {
        let (ctx, mut sent, inbound) = test_ctx().await;
        let _service = spawn(ctx);

        // Drive the hello/nick-reply handshake so `current_nick` becomes
        // "bob" before exercising the mention gate.
        inbound
            .send(
                json!({"type":"hello-event","data":{
                    "id":"a","session":{"id":"a","name":"guest","server_id":"s","server_era":"e","session_id":"sess"},
                    "room_is_private": false, "version":"v1"
                }})
                .to_string(),
            )
            .unwrap();
        let hello_frame = tokio::time::timeout(Duration::from_millis(200), sent.recv())
            .await
            .unwrap()
            .unwrap();
        let hello_envelope: serde_json::Value = serde_json::from_str(&hello_frame).unwrap();
        let hello_id = hello_envelope["id"].as_str().unwrap().to_string();
        inbound
            .send(
                json!({"id": hello_id, "type":"nick-reply","data":{
                    "session_id":"sess","id":"a","from":"guest","to":"bob"
                }})
                .to_string(),
            )
            .unwrap();

        inbound
            .send(
                json!({"type":"send-event","data":{
                    "id":"m1","time":1,
                    "sender":{"id":"a","name":"n","server_id":"s","server_era":"e","session_id":"sess"},
                    "content":"!ping @someoneelse"
                }})
                .to_string(),
            )
            .unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(50), sent.recv())
            .await
            .is_err());

        inbound
            .send(
                json!({"type":"send-event","data":{
                    "id":"m2","time":1,
                    "sender":{"id":"a","name":"n","server_id":"s","server_era":"e","session_id":"sess"},
                    "content":"!ping @bob"
                }})
                .to_string(),
            )
            .unwrap();
        let frame = tokio::time::timeout(Duration::from_millis(200), sent.recv())
            .await
            .unwrap()
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope["data"]["content"], "pong!");
        assert_eq!(envelope["data"]["parent"], "m2");
    }
}
