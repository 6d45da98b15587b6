//! `!remind <n>m <message>` schedules a delayed reply via a linked one-shot
//! subtask.

use std::time::Duration;

use agent::{Agent, BoxFuture};
use regex::Regex;
use wireproto::{Packet, Payload};

use crate::bot::BotContext;

struct State {
    ctx: BotContext,
    remind_re: Regex,
    self_handle: Option<Agent<State>>,
}

pub fn spawn(ctx: BotContext) -> Agent<State> {
    let state = State {
        ctx: ctx.clone(),
        remind_re: Regex::new(r"^!remind (\d+)m (.+)$").unwrap(),
        self_handle: None,
    };
    let agent = agent::spawn(state);
    let self_handle = agent.clone();
    agent.cast(move |state| {
        state.self_handle = Some(self_handle);
        Box::pin(async {})
    });
    ctx.client.add_listener(&agent, on_packet);
    agent
}

fn on_packet(state: &mut State, packet: Packet) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let Ok(Payload::SendEvent(message)) = packet.payload() else {
            return;
        };
        if !message.content.starts_with("!remind") {
            return;
        }
        let parent = message.id.clone();

        let Some(caps) = state.remind_re.captures(&message.content) else {
            let _ = state
                .ctx
                .client
                .send_content("usage: !remind 15m go on a walk", Some(parent))
                .await;
            return;
        };
        let minutes: u64 = caps[1].parse().unwrap_or(0);
        let body = caps[2].to_string();
        let announcement = format!("reminder @{}: {}", message.sender.name, body);

        let client = state.ctx.client.clone();
        let bot = state.ctx.bot.clone();
        let self_handle = state
            .self_handle
            .clone()
            .expect("self_handle set before any packet can arrive");
        self_handle.spawn_linked_task(
            move || async move {
                tokio::time::sleep(Duration::from_secs(minutes * 60)).await;
                if bot.is_alive() {
                    let _ = client.send_content(announcement, None).await;
                }
                Ok(())
            },
            true,
        );
        let _ = state.ctx.client.send_content("acknowledged!", Some(parent)).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::Bot;
    use chatclient::{fake, ChatClient};
    use nickauth::NickAndAuth;
    use rtsup::{Intensity, Policy, Supervisor};
    use serde_json::json;
    use std::time::Duration as StdDuration;

    async fn test_ctx() -> (
        BotContext,
        tokio::sync::mpsc::UnboundedReceiver<String>,
        tokio::sync::mpsc::UnboundedSender<String>,
    ) {
        let ((writer, sent), (reader, inbound)) = fake::pair();
        let client = ChatClient::from_transport(writer, reader, false);
        let nick_and_auth = NickAndAuth::spawn(client.clone(), "bob");
        let services = Supervisor::spawn(Policy::OneForOne, Intensity::new(3, StdDuration::from_secs(1)));
        let sentinel = agent::spawn(());
        let bot = Bot::for_test(sentinel, client.clone(), nick_and_auth.clone(), services);
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
    async fn malformed_remind_gets_usage_reply() {
        let (ctx, mut sent, inbound) = test_ctx().await;
        let _service = spawn(ctx);

        inbound
            .send(
                json!({"type":"send-event","data":{
                    "id":"m1","time":1,
                    "sender":{"id":"a","name":"n","server_id":"s","server_era":"e","session_id":"sess"},
                    "content":"!remind soon please"
                }})
                .to_string(),
            )
            .unwrap();
        let frame = tokio::time::timeout(StdDuration::from_millis(200), sent.recv())
            .await
            .unwrap()
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert!(envelope["data"]["content"]
            .as_str()
            .unwrap()
            .starts_with("usage:"));
    }

    #[tokio::test]
    async fn well_formed_remind_acknowledges_immediately() {
        let (ctx, mut sent, inbound) = test_ctx().await;
        let _service = spawn(ctx);

        inbound
            .send(
                json!({"type":"send-event","data":{
                    "id":"m1","time":1,
                    "sender":{"id":"a","name":"n","server_id":"s","server_era":"e","session_id":"sess"},
                    "content":"!remind 1m eat food"
                }})
                .to_string(),
            )
            .unwrap();
        let frame = tokio::time::timeout(StdDuration::from_millis(200), sent.recv())
            .await
            .unwrap()
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope["data"]["content"], "acknowledged!");
    }
}
