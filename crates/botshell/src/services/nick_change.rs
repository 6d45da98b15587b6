//! `!nick <name>` delegates to [`nickauth::NickAndAuth::set_desired_nick`].

use agent::{Agent, BoxFuture};
use regex::Regex;
use wireproto::{Packet, Payload};

use crate::bot::BotContext;

struct State {
    ctx: BotContext,
    nick_re: Regex,
}

pub fn spawn(ctx: BotContext) -> Agent<State> {
    let state = State {
        ctx: ctx.clone(),
        nick_re: Regex::new(r"^!nick (\S+)$").unwrap(),
    };
    let agent = agent::spawn(state);
    ctx.client.add_listener(&agent, on_packet);
    agent
}

fn on_packet(state: &mut State, packet: Packet) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let Ok(Payload::SendEvent(message)) = packet.payload() else {
            return;
        };
        let Some(caps) = state.nick_re.captures(message.content.trim()) else {
            return;
        };
        let new_nick = caps[1].to_string();
        if let Some(err) = state.ctx.nick_and_auth.set_desired_nick(new_nick).await {
            let _ = state
                .ctx
                .client
                .send_content(format!("couldn't change nick: {err}"), Some(message.id.clone()))
                .await;
        }
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
    use std::time::Duration;

    #[tokio::test]
    async fn nick_command_delegates_to_nick_and_auth() {
        let ((writer, mut sent), (reader, inbound)) = fake::pair();
        let client = ChatClient::from_transport(writer, reader, false);
        let nick_and_auth = NickAndAuth::spawn(client.clone(), "bob");
        let services = Supervisor::spawn(Policy::OneForOne, Intensity::new(3, Duration::from_secs(1)));
        let sentinel = agent::spawn(());
        let bot = Bot::for_test(sentinel, client.clone(), nick_and_auth.clone(), services);
        let ctx = BotContext {
            client,
            nick_and_auth,
            bot,
            start_time: std::time::Instant::now(),
            started_at: chrono::Utc::now(),
        };
        let _service = spawn(ctx);

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
                    "sender":{"id":"a","name":"guest","server_id":"s","server_era":"e","session_id":"sess"},
                    "content":"!nick ferris"
                }})
                .to_string(),
            )
            .unwrap();
        let frame = tokio::time::timeout(Duration::from_millis(200), sent.recv())
            .await
            .unwrap()
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope["type"], "nick");
        assert_eq!(envelope["data"]["name"], "ferris");
    }
}
