//! `!quit` replies then exits the process.

use agent::{Agent, BoxFuture};
use wireproto::{Packet, Payload};

use crate::bot::BotContext;

pub fn spawn(ctx: BotContext) -> Agent<BotContext> {
    let agent = agent::spawn(ctx.clone());
    ctx.client.add_listener(&agent, on_packet);
    agent
}

fn on_packet(state: &mut BotContext, packet: Packet) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let Ok(Payload::SendEvent(message)) = packet.payload() else {
            return;
        };
        if message.content.trim() == "!quit" {
            let _ = state
                .client
                .send_content("good bye!", Some(message.id.clone()))
                .await;
            std::process::exit(0);
        }
    })
}
