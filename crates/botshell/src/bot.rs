//! Composes a [`ChatClient`], a [`NickAndAuth`], and a one-for-one
//! [`Supervisor`] of user services into one bidirectionally-linked unit.

use std::time::Duration;
use std::time::Instant;

use agent::{Agent, AgentId, ExitCause, HasCore};
use chatclient::ChatClient;
use nickauth::NickAndAuth;
use rtsup::{Intensity, Policy, Supervisable, Supervisor};
use tokio::sync::oneshot;
use wireproto::Packet;

use crate::config::BotSection;
use crate::services;

/// Everything a service factory needs to build its agent: the shared client
/// and nick-and-auth handles, a way to reach the owning bot for `!kill` /
/// `!restart`, and the bot's start time for `!uptime`.
#[derive(Clone)]
pub struct BotContext {
    pub client: ChatClient,
    pub nick_and_auth: NickAndAuth,
    pub bot: Bot,
    pub start_time: Instant,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// A running bot: one chat connection, its nick/auth machine, and a
/// supervised set of services, fate-sharing through a sentinel agent.
#[derive(Clone)]
pub struct Bot {
    sentinel: Agent<()>,
    pub client: ChatClient,
    pub nick_and_auth: NickAndAuth,
    pub services: Supervisor,
}

impl Bot {
    /// Connect to the room described by `config` and start every configured
    /// service under a one-for-one supervisor sized by
    /// `services_max_restarts` / `services_max_restarts_period`.
    pub async fn connect(config: &BotSection) -> anyhow::Result<Bot> {
        let uri = config.uri();
        let client = ChatClient::connect(&uri, config.handle_pings).await?;
        let nick_and_auth = NickAndAuth::spawn(client.clone(), config.nick.clone());
        if !config.passcode.is_empty() {
            nick_and_auth.set_passcode(config.passcode.clone()).await;
        }

        let intensity = Intensity::new(
            config.services_max_restarts,
            Duration::from_secs_f64(config.services_max_restarts_period.max(0.0)),
        );
        let services_supervisor = Supervisor::spawn(Policy::OneForOne, intensity);

        let sentinel = agent::spawn(());
        sentinel.bidirectional_link(&client as &dyn Supervisable);
        sentinel.bidirectional_link(&nick_and_auth as &dyn Supervisable);
        sentinel.bidirectional_link(&services_supervisor as &dyn Supervisable);

        let bot = Bot {
            sentinel,
            client,
            nick_and_auth,
            services: services_supervisor,
        };

        let ctx = BotContext {
            client: bot.client.clone(),
            nick_and_auth: bot.nick_and_auth.clone(),
            bot: bot.clone(),
            start_time: Instant::now(),
            started_at: chrono::Utc::now(),
        };
        services::registry::spawn_configured(&bot.services, &ctx, &config.services).await;

        Ok(bot)
    }

    pub fn id(&self) -> AgentId {
        self.sentinel.id()
    }

    pub fn is_alive(&self) -> bool {
        self.sentinel.is_alive()
    }

    /// Tears down the whole bot: the sentinel's exit propagates to the
    /// client, the nick-and-auth machine, and the service supervisor via
    /// their shared links.
    pub fn exit(&self, cause: Option<ExitCause>) {
        self.sentinel.exit(cause);
    }

    pub async fn send_content(
        &self,
        content: impl Into<String>,
        parent: Option<String>,
    ) -> anyhow::Result<Packet> {
        self.client.send_content(content, parent).await
    }

    pub async fn set_desired_nick(&self, new_nick: impl Into<String>) -> Option<String> {
        self.nick_and_auth.set_desired_nick(new_nick).await
    }

    pub async fn set_passcode(&self, new_passcode: impl Into<String>) -> Option<String> {
        self.nick_and_auth.set_passcode(new_passcode).await
    }

    pub fn add_listener<T, F>(&self, listener: &Agent<T>, handler: F)
    where
        T: Send + 'static,
        F: for<'a> Fn(&'a mut T, Packet) -> agent::BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.client.add_listener(listener, handler);
    }

    /// Resolves once the bot exits, with its exit cause. Safe to call after
    /// the bot has already exited: `monitor` replays the recorded cause to a
    /// watcher registered late instead of dropping the notification.
    pub async fn wait_until_exit(&self) -> Option<ExitCause> {
        let (tx, rx) = oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        let tracker = agent::spawn(tx);
        tracker.monitor(&self.sentinel, move |state, _who, cause| {
            if let Some(tx) = state.lock().unwrap().take() {
                let _ = tx.send(cause);
            }
            Box::pin(async {})
        });
        rx.await.unwrap_or(None)
    }
}

#[cfg(test)]
impl Bot {
    /// Builds a `Bot` from already-spawned parts, skipping `connect`'s real
    /// websocket dial so services can be tested against a fake transport.
    pub(crate) fn for_test(
        sentinel: Agent<()>,
        client: ChatClient,
        nick_and_auth: NickAndAuth,
        services: Supervisor,
    ) -> Bot {
        Bot {
            sentinel,
            client,
            nick_and_auth,
            services,
        }
    }
}
