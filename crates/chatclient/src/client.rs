use std::collections::HashMap;
use std::sync::Arc;

use agent::{Agent, BoxFuture, ExitCause};
use tokio::sync::oneshot;
use wireproto::{Command, Packet, Payload};

use crate::listener::{AgentListener, PacketListener};
use crate::transport::{TransportReader, TransportWriter};

/// State owned exclusively by the client agent's mailbox task: the socket's
/// write half, the reply map, the outbound id counter, and the listener
/// set. Reads happen only in the linked receive subtask; every mutation
/// here happens only on this agent's own mailbox thread.
pub struct ClientState {
    writer: Box<dyn TransportWriter>,
    reply_map: HashMap<String, oneshot::Sender<Packet>>,
    next_id: u64,
    listeners: Vec<Arc<dyn PacketListener>>,
    handle_pings: bool,
}

impl ClientState {
    fn next_correlation_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }

    /// Assigns a correlation id, registers the reply future *before* the
    /// envelope reaches the socket (closing the race with a fast reply),
    /// writes the frame, then hands the receiving half back. The reply
    /// itself is *not* awaited here: this runs on the client agent's own
    /// mailbox, and `handle_inbound` — the only thing that can resolve this
    /// receiver — is dispatched onto that same mailbox, so waiting on it
    /// here would leave the mailbox parked forever, one message short of
    /// delivering its own reply.
    async fn send_correlated(
        &mut self,
        command: Command,
    ) -> anyhow::Result<oneshot::Receiver<Packet>> {
        let id = self.next_correlation_id();
        let (tx, rx) = oneshot::channel();
        self.reply_map.insert(id.clone(), tx);
        let envelope = command.to_envelope(Some(&id));
        if let Err(e) = self.writer.send_text(envelope.to_string()).await {
            self.reply_map.remove(&id);
            return Err(e);
        }
        Ok(rx)
    }

    async fn send_fire_and_forget(&mut self, command: Command) -> anyhow::Result<()> {
        let envelope = command.to_envelope(None);
        self.writer.send_text(envelope.to_string()).await
    }
}

/// A reply-correlating duplex endpoint to the chat service: multiplexes
/// request/response commands and fan-out events over one socket
/// connection, auto-answering protocol pings.
#[derive(Clone)]
pub struct ChatClient {
    agent: Agent<ClientState>,
}

impl ChatClient {
    /// Establish the socket and start the receive task as a linked subtask.
    /// If the socket closes (EOF or error), the receive task exits, which —
    /// being linked — takes the client agent down with it.
    pub async fn connect(uri: &str, handle_pings: bool) -> anyhow::Result<ChatClient> {
        let (writer, reader) = crate::transport::connect(uri).await?;
        Ok(Self::from_transport(writer, reader, handle_pings))
    }

    /// Build a client directly from transport halves; used by `connect` and
    /// by tests against [`crate::transport::fake`].
    pub fn from_transport(
        writer: Box<dyn TransportWriter>,
        mut reader: Box<dyn TransportReader>,
        handle_pings: bool,
    ) -> ChatClient {
        let state = ClientState {
            writer,
            reply_map: HashMap::new(),
            next_id: wireproto::FIRST_MESSAGE_ID,
            listeners: Vec::new(),
            handle_pings,
        };
        let agent = agent::spawn(state);
        let mailbox = agent.clone();
        agent.spawn_linked_task(
            move || async move {
                loop {
                    match reader.recv_text().await? {
                        Some(text) => {
                            mailbox.cast(move |state: &mut ClientState| {
                                Box::pin(handle_inbound(state, text))
                            });
                        }
                        None => return Ok(()),
                    }
                }
            },
            false,
        );
        ChatClient { agent }
    }

    pub fn id(&self) -> agent::AgentId {
        self.agent.id()
    }

    pub fn is_alive(&self) -> bool {
        self.agent.is_alive()
    }

    /// Terminates the client: pending reply futures are resolved as
    /// cancelled, the socket write half is dropped with it.
    pub fn exit(&self, cause: Option<ExitCause>) {
        self.agent.exit(cause);
    }

    /// Register every other agent that should receive inbound packets via
    /// `handler`. Delivery runs on `listener`'s own mailbox, `cast`-style.
    pub fn add_listener<T, F>(&self, listener: &Agent<T>, handler: F)
    where
        T: Send + 'static,
        F: for<'a> Fn(&'a mut T, Packet) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        let entry: Arc<dyn PacketListener> =
            Arc::new(AgentListener::new(listener.clone(), handler));
        self.agent.cast(move |state: &mut ClientState| {
            state.listeners.push(entry);
            Box::pin(async {})
        });
    }

    pub async fn send_nick(&self, nick: impl Into<String>) -> anyhow::Result<Packet> {
        let nick = nick.into();
        self.request(Command::Nick { nick }).await
    }

    pub async fn send_auth(&self, passcode: impl Into<String>) -> anyhow::Result<Packet> {
        let passcode = passcode.into();
        self.request(Command::Auth { passcode }).await
    }

    pub async fn send_content(
        &self,
        content: impl Into<String>,
        parent: Option<String>,
    ) -> anyhow::Result<Packet> {
        let content = content.into();
        self.request(Command::Send { content, parent }).await
    }

    pub async fn send_log_command(&self, before: Option<String>, n: u32) -> anyhow::Result<Packet> {
        self.request(Command::Log { before, n }).await
    }

    pub async fn send_get_message(&self, id: impl Into<String>) -> anyhow::Result<Packet> {
        let id = id.into();
        self.request(Command::GetMessage { id }).await
    }

    /// Fire-and-forget acknowledgment of a ping; not part of the reply map.
    pub fn send_ping_reply(&self, time: i64) {
        self.agent.cast(move |state: &mut ClientState| {
            Box::pin(async move {
                if let Err(e) = state.send_fire_and_forget(Command::PingReply { time }).await {
                    tracing::warn!("ping-reply failed: {e}");
                }
            })
        });
    }

    /// Enqueues `command` onto the client's mailbox (where the id is
    /// assigned and the frame is written), then awaits the reply *outside*
    /// the mailbox so the receive task stays free to deliver it.
    async fn request(&self, command: Command) -> anyhow::Result<Packet> {
        let rx = match self
            .agent
            .call(move |state: &mut ClientState| Box::pin(state.send_correlated(command)))
            .await
        {
            None => return Err(anyhow::anyhow!("client exited before the command was sent")),
            Some(Err(e)) => return Err(e),
            Some(Ok(rx)) => rx,
        };
        rx.await
            .map_err(|_| anyhow::anyhow!("client exited before a reply arrived"))
    }
}

impl rtsup::Supervisable for ChatClient {
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
        agent::HasCore::core(&self.agent)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn clone_box(&self) -> Box<dyn rtsup::Supervisable> {
        Box::new(self.clone())
    }
}

async fn handle_inbound(state: &mut ClientState, text: String) {
    let packet: Packet = match serde_json::from_str(&text) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("failed to decode inbound packet: {e}");
            return;
        }
    };

    if let Some(id) = packet.reply_id.clone() {
        match state.reply_map.remove(&id) {
            Some(tx) => {
                let _ = tx.send(packet.clone());
            }
            None => tracing::debug!("reply id {id} has no pending future, dropping"),
        }
    }

    if state.handle_pings {
        if let Ok(Payload::Ping(ping)) = packet.payload() {
            let time = ping.time;
            if let Err(e) = state
                .send_fire_and_forget(Command::PingReply { time })
                .await
            {
                tracing::warn!("ping-reply failed: {e}");
            }
        }
    }

    state.listeners.retain(|l| l.is_alive());
    for listener in &state.listeners {
        listener.deliver(packet.clone());
    }
}
