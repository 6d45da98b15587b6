use serde::Deserialize;

fn default_true() -> bool {
    true
}

/// A session's identity and standing as captured at some point in time.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionView {
    pub id: String,
    pub name: String,
    pub server_id: String,
    pub server_era: String,
    pub session_id: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_manager: bool,
}

/// A node in a room's log: a chat message, or any broadcast event that
/// appears there. `SendEvent`, `SendReply`, and `EditMessageEvent` all carry
/// this same shape.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub edit_id: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub previous_edit_id: Option<String>,
    pub time: i64,
    pub sender: SessionView,
    pub content: String,
    #[serde(default)]
    pub encryption_key_id: Option<String>,
    #[serde(default)]
    pub edited: Option<i64>,
    #[serde(default)]
    pub deleted: Option<i64>,
    #[serde(default)]
    pub truncated: bool,
}

/// Sent once a session starts; carries identity and room-authorization
/// info.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloEvent {
    pub id: String,
    #[serde(default)]
    pub account: Option<serde_json::Value>,
    pub session: SessionView,
    #[serde(default = "default_true")]
    pub account_has_access: bool,
    pub room_is_private: bool,
    pub version: String,
}

/// Server-to-client keepalive; the client should answer with a ping-reply
/// carrying the same `time`.
#[derive(Debug, Clone, Deserialize)]
pub struct PingEvent {
    pub time: i64,
    pub next: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BounceEvent {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    auth_options: Option<Vec<String>>,
}

impl BounceEvent {
    /// Defaults to `["passcode"]` when the server omits the field or sends
    /// an empty list.
    pub fn auth_options(&self) -> Vec<String> {
        match &self.auth_options {
            Some(opts) if !opts.is_empty() => opts.clone(),
            _ => vec!["passcode".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthReply {
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Sent once a session has joined a room: its current listing and recent
/// history.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotEvent {
    pub identity: String,
    pub session_id: String,
    pub version: String,
    pub listing: Vec<SessionView>,
    pub log: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub server_id: String,
    pub server_era: String,
}

/// Shared shape of `NickEvent` and `NickReply`.
#[derive(Debug, Clone, Deserialize)]
pub struct NickBased {
    pub session_id: String,
    pub id: String,
    pub from: String,
    pub to: String,
}

pub type NickEvent = NickBased;
pub type NickReply = NickBased;

/// The decoded, tagged contents of a [`crate::Packet`]. Variant selection
/// replaces the server's `type` string with an exhaustive match in
/// [`crate::packet::decode_payload`] rather than a runtime lookup table.
#[derive(Debug, Clone)]
pub enum Payload {
    Hello(HelloEvent),
    Snapshot(SnapshotEvent),
    Ping(PingEvent),
    Bounce(BounceEvent),
    AuthReply(AuthReply),
    Network(NetworkEvent),
    NickEvent(NickEvent),
    NickReply(NickReply),
    SendEvent(Message),
    EditMessage(Message),
    SendReply(Message),
    Join(SessionView),
    Part(SessionView),
}

impl Payload {
    pub fn as_hello(&self) -> Option<&HelloEvent> {
        match self {
            Payload::Hello(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_bounce(&self) -> Option<&BounceEvent> {
        match self {
            Payload::Bounce(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_auth_reply(&self) -> Option<&AuthReply> {
        match self {
            Payload::AuthReply(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_ping(&self) -> Option<&PingEvent> {
        match self {
            Payload::Ping(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_nick(&self) -> Option<&NickBased> {
        match self {
            Payload::NickEvent(n) | Payload::NickReply(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Payload::SendEvent(m) | Payload::EditMessage(m) | Payload::SendReply(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_session_view(&self) -> Option<&SessionView> {
        match self {
            Payload::Join(s) | Payload::Part(s) => Some(s),
            _ => None,
        }
    }
}
