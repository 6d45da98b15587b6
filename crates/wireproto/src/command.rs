use serde_json::{json, Value};

/// An outbound command the client can issue. Each variant knows its own
/// wire `type` string and `data` shape; [`Command::to_envelope`] assembles
/// the full JSON object, optionally carrying a correlation id.
#[derive(Debug, Clone)]
pub enum Command {
    Nick { nick: String },
    Auth { passcode: String },
    Send { content: String, parent: Option<String> },
    PingReply { time: i64 },
    Log { before: Option<String>, n: u32 },
    GetMessage { id: String },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Nick { .. } => "nick",
            Command::Auth { .. } => "auth",
            Command::Send { .. } => "send",
            Command::PingReply { .. } => "ping-reply",
            Command::Log { .. } => "log",
            Command::GetMessage { .. } => "get-message",
        }
    }

    fn data(&self) -> Value {
        match self {
            Command::Nick { nick } => json!({ "name": nick }),
            Command::Auth { passcode } => json!({ "type": "passcode", "passcode": passcode }),
            Command::Send { content, parent } => json!({ "content": content, "parent": parent }),
            Command::PingReply { time } => json!({ "time": time }),
            Command::Log { before, n } => json!({ "before": before, "n": n }),
            Command::GetMessage { id } => json!({ "id": id }),
        }
    }

    /// Build the outbound JSON envelope. `id` is omitted for commands that
    /// don't expect a correlated reply (currently only `ping-reply`).
    pub fn to_envelope(&self, id: Option<&str>) -> Value {
        let mut obj = serde_json::Map::new();
        if let Some(id) = id {
            obj.insert("id".to_string(), Value::String(id.to_string()));
        }
        obj.insert("type".to_string(), Value::String(self.kind().to_string()));
        obj.insert("data".to_string(), self.data());
        Value::Object(obj)
    }
}
