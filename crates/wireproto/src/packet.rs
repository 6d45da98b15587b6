use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::payload::{
    AuthReply, BounceEvent, HelloEvent, Message, NetworkEvent, NickBased, Payload, PingEvent,
    SessionView, SnapshotEvent,
};

#[derive(Debug, Error)]
pub enum PacketError {
    /// The packet's `error` field was set; the caller asked for `payload`
    /// anyway.
    #[error("{0}")]
    ErrorResponse(String),
    /// No `error`, but also no `data` to decode.
    #[error("packet of kind `{0}` carried no payload")]
    MissingPayload(String),
    /// `data` was present but didn't match the shape `kind` calls for.
    #[error("failed to decode `{kind}` payload: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One JSON envelope exchanged with the chat service, in either direction.
#[derive(Debug, Clone)]
pub struct Packet {
    pub reply_id: Option<String>,
    pub kind: String,
    payload: Option<Payload>,
    pub error: Option<String>,
    pub throttled: bool,
    pub throttled_reason: Option<String>,
}

impl Packet {
    /// The decoded payload, or an [`PacketError::ErrorResponse`] if the
    /// server reported an error for this command instead.
    pub fn payload(&self) -> Result<&Payload, PacketError> {
        if let Some(err) = &self.error {
            return Err(PacketError::ErrorResponse(err.clone()));
        }
        self.payload
            .as_ref()
            .ok_or_else(|| PacketError::MissingPayload(self.kind.clone()))
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

#[derive(Deserialize)]
struct RawPacket {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    data: Option<Value>,
    error: Option<String>,
    #[serde(default)]
    throttled: bool,
    throttled_reason: Option<String>,
}

impl<'de> Deserialize<'de> for Packet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawPacket::deserialize(deserializer)?;
        let payload = match raw.data {
            Some(data) => Some(
                decode_payload(&raw.kind, data).map_err(serde::de::Error::custom)?,
            ),
            None => None,
        };
        Ok(Packet {
            reply_id: raw.id,
            kind: raw.kind,
            payload,
            error: raw.error,
            throttled: raw.throttled,
            throttled_reason: raw.throttled_reason,
        })
    }
}

/// Exhaustive static dispatch from the wire `type` string to a decoder.
fn decode_payload(kind: &str, data: Value) -> Result<Payload, PacketError> {
    let wrap = |source: serde_json::Error| PacketError::Decode {
        kind: kind.to_string(),
        source,
    };
    Ok(match kind {
        "hello-event" => Payload::Hello(serde_json::from_value::<HelloEvent>(data).map_err(wrap)?),
        "snapshot-event" => {
            Payload::Snapshot(serde_json::from_value::<SnapshotEvent>(data).map_err(wrap)?)
        }
        "ping-event" => Payload::Ping(serde_json::from_value::<PingEvent>(data).map_err(wrap)?),
        "bounce-event" => {
            Payload::Bounce(serde_json::from_value::<BounceEvent>(data).map_err(wrap)?)
        }
        "auth-reply" => {
            Payload::AuthReply(serde_json::from_value::<AuthReply>(data).map_err(wrap)?)
        }
        "network-event" => {
            Payload::Network(serde_json::from_value::<NetworkEvent>(data).map_err(wrap)?)
        }
        "nick-event" => {
            Payload::NickEvent(serde_json::from_value::<NickBased>(data).map_err(wrap)?)
        }
        "nick-reply" => {
            Payload::NickReply(serde_json::from_value::<NickBased>(data).map_err(wrap)?)
        }
        "send-event" => Payload::SendEvent(serde_json::from_value::<Message>(data).map_err(wrap)?),
        "edit-message-event" => {
            Payload::EditMessage(serde_json::from_value::<Message>(data).map_err(wrap)?)
        }
        "send-reply" => Payload::SendReply(serde_json::from_value::<Message>(data).map_err(wrap)?),
        "join-event" => Payload::Join(serde_json::from_value::<SessionView>(data).map_err(wrap)?),
        "part-event" => Payload::Part(serde_json::from_value::<SessionView>(data).map_err(wrap)?),
        other => {
            return Err(PacketError::Decode {
                kind: other.to_string(),
                source: serde::de::Error::custom(format!("unrecognized packet kind `{other}`")),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_hello_event_with_defaults() {
        let raw = r#"{"type":"hello-event","data":{"id":"agent:1","session":{"id":"agent:1","name":"bob","server_id":"s1","server_era":"e1","session_id":"sess1"},"room_is_private":true,"version":"v1"}}"#;
        let packet: Packet = serde_json::from_str(raw).unwrap();
        let hello = packet.payload().unwrap().as_hello().unwrap();
        assert!(hello.account_has_access);
        assert!(!hello.session.is_staff);
        assert!(hello.room_is_private);
    }

    #[test]
    fn bounce_event_defaults_auth_options() {
        let raw = r#"{"type":"bounce-event","data":{}}"#;
        let packet: Packet = serde_json::from_str(raw).unwrap();
        let bounce = packet.payload().unwrap().as_bounce().unwrap();
        assert_eq!(bounce.auth_options(), vec!["passcode".to_string()]);
    }

    #[test]
    fn error_field_shadows_payload_access() {
        let raw = r#"{"id":"1","type":"nick-reply","error":"nick taken"}"#;
        let packet: Packet = serde_json::from_str(raw).unwrap();
        match packet.payload() {
            Err(PacketError::ErrorResponse(msg)) => assert_eq!(msg, "nick taken"),
            other => panic!("expected ErrorResponse, got {other:?}"),
        }
    }

    #[test]
    fn reply_id_round_trips() {
        let raw = r#"{"id":"beef1","type":"nick-reply","data":{"session_id":"s","id":"agent:1","from":"a","to":"b"}}"#;
        let packet: Packet = serde_json::from_str(raw).unwrap();
        assert_eq!(packet.reply_id.as_deref(), Some("beef1"));
        assert_eq!(packet.payload().unwrap().as_nick().unwrap().to, "b");
    }
}
