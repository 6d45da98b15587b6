//! Envelope and payload types for the chat service's JSON-over-duplex-socket
//! protocol: decoding inbound frames and encoding outbound commands.

mod command;
mod packet;
mod payload;

pub use command::Command;
pub use packet::{Packet, PacketError};
pub use payload::{
    AuthReply, BounceEvent, HelloEvent, Message, NetworkEvent, NickBased, NickEvent, NickReply,
    Payload, PingEvent, SessionView, SnapshotEvent,
};

/// `wss://host:443/room/{room}/ws`, the default room URL template.
pub const DEFAULT_URI_FORMAT: &str = "wss://euphoria.io:443/room/{room}/ws";

/// Correlation ids are stringified from a monotonic counter; this is the
/// reference seed (arbitrary, fixed here for reproducible tests).
pub const FIRST_MESSAGE_ID: u64 = 0xBEEF;
