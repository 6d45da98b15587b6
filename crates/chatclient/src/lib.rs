//! A reply-correlating duplex client for the chat service: owns one socket,
//! multiplexes request/response commands against fan-out events, and
//! answers protocol pings automatically.

mod client;
mod listener;
mod transport;

pub use client::{ChatClient, ClientState};
pub use listener::{AgentListener, PacketListener};
pub use transport::{connect, TransportReader, TransportWriter};

/// In-memory transport pair for driving a [`ChatClient`] without a live
/// socket, also used to test components built on top of it (`nickauth`,
/// `botshell`). Enabled for this crate's own tests or via the `test-util`
/// feature.
#[cfg(any(test, feature = "test-util"))]
pub use transport::fake;
