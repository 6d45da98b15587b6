use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// The write half of the duplex socket, owned solely by the client agent.
#[async_trait]
pub trait TransportWriter: Send {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()>;
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// The read half, owned solely by the client's linked receive subtask.
#[async_trait]
pub trait TransportReader: Send {
    /// `Ok(None)` signals a graceful close (EOF).
    async fn recv_text(&mut self) -> anyhow::Result<Option<String>>;
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

pub struct WsWriter(futures::stream::SplitSink<WsStream, WsMessage>);
pub struct WsReader(futures::stream::SplitStream<WsStream>);

#[async_trait]
impl TransportWriter for WsWriter {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        self.0.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.0.close().await?;
        Ok(())
    }
}

#[async_trait]
impl TransportReader for WsReader {
    async fn recv_text(&mut self) -> anyhow::Result<Option<String>> {
        loop {
            match self.0.next().await {
                None => return Ok(None),
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(text)),
                Some(Ok(WsMessage::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/binary frames: not part of this protocol
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// Connect to `uri` and split it into independent reader/writer halves, the
/// way the reactor-owned-socket pattern expects.
pub async fn connect(
    uri: &str,
) -> anyhow::Result<(Box<dyn TransportWriter>, Box<dyn TransportReader>)> {
    let (stream, _response) = tokio_tungstenite::connect_async(uri).await?;
    let (sink, source) = stream.split();
    Ok((Box::new(WsWriter(sink)), Box::new(WsReader(source))))
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use tokio::sync::mpsc;

    /// An in-memory transport pair for driving the client in tests without
    /// a live socket.
    pub struct FakeWriter {
        pub sent: mpsc::UnboundedSender<String>,
    }

    pub struct FakeReader {
        pub inbound: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl TransportWriter for FakeWriter {
        async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
            let _ = self.sent.send(text);
            Ok(())
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl TransportReader for FakeReader {
        async fn recv_text(&mut self) -> anyhow::Result<Option<String>> {
            Ok(self.inbound.recv().await)
        }
    }

    pub fn pair() -> (
        (Box<dyn TransportWriter>, mpsc::UnboundedReceiver<String>),
        (Box<dyn TransportReader>, mpsc::UnboundedSender<String>),
    ) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            (Box::new(FakeWriter { sent: sent_tx }), sent_rx),
            (Box::new(FakeReader { inbound: inbound_rx }), inbound_tx),
        )
    }
}
