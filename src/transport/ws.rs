//! WebSocket transport over `tokio-tungstenite`.
//!
//! [`WsConnector`] performs the TLS handshake and splits the stream into the
//! [`SocketWriter`]/[`SocketReader`] halves the protocol clients drive.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use super::{Connector, SocketMessage, SocketPair, SocketReader, SocketWriter};

/// Concrete WebSocket stream type (avoids repeating the generic everywhere).
type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// [`Connector`] that opens real WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Create a connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<SocketPair> {
        use tungstenite::client::IntoClientRequest;

        let request = url
            .into_client_request()
            .with_context(|| format!("invalid WebSocket URL: {url}"))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .with_context(|| format!("WebSocket connect to {url} failed"))?;

        let (sink, stream) = ws_stream.split();
        Ok((
            Box::new(WsWriter { sink, closed: false }),
            Box::new(WsReader { stream }),
        ))
    }
}

/// Write half of a WebSocket connection.
struct WsWriter {
    sink: SplitSink<WsStream, tungstenite::Message>,
    closed: bool,
}

impl std::fmt::Debug for WsWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsWriter")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SocketWriter for WsWriter {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .context("WebSocket send_text failed")
    }

    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .context("WebSocket send_pong failed")
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sink.close().await.context("WebSocket close failed")
    }
}

/// Read half of a WebSocket connection.
struct WsReader {
    stream: SplitStream<WsStream>,
}

impl std::fmt::Debug for WsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsReader").finish_non_exhaustive()
    }
}

#[async_trait]
impl SocketReader for WsReader {
    async fn recv(&mut self) -> Option<Result<SocketMessage>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(anyhow::anyhow!("WebSocket read error: {e}"))),
            };
            if let Some(message) = convert(message) {
                return Some(Ok(message));
            }
        }
    }
}

/// Map a tungstenite message onto [`SocketMessage`], dropping frames neither
/// protocol uses.
fn convert(message: tungstenite::Message) -> Option<SocketMessage> {
    match message {
        tungstenite::Message::Text(text) => Some(SocketMessage::Text(text.to_string())),
        tungstenite::Message::Ping(data) => Some(SocketMessage::Ping(data.to_vec())),
        tungstenite::Message::Close(close_frame) => {
            let (code, reason) = close_frame
                .map(|cf| (cf.code.into(), cf.reason.to_string()))
                .unwrap_or((1005, String::new()));
            Some(SocketMessage::Close { code, reason })
        }
        tungstenite::Message::Binary(_)
        | tungstenite::Message::Pong(_)
        | tungstenite::Message::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_text_and_ping() {
        assert_eq!(
            convert(tungstenite::Message::Text("PING :tmi.twitch.tv".into())),
            Some(SocketMessage::Text("PING :tmi.twitch.tv".into()))
        );
        assert_eq!(
            convert(tungstenite::Message::Ping(vec![1, 2])),
            Some(SocketMessage::Ping(vec![1, 2]))
        );
    }

    #[test]
    fn test_convert_close_without_frame_uses_1005() {
        assert_eq!(
            convert(tungstenite::Message::Close(None)),
            Some(SocketMessage::Close {
                code: 1005,
                reason: String::new()
            })
        );
    }

    #[test]
    fn test_convert_drops_binary_and_pong() {
        assert_eq!(convert(tungstenite::Message::Binary(vec![0])), None);
        assert_eq!(convert(tungstenite::Message::Pong(vec![])), None);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let err = WsConnector::new()
            .connect("not a url")
            .await
            .expect_err("invalid URL must fail");
        assert!(err.to_string().contains("invalid WebSocket URL"));
    }
}
