//! Socket transport seam shared by both protocol clients.
//!
//! Clients never talk to `tokio-tungstenite` directly. They ask a
//! [`Connector`] for a ([`SocketWriter`], [`SocketReader`]) pair and drive the
//! two halves from their `tokio::select!` loop.
//!
//! ```text
//!   ChatClient / LiveEventsClient
//!            │  connect(url)
//!            ▼
//!   Connector ── WsConnector      (production, TLS WebSocket)
//!            └── MemoryConnector  (in-process, tests and embedding)
//! ```

pub mod memory;
pub mod ws;

pub use memory::{MemoryConnector, MemoryListener, ServerEnd};
pub use ws::WsConnector;

use anyhow::Result;
use async_trait::async_trait;

/// Message received from a socket.
///
/// Binary and pong frames carry nothing either protocol uses and are
/// filtered out by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Ping frame; the client answers with [`SocketWriter::send_pong`].
    Ping(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Write half of an open socket.
#[async_trait]
pub trait SocketWriter: Send + std::fmt::Debug {
    /// Send a UTF-8 text frame.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Answer a ping.
    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()>;

    /// Close the socket. Closing an already closed socket is not an error.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of an open socket.
#[async_trait]
pub trait SocketReader: Send + std::fmt::Debug {
    /// Receive the next message, returning `None` once the stream ends.
    async fn recv(&mut self) -> Option<Result<SocketMessage>>;
}

/// Boxed writer/reader pair produced by a [`Connector`].
pub type SocketPair = (Box<dyn SocketWriter>, Box<dyn SocketReader>);

/// Opens sockets by URL.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Open a socket to `url`.
    async fn connect(&self, url: &str) -> Result<SocketPair>;
}
