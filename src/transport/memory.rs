//! In-process transport built on tokio channels.
//!
//! [`MemoryConnector::new`] returns a connector to hand to a client and a
//! [`MemoryListener`] that yields the server side ([`ServerEnd`]) of every
//! socket the client opens. The server end can push frames, read what the
//! client sent, and observe when the client closed its side.
//!
//! Used by the integration tests to drive both protocol clients without a
//! network, and usable by embedders that want to replay recorded traffic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Connector, SocketMessage, SocketPair, SocketReader, SocketWriter};

#[derive(Debug, Default)]
struct Shared {
    /// Every URL passed to `connect`, successful or not.
    urls: Vec<String>,
    /// Errors to return from upcoming `connect` calls.
    failures: VecDeque<String>,
}

/// [`Connector`] whose sockets are in-memory channel pairs.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
    accept_tx: mpsc::UnboundedSender<ServerEnd>,
}

/// Receives the server side of each socket opened through a
/// [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<ServerEnd>,
}

impl MemoryConnector {
    /// Create a connector and its listener.
    #[must_use]
    pub fn new() -> (Self, MemoryListener) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::default(),
                accept_tx,
            },
            MemoryListener { accept_rx },
        )
    }

    /// Make the next `connect` call fail with `reason`.
    pub fn fail_next(&self, reason: &str) {
        self.lock().failures.push_back(reason.to_string());
    }

    /// URLs of every connection attempt so far, in order.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.lock().urls.clone()
    }

    /// Number of connection attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.lock().urls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<SocketPair> {
        {
            let mut shared = self.lock();
            shared.urls.push(url.to_string());
            if let Some(reason) = shared.failures.pop_front() {
                bail!("connect to {url} refused: {reason}");
            }
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();

        let server = ServerEnd {
            url: url.to_string(),
            to_client,
            from_client,
        };
        if self.accept_tx.send(server).is_err() {
            bail!("memory listener dropped");
        }

        Ok((
            Box::new(MemoryWriter {
                to_server: Some(to_server),
            }),
            Box::new(MemoryReader { from_server }),
        ))
    }
}

impl MemoryListener {
    /// Wait for the client to open its next socket.
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.accept_rx.recv().await
    }

    /// Return an already opened socket without waiting.
    pub fn try_accept(&mut self) -> Option<ServerEnd> {
        self.accept_rx.try_recv().ok()
    }
}

/// Server side of one in-memory socket.
#[derive(Debug)]
pub struct ServerEnd {
    url: String,
    to_client: mpsc::UnboundedSender<SocketMessage>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    /// URL the client connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push a text frame to the client. Returns `false` if the client has
    /// already dropped its reader.
    pub fn send_text(&self, text: &str) -> bool {
        self.to_client
            .send(SocketMessage::Text(text.to_string()))
            .is_ok()
    }

    /// Push an arbitrary frame to the client.
    pub fn send(&self, message: SocketMessage) -> bool {
        self.to_client.send(message).is_ok()
    }

    /// Next text frame the client sent, or `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Every text frame the client has sent so far, without waiting.
    pub fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.from_client.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// `true` once the client has dropped its side of the socket.
    #[must_use]
    pub fn is_client_closed(&self) -> bool {
        self.to_client.is_closed()
    }
}

/// Client write half.
#[derive(Debug)]
struct MemoryWriter {
    to_server: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl SocketWriter for MemoryWriter {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        let Some(tx) = &self.to_server else {
            bail!("socket closed");
        };
        if tx.send(text.to_string()).is_err() {
            bail!("server end dropped");
        }
        Ok(())
    }

    async fn send_pong(&mut self, _data: Vec<u8>) -> Result<()> {
        if self.to_server.is_none() {
            bail!("socket closed");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.to_server = None;
        Ok(())
    }
}

/// Client read half.
#[derive(Debug)]
struct MemoryReader {
    from_server: mpsc::UnboundedReceiver<SocketMessage>,
}

#[async_trait]
impl SocketReader for MemoryReader {
    async fn recv(&mut self) -> Option<Result<SocketMessage>> {
        self.from_server.recv().await.map(Ok)
    }
}
