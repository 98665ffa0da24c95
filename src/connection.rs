//! Per-client connection bookkeeping shared by both protocol clients.
//!
//! A [`ConnectionState`] is owned by exactly one client actor and mutated
//! only from inside that actor's loop. It tracks the live socket, the single
//! pending reconnect deadline, and whether the client still wants to be
//! connected. The helpers at the bottom turn optional sockets and deadlines
//! into futures that simply never resolve when absent, so they can sit in a
//! `tokio::select!` unconditionally.

use std::future::pending;

use anyhow::Result;
use tokio::time::{Duration, Instant};

use crate::transport::{SocketMessage, SocketReader, SocketWriter};

/// An open socket split into its two halves.
#[derive(Debug)]
pub struct Socket {
    /// Write half.
    pub writer: Box<dyn SocketWriter>,
    /// Read half.
    pub reader: Box<dyn SocketReader>,
}

impl Socket {
    /// Close the write half, logging rather than returning failures.
    pub async fn close(mut self, label: &str) {
        if let Err(e) = self.writer.close().await {
            log::debug!("[{}] Close failed: {:#}", label, e);
        }
    }
}

/// Socket, reconnect timer and target of one client.
#[derive(Debug)]
pub struct ConnectionState<S> {
    /// Live socket, if any.
    pub socket: Option<S>,
    /// When the pending reconnect fires. At most one is ever pending.
    pub reconnect_at: Option<Instant>,
    /// Channel name or broadcaster id the client should be connected to.
    /// `Some` exactly while the client intends to stay connected.
    pub target: Option<String>,
    /// Set by a deliberate disconnect so late close events cannot reconnect.
    pub suppress_reconnect: bool,
}

impl<S> Default for ConnectionState<S> {
    fn default() -> Self {
        Self {
            socket: None,
            reconnect_at: None,
            target: None,
            suppress_reconnect: false,
        }
    }
}

impl<S> ConnectionState<S> {
    /// Record the new target and allow reconnects again.
    pub fn retarget(&mut self, target: String) {
        self.target = Some(target);
        self.suppress_reconnect = false;
        self.reconnect_at = None;
    }

    /// Forget the target, cancel any pending reconnect and hand back the
    /// socket for closing.
    pub fn release(&mut self) -> Option<S> {
        self.target = None;
        self.suppress_reconnect = true;
        self.reconnect_at = None;
        self.socket.take()
    }

    /// `true` while a close should be followed by a reconnect.
    #[must_use]
    pub fn wants_reconnect(&self) -> bool {
        self.target.is_some() && !self.suppress_reconnect
    }

    /// Schedule a reconnect `delay` from now unless one is already pending
    /// or the client no longer wants to be connected.
    ///
    /// Returns `true` if a new reconnect was scheduled.
    pub fn schedule_reconnect(&mut self, delay: Duration) -> bool {
        if !self.wants_reconnect() || self.reconnect_at.is_some() {
            return false;
        }
        self.reconnect_at = Some(Instant::now() + delay);
        true
    }

    /// Clear a reconnect deadline that has fired and return the target to
    /// reconnect to, if still wanted.
    pub fn take_reconnect(&mut self) -> Option<String> {
        self.reconnect_at = None;
        if self.wants_reconnect() {
            self.target.clone()
        } else {
            None
        }
    }
}

/// Wait for the next message on `socket`, or forever if there is none.
pub async fn next_message<S>(
    socket: &mut Option<S>,
    reader: impl FnOnce(&mut S) -> &mut Box<dyn SocketReader>,
) -> Option<Result<SocketMessage>> {
    match socket.as_mut() {
        Some(s) => reader(s).recv().await,
        None => pending().await,
    }
}

/// Sleep until `deadline`, or forever if there is none.
pub async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}
