//! Suppression of our own messages echoed back by the server.
//!
//! An authenticated session sees its own `PRIVMSG`s come back. The client
//! already added them to history when sending, so each sent text is
//! remembered for a short window and the first matching echo is dropped.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Short-lived multiset of recently sent texts.
#[derive(Debug)]
pub struct EchoTracker {
    ttl: Duration,
    pending: VecDeque<(Instant, String)>,
}

impl EchoTracker {
    /// Create a tracker whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: VecDeque::new(),
        }
    }

    /// Remember a text we just sent.
    pub fn record(&mut self, text: &str) {
        self.purge();
        self.pending
            .push_back((Instant::now() + self.ttl, text.to_string()));
    }

    /// Consume one pending entry equal to `text`.
    ///
    /// Returns `true` when the incoming line is our own echo.
    pub fn take_match(&mut self, text: &str) -> bool {
        self.purge();
        match self.pending.iter().position(|(_, t)| t == text) {
            Some(idx) => {
                self.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.pending.iter().filter(|(at, _)| *at > now).count()
    }

    /// `true` when no entry is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn purge(&mut self) {
        let now = Instant::now();
        // Entries are pushed in expiry order.
        while self.pending.front().is_some_and(|(at, _)| *at <= now) {
            self.pending.pop_front();
        }
    }
}
