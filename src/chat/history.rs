//! Chat history store.
//!
//! Every accepted chat message (inbound and our own outbound ones) is
//! pushed here. The store is a trait so an overlay can back it with
//! something persistent; [`MemoryChatHistory`] keeps a bounded ring.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::message::ChatMessage;
use crate::constants::CHAT_HISTORY_CAPACITY;

/// Sink for chat messages.
pub trait ChatHistory: Send + Sync + std::fmt::Debug {
    /// Append a message.
    fn push(&self, message: ChatMessage);

    /// Messages currently retained, oldest first.
    fn messages(&self) -> Vec<ChatMessage>;
}

/// Bounded in-memory history; the oldest message is evicted first.
#[derive(Debug)]
pub struct MemoryChatHistory {
    capacity: usize,
    messages: Mutex<VecDeque<ChatMessage>>,
}

impl MemoryChatHistory {
    /// Create a history that keeps at most `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Number of retained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` when nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ChatMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryChatHistory {
    fn default() -> Self {
        Self::new(CHAT_HISTORY_CAPACITY)
    }
}

impl ChatHistory for MemoryChatHistory {
    fn push(&self, message: ChatMessage) {
        if self.capacity == 0 {
            return;
        }
        let mut messages = self.lock();
        while messages.len() >= self.capacity {
            messages.pop_front();
        }
        messages.push_back(message);
    }

    fn messages(&self) -> Vec<ChatMessage> {
        self.lock().iter().cloned().collect()
    }
}
