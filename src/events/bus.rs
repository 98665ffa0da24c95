//! In-memory publish/subscribe bus for [`ChannelEvent`]s.
//!
//! # Design Principle: "Subscribe once. React always."
//!
//! Handlers are invoked synchronously, in subscription order, on the thread
//! that calls [`EventBus::publish`]. Handlers should be fast; expensive work
//! belongs on a queue owned by the consumer.
//!
//! `publish` dispatches over a snapshot of the subscriber list taken when it
//! starts. Subscribing or unsubscribing from inside a handler is allowed and
//! takes effect from the next `publish` call. No lock is held while handlers
//! run, so handlers may freely call back into the bus.
//!
//! There is no buffering: an event published with no subscribers is dropped.
//! A handler that panics unwinds through `publish` and the remaining handlers
//! for that event do not run.

use std::sync::{Arc, Mutex, PoisonError};

use super::ChannelEvent;

/// Callback invoked for every published event.
pub type EventHandler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Subscriber list plus id counter.
#[derive(Default)]
struct Registry {
    /// Subscribers in registration order.
    handlers: Vec<(u64, EventHandler)>,
    /// Counter for generating unique subscription ids.
    next_id: u64,
}

/// Process-wide fan-out channel for normalized events.
///
/// Cheap to clone; clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for all future events.
    ///
    /// Returns a [`Subscription`] whose [`Subscription::unsubscribe`] removes
    /// the handler. Dropping the subscription does not unsubscribe.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));
        log::debug!("[Bus] Registered subscriber {}", id);

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every current subscriber, in registration order.
    pub fn publish(&self, event: &ChannelEvent) {
        let snapshot: Vec<EventHandler> = self
            .lock()
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        if snapshot.is_empty() {
            log::trace!("[Bus] Dropping {} event: no subscribers", event.kind);
            return;
        }

        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().handlers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: std::sync::Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the handler from the bus.
    ///
    /// Safe to call more than once, and after the bus itself is gone.
    pub fn unsubscribe(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(idx) = registry.handlers.iter().position(|(id, _)| *id == self.id) {
            registry.handlers.remove(idx);
            log::debug!("[Bus] Unregistered subscriber {}", self.id);
        }
    }
}
