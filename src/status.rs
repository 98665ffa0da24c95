//! Connection-status reporting.
//!
//! Each protocol client is handed a [`StatusListener`] at construction and
//! reports every connected/disconnected transition through it. What the
//! listener does with the flag (UI state, logging, metrics) is up to the
//! application.

/// Receives connection-status changes from a protocol client.
pub trait StatusListener: Send + Sync {
    /// Called with `true` once the client is usable and `false` when its
    /// socket goes away.
    fn set_connected(&self, connected: bool);
}

impl<F> StatusListener for F
where
    F: Fn(bool) + Send + Sync,
{
    fn set_connected(&self, connected: bool) {
        self(connected);
    }
}
