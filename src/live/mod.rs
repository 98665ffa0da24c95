//! Live-events protocol: frame decoding, the subscription table and the
//! [`LiveEventsClient`] actor.

mod client;
pub mod message;
pub mod subscriptions;

pub use client::{LiveEventsClient, LiveSettings, LiveState};
pub use message::{LiveMessage, Session};
pub use subscriptions::{map_event_type, subscription_requests, SubscriptionSpec, SUBSCRIPTIONS};
