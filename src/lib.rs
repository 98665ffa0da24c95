//! stagefeed - real-time ingestion core for a stream overlay.
//!
//! Two independent sockets feed one typed event stream:
//!
//! - **Chat** - line-oriented chat protocol, parsed into `chat`, `join` and
//!   `part` events ([`chat::ChatClient`])
//! - **Live events** - JSON-framed event subscriptions with a keepalive
//!   watchdog and server-driven migration ([`live::LiveEventsClient`])
//!
//! Both publish [`ChannelEvent`]s on an [`EventBus`]; consumers subscribe to
//! the bus and never see raw protocol traffic.
//!
//! # Modules
//!
//! - [`events`] - Event model and bus
//! - [`chat`] - Chat parsing, history, commands and client
//! - [`live`] - Live-event frames, subscriptions and client
//! - [`transport`] - Socket abstraction (WebSocket and in-memory)
//! - [`config`] - Configuration loading/saving

pub mod chat;
pub mod config;
pub mod connection;
pub mod constants;
pub mod context;
pub mod events;
pub mod helix;
pub mod live;
pub mod rpc;
pub mod status;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, Timings};
pub use context::ClientContext;
pub use events::{ChannelEvent, ChannelEventType, EventBus, EventData, Subscription};
pub use helix::HelixProvider;
pub use rpc::{ChatCredentials, RpcProvider, SubscriptionRequest};
pub use status::StatusListener;
