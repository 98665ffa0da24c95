//! Request/response collaborator used by both protocol clients.
//!
//! The clients only need two operations from the platform's REST side:
//! minting chat credentials and registering live-event subscriptions.
//! Both may fail; the clients treat failures as recoverable (anonymous
//! chat fallback, per-subscription logging).

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Credentials for an authenticated chat login.
#[derive(Clone, PartialEq, Eq)]
pub struct ChatCredentials {
    /// OAuth access token, sent as `PASS oauth:<token>`.
    pub token: String,
    /// Login name, sent as `NICK <username>`.
    pub username: String,
}

impl std::fmt::Debug for ChatCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCredentials")
            .field("token", &"[redacted]")
            .field("username", &self.username)
            .finish()
    }
}

/// One live-event subscription registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    /// Session the subscription is bound to.
    pub session_id: String,
    /// Provider event type (e.g. `channel.follow`).
    pub event_type: String,
    /// Provider schema version of the event type.
    pub version: String,
    /// Condition object, keyed to the broadcaster.
    pub condition: BTreeMap<String, String>,
}

/// Async operations the protocol clients delegate to the platform API.
#[async_trait]
pub trait RpcProvider: Send + Sync + std::fmt::Debug {
    /// Fetch a token/username pair for an authenticated chat login.
    async fn fetch_chat_credentials(&self) -> Result<ChatCredentials>;

    /// Register one live-event subscription.
    async fn subscribe(&self, request: &SubscriptionRequest) -> Result<()>;
}
