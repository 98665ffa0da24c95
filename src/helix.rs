//! REST-backed [`RpcProvider`].
//!
//! [`HelixProvider`] hands out the configured chat credentials and registers
//! live-event subscriptions against the platform's subscription endpoint.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::constants;
use crate::rpc::{ChatCredentials, RpcProvider, SubscriptionRequest};

/// [`RpcProvider`] backed by configured credentials and the REST API.
#[derive(Clone)]
pub struct HelixProvider {
    client: Client,
    base_url: String,
    client_id: String,
    token: String,
    username: String,
}

impl std::fmt::Debug for HelixProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelixProvider")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("has_token", &!self.token.is_empty())
            .finish_non_exhaustive()
    }
}

impl HelixProvider {
    /// Create a provider.
    ///
    /// # Arguments
    ///
    /// * `base_url` - REST base URL, without trailing slash
    /// * `client_id` - Application client ID
    /// * `token` - OAuth access token (empty when not logged in)
    /// * `username` - Login name matching the token
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, client_id: &str, token: &str, username: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            token: token.to_string(),
            username: username.to_string(),
        })
    }
}

#[async_trait]
impl RpcProvider for HelixProvider {
    async fn fetch_chat_credentials(&self) -> Result<ChatCredentials> {
        if self.token.is_empty() {
            bail!("not logged in: no access token configured");
        }
        if self.username.is_empty() {
            bail!("not logged in: no username configured");
        }
        Ok(ChatCredentials {
            token: self.token.clone(),
            username: self.username.clone(),
        })
    }

    async fn subscribe(&self, request: &SubscriptionRequest) -> Result<()> {
        if self.token.is_empty() {
            bail!("cannot subscribe to {}: not logged in", request.event_type);
        }

        let url = format!("{}/eventsub/subscriptions", self.base_url);
        let body = serde_json::json!({
            "type": request.event_type,
            "version": request.version,
            "condition": request.condition,
            "transport": {
                "method": "websocket",
                "session_id": request.session_id,
            }
        });

        let response = self
            .client
            .post(&url)
            .header("Client-Id", &self.client_id)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("subscribe request for {} failed", request.event_type))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!(
                "subscribe to {} rejected ({}): {}",
                request.event_type,
                status,
                text
            );
        }

        log::debug!("[Helix] Subscribed to {}", request.event_type);
        Ok(())
    }
}
