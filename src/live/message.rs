//! Frame decoding for the live-events socket.
//!
//! Every frame is a JSON object with `metadata.message_type` and a
//! `payload` whose shape depends on the type:
//!
//! ```json
//! {
//!   "metadata": { "message_type": "session_welcome" },
//!   "payload": { "session": { "id": "abc", "keepalive_timeout_seconds": 10 } }
//! }
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::events::EventData;

/// Session details carried by welcome and reconnect frames.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    /// Session id that subscriptions are bound to.
    pub id: String,
    /// Server keepalive interval; `None` or `0` keeps the current value.
    #[serde(default)]
    pub keepalive_timeout_seconds: Option<u64>,
    /// Where to reconnect during a server-initiated migration.
    #[serde(default)]
    pub reconnect_url: Option<String>,
}

/// A decoded live-events frame.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    /// `session_welcome`
    Welcome(Session),
    /// `session_reconnect`
    Reconnect(Session),
    /// `notification`
    Notification {
        /// Provider subscription type, e.g. `channel.follow`.
        subscription_type: String,
        /// Event payload, forwarded as-is.
        event: EventData,
    },
    /// `session_keepalive`
    Keepalive,
    /// `revocation`
    Revocation {
        /// Subscription type that was revoked.
        subscription_type: String,
        /// Reason reported by the server.
        status: String,
    },
    /// Any other message type.
    Other(String),
}

#[derive(Deserialize)]
struct Frame {
    metadata: Metadata,
    #[serde(default)]
    payload: Payload,
}

#[derive(Deserialize)]
struct Metadata {
    message_type: String,
}

#[derive(Default, Deserialize)]
struct Payload {
    #[serde(default)]
    session: Option<Session>,
    #[serde(default)]
    subscription: Option<SubscriptionInfo>,
    #[serde(default)]
    event: Option<EventData>,
}

#[derive(Deserialize)]
struct SubscriptionInfo {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    status: Option<String>,
}

impl LiveMessage {
    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid JSON, a missing `metadata.message_type`,
    /// or a session/notification frame without its required payload.
    pub fn decode(frame: &str) -> Result<Self> {
        let frame: Frame = serde_json::from_str(frame).context("invalid live-events frame")?;
        let payload = frame.payload;

        let message = match frame.metadata.message_type.as_str() {
            "session_welcome" => Self::Welcome(require_session(payload.session, "welcome")?),
            "session_reconnect" => {
                Self::Reconnect(require_session(payload.session, "reconnect")?)
            }
            "notification" => {
                let Some(subscription) = payload.subscription else {
                    bail!("notification without subscription");
                };
                Self::Notification {
                    subscription_type: subscription.kind,
                    event: payload.event.unwrap_or_default(),
                }
            }
            "session_keepalive" => Self::Keepalive,
            "revocation" => {
                let Some(subscription) = payload.subscription else {
                    bail!("revocation without subscription");
                };
                Self::Revocation {
                    subscription_type: subscription.kind,
                    status: subscription.status.unwrap_or_default(),
                }
            }
            other => Self::Other(other.to_string()),
        };
        Ok(message)
    }
}

fn require_session(session: Option<Session>, kind: &str) -> Result<Session> {
    session.with_context(|| format!("session_{kind} without session"))
}
