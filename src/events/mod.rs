//! Normalized channel events and the process-wide event bus.
//!
//! Both protocol clients translate their wire traffic into [`ChannelEvent`]s
//! and hand them to an [`EventBus`]. Consumers never see raw lines or frames.

mod bus;

pub use bus::{EventBus, EventHandler, Subscription};

use serde::{Deserialize, Serialize};

/// Payload of a [`ChannelEvent`], keys kept in insertion order.
pub type EventData = serde_json::Map<String, serde_json::Value>;

/// Kind of a normalized channel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventType {
    /// Chat message from a viewer.
    Chat,
    /// Viewer joined the chat room.
    Join,
    /// Viewer left the chat room.
    Part,
    /// New follower.
    Follow,
    /// Incoming raid.
    Raid,
    /// New or renewed subscription.
    Subscribe,
    /// Gifted subscriptions.
    GiftSub,
    /// Bits cheer.
    Cheer,
    /// User banned or timed out.
    Ban,
    /// User unbanned.
    Unban,
    /// Stream went live.
    StreamOnline,
    /// Stream ended.
    StreamOffline,
    /// Title or category changed.
    ChannelUpdate,
    /// Polled follower total.
    FollowerCountUpdate,
    /// Polled concurrent viewer count.
    ViewerCountUpdate,
    /// Channel points reward redeemed.
    ChannelPointsRedemption,
}

impl ChannelEventType {
    /// Wire name of this event type (`"gift_sub"`, `"stream_online"`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Join => "join",
            Self::Part => "part",
            Self::Follow => "follow",
            Self::Raid => "raid",
            Self::Subscribe => "subscribe",
            Self::GiftSub => "gift_sub",
            Self::Cheer => "cheer",
            Self::Ban => "ban",
            Self::Unban => "unban",
            Self::StreamOnline => "stream_online",
            Self::StreamOffline => "stream_offline",
            Self::ChannelUpdate => "channel_update",
            Self::FollowerCountUpdate => "follower_count_update",
            Self::ViewerCountUpdate => "viewer_count_update",
            Self::ChannelPointsRedemption => "channel_points_redemption",
        }
    }
}

impl std::fmt::Display for ChannelEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized event as delivered to bus subscribers.
///
/// Immutable once published: handlers receive a shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: ChannelEventType,
    /// Unix time in milliseconds at which the event was produced.
    pub timestamp: i64,
    /// Event-specific payload.
    pub data: EventData,
}

impl ChannelEvent {
    /// Build an event stamped with the current wall-clock time.
    #[must_use]
    pub fn now(kind: ChannelEventType, data: EventData) -> Self {
        Self {
            kind,
            timestamp: chrono::Utc::now().timestamp_millis(),
            data,
        }
    }

    /// Look up a string field in the payload.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Look up an unsigned integer field in the payload.
    #[must_use]
    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(serde_json::Value::as_u64)
    }
}
