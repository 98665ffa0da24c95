//! Subscription table and provider-type mapping.

use std::collections::BTreeMap;

use crate::events::ChannelEventType;
use crate::rpc::SubscriptionRequest;

/// One entry of the subscription table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionSpec {
    /// Provider event type.
    pub event_type: &'static str,
    /// Schema version.
    pub version: &'static str,
    /// Condition keys, each set to the broadcaster id.
    pub condition_keys: &'static [&'static str],
}

const BROADCASTER: &[&str] = &["broadcaster_user_id"];

/// Every subscription registered for a fresh session.
pub const SUBSCRIPTIONS: [SubscriptionSpec; 12] = [
    SubscriptionSpec {
        event_type: "channel.follow",
        version: "2",
        condition_keys: &["broadcaster_user_id", "moderator_user_id"],
    },
    SubscriptionSpec {
        event_type: "channel.raid",
        version: "1",
        condition_keys: &["to_broadcaster_user_id"],
    },
    SubscriptionSpec {
        event_type: "channel.update",
        version: "2",
        condition_keys: BROADCASTER,
    },
    SubscriptionSpec {
        event_type: "stream.online",
        version: "1",
        condition_keys: BROADCASTER,
    },
    SubscriptionSpec {
        event_type: "stream.offline",
        version: "1",
        condition_keys: BROADCASTER,
    },
    SubscriptionSpec {
        event_type: "channel.subscribe",
        version: "1",
        condition_keys: BROADCASTER,
    },
    SubscriptionSpec {
        event_type: "channel.subscription.gift",
        version: "1",
        condition_keys: BROADCASTER,
    },
    SubscriptionSpec {
        event_type: "channel.subscription.message",
        version: "1",
        condition_keys: BROADCASTER,
    },
    SubscriptionSpec {
        event_type: "channel.ban",
        version: "1",
        condition_keys: BROADCASTER,
    },
    SubscriptionSpec {
        event_type: "channel.unban",
        version: "1",
        condition_keys: BROADCASTER,
    },
    SubscriptionSpec {
        event_type: "channel.cheer",
        version: "1",
        condition_keys: BROADCASTER,
    },
    SubscriptionSpec {
        event_type: "channel.channel_points_custom_reward_redemption.add",
        version: "1",
        condition_keys: BROADCASTER,
    },
];

impl SubscriptionSpec {
    /// Build the registration request for `session_id` and `broadcaster_id`.
    #[must_use]
    pub fn request(&self, session_id: &str, broadcaster_id: &str) -> SubscriptionRequest {
        SubscriptionRequest {
            session_id: session_id.to_string(),
            event_type: self.event_type.to_string(),
            version: self.version.to_string(),
            condition: self
                .condition_keys
                .iter()
                .map(|key| ((*key).to_string(), broadcaster_id.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }
}

/// Requests for the whole table.
#[must_use]
pub fn subscription_requests(session_id: &str, broadcaster_id: &str) -> Vec<SubscriptionRequest> {
    SUBSCRIPTIONS
        .iter()
        .map(|spec| spec.request(session_id, broadcaster_id))
        .collect()
}

/// Canonical event type for a provider subscription type.
#[must_use]
pub fn map_event_type(subscription_type: &str) -> Option<ChannelEventType> {
    let kind = match subscription_type {
        "channel.follow" => ChannelEventType::Follow,
        "channel.raid" => ChannelEventType::Raid,
        "channel.update" => ChannelEventType::ChannelUpdate,
        "stream.online" => ChannelEventType::StreamOnline,
        "stream.offline" => ChannelEventType::StreamOffline,
        "channel.subscribe" | "channel.subscription.message" => ChannelEventType::Subscribe,
        "channel.subscription.gift" => ChannelEventType::GiftSub,
        "channel.ban" => ChannelEventType::Ban,
        "channel.unban" => ChannelEventType::Unban,
        "channel.cheer" => ChannelEventType::Cheer,
        "channel.channel_points_custom_reward_redemption.add" => {
            ChannelEventType::ChannelPointsRedemption
        }
        _ => return None,
    };
    Some(kind)
}
