//! Chat message types produced by the chat parser.

use serde::{Deserialize, Serialize};

use crate::events::EventData;

/// A badge shown next to a chatter's name (`setId/versionId`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBadge {
    /// Badge set, e.g. `subscriber`.
    pub set_id: String,
    /// Version within the set, e.g. `12`.
    pub version_id: String,
}

/// An emote occurrence inside a message's text.
///
/// `start` and `end` are the wire values: UTF-16 code-unit indices into the
/// message text, both inclusive (`Kappa` at the start of a message is
/// `0..=4`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEmote {
    /// Emote id.
    pub id: String,
    /// First code unit.
    pub start: usize,
    /// Last code unit.
    pub end: usize,
}

/// One chat message as kept in history and published on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Locally generated unique id.
    pub id: String,
    /// Display name of the sender.
    pub username: String,
    /// Hex colour of the sender's name (`#RRGGBB`), may be empty.
    pub colour: String,
    /// Message text.
    pub text: String,
    /// Badges in wire order.
    pub badges: Vec<ChatBadge>,
    /// Emote occurrences in wire order.
    pub emotes: Vec<ChatEmote>,
    /// Unix time in milliseconds.
    pub timestamp: i64,
}

impl ChatMessage {
    /// Create a message stamped now with a fresh id.
    #[must_use]
    pub fn new(
        username: String,
        colour: String,
        text: String,
        badges: Vec<ChatBadge>,
        emotes: Vec<ChatEmote>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username,
            colour,
            text,
            badges,
            emotes,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Payload for the `chat` bus event.
    #[must_use]
    pub fn to_event_data(&self) -> EventData {
        let mut data = EventData::new();
        data.insert("id".into(), self.id.clone().into());
        data.insert("username".into(), self.username.clone().into());
        data.insert("colour".into(), self.colour.clone().into());
        data.insert("text".into(), self.text.clone().into());
        data.insert(
            "badges".into(),
            serde_json::to_value(&self.badges).unwrap_or_default(),
        );
        data.insert(
            "emotes".into(),
            serde_json::to_value(&self.emotes).unwrap_or_default(),
        );
        data
    }
}
