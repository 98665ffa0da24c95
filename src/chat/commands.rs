//! Chat command responder.
//!
//! Configured commands map a trigger (`!uptime`) to a response template
//! (`Live for {uptime} playing {game}`). Template variables resolve from
//! [`StreamStats`], which is kept current from bus events. One cooldown is
//! shared by every command.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::events::{ChannelEvent, ChannelEventType, EventBus, Subscription};

/// One configured chat command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCommand {
    /// Text that fires the command, matched case-insensitively.
    pub trigger: String,
    /// Response template.
    pub response: String,
    /// Disabled commands never fire.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Platform state cached for template substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Stream title.
    pub title: Option<String>,
    /// Category (game) name.
    pub game: Option<String>,
    /// When the current stream went live; `None` while offline.
    pub started_at: Option<DateTime<Utc>>,
    /// Current viewer count.
    pub viewers: Option<u64>,
    /// Total followers.
    pub followers: Option<u64>,
}

impl StreamStats {
    /// Fold one bus event into the cached state.
    pub fn apply(&mut self, event: &ChannelEvent) {
        match event.kind {
            ChannelEventType::ChannelUpdate => {
                if let Some(title) = event.str_field("title") {
                    self.title = Some(title.to_string());
                }
                if let Some(game) = event.str_field("category_name") {
                    self.game = Some(game.to_string());
                }
            }
            ChannelEventType::StreamOnline => {
                self.started_at = event
                    .str_field("started_at")
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .or_else(|| DateTime::from_timestamp_millis(event.timestamp));
            }
            ChannelEventType::StreamOffline => self.started_at = None,
            ChannelEventType::ViewerCountUpdate => {
                if let Some(count) = event.u64_field("count") {
                    self.viewers = Some(count);
                }
            }
            ChannelEventType::FollowerCountUpdate => {
                if let Some(total) = event.u64_field("total") {
                    self.followers = Some(total);
                }
            }
            _ => {}
        }
    }

    /// Substitute `{uptime}`, `{game}`, `{title}`, `{viewers}` and
    /// `{followers}` in `template`.
    #[must_use]
    pub fn render(&self, template: &str, now: DateTime<Utc>) -> String {
        template
            .replace("{uptime}", &format_uptime(self.started_at, now))
            .replace("{game}", self.game.as_deref().unwrap_or("unknown"))
            .replace("{title}", self.title.as_deref().unwrap_or("unknown"))
            .replace("{viewers}", &self.viewers.unwrap_or(0).to_string())
            .replace("{followers}", &self.followers.unwrap_or(0).to_string())
    }
}

/// Format stream uptime as `XhYm`, `Ym`, or `offline`.
#[must_use]
pub fn format_uptime(started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(started_at) = started_at else {
        return "offline".to_string();
    };
    let minutes = (now - started_at).num_minutes().max(0);
    let hours = minutes / 60;
    if hours > 0 {
        format!("{hours}h{}m", minutes % 60)
    } else {
        format!("{minutes}m")
    }
}

/// Matches chat text against configured commands and renders responses.
pub struct CommandResponder {
    commands: Vec<CustomCommand>,
    cooldown: Duration,
    last_fired: Option<Instant>,
    stats: Arc<Mutex<StreamStats>>,
}

impl std::fmt::Debug for CommandResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandResponder")
            .field("commands", &self.commands.len())
            .field("cooldown", &self.cooldown)
            .field("last_fired", &self.last_fired)
            .finish_non_exhaustive()
    }
}

impl CommandResponder {
    /// Create a responder with its own empty stats cache.
    #[must_use]
    pub fn new(commands: Vec<CustomCommand>, cooldown: Duration) -> Self {
        Self {
            commands,
            cooldown,
            last_fired: None,
            stats: Arc::default(),
        }
    }

    /// Keep the stats cache current from `bus`.
    ///
    /// The returned subscription must be unsubscribed when the responder's
    /// owner shuts down.
    pub fn track(&self, bus: &EventBus) -> Subscription {
        let stats = Arc::clone(&self.stats);
        bus.subscribe(move |event| {
            stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .apply(event);
        })
    }

    /// Snapshot of the cached stats.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check `text` against the commands.
    ///
    /// Returns the rendered response of the first enabled command whose
    /// trigger equals the text or prefixes it followed by a space. Nothing
    /// fires while unauthenticated or during the shared cooldown. A
    /// response stamps the cooldown.
    pub fn respond(&mut self, text: &str, authenticated: bool) -> Option<String> {
        if !authenticated {
            return None;
        }
        if self
            .last_fired
            .is_some_and(|at| at.elapsed() < self.cooldown)
        {
            return None;
        }

        let lowered = text.trim().to_lowercase();
        let command = self.commands.iter().find(|cmd| {
            let trigger = cmd.trigger.trim().to_lowercase();
            cmd.enabled
                && !trigger.is_empty()
                && (lowered == trigger
                    || lowered
                        .strip_prefix(trigger.as_str())
                        .is_some_and(|rest| rest.starts_with(' ')))
        })?;

        let response = self.stats().render(&command.response, Utc::now());
        log::info!("[Chat] Command {} fired", command.trigger);
        self.last_fired = Some(Instant::now());
        Some(response)
    }
}
