//! Configuration loading and persistence.
//!
//! Reads `config.json` from the stagefeed config directory and layers
//! environment overrides on top. The OAuth token is never written to disk;
//! it only ever comes from `STAGEFEED_TOKEN`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{fs, path::Path, path::PathBuf};

use crate::chat::{ChatSettings, CustomCommand};
use crate::constants;
use crate::live::LiveSettings;

/// Protocol timings in milliseconds. Defaults match [`crate::constants`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Timings {
    /// Delay before reconnecting after an unexpected close.
    pub reconnect_delay_ms: u64,
    /// Grace added to the live-events keepalive timeout.
    pub keepalive_grace_ms: u64,
    /// Keepalive timeout assumed before the server announces one.
    pub default_keepalive_ms: u64,
    /// Lifetime of a superseded live-events socket after a migration.
    pub handoff_grace_ms: u64,
    /// Lifetime of an outbound chat message in the echo set.
    pub echo_ttl_ms: u64,
    /// Cooldown shared by all chat commands.
    pub command_cooldown_ms: u64,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: millis(constants::RECONNECT_DELAY),
            keepalive_grace_ms: millis(constants::KEEPALIVE_GRACE),
            default_keepalive_ms: millis(constants::DEFAULT_KEEPALIVE_TIMEOUT),
            handoff_grace_ms: millis(constants::RECONNECT_HANDOFF_GRACE),
            echo_ttl_ms: millis(constants::ECHO_TTL),
            command_cooldown_ms: millis(constants::COMMAND_COOLDOWN),
        }
    }
}

/// Configuration for stagefeed.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Chat channel to join (with or without `#`).
    pub channel: String,
    /// Numeric broadcaster id for live events.
    pub broadcaster_id: String,
    /// Application client ID sent with REST requests.
    pub client_id: String,
    /// Login name matching the token.
    pub username: String,
    /// OAuth token - NOT serialized to disk.
    #[serde(skip)]
    pub token: String,
    /// Chat socket URL.
    pub chat_url: String,
    /// Live-events socket URL.
    pub eventsub_url: String,
    /// REST API base URL.
    pub helix_url: String,
    /// Chat commands answered by the responder.
    pub commands: Vec<CustomCommand>,
    /// Protocol timings.
    pub timings: Timings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: String::new(),
            broadcaster_id: String::new(),
            client_id: constants::DEFAULT_CLIENT_ID.to_string(),
            username: String::new(),
            token: String::new(),
            chat_url: constants::CHAT_URL.to_string(),
            eventsub_url: constants::EVENTSUB_URL.to_string(),
            helix_url: constants::HELIX_URL.to_string(),
            commands: Vec::new(),
            timings: Timings::default(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `STAGEFEED_CONFIG_DIR` wins; otherwise the platform config dir
    /// (`~/.config/stagefeed` on Linux).
    ///
    /// # Errors
    ///
    /// Returns an error if no config directory can be determined or created.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = match std::env::var("STAGEFEED_CONFIG_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir()
                .context("Could not determine config directory")?
                .join("stagefeed"),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory is unusable or the file
    /// exists but is not valid JSON.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_dir()?)
    }

    /// Like [`Config::load`], reading `config.json` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.json");
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("invalid config in {}", config_path.display()))?
        } else {
            log::debug!("No config at {}, using defaults", config_path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(channel) = std::env::var("STAGEFEED_CHANNEL") {
            self.channel = channel;
        }

        if let Ok(broadcaster_id) = std::env::var("STAGEFEED_BROADCASTER_ID") {
            self.broadcaster_id = broadcaster_id;
        }

        if let Ok(client_id) = std::env::var("STAGEFEED_CLIENT_ID") {
            self.client_id = client_id;
        }

        if let Ok(username) = std::env::var("STAGEFEED_USERNAME") {
            self.username = username;
        }

        // Token only ever comes from the environment
        if let Ok(token) = std::env::var("STAGEFEED_TOKEN") {
            self.token = token.trim_start_matches("oauth:").to_string();
        }
    }

    /// Persists the current configuration to the config directory.
    /// Note: the token is NOT saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_dir()?)
    }

    /// Like [`Config::save`], writing `config.json` into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        let config_path = dir.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", config_path.display()))?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Check if a token and matching username are configured.
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.token.is_empty() && !self.username.is_empty()
    }

    /// Settings for the chat client.
    #[must_use]
    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            url: self.chat_url.clone(),
            reconnect_delay: Duration::from_millis(self.timings.reconnect_delay_ms),
            echo_ttl: Duration::from_millis(self.timings.echo_ttl_ms),
            command_cooldown: Duration::from_millis(self.timings.command_cooldown_ms),
            commands: self.commands.clone(),
        }
    }

    /// Settings for the live-events client.
    #[must_use]
    pub fn live_settings(&self) -> LiveSettings {
        LiveSettings {
            url: self.eventsub_url.clone(),
            reconnect_delay: Duration::from_millis(self.timings.reconnect_delay_ms),
            default_keepalive: Duration::from_millis(self.timings.default_keepalive_ms),
            keepalive_grace: Duration::from_millis(self.timings.keepalive_grace_ms),
            handoff_grace: Duration::from_millis(self.timings.handoff_grace_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chat_url, constants::CHAT_URL);
        assert_eq!(config.eventsub_url, constants::EVENTSUB_URL);
        assert_eq!(config.client_id, constants::DEFAULT_CLIENT_ID);
        assert_eq!(config.timings.reconnect_delay_ms, 3000);
        assert_eq!(config.timings.handoff_grace_ms, 30_000);
        assert!(config.commands.is_empty());
    }

    #[test]
    fn test_config_serialization_excludes_token() {
        let mut config = Config::default();
        config.token = "secret_token".to_string();
        let json = serde_json::to_string(&config).unwrap();

        // Token should NOT be in the JSON
        assert!(!json.contains("secret_token"));
        assert!(!json.contains("\"token\""));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "channel": "somestreamer", "timings": { "reconnect_delay_ms": 500 } }"#,
        )
        .unwrap();
        assert_eq!(config.channel, "somestreamer");
        assert_eq!(config.timings.reconnect_delay_ms, 500);
        assert_eq!(config.timings.echo_ttl_ms, 5000);
        assert_eq!(config.helix_url, constants::HELIX_URL);
    }

    #[test]
    fn test_settings_use_timings() {
        let mut config = Config::default();
        config.timings.reconnect_delay_ms = 1234;
        config.timings.default_keepalive_ms = 7000;
        config.commands.push(CustomCommand {
            trigger: "!hi".into(),
            response: "hello".into(),
            enabled: true,
        });

        let chat = config.chat_settings();
        assert_eq!(chat.reconnect_delay, Duration::from_millis(1234));
        assert_eq!(chat.commands.len(), 1);

        let live = config.live_settings();
        assert_eq!(live.reconnect_delay, Duration::from_millis(1234));
        assert_eq!(live.default_keepalive, Duration::from_secs(7));
        assert_eq!(live.handoff_grace, constants::RECONNECT_HANDOFF_GRACE);
    }

    #[test]
    fn test_has_token() {
        let mut config = Config::default();
        assert!(!config.has_token());

        config.token = "abc".to_string();
        assert!(!config.has_token());

        config.username = "me".to_string();
        assert!(config.has_token());
    }
}
