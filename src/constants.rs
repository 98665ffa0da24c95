//! Application-wide constants for stagefeed.
//!
//! This module centralizes endpoints, protocol literals and every fixed
//! delay used by the protocol clients. Constants are grouped by domain.
//! Delays are the defaults; [`crate::config::Timings`] can override them.
//!
//! # Categories
//!
//! - **Endpoints**: Default socket and HTTP URLs
//! - **Chat protocol**: Literal lines and identities used on the chat socket
//! - **Timing**: Reconnect, keepalive, handoff and cooldown windows
//! - **Limits**: In-memory bounds

use std::time::Duration;

// ============================================================================
// Endpoints
// ============================================================================

/// Chat (IRC-over-WebSocket) endpoint.
pub const CHAT_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Structured-event (EventSub) WebSocket endpoint.
pub const EVENTSUB_URL: &str = "wss://eventsub.wss.twitch.tv/ws";

/// Base URL of the REST API used to register subscriptions.
pub const HELIX_URL: &str = "https://api.twitch.tv/helix";

/// Application client ID sent with every REST request.
pub const DEFAULT_CLIENT_ID: &str = "yu2txwsc619qgqaghrv1xzf66swhad";

/// HTTP client request timeout for REST calls.
///
/// Subscription registration is the only REST traffic; 10 seconds keeps a
/// hung request from holding a registration task open indefinitely.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Chat protocol
// ============================================================================

/// Read-only nick used when no credentials are available.
pub const ANONYMOUS_NICK: &str = "justinfan12345";

/// Reply sent for every server `PING` line.
pub const PONG_LINE: &str = "PONG :tmi.twitch.tv";

/// Capabilities requested by an authenticated session.
pub const CAPS_AUTHENTICATED: &str =
    "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership";

/// Capabilities requested by an anonymous session.
pub const CAPS_ANONYMOUS: &str = "CAP REQ :twitch.tv/tags";

// ============================================================================
// Timing
// ============================================================================

/// Delay before reconnecting after an unexpected socket close.
///
/// Applies to both clients. The delay is fixed: there is no backoff and no
/// retry limit, reconnects stop only when the client is told to disconnect.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Keepalive timeout assumed until the server announces its own.
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Upper bound on a server-announced keepalive timeout.
pub const MAX_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(600);

/// Grace added on top of the keepalive timeout before the watchdog fires.
pub const KEEPALIVE_GRACE: Duration = Duration::from_millis(5000);

/// How long a superseded live-events socket keeps receiving after a
/// `session_reconnect` before it is closed.
pub const RECONNECT_HANDOFF_GRACE: Duration = Duration::from_millis(30_000);

/// Lifetime of an outbound message in the echo-suppression set.
pub const ECHO_TTL: Duration = Duration::from_millis(5000);

/// Global cooldown shared by all chat commands.
pub const COMMAND_COOLDOWN: Duration = Duration::from_millis(5000);

// ============================================================================
// Limits
// ============================================================================

/// Number of chat messages retained by [`crate::chat::MemoryChatHistory`].
pub const CHAT_HISTORY_CAPACITY: usize = 200;
