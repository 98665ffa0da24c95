//! Line parser for the chat protocol.
//!
//! Chat arrives as IRC lines, optionally prefixed with an IRCv3 tag block:
//!
//! ```text
//! @badges=broadcaster/1;color=#9ACD32;display-name=Streamer;emotes=25:0-4 :streamer!streamer@streamer.tmi.twitch.tv PRIVMSG #streamer :Kappa hi
//! ```
//!
//! [`classify_line`] splits a line into its tag block, prefix and command
//! and dispatches on the command. Everything unknown is [`ChatLine::Other`].

use super::colour::default_colour_for_username;
use super::message::{ChatBadge, ChatEmote};

/// A chat line, classified by command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLine {
    /// Server `PING`; must be answered with a `PONG`.
    Ping,
    /// `USERSTATE` / `GLOBALUSERSTATE` carrying our own colour, if set.
    UserState {
        /// Value of the `color` tag, `None` when absent or empty.
        colour: Option<String>,
    },
    /// A chat message.
    Privmsg(Privmsg),
    /// A user joined the channel.
    Join {
        /// Login name of the user.
        nick: String,
    },
    /// A user left the channel.
    Part {
        /// Login name of the user.
        nick: String,
    },
    /// Anything else (numerics, `CAP ACK`, `ROOMSTATE`, ...).
    Other,
}

/// Decoded `PRIVMSG` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Privmsg {
    /// Login name from the line prefix, lowercased. Falls back to the
    /// lowercased display name when the prefix is missing.
    pub login: String,
    /// Display name, or the login when the `display-name` tag is empty.
    pub username: String,
    /// Name colour: the `color` tag, or a palette colour derived from the
    /// username when the tag is empty.
    pub colour: String,
    /// Trailing message text.
    pub text: String,
    /// Badges in wire order.
    pub badges: Vec<ChatBadge>,
    /// Emotes in wire order, inclusive spans.
    pub emotes: Vec<ChatEmote>,
}

/// A line split into its parts. Fields borrow from the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawLine<'a> {
    tags: &'a str,
    prefix: Option<&'a str>,
    command: &'a str,
    params: &'a str,
}

impl<'a> RawLine<'a> {
    fn split(line: &'a str) -> Self {
        let (tags, rest) = split_tags(line);

        let (prefix, rest) = match rest.strip_prefix(':') {
            Some(stripped) => match stripped.split_once(' ') {
                Some((prefix, rest)) => (Some(prefix), rest),
                None => (Some(stripped), ""),
            },
            None => (None, rest),
        };

        let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));
        Self {
            tags,
            prefix,
            command,
            params,
        }
    }

    fn tag(&self, key: &str) -> Option<&'a str> {
        tag_value(self.tags, key)
    }

    /// Nick portion of a `nick!user@host` prefix.
    fn nick(&self) -> Option<&'a str> {
        let (nick, _) = self.prefix?.split_once('!')?;
        is_nick(nick).then_some(nick)
    }
}

/// Classify one line received from the chat socket.
#[must_use]
pub fn classify_line(line: &str) -> ChatLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let raw = RawLine::split(line);

    match raw.command {
        "PING" => ChatLine::Ping,
        "USERSTATE" | "GLOBALUSERSTATE" => ChatLine::UserState {
            colour: parse_colour_tag(line),
        },
        "PRIVMSG" => parse_privmsg(line).map_or(ChatLine::Other, ChatLine::Privmsg),
        "JOIN" | "PART" => match (raw.nick(), raw.params.starts_with('#')) {
            (Some(nick), true) => {
                let nick = nick.to_string();
                if raw.command == "JOIN" {
                    ChatLine::Join { nick }
                } else {
                    ChatLine::Part { nick }
                }
            }
            _ => ChatLine::Other,
        },
        _ => ChatLine::Other,
    }
}

/// Decode a `PRIVMSG` line.
///
/// Returns `None` when the line is not a chat message, has no trailing
/// text, or has neither a display name nor a nick prefix.
#[must_use]
pub fn parse_privmsg(line: &str) -> Option<Privmsg> {
    let raw = RawLine::split(line.trim_end_matches(['\r', '\n']));
    if raw.command != "PRIVMSG" {
        return None;
    }

    // `#channel :text`; the text itself may contain " :".
    let (_, text) = raw.params.split_once(" :")?;

    let nick = raw.nick();
    let username = raw
        .tag("display-name")
        .filter(|name| !name.is_empty())
        .or(nick)?
        .to_string();
    let login = nick.map_or_else(|| username.to_lowercase(), str::to_lowercase);

    let colour = match raw.tag("color") {
        Some(colour) if !colour.is_empty() => colour.to_string(),
        _ => default_colour_for_username(&username).to_string(),
    };

    Some(Privmsg {
        login,
        username,
        colour,
        text: text.to_string(),
        badges: raw.tag("badges").map(parse_badges).unwrap_or_default(),
        emotes: raw.tag("emotes").map(parse_emotes).unwrap_or_default(),
    })
}

/// Value of the `color` tag on a line, `None` when absent or empty.
#[must_use]
pub fn parse_colour_tag(line: &str) -> Option<String> {
    RawLine::split(line)
        .tag("color")
        .filter(|c| !c.is_empty())
        .map(String::from)
}

/// Decode a `badges` tag value: `set/version,set/version`.
#[must_use]
pub fn parse_badges(value: &str) -> Vec<ChatBadge> {
    value
        .split(',')
        .filter_map(|badge| badge.split_once('/'))
        .filter(|(set_id, _)| !set_id.is_empty())
        .map(|(set_id, version_id)| ChatBadge {
            set_id: set_id.to_string(),
            version_id: version_id.to_string(),
        })
        .collect()
}

/// Decode an `emotes` tag value: `id:start-end,start-end/id:start-end`.
///
/// Malformed ranges are skipped. Order follows the wire.
#[must_use]
pub fn parse_emotes(value: &str) -> Vec<ChatEmote> {
    let mut emotes = Vec::new();
    for group in value.split('/').filter(|g| !g.is_empty()) {
        let Some((id, ranges)) = group.split_once(':') else {
            continue;
        };
        for range in ranges.split(',') {
            let Some((start, end)) = range.split_once('-') else {
                continue;
            };
            let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) else {
                continue;
            };
            emotes.push(ChatEmote {
                id: id.to_string(),
                start,
                end,
            });
        }
    }
    emotes
}

/// Split a line into its tag block (without the leading `@`) and the rest.
fn split_tags(line: &str) -> (&str, &str) {
    match line.strip_prefix('@').and_then(|l| l.split_once(' ')) {
        Some((tags, rest)) => (tags, rest),
        None => ("", line),
    }
}

fn tag_value<'a>(tags: &'a str, key: &str) -> Option<&'a str> {
    tags.split(';')
        .filter_map(|pair| pair.split_once('='))
        .find_map(|(k, v)| (k == key).then_some(v))
}

fn is_nick(nick: &str) -> bool {
    !nick.is_empty() && nick.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
