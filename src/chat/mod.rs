//! Chat protocol: line parsing, message model and the [`ChatClient`] actor.

mod client;
pub mod colour;
pub mod commands;
mod echo;
pub mod fragments;
mod history;
mod message;
pub mod parse;

pub use client::{normalize_channel, ChatClient, ChatSettings, ChatState};
pub use colour::default_colour_for_username;
pub use commands::{CommandResponder, CustomCommand, StreamStats};
pub use echo::EchoTracker;
pub use fragments::{split_message_fragments, MessageFragment};
pub use history::{ChatHistory, MemoryChatHistory};
pub use message::{ChatBadge, ChatEmote, ChatMessage};
pub use parse::{classify_line, parse_privmsg, ChatLine, Privmsg};
