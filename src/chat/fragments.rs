//! Split message text into text and emote fragments for rendering.

use serde::Serialize;

use super::message::ChatEmote;

/// A renderable piece of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageFragment {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An emote image.
    Emote {
        /// Emote id.
        id: String,
        /// Text the emote replaces.
        name: String,
    },
}

/// Split `text` into alternating text and emote fragments.
///
/// Emote spans are inclusive UTF-16 code-unit ranges. They are sorted by
/// start first; a span that overlaps an earlier one or runs past the end of
/// the text is ignored and its characters stay in the surrounding text.
/// Concatenating the text of every fragment (emote `name`s included)
/// reproduces `text`.
#[must_use]
pub fn split_message_fragments(text: &str, emotes: &[ChatEmote]) -> Vec<MessageFragment> {
    if emotes.is_empty() {
        return vec![MessageFragment::Text {
            text: text.to_string(),
        }];
    }

    let units: Vec<u16> = text.encode_utf16().collect();
    let mut sorted: Vec<&ChatEmote> = emotes.iter().collect();
    sorted.sort_by_key(|emote| emote.start);

    let mut fragments = Vec::new();
    let mut cursor = 0;
    for emote in sorted {
        let end = emote.end.saturating_add(1);
        if emote.start < cursor || emote.end < emote.start || end > units.len() {
            continue;
        }
        if emote.start > cursor {
            fragments.push(MessageFragment::Text {
                text: String::from_utf16_lossy(&units[cursor..emote.start]),
            });
        }
        fragments.push(MessageFragment::Emote {
            id: emote.id.clone(),
            name: String::from_utf16_lossy(&units[emote.start..end]),
        });
        cursor = end;
    }

    if cursor < units.len() {
        fragments.push(MessageFragment::Text {
            text: String::from_utf16_lossy(&units[cursor..]),
        });
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emote(id: &str, start: usize, end: usize) -> ChatEmote {
        ChatEmote {
            id: id.into(),
            start,
            end,
        }
    }

    fn text(t: &str) -> MessageFragment {
        MessageFragment::Text { text: t.into() }
    }

    fn em(id: &str, name: &str) -> MessageFragment {
        MessageFragment::Emote {
            id: id.into(),
            name: name.into(),
        }
    }

    fn rejoin(fragments: &[MessageFragment]) -> String {
        fragments
            .iter()
            .map(|f| match f {
                MessageFragment::Text { text } => text.as_str(),
                MessageFragment::Emote { name, .. } => name.as_str(),
            })
            .collect()
    }

    #[test]
    fn test_no_emotes_is_single_text() {
        assert_eq!(split_message_fragments("hello", &[]), vec![text("hello")]);
    }

    #[test]
    fn test_leading_emote() {
        let out = split_message_fragments("Kappa hello", &[emote("25", 0, 4)]);
        assert_eq!(out, vec![em("25", "Kappa"), text(" hello")]);
    }

    #[test]
    fn test_emotes_sorted_before_use() {
        let input = "Kappa and Keepo";
        let out = split_message_fragments(input, &[emote("1902", 10, 14), emote("25", 0, 4)]);
        assert_eq!(
            out,
            vec![em("25", "Kappa"), text(" and "), em("1902", "Keepo")]
        );
        assert_eq!(rejoin(&out), input);
    }

    #[test]
    fn test_repeated_emote_id() {
        let input = "Kappa hi Kappa";
        let emotes = crate::chat::parse::parse_emotes("25:0-4,9-13");
        let out = split_message_fragments(input, &emotes);
        assert_eq!(
            out,
            vec![em("25", "Kappa"), text(" hi "), em("25", "Kappa")]
        );
        assert_eq!(rejoin(&out), input);
    }

    #[test]
    fn test_overlapping_and_out_of_range_are_dropped() {
        let input = "Kappa hi";
        let out = split_message_fragments(
            input,
            &[emote("25", 0, 4), emote("99", 2, 6), emote("7", 6, 40)],
        );
        assert_eq!(out, vec![em("25", "Kappa"), text(" hi")]);
        assert_eq!(rejoin(&out), input);
    }

    #[test]
    fn test_indices_are_utf16_code_units() {
        // The crab is two UTF-16 code units.
        let input = "\u{1F980} Kappa";
        let out = split_message_fragments(input, &[emote("25", 3, 7)]);
        assert_eq!(out, vec![text("\u{1F980} "), em("25", "Kappa")]);
        assert_eq!(rejoin(&out), input);
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let json = serde_json::to_value(split_message_fragments("Kappa", &[emote("25", 0, 4)]))
            .unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "type": "emote", "id": "25", "name": "Kappa" }])
        );
    }
}
