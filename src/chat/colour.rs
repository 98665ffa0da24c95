//! Deterministic fallback colours for chatters without a colour tag.

/// Colour the platform renders for users that never picked one.
pub const NO_COLOUR: &str = "#FFFFFF";

/// Palette of readable, non-white name colours.
pub const PALETTE: [&str; 15] = [
    "#FF0000", "#0000FF", "#00FF00", "#B22222", "#FF7F50", "#9ACD32", "#FF4500", "#2E8B57",
    "#DAA520", "#D2691E", "#5F9EA0", "#1E90FF", "#FF69B4", "#8A2BE2", "#00FF7F",
];

/// Pick a palette colour for `username`.
///
/// Folds the UTF-16 code units of the name into a 32-bit signed hash
/// (`hash = hash * 31 + unit`, wrapping), then indexes the palette with
/// `|hash| mod len`. The arithmetic must stay bit-exact: other consumers
/// compute the same colour independently.
#[must_use]
pub fn default_colour_for_username(username: &str) -> &'static str {
    let hash = username
        .encode_utf16()
        .fold(0_i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)));
    let idx = hash.unsigned_abs() as usize % PALETTE.len();
    PALETTE[idx]
}
