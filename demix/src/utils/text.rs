//! Text helpers.

/// Truncate a string to at most `max` characters, respecting char
/// boundaries. Used to cap external-tool titles before display.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
