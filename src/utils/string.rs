//! UTF-8 safe string helpers.
//!
//! Tool output and log previews are cut by characters, never by byte index,
//! so multibyte text cannot cause a panic.

/// Return the first `n` characters of `s` as a `String` (no ellipsis).
pub fn prefix_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Return a preview of `s` up to `n` characters. If `s` is longer than `n`
/// characters, the returned string will include a trailing ellipsis `...`.
pub fn preview(s: &str, n: usize) -> String {
    let mut prefix = prefix_chars(s, n);
    if s.chars().count() > n {
        prefix.push_str("...");
    }
    prefix
}

/// Truncate `s` to `max` characters, appending a marker with the number of
/// characters dropped.
pub fn truncate_with_marker(s: &str, max: usize) -> String {
    let total = s.chars().count();
    if total <= max {
        return s.to_string();
    }
    format!(
        "{}\n... [truncated {} characters]",
        prefix_chars(s, max),
        total - max
    )
}
