//! UTF-8 safe string helpers for log output.
//!
//! Previews take the first N Unicode scalar values (chars) instead of
//! slicing by byte index, which can panic on multibyte characters.

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

/// Single-line preview for logs: newlines flattened, data URLs redacted.
pub fn log_preview(s: &str, n: usize) -> String {
    let flat = s.trim().replace('\n', " ");
    preview(&super::sanitize::redact_data_urls(&flat), n)
}

/// Human-friendly token count (`950`, `1.2k`, `3.4M`).
pub fn humanize_token_count(count: u64) -> String {
    match count {
        0..=999 => count.to_string(),
        1_000..=999_999 => format!("{:.1}k", count as f64 / 1_000.0),
        _ => format!("{:.1}M", count as f64 / 1_000_000.0),
    }
}
