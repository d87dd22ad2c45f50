//! Keeps player-typed text on one log line.

use std::fmt::Write;

/// Longest slice of player input that makes it into a log line.
pub const MAX_LOGGED_CHARS: usize = 120;

/// Escape `s` for single-line logging. Backslashes and control characters are
/// escaped (`\n`, `\r`, `\t`, otherwise `\xNN`) and anything past
/// [`MAX_LOGGED_CHARS`] is cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    escape_with_limit(s, MAX_LOGGED_CHARS)
}

pub fn escape_with_limit(s: &str, limit: usize) -> String {
    let mut out = String::with_capacity(s.len().min(limit) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count >= limit {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
