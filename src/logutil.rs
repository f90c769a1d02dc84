//! Logging utilities for sanitizing user-supplied payload strings so logs
//! stay single-line. Escapes control characters that otherwise break log
//! readability.

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///   Truncates very long strings (over `MAX_PREVIEW`) with an ellipsis to cap log noise.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 300;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::escape_log;

    #[test]
    fn escapes_newlines() {
        let s = "review line1\nline2\r\tend";
        assert_eq!(escape_log(s), "review line1\\nline2\\r\\tend");
    }

    #[test]
    fn truncates_long_payloads() {
        let s = "x".repeat(500);
        let escaped = escape_log(&s);
        assert!(escaped.ends_with('…'));
        assert!(escaped.chars().count() <= 301);
    }
}
