//! Utility functions shared by Amica crates.

use std::ops::Range;

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Works on character boundaries, so multi-byte text is never split.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Locate `{name}` placeholders in a template string.
///
/// A placeholder is an opening brace, one or more ASCII alphanumerics or
/// underscores, and a closing brace. Returned ranges cover the braces.
pub fn placeholder_spans(template: &str) -> Vec<Range<usize>> {
    let bytes = template.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' {
            let start = i;
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                j += 1;
            }
            if j > start + 1 && j < bytes.len() && bytes[j] == b'}' {
                spans.push(start..j + 1);
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }

    spans
}

/// Turn an arbitrary key into a safe file stem.
///
/// Keeps ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
pub fn sanitize_key(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}
