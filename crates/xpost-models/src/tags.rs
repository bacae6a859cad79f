//! Tag sanitization.
//!
//! Platforms reject malformed tag sets outright, so every tag list passes
//! through here before being handed to an adapter. Sanitization is
//! idempotent: running it over an already-clean list returns the same list.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Tag constraints for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TagLimits {
    /// Tags longer than this are dropped (not truncated).
    pub max_tag_len: usize,
    /// The list is truncated to this many tags.
    pub max_tags: usize,
    /// Tags that would push the combined length past this are dropped.
    pub max_total_len: usize,
}

impl Default for TagLimits {
    fn default() -> Self {
        Self {
            max_tag_len: 30,
            max_tags: 15,
            max_total_len: 400,
        }
    }
}

/// Sanitize a tag list for a platform.
///
/// - strips leading '#' and any symbol/emoji characters
/// - collapses internal whitespace
/// - drops tags longer than `max_tag_len` characters
/// - deduplicates case-insensitively, keeping the first occurrence
/// - drops tags that would exceed `max_total_len` combined characters
/// - truncates (never rejects) the list at `max_tags`
pub fn sanitize_tags<S: AsRef<str>>(tags: &[S], limits: &TagLimits) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    let mut total_len = 0usize;

    for raw in tags {
        let cleaned = clean_tag(raw.as_ref());
        if cleaned.is_empty() {
            continue;
        }

        let char_len = cleaned.chars().count();
        if char_len > limits.max_tag_len {
            continue;
        }

        let lower = cleaned.to_lowercase();
        if seen.contains(&lower) {
            continue;
        }

        if total_len + char_len > limits.max_total_len {
            continue;
        }

        if out.len() >= limits.max_tags {
            break;
        }

        total_len += char_len;
        seen.push(lower);
        out.push(cleaned);
    }

    out
}

/// Strip symbols/emoji from a single tag, keeping letters, digits and
/// single internal spaces.
fn clean_tag(raw: &str) -> String {
    let stripped = raw.trim().trim_start_matches('#');

    let mut cleaned = String::with_capacity(stripped.len());
    let mut last_was_space = true;
    for c in stripped.chars() {
        if c.is_alphanumeric() {
            cleaned.push(c);
            last_was_space = false;
        } else if c.is_whitespace() && !last_was_space {
            cleaned.push(' ');
            last_was_space = true;
        }
        // Anything else (punctuation, symbols, emoji) is dropped.
    }

    cleaned.trim_end().to_string()
}
