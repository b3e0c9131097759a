//! Fields derived from post content: excerpt and reading time.

use regex::Regex;
use std::sync::OnceLock;

const EXCERPT_CHARS: usize = 200;
const WORDS_PER_MINUTE: usize = 200;

fn tag_pattern() -> Option<&'static Regex> {
    static TAGS: OnceLock<Option<Regex>> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").ok()).as_ref()
}

/// Removes HTML tags, leaving their text content.
pub(super) fn strip_tags(content: &str) -> String {
    match tag_pattern() {
        Some(pattern) => pattern.replace_all(content, "").into_owned(),
        None => content.to_string(),
    }
}

/// First 200 characters of the plain text, with `...` when it was cut.
pub(super) fn excerpt(content: &str) -> String {
    let plain = strip_tags(content);
    let mut chars = plain.chars();
    let mut excerpt: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        excerpt.push_str("...");
    }
    excerpt
}

/// Minutes to read at 200 words per minute, never less than one.
pub(super) fn read_time(content: &str) -> i32 {
    let words = strip_tags(content).split_whitespace().count();
    let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
    i32::try_from(minutes).unwrap_or(i32::MAX)
}
