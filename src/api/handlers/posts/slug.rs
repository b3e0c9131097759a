//! Slug helpers for posts.
//!
//! Slugs are lowercase `a-z0-9-` with collapsed separators. Uniqueness is the
//! store's job; collisions are resolved by the caller with [`with_suffix`].

pub(super) const SLUG_MAX: usize = 120;
const FALLBACK_SLUG: &str = "post";

/// Turns a title into a URL-safe slug, falling back to `post` when nothing
/// alphanumeric is left (for example a title made only of symbols).
pub(super) fn slug_from_title(title: &str) -> String {
    let mut slug = String::new();
    let mut prev_dash = false;
    for ch in title.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }
    let truncated: String = slug.trim_matches('-').chars().take(SLUG_MAX).collect();
    let normalized = truncated.trim_matches('-');
    if normalized.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        normalized.to_string()
    }
}

/// Appends `-{suffix}` to `base`, truncating the base so the result fits `max_len`.
/// Returns `None` if no base segment would remain.
pub(super) fn with_suffix(base: &str, suffix: usize, max_len: usize) -> Option<String> {
    let suffix = format!("-{suffix}");
    if suffix.len() >= max_len {
        return None;
    }
    let allowed = max_len.saturating_sub(suffix.len());
    let base_part: String = base.chars().take(allowed).collect();
    let base_part = base_part.trim_end_matches('-');
    if base_part.is_empty() {
        return None;
    }
    Some(format!("{base_part}{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_from_title_normalizes() {
        assert_eq!(slug_from_title("  Hello, World!  "), "hello-world");
        assert_eq!(slug_from_title("Rust & Tokio -- 2024"), "rust-tokio-2024");
        assert_eq!(slug_from_title("Ünïcödé title"), "n-c-d-title");
    }

    #[test]
    fn slug_from_title_falls_back() {
        assert_eq!(slug_from_title("!!!"), "post");
        assert_eq!(slug_from_title(""), "post");
    }

    #[test]
    fn slug_from_title_is_bounded() {
        let slug = slug_from_title(&"a".repeat(300));
        assert_eq!(slug.len(), SLUG_MAX);
    }

    #[test]
    fn with_suffix_truncates_base() {
        assert_eq!(with_suffix("hello", 2, SLUG_MAX).as_deref(), Some("hello-2"));
        assert_eq!(with_suffix("abcdef", 12, 6).as_deref(), Some("abc-12"));
        assert_eq!(with_suffix("ab-cd", 1, 5).as_deref(), Some("ab-1"));
        assert_eq!(with_suffix("abc", 123, 4), None);
    }
}
