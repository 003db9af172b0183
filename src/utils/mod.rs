//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod retry;

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Maximum slug length in bytes
pub const MAX_SLUG_LEN: usize = 80;

/// Words per minute used for reading time estimates
const WORDS_PER_MINUTE: usize = 200;

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Build a slug from a title
///
/// Keeps letters and digits from any script, lowercased, and collapses
/// everything else into single hyphens. The length is capped at
/// [`MAX_SLUG_LEN`] bytes on a char boundary without a trailing hyphen.
/// Titles with no letters or digits fall back to `"article"`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        let mut end = MAX_SLUG_LEN;
        while !slug.is_char_boundary(end) {
            end -= 1;
        }
        slug.truncate(end);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        String::from("article")
    } else {
        slug
    }
}

/// Derive the translation slug for a master slug
pub fn translation_slug(master_slug: &str, language_code: &str) -> String {
    format!("{master_slug}-{}", language_code.to_ascii_lowercase())
}

/// SHA-256 hex digest used for coarse duplicate detection
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Estimated reading time, never below one minute
pub fn reading_time_minutes(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
}

/// Truncate text to a maximum length on a char boundary
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }

    let mut end = max_len.saturating_sub(3);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello   world  "), "hello world");
        assert_eq!(normalize_whitespace("hello\n\nworld"), "hello world");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Ten Tips for Better Sleep!"), "ten-tips-for-better-sleep");
        assert_eq!(slugify("  --Rust & WebAssembly--  "), "rust-webassembly");
        assert_eq!(slugify("¿¡!!"), "article");
    }

    #[test]
    fn test_slugify_keeps_non_latin_titles_apart() {
        let sleep = slugify("睡眠を改善する十の習慣");
        let breakfast = slugify("朝食の大切さについて");
        let greek = slugify("Ελληνικά άρθρα για ύπνο");

        assert_eq!(sleep, "睡眠を改善する十の習慣");
        assert_eq!(greek, "ελληνικά-άρθρα-για-ύπνο");
        assert_ne!(sleep, breakfast);
        assert_ne!(sleep, "article");
        assert_eq!(slugify("Café Culture"), "café-culture");
    }

    #[test]
    fn test_slugify_caps_length_on_char_boundary() {
        let slug = slugify(&"睡眠".repeat(40));
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(slug.chars().all(|c| c == '睡' || c == '眠'));
    }

    #[test]
    fn test_slugify_caps_length() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_translation_slug() {
        assert_eq!(translation_slug("better-sleep", "ES"), "better-sleep-es");
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 64);
    }

    #[test]
    fn test_reading_time() {
        assert_eq!(reading_time_minutes(""), 1);
        assert_eq!(reading_time_minutes(&"word ".repeat(200)), 1);
        assert_eq!(reading_time_minutes(&"word ".repeat(201)), 2);
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("very long text here", 10), "very lo...");
        assert_eq!(truncate_text("ééééé", 6), "é...");
    }
}
