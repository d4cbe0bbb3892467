//! Content hashing for cross-key deduplication.
//!
//! Two strategies rendering the same page rarely agree byte for byte, so the
//! hash is taken over a normalized form: markup and Markdown syntax removed,
//! case folded, whitespace collapsed.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("BUG: hardcoded HTML tag regex is invalid"));

/// Markdown link/image targets: `](url)` keeps only the bracketed text.
static LINK_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\]\([^)]*\)").expect("BUG: hardcoded link target regex is invalid")
});

static MARKDOWN_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[#*_`>|~\[\]!\\-]+").expect("BUG: hardcoded markdown syntax regex is invalid")
});

/// Hash of a normalized page body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(u64);

impl ContentHash {
    /// Hash of a body that normalizes to nothing. Never used for dedup.
    pub const EMPTY: ContentHash = ContentHash(0);

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Normalized text used for hashing.
#[must_use]
pub fn normalize_body(body: &str) -> String {
    let text = HTML_TAG.replace_all(body, " ");
    let text = LINK_TARGET.replace_all(&text, "]");
    let text = MARKDOWN_SYNTAX.replace_all(&text, " ");
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Content hash of `body`; [`ContentHash::EMPTY`] when nothing remains after normalization.
#[must_use]
pub fn content_hash(body: &str) -> ContentHash {
    let normalized = normalize_body(body);
    if normalized.is_empty() {
        return ContentHash::EMPTY;
    }
    // Reserve zero for the empty body.
    ContentHash(xxh3_64(normalized.as_bytes()).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_and_whitespace_insensitive() {
        let markdown = "# Install\n\nRun **the** installer.\n";
        let html = "<h1>Install</h1>\n<p>Run <b>the</b>   installer.</p>";
        assert_eq!(content_hash(markdown), content_hash(html));
    }

    #[test]
    fn test_link_targets_ignored() {
        assert_eq!(
            content_hash("See [setup](../setup/index.md)."),
            content_hash("See [setup](https://docs.example.com/setup).")
        );
    }

    #[test]
    fn test_different_text_differs() {
        assert_ne!(content_hash("alpha beta"), content_hash("alpha gamma"));
    }

    #[test]
    fn test_empty_body() {
        assert!(content_hash("").is_empty());
        assert!(content_hash("  <div></div> \n ## ").is_empty());
        assert!(!content_hash("x").is_empty());
    }
}
