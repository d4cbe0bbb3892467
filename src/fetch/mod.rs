//! Fetch layer seam.
//!
//! Probes never perform network I/O directly. They go through a [`Fetcher`],
//! which the embedding application implements on top of its HTTP client,
//! browser pool or cache. Any [`FetchError`] becomes an extraction failure for
//! the page being fetched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by the fetch layer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Network error: {0}")]
    Network(String),
}

/// Raw response body plus the declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedContent {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// True when the response is a rendered HTML document.
    ///
    /// Checks the declared content type first, then sniffs the start of the
    /// body, since static hosts often serve every path as `text/plain` or
    /// `application/octet-stream`.
    #[must_use]
    pub fn is_html_document(&self) -> bool {
        if let Some(ct) = &self.content_type
            && ct.to_ascii_lowercase().contains("html")
        {
            return true;
        }
        let head: String = String::from_utf8_lossy(&self.bytes[..self.bytes.len().min(512)])
            .trim_start()
            .chars()
            .take(15)
            .collect::<String>()
            .to_ascii_lowercase();
        head.starts_with("<!doctype html") || head.starts_with("<html")
    }
}

/// Retrieves a URL. Implementations must be safe to call concurrently.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_detection_by_content_type() {
        let c = FetchedContent::new("# Title", Some("text/html; charset=utf-8"));
        assert!(c.is_html_document());
        let c = FetchedContent::new("# Title", Some("text/markdown"));
        assert!(!c.is_html_document());
    }

    #[test]
    fn test_html_detection_by_sniffing() {
        let c = FetchedContent::new("\n  <!DOCTYPE html><html></html>", Some("text/plain"));
        assert!(c.is_html_document());
        let c = FetchedContent::new("<html lang=\"en\">", None);
        assert!(c.is_html_document());
        let c = FetchedContent::new("Some <b>markdown</b>", None);
        assert!(!c.is_html_document());
    }
}
