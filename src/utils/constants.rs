//! Shared configuration constants for docfusion
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

use std::time::Duration;

/// Default overall run deadline: 5 minutes
///
/// Covers discovery and extraction for every enabled strategy. Probes still
/// running when it elapses are cancelled and contribute what they finished.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// Body-length ratio above which two high-quality candidates are a conflict
///
/// A ratio of 2.0 means one extraction is more than twice the length of the
/// other. The longer body wins and the discrepancy is reported.
pub const DEFAULT_CONFLICT_RATIO: f64 = 2.0;

/// Maximum concurrent page extractions inside a single probe
///
/// Probes run concurrently with each other, so the effective upper bound on
/// in-flight fetches is this value times the number of enabled strategies.
pub const DEFAULT_MAX_CONCURRENT_EXTRACTIONS: usize = 8;

/// Directory (relative to the output root) that localized assets are placed in
pub const DEFAULT_ASSET_DIR: &str = "assets";

/// Titles that carry no information and trigger title fallback
///
/// Compared case-insensitively after trimming. The empty string is always
/// treated as a placeholder regardless of configuration.
pub const DEFAULT_PLACEHOLDER_TITLES: &[&str] = &[
    "untitled",
    "untitled page",
    "main page",
    "home",
    "unknown",
    "null",
    "undefined",
    "page not found",
    "404",
];

/// File extensions treated as downloadable assets when referenced by a plain link
///
/// Image references (`![..](..)`, `<img src>`) are localized regardless of
/// extension because hosted platforms often serve them from extension-less
/// image proxies.
pub const DEFAULT_ASSET_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "pdf", "zip", "tar", "gz",
];

/// Well-known sitemap locations, probed in order relative to the site root
pub const SITEMAP_PATHS: &[&str] = &["sitemap.xml", "sitemap-pages.xml", "sitemap_index.xml"];

/// Maximum sitemap-index nesting followed before giving up
pub const MAX_SITEMAP_DEPTH: usize = 4;

/// Minimum number of links a container needs to be considered the sidebar
pub const MIN_SIDEBAR_LINKS: usize = 4;

/// Titles longer than this are rejected as extraction noise
pub const MAX_TITLE_CHARS: usize = 200;

/// Number of leading Markdown lines searched for a `# ` title heading
pub const TITLE_SCAN_LINES: usize = 10;

/// Maximum element nesting followed while cleaning extracted HTML
///
/// Protects the recursive serializer from pathological documents.
pub const MAX_NESTING_DEPTH: usize = 100;
