//! URL and path manipulation utilities.
//!
//! This module maps canonical keys onto the local document layout and
//! computes the relative links between localized files.

use std::path::{Path, PathBuf};

use url::Url;

use crate::canonical::CanonicalKey;

/// File name every page is stored under inside its path directory.
pub const DOCUMENT_FILE_NAME: &str = "index.md";

/// Local path of the document for `key`, relative to the output root.
///
/// The host is not part of the path because a run covers a single site:
/// `https://docs.example.com/guide/intro` becomes `guide/intro/index.md` and
/// the host root becomes `index.md`. Each segment is passed through
/// `sanitize_filename` so keys can never escape the output directory.
#[must_use]
pub fn document_path(key: &CanonicalKey) -> PathBuf {
    let mut path = PathBuf::new();
    for segment in key.segments() {
        let clean = sanitize_filename::sanitize(segment);
        if clean.is_empty() || clean == "." || clean == ".." {
            path.push("_");
        } else {
            path.push(clean);
        }
    }
    path.join(DOCUMENT_FILE_NAME)
}

/// Relative link from the file at `from_file` to the file at `to_file`.
///
/// Both paths are relative to the same output root. The result always uses
/// forward slashes so it can be embedded in Markdown regardless of platform.
#[must_use]
pub fn compute_relative_path(from_file: &Path, to_file: &Path) -> Option<String> {
    let from_dir = from_file.parent()?;
    let relative = pathdiff::diff_paths(to_file, from_dir)?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Check whether `href` names something a fetch could retrieve.
///
/// Skips empty values, in-page anchors and non-http schemes.
#[must_use]
pub fn is_fetchable_href(href: &str) -> bool {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return false;
    }
    let lower = href.to_ascii_lowercase();
    !(lower.starts_with("data:")
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:"))
}

/// Lowercased extension of the last path segment, if it has one.
#[must_use]
pub fn path_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Split `href` into the part before `#` and the fragment (including `#`).
#[must_use]
pub fn split_fragment(href: &str) -> (&str, &str) {
    match href.find('#') {
        Some(idx) => (&href[..idx], &href[idx..]),
        None => (href, ""),
    }
}
