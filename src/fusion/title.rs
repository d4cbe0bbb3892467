//! Title fallback helpers.

use convert_case::{Case, Casing};

use crate::canonical::CanonicalKey;

/// Title used for the site root when no strategy produced one.
pub const ROOT_TITLE: &str = "Introduction";

/// True for empty titles and any of `placeholders`, ignoring case.
#[must_use]
pub fn is_placeholder(title: &str, placeholders: &[String]) -> bool {
    let title = title.trim();
    title.is_empty() || placeholders.iter().any(|p| p.eq_ignore_ascii_case(title))
}

/// Human title derived from the last path segment: `getting-started` -> `Getting Started`.
#[must_use]
pub fn humanize_slug(key: &CanonicalKey) -> String {
    let Some(slug) = key.slug() else {
        return ROOT_TITLE.to_string();
    };
    let words = slug.replace(['_', '.', '+'], "-");
    let title = words
        .trim_matches('-')
        .from_case(Case::Kebab)
        .to_case(Case::Title);
    if title.trim().is_empty() {
        ROOT_TITLE.to_string()
    } else {
        title
    }
}
