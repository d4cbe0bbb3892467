//! Canonical URL normalization.
//!
//! Every page identity in a run is a [`CanonicalKey`]: the page URL reduced to
//! the parts that decide which document it renders. Two URLs that render the
//! same page on a hosted-docs platform normalize to the same key.
//!
//! Page keys:
//! - scheme folded to `https`, host lowercased with a leading `www.` removed
//! - default ports dropped
//! - path lowercased, empty segments collapsed, source suffixes
//!   (`.md`, `.html`, `index.html`, `README.md`) folded onto the page path
//! - trailing slash removed except for the host root
//! - query and fragment removed
//!
//! Resource keys (see [`Normalizer::resource_key`]) are used for assets, where
//! the path case and query can select distinct files. They keep the path as-is
//! and keep non-tracking query pairs in sorted order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised while normalizing a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum NormalizeError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported scheme '{scheme}' in '{url}'")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("URL has no host: '{url}'")]
    MissingHost { url: String },
}

/// Suffixes that name the source of a page rather than the page itself.
///
/// Order matters: whole-file names are stripped before bare extensions so
/// `/guide/README.md` folds to `/guide` and not `/guide/readme`.
const SOURCE_SUFFIXES: &[&str] = &["/readme.md", "/index.html", "/index.md", ".md", ".html", ".htm"];

/// Normalized page identity.
///
/// Always a valid absolute URL string of the form `https://host[:port]/path`.
/// Ordering is plain string ordering, which keeps every map keyed by it
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Byte offset where the path starts.
    fn path_start(&self) -> usize {
        let after_scheme = self.0.find("://").map_or(0, |i| i + 3);
        self.0[after_scheme..]
            .find('/')
            .map_or(self.0.len(), |i| after_scheme + i)
    }

    /// Scheme, host and port, without a trailing slash.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.0[..self.path_start()]
    }

    /// Path component, always starting with `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        let path = &self.0[self.path_start()..];
        if path.is_empty() { "/" } else { path }
    }

    /// Non-empty path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path().split('/').filter(|s| !s.is_empty())
    }

    /// Number of path segments. The host root has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last path segment, if any.
    #[must_use]
    pub fn slug(&self) -> Option<&str> {
        self.segments().last()
    }

    #[must_use]
    pub fn is_host_root(&self) -> bool {
        self.path() == "/"
    }

    /// Key of the path one segment up, or `None` for the host root.
    #[must_use]
    pub fn path_parent(&self) -> Option<CanonicalKey> {
        if self.is_host_root() {
            return None;
        }
        let path = self.path();
        let parent = match path.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &path[..idx],
        };
        Some(CanonicalKey(format!("{}{}", self.origin(), parent)))
    }

    /// True when `self` is `other` or lies beneath it in the path hierarchy.
    #[must_use]
    pub fn is_within(&self, other: &CanonicalKey) -> bool {
        if self.origin() != other.origin() {
            return false;
        }
        if other.is_host_root() {
            return true;
        }
        let (mine, theirs) = (self.path(), other.path());
        mine == theirs
            || (mine.starts_with(theirs) && mine.as_bytes().get(theirs.len()) == Some(&b'/'))
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CanonicalKey {
    type Err = NormalizeError;

    /// Normalize an absolute URL without a site root.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s.trim()).map_err(|e| NormalizeError::InvalidUrl {
            url: s.to_string(),
            reason: e.to_string(),
        })?;
        normalize(s, &url)
    }
}

/// Normalize `raw_url` into a page key, resolving relative input against `site_root`.
///
/// Pure and idempotent: feeding a key's string form back in yields the same key.
pub fn normalize(raw_url: &str, site_root: &Url) -> Result<CanonicalKey, NormalizeError> {
    let url = resolve(raw_url, site_root)?;
    let origin = origin_of(&url, raw_url, "https")?;
    let path = fold_page_path(url.path());
    Ok(CanonicalKey(format!("{origin}{path}")))
}

/// Reusable normalizer bound to one site root.
#[derive(Debug, Clone)]
pub struct Normalizer {
    site_root: Url,
}

impl Normalizer {
    #[must_use]
    pub fn new(site_root: Url) -> Self {
        Self { site_root }
    }

    #[must_use]
    pub fn site_root(&self) -> &Url {
        &self.site_root
    }

    /// Page key for `raw_url`.
    pub fn key(&self, raw_url: &str) -> Result<CanonicalKey, NormalizeError> {
        normalize(raw_url, &self.site_root)
    }

    /// Page key for a link found on the page at `base`.
    pub fn key_relative_to(&self, raw_url: &str, base: &Url) -> Result<CanonicalKey, NormalizeError> {
        normalize(raw_url, base)
    }

    /// Canonical string for a resource (asset) URL found on the page at `base`.
    ///
    /// Unlike page keys the path keeps its case and source suffixes, and the
    /// query survives with tracking parameters removed and pairs sorted.
    pub fn resource_key(&self, raw_url: &str, base: &Url) -> Result<String, NormalizeError> {
        let url = resolve(raw_url, base)?;
        let origin = origin_of(&url, raw_url, url.scheme())?;
        let path = collapse_slashes(url.path());

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !is_tracking_query_param(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort();

        if pairs.is_empty() {
            return Ok(format!("{origin}{path}"));
        }
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            query.append_pair(k, v);
        }
        Ok(format!("{origin}{path}?{}", query.finish()))
    }
}

/// Query parameters that only carry campaign or click tracking.
#[must_use]
pub fn is_tracking_query_param(param: &str) -> bool {
    let name = param.to_ascii_lowercase();
    if name.starts_with("utm_") || name.starts_with("gad_") || name.starts_with("pk_") {
        return true;
    }
    matches!(
        name.as_str(),
        "gclid" | "fbclid" | "gbraid" | "wbraid" | "_gl" | "mc_cid" | "mc_eid"
    )
}

fn resolve(raw_url: &str, base: &Url) -> Result<Url, NormalizeError> {
    let trimmed = raw_url.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::InvalidUrl {
            url: raw_url.to_string(),
            reason: "empty URL".to_string(),
        });
    }
    let url = base.join(trimmed).map_err(|e| NormalizeError::InvalidUrl {
        url: raw_url.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(NormalizeError::UnsupportedScheme {
            url: raw_url.to_string(),
            scheme: other.to_string(),
        }),
    }
}

fn origin_of(url: &Url, raw_url: &str, scheme: &str) -> Result<String, NormalizeError> {
    let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(|| {
        NormalizeError::MissingHost {
            url: raw_url.to_string(),
        }
    })?;
    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    // Page keys fold the scheme to https, so both default ports disappear.
    let port = match url.port() {
        None => String::new(),
        Some(80 | 443) if scheme == "https" => String::new(),
        Some(port) => format!(":{port}"),
    };
    Ok(format!("{scheme}://{host}{port}"))
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if out.len() > 1 {
            out.push('/');
        }
        out.push_str(segment);
    }
    if path.ends_with('/') && out.len() > 1 {
        out.push('/');
    }
    out
}

fn fold_page_path(path: &str) -> String {
    let mut path = collapse_slashes(path).to_lowercase();

    // Strip repeatedly so `page.html.md` and `guide/README.md` fold fully and
    // re-normalizing a key never changes it.
    loop {
        let trimmed = path.trim_end_matches('/');
        let mut next = if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() };
        if let Some(suffix) = SOURCE_SUFFIXES.iter().find(|s| next.ends_with(*s)) {
            next.truncate(next.len() - suffix.len());
        }
        if next.is_empty() {
            next.push('/');
        }
        if next == path {
            return path;
        }
        path = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Url {
        Url::parse("https://docs.example.com/").unwrap()
    }

    fn key(raw: &str) -> String {
        normalize(raw, &root()).unwrap().to_string()
    }

    #[test]
    fn test_trailing_slash_and_case() {
        assert_eq!(key("https://docs.example.com/a/"), "https://docs.example.com/a");
        assert_eq!(key("HTTPS://Docs.Example.com/A"), "https://docs.example.com/a");
        assert_eq!(key("https://docs.example.com/"), "https://docs.example.com/");
        assert_eq!(key("https://docs.example.com"), "https://docs.example.com/");
    }

    #[test]
    fn test_query_and_fragment_removed() {
        assert_eq!(
            key("https://docs.example.com/a?utm_source=x&b=1#section"),
            "https://docs.example.com/a"
        );
    }

    #[test]
    fn test_scheme_www_and_port_folded() {
        assert_eq!(key("http://www.docs.example.com:80/a"), "https://docs.example.com/a");
        assert_eq!(key("https://docs.example.com:443/a"), "https://docs.example.com/a");
        assert_eq!(key("https://docs.example.com:8443/a"), "https://docs.example.com:8443/a");
    }

    #[test]
    fn test_relative_resolution() {
        assert_eq!(key("/guide/intro"), "https://docs.example.com/guide/intro");
        assert_eq!(key("guide//intro/"), "https://docs.example.com/guide/intro");
        let base = Url::parse("https://docs.example.com/guide/intro").unwrap();
        assert_eq!(
            normalize("../api", &base).unwrap().as_str(),
            "https://docs.example.com/api"
        );
    }

    #[test]
    fn test_source_suffixes_fold_onto_page() {
        assert_eq!(key("/guide/intro.md"), "https://docs.example.com/guide/intro");
        assert_eq!(key("/guide/README.md"), "https://docs.example.com/guide");
        assert_eq!(key("/guide/index.html"), "https://docs.example.com/guide");
        assert_eq!(key("/README.md"), "https://docs.example.com/");
        assert_eq!(key("/page.html.md"), "https://docs.example.com/page");
    }

    #[test]
    fn test_idempotent_on_keys() {
        for raw in ["/a/b/", "/README.md", "/x.html.md", "/", "/Mixed/Case?q=1"] {
            let first = key(raw);
            assert_eq!(key(&first), first, "not idempotent for {raw}");
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            normalize("", &root()),
            Err(NormalizeError::InvalidUrl { .. })
        ));
        assert!(matches!(
            normalize("mailto:someone@example.com", &root()),
            Err(NormalizeError::UnsupportedScheme { .. })
        ));
        assert!("not a url".parse::<CanonicalKey>().is_err());
    }

    #[test]
    fn test_key_path_helpers() {
        let k: CanonicalKey = "https://docs.example.com/api/auth".parse().unwrap();
        assert_eq!(k.origin(), "https://docs.example.com");
        assert_eq!(k.path(), "/api/auth");
        assert_eq!(k.depth(), 2);
        assert_eq!(k.slug(), Some("auth"));
        let parent = k.path_parent().unwrap();
        assert_eq!(parent.as_str(), "https://docs.example.com/api");
        assert_eq!(parent.path_parent().unwrap().as_str(), "https://docs.example.com/");
        assert!(k.is_within(&parent));
        let sibling: CanonicalKey = "https://docs.example.com/apiary".parse().unwrap();
        assert!(!sibling.is_within(&parent));
    }

    #[test]
    fn test_resource_key_keeps_case_and_sorted_query() {
        let n = Normalizer::new(root());
        let base = Url::parse("https://docs.example.com/guide/intro").unwrap();
        let a = n
            .resource_key("/img/Logo.PNG?w=2&a=1&utm_campaign=x", &base)
            .unwrap();
        let b = n.resource_key("https://www.docs.example.com/img/Logo.PNG?a=1&w=2", &base).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "https://docs.example.com/img/Logo.PNG?a=1&w=2");
    }
}
