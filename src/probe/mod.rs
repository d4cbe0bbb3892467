//! Acquisition strategies.
//!
//! A [`Probe`] is one independent way of acquiring a documentation site:
//! reading its source repository, walking its sitemap, walking its rendered
//! sidebar, or fetching raw Markdown counterparts of rendered pages. Each probe
//! discovers candidate URLs and extracts them into [`PageCandidate`]s tagged
//! with an [`ExtractionQuality`]. Probes share nothing mutable; the
//! orchestrator runs them concurrently and the fusion merger reconciles their
//! output.

pub mod direct_file;
pub mod extract;
pub mod navigation;
pub mod repository;
pub mod sitemap;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::canonical::{CanonicalKey, NormalizeError, Normalizer};
use crate::config::FusionConfig;
use crate::error::ProbeError;
use crate::fusion::content_hash::{ContentHash, content_hash};
use crate::source_tree::SourceRef;

pub use direct_file::DirectFileProbe;
pub use navigation::NavigationProbe;
pub use repository::RepositoryProbe;
pub use sitemap::SitemapProbe;

/// Identity of an acquisition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Repository,
    Sitemap,
    Navigation,
    DirectFile,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Repository,
        StrategyKind::Sitemap,
        StrategyKind::Navigation,
        StrategyKind::DirectFile,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Repository => "repository",
            StrategyKind::Sitemap => "sitemap",
            StrategyKind::Navigation => "navigation",
            StrategyKind::DirectFile => "direct_file",
        }
    }

    /// Quality of a normal extraction by this strategy.
    #[must_use]
    pub fn native_quality(&self) -> ExtractionQuality {
        match self {
            StrategyKind::Repository | StrategyKind::DirectFile => ExtractionQuality::NativeMarkdown,
            StrategyKind::Navigation => ExtractionQuality::SidebarScrape,
            StrategyKind::Sitemap => ExtractionQuality::SitemapScrape,
        }
    }

    /// Tie-break rank when two candidates have equal quality; lower wins.
    #[must_use]
    pub fn precedence(&self) -> u8 {
        match self {
            StrategyKind::Repository => 0,
            StrategyKind::DirectFile => 1,
            StrategyKind::Navigation => 2,
            StrategyKind::Sitemap => 3,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "repository" | "repo" | "github" => Ok(StrategyKind::Repository),
            "sitemap" => Ok(StrategyKind::Sitemap),
            "navigation" | "nav" | "sidebar" => Ok(StrategyKind::Navigation),
            "direct_file" | "direct" | "smart_probe" => Ok(StrategyKind::DirectFile),
            other => Err(format!("Unknown strategy '{other}'")),
        }
    }
}

/// How faithfully a page was retrieved. Declared lowest first so `Ord` ranks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionQuality {
    Fallback,
    SitemapScrape,
    SidebarScrape,
    NativeMarkdown,
}

/// Where a page sits in the rendered sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NavPosition {
    pub parent: Option<CanonicalKey>,
    /// Global document order of the sidebar entry.
    pub order: u32,
    /// Nesting level in the sidebar, 0 for top-level entries.
    pub depth: u32,
    /// Group header the entry sits under, if any.
    pub section: Option<String>,
}

/// One page as extracted by one strategy. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCandidate {
    canonical_key: CanonicalKey,
    source_strategy: StrategyKind,
    raw_url: String,
    title: String,
    body: String,
    content_hash: ContentHash,
    structural_depth: u32,
    quality: ExtractionQuality,
    nav: Option<NavPosition>,
}

impl PageCandidate {
    /// Build a candidate at the strategy's native quality.
    pub fn new(
        canonical_key: CanonicalKey,
        source_strategy: StrategyKind,
        raw_url: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let body = body.into();
        let structural_depth = u32::try_from(canonical_key.depth()).unwrap_or(u32::MAX);
        Self {
            content_hash: content_hash(&body),
            structural_depth,
            quality: source_strategy.native_quality(),
            canonical_key,
            source_strategy,
            raw_url: raw_url.into(),
            title: title.into(),
            body,
            nav: None,
        }
    }

    #[must_use]
    pub fn with_quality(mut self, quality: ExtractionQuality) -> Self {
        self.quality = quality;
        self
    }

    /// Attach the sidebar position; structural depth follows the sidebar.
    #[must_use]
    pub fn with_nav(mut self, nav: Option<NavPosition>) -> Self {
        if let Some(position) = &nav {
            self.structural_depth = position.depth;
        }
        self.nav = nav;
        self
    }

    pub fn canonical_key(&self) -> &CanonicalKey {
        &self.canonical_key
    }

    pub fn source_strategy(&self) -> StrategyKind {
        self.source_strategy
    }

    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn content_hash(&self) -> ContentHash {
        self.content_hash
    }

    pub fn structural_depth(&self) -> u32 {
        self.structural_depth
    }

    pub fn quality(&self) -> ExtractionQuality {
        self.quality
    }

    pub fn nav(&self) -> Option<&NavPosition> {
        self.nav.as_ref()
    }

    pub fn nav_parent(&self) -> Option<&CanonicalKey> {
        self.nav.as_ref().and_then(|n| n.parent.as_ref())
    }

    pub fn sibling_order(&self) -> Option<u32> {
        self.nav.as_ref().map(|n| n.order)
    }

    pub fn section(&self) -> Option<&str> {
        self.nav.as_ref().and_then(|n| n.section.as_deref())
    }
}

/// A URL found by a probe's discovery phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub key: CanonicalKey,
    pub raw_url: String,
    pub title_hint: Option<String>,
    pub nav: Option<NavPosition>,
    /// Repository file backing the page, for the Repository probe.
    pub source: Option<SourceRef>,
}

impl DiscoveredUrl {
    pub fn new(key: CanonicalKey, raw_url: impl Into<String>) -> Self {
        Self {
            key,
            raw_url: raw_url.into(),
            title_hint: None,
            nav: None,
            source: None,
        }
    }
}

/// Finite, single-pass sequence of discovered URLs.
///
/// Consumed by value; a second pass needs a second `discover` call.
/// Duplicate keys are dropped at construction, keeping the first occurrence.
#[derive(Debug)]
pub struct Discovery {
    items: std::vec::IntoIter<DiscoveredUrl>,
}

impl Discovery {
    pub fn new(items: Vec<DiscoveredUrl>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let items: Vec<DiscoveredUrl> = items
            .into_iter()
            .filter(|item| seen.insert(item.key.clone()))
            .collect();
        Self {
            items: items.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for Discovery {
    type Item = DiscoveredUrl;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

/// The site a run acquires, plus the URL filters applied before extraction.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    base: Url,
    root_key: CanonicalKey,
    normalizer: Normalizer,
    section_prefix: Option<CanonicalKey>,
    excluded: Vec<Regex>,
}

impl ProbeTarget {
    /// Target for `site_root` with no section or exclude filters.
    pub fn new(site_root: &str) -> Result<Self, NormalizeError> {
        let parsed = Url::parse(site_root.trim()).map_err(|e| NormalizeError::InvalidUrl {
            url: site_root.to_string(),
            reason: e.to_string(),
        })?;
        let root_key = crate::canonical::normalize(site_root, &parsed)?;
        let base = directory_url(parsed);
        Ok(Self {
            normalizer: Normalizer::new(base.clone()),
            base,
            root_key,
            section_prefix: None,
            excluded: Vec::new(),
        })
    }

    pub fn from_config(config: &FusionConfig) -> Result<Self, NormalizeError> {
        let mut target = Self::new(config.site_root())?;
        if let Some(prefix) = config.section_prefix() {
            target = target.with_section_prefix(prefix)?;
        }
        target.excluded = config.excluded_patterns_compiled().to_vec();
        Ok(target)
    }

    /// Keep only pages under `prefix`, a path relative to the site root or an absolute URL.
    pub fn with_section_prefix(mut self, prefix: &str) -> Result<Self, NormalizeError> {
        self.section_prefix = Some(self.normalizer.key(prefix.trim_start_matches('/'))?);
        Ok(self)
    }

    #[must_use]
    pub fn with_excluded(mut self, patterns: Vec<Regex>) -> Self {
        self.excluded = patterns;
        self
    }

    /// Site root as a directory URL (always ends with `/`), used to resolve relative paths.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn root_key(&self) -> &CanonicalKey {
        &self.root_key
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn normalize(&self, raw_url: &str) -> Result<CanonicalKey, NormalizeError> {
        self.normalizer.key(raw_url)
    }

    /// True when `key` belongs to the site.
    pub fn in_scope(&self, key: &CanonicalKey) -> bool {
        key.is_within(&self.root_key)
    }

    /// True when `key` survives the site, section and exclude filters.
    pub fn admits(&self, key: &CanonicalKey) -> bool {
        if !self.in_scope(key) {
            return false;
        }
        if let Some(prefix) = &self.section_prefix
            && !key.is_within(prefix)
        {
            return false;
        }
        !self
            .excluded
            .iter()
            .any(|re| re.is_match(key.as_str()) || re.is_match(key.path()))
    }
}

/// Directory form of a site root so relative joins stay beneath it.
fn directory_url(mut url: Url) -> Url {
    url.set_query(None);
    url.set_fragment(None);
    let path = url.path().to_string();
    if path.ends_with('/') {
        return url;
    }
    let last = path.rsplit('/').next().unwrap_or_default();
    if last.contains('.') {
        // `/docs/index.html` serves the `/docs/` directory.
        let dir = &path[..path.len() - last.len()];
        url.set_path(dir);
    } else {
        url.set_path(&format!("{path}/"));
    }
    url
}

/// One acquisition strategy.
#[async_trait]
pub trait Probe: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Discover candidate URLs. `DiscoveryUnavailable` means the strategy
    /// does not apply to this site and is reported, not fatal.
    async fn discover(&self, target: &ProbeTarget) -> Result<Discovery, ProbeError>;

    /// Extract one discovered URL into a candidate.
    async fn extract(
        &self,
        target: &ProbeTarget,
        url: &DiscoveredUrl,
    ) -> Result<PageCandidate, ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_ordering() {
        assert!(ExtractionQuality::NativeMarkdown > ExtractionQuality::SidebarScrape);
        assert!(ExtractionQuality::SidebarScrape > ExtractionQuality::SitemapScrape);
        assert!(ExtractionQuality::SitemapScrape > ExtractionQuality::Fallback);
        assert_eq!(
            StrategyKind::DirectFile.native_quality(),
            StrategyKind::Repository.native_quality()
        );
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Sitemap".parse::<StrategyKind>(), Ok(StrategyKind::Sitemap));
        assert_eq!("direct-file".parse::<StrategyKind>(), Ok(StrategyKind::DirectFile));
        assert!("ftp".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_discovery_dedups_and_is_single_pass() {
        let target = ProbeTarget::new("https://docs.example.com/").unwrap();
        let a = DiscoveredUrl::new(target.normalize("/a").unwrap(), "https://docs.example.com/a");
        let a2 = DiscoveredUrl::new(target.normalize("/a/").unwrap(), "https://docs.example.com/a/");
        let b = DiscoveredUrl::new(target.normalize("/b").unwrap(), "https://docs.example.com/b");
        let mut discovery = Discovery::new(vec![a, a2, b]);
        assert_eq!(discovery.size_hint(), (2, Some(2)));
        assert_eq!(discovery.next().unwrap().raw_url, "https://docs.example.com/a");
        assert_eq!(discovery.next().unwrap().raw_url, "https://docs.example.com/b");
        assert!(discovery.next().is_none());
        assert!(discovery.next().is_none());
    }

    #[test]
    fn test_target_scope_and_filters() {
        let target = ProbeTarget::new("https://docs.example.com/docs")
            .unwrap()
            .with_section_prefix("guide")
            .unwrap()
            .with_excluded(vec![Regex::new("^.*/draft.*$").unwrap()]);
        assert_eq!(target.base_url().as_str(), "https://docs.example.com/docs/");
        let key = |p: &str| target.normalize(p).unwrap();
        assert!(target.admits(&key("guide/intro")));
        assert!(!target.admits(&key("api/auth")));
        assert!(!target.admits(&key("guide/drafts")));
        assert!(!target.admits(&key("https://docs.example.com/blog/guide")));
        assert!(!target.admits(&key("https://other.example.com/docs/guide")));
    }

    #[test]
    fn test_candidate_depth_follows_nav() {
        let key: CanonicalKey = "https://docs.example.com/a/b/c".parse().unwrap();
        let c = PageCandidate::new(key.clone(), StrategyKind::Sitemap, key.as_str(), "C", "body");
        assert_eq!(c.structural_depth(), 3);
        assert_eq!(c.quality(), ExtractionQuality::SitemapScrape);
        let nav = NavPosition {
            parent: None,
            order: 4,
            depth: 1,
            section: Some("Guides".to_string()),
        };
        let c = c.with_nav(Some(nav));
        assert_eq!(c.structural_depth(), 1);
        assert_eq!(c.sibling_order(), Some(4));
        assert_eq!(c.section(), Some("Guides"));
    }
}
