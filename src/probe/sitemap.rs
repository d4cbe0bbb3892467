//! Sitemap strategy.
//!
//! Reads `sitemap.xml` (and its common alternates), following sitemap indexes
//! with a seen-set, then scrapes each listed page.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use url::Url;

use super::extract::scrape_candidate;
use super::{DiscoveredUrl, Discovery, PageCandidate, Probe, ProbeTarget, StrategyKind};
use crate::error::ProbeError;
use crate::fetch::Fetcher;
use crate::utils::{MAX_SITEMAP_DEPTH, SITEMAP_PATHS};

/// Parsed contents of one sitemap document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitemapDocument {
    /// Page locations from a `<urlset>`.
    pub urls: Vec<String>,
    /// Child sitemap locations from a `<sitemapindex>`.
    pub sitemaps: Vec<String>,
}

/// Parse a sitemap or sitemap index.
///
/// Fails when the document is not XML or has neither a `urlset` nor a
/// `sitemapindex` element.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut doc = SitemapDocument::default();
    let mut buf = Vec::new();

    let mut recognized = false;
    let mut in_url = false;
    let mut in_sitemap = false;
    let mut in_loc = false;
    let mut current_loc = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"urlset" | b"sitemapindex" => recognized = true,
                b"url" => {
                    in_url = true;
                    current_loc.clear();
                }
                b"sitemap" => {
                    in_sitemap = true;
                    current_loc.clear();
                }
                b"loc" => in_loc = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"url" if in_url => {
                    if !current_loc.is_empty() {
                        doc.urls.push(current_loc.clone());
                    }
                    in_url = false;
                }
                b"sitemap" if in_sitemap => {
                    if !current_loc.is_empty() {
                        doc.sitemaps.push(current_loc.clone());
                    }
                    in_sitemap = false;
                }
                b"loc" => in_loc = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_loc && (in_url || in_sitemap) => {
                let text = e.unescape().map_err(|e| anyhow!("Invalid sitemap text: {e}"))?;
                current_loc.push_str(text.trim());
            }
            Ok(Event::CData(e)) if in_loc && (in_url || in_sitemap) => {
                current_loc.push_str(String::from_utf8_lossy(&e.into_inner()).trim());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("XML parse error: {e}")),
            _ => {}
        }
        buf.clear();
    }

    if !recognized {
        return Err(anyhow!("document is neither a urlset nor a sitemapindex"));
    }
    Ok(doc)
}

/// Discovers pages from the site's sitemaps.
pub struct SitemapProbe {
    fetcher: Arc<dyn Fetcher>,
}

impl SitemapProbe {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Sitemap URLs tried first: beside the site root, then at the host root.
    fn entry_points(target: &ProbeTarget) -> Vec<String> {
        let base = target.base_url();
        let mut host_root = base.clone();
        host_root.set_path("/");
        let mut seen = HashSet::new();
        [base, &host_root]
            .iter()
            .flat_map(|root| SITEMAP_PATHS.iter().filter_map(move |p| root.join(p).ok()))
            .map(|url| url.to_string())
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }

    /// Page locations reachable from the well-known sitemap paths.
    ///
    /// Returns `None` when no sitemap could be fetched and parsed at all.
    pub async fn collect_locations(&self, target: &ProbeTarget) -> Option<Vec<String>> {
        let mut pending: Vec<(String, usize)> = Self::entry_points(target)
            .into_iter()
            .map(|url| (url, 0))
            .rev()
            .collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut locations = Vec::new();
        let mut found_any = false;

        while let Some((sitemap_url, depth)) = pending.pop() {
            if !seen.insert(sitemap_url.clone()) {
                continue;
            }
            let content = match self.fetcher.fetch(&sitemap_url).await {
                Ok(content) => content,
                Err(e) => {
                    log::debug!("Sitemap {sitemap_url} unavailable: {e}");
                    continue;
                }
            };
            let doc = match parse_sitemap(&content.text()) {
                Ok(doc) => doc,
                Err(e) => {
                    log::debug!("Ignoring sitemap {sitemap_url}: {e:#}");
                    continue;
                }
            };
            found_any = true;
            log::debug!(
                "Sitemap {sitemap_url}: {} pages, {} child sitemaps",
                doc.urls.len(),
                doc.sitemaps.len()
            );
            locations.extend(doc.urls);

            if depth >= MAX_SITEMAP_DEPTH {
                log::warn!("Sitemap index nesting exceeds {MAX_SITEMAP_DEPTH} at {sitemap_url}");
                continue;
            }
            let base = Url::parse(&sitemap_url).ok();
            for child in doc.sitemaps.into_iter().rev() {
                let resolved = base
                    .as_ref()
                    .and_then(|b| b.join(&child).ok())
                    .map_or(child, |u| u.to_string());
                pending.push((resolved, depth + 1));
            }
        }

        found_any.then_some(locations)
    }
}

#[async_trait]
impl Probe for SitemapProbe {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sitemap
    }

    async fn discover(&self, target: &ProbeTarget) -> Result<Discovery, ProbeError> {
        let Some(locations) = self.collect_locations(target).await else {
            return Err(ProbeError::unavailable(
                StrategyKind::Sitemap,
                "no sitemap found at well-known locations",
            ));
        };

        let items = locations
            .into_iter()
            .filter_map(|loc| match target.normalize(&loc) {
                Ok(key) => Some(DiscoveredUrl::new(key, loc)),
                Err(e) => {
                    log::debug!("Skipping sitemap entry: {e}");
                    None
                }
            })
            .collect();
        Ok(Discovery::new(items))
    }

    async fn extract(
        &self,
        _target: &ProbeTarget,
        url: &DiscoveredUrl,
    ) -> Result<PageCandidate, ProbeError> {
        scrape_candidate(self.fetcher.as_ref(), StrategyKind::Sitemap, url).await
    }
}
