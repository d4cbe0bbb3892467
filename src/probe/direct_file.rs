//! DirectFile strategy.
//!
//! Many static documentation hosts publish the Markdown source next to each
//! rendered page. For every page URL found through the sitemap and the root
//! page's links, this probe requests `<page>.md` and then `<page>/README.md`,
//! rejecting responses that turn out to be rendered HTML.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::extract::{extract_links, markdown_title, split_front_matter};
use super::navigation::{is_content_link, parse_sidebar};
use super::sitemap::SitemapProbe;
use super::{DiscoveredUrl, Discovery, PageCandidate, Probe, ProbeTarget, StrategyKind};
use crate::error::ProbeError;
use crate::fetch::Fetcher;

/// Fetches raw Markdown counterparts of rendered pages.
pub struct DirectFileProbe {
    fetcher: Arc<dyn Fetcher>,
}

impl DirectFileProbe {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Raw-source URLs to try for a rendered page, in order.
    #[must_use]
    pub fn source_urls(page_url: &str, target: &ProbeTarget) -> Vec<String> {
        let clean = page_url
            .split('#')
            .next()
            .unwrap_or_default()
            .split('?')
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');

        if clean.to_ascii_lowercase().ends_with(".md") {
            return vec![clean.to_string()];
        }

        let is_root = target
            .normalize(page_url)
            .is_ok_and(|key| &key == target.root_key());
        if is_root {
            // `https://host.md` is not a page source.
            return target
                .base_url()
                .join("README.md")
                .map(|u| vec![u.to_string()])
                .unwrap_or_default();
        }
        vec![format!("{clean}.md"), format!("{clean}/README.md")]
    }

    /// Page URLs linked from the root page: the sidebar when there is one,
    /// otherwise every in-scope link.
    async fn root_page_links(&self, target: &ProbeTarget) -> Vec<String> {
        let root = target.base_url().clone();
        let page = match self.fetcher.fetch(root.as_str()).await {
            Ok(page) => page.text(),
            Err(e) => {
                log::debug!("Site root unavailable for direct-file discovery: {e}");
                return Vec::new();
            }
        };

        let mut links = vec![root.to_string()];
        match parse_sidebar(&page, &root, target) {
            Some(entries) => links.extend(entries.into_iter().map(|e| e.raw_url)),
            None => links.extend(
                extract_links(&page, &root)
                    .into_iter()
                    .filter(|href| Url::parse(href).is_ok_and(|u| is_content_link(&u, target))),
            ),
        }
        links
    }
}

#[async_trait]
impl Probe for DirectFileProbe {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectFile
    }

    async fn discover(&self, target: &ProbeTarget) -> Result<Discovery, ProbeError> {
        let sitemap = SitemapProbe::new(Arc::clone(&self.fetcher));
        let mut pages = sitemap.collect_locations(target).await.unwrap_or_default();
        pages.extend(self.root_page_links(target).await);

        let mut seen = HashSet::new();
        let items: Vec<DiscoveredUrl> = pages
            .into_iter()
            .filter_map(|raw| {
                let key = target.normalize(&raw).ok()?;
                seen.insert(key.clone()).then(|| DiscoveredUrl::new(key, raw))
            })
            .collect();

        if items.is_empty() {
            return Err(ProbeError::unavailable(
                StrategyKind::DirectFile,
                "no page URLs to probe for Markdown sources",
            ));
        }
        Ok(Discovery::new(items))
    }

    async fn extract(
        &self,
        target: &ProbeTarget,
        url: &DiscoveredUrl,
    ) -> Result<PageCandidate, ProbeError> {
        let mut last_error = None;

        for source in Self::source_urls(&url.raw_url, target) {
            match self.fetcher.fetch(&source).await {
                Ok(content) if content.is_html_document() => {
                    log::debug!("{source} served HTML, not a Markdown source");
                    last_error = Some(ProbeError::extraction(&source, "response is an HTML document"));
                }
                Ok(content) => {
                    let text = content.text();
                    let (front_title, body) = split_front_matter(&text);
                    if body.trim().is_empty() {
                        last_error = Some(ProbeError::extraction(&source, "empty Markdown source"));
                        continue;
                    }
                    let title = front_title
                        .or_else(|| markdown_title(body))
                        .or_else(|| url.title_hint.clone())
                        .unwrap_or_default();
                    return Ok(PageCandidate::new(
                        url.key.clone(),
                        StrategyKind::DirectFile,
                        source,
                        title,
                        body.trim(),
                    )
                    .with_nav(url.nav.clone()));
                }
                Err(e) => last_error = Some(ProbeError::fetch(&source, e)),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProbeError::extraction(&url.raw_url, "no Markdown source candidates")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_urls() {
        let target = ProbeTarget::new("https://docs.example.com/").unwrap();
        assert_eq!(
            DirectFileProbe::source_urls("https://docs.example.com/guide/intro/?x=1#top", &target),
            vec![
                "https://docs.example.com/guide/intro.md".to_string(),
                "https://docs.example.com/guide/intro/README.md".to_string(),
            ]
        );
        assert_eq!(
            DirectFileProbe::source_urls("https://docs.example.com/guide.md", &target),
            vec!["https://docs.example.com/guide.md".to_string()]
        );
        assert_eq!(
            DirectFileProbe::source_urls("https://docs.example.com/", &target),
            vec!["https://docs.example.com/README.md".to_string()]
        );
    }
}
