//! Repository strategy.
//!
//! Detects the source repository of a site from a blob link on the site root
//! page and reads the Markdown straight from it. Highest quality when it
//! applies, since nothing is reconstructed from rendered HTML.

use std::sync::Arc;

use async_trait::async_trait;

use super::extract::{extract_links, markdown_title, split_front_matter};
use super::{DiscoveredUrl, Discovery, PageCandidate, Probe, ProbeTarget, StrategyKind};
use crate::error::ProbeError;
use crate::fetch::Fetcher;
use crate::source_tree::{RepoLocator, SourceRef, SourceTree};

/// Reads pages from the repository behind a site.
pub struct RepositoryProbe {
    fetcher: Arc<dyn Fetcher>,
    source_tree: Option<Arc<dyn SourceTree>>,
}

impl RepositoryProbe {
    /// Without a source tree the probe still runs and reports itself unavailable.
    pub fn new(fetcher: Arc<dyn Fetcher>, source_tree: Option<Arc<dyn SourceTree>>) -> Self {
        Self {
            fetcher,
            source_tree,
        }
    }

    /// Repository linked from the site root page, if any.
    pub async fn detect(&self, target: &ProbeTarget) -> Option<RepoLocator> {
        let root = target.base_url();
        let page = match self.fetcher.fetch(root.as_str()).await {
            Ok(page) => page.text(),
            Err(e) => {
                log::debug!("Site root unavailable for repository detection: {e}");
                return None;
            }
        };
        extract_links(&page, root)
            .iter()
            .find_map(|href| RepoLocator::from_blob_link(href))
    }
}

#[async_trait]
impl Probe for RepositoryProbe {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Repository
    }

    async fn discover(&self, target: &ProbeTarget) -> Result<Discovery, ProbeError> {
        let Some(repo) = self.detect(target).await else {
            return Err(ProbeError::unavailable(
                StrategyKind::Repository,
                "no source repository link on the site root page",
            ));
        };
        log::info!("Detected source repository {}", repo.web_url());

        let Some(tree) = &self.source_tree else {
            return Err(ProbeError::unavailable(
                StrategyKind::Repository,
                format!("repository {} detected but no source tree is configured", repo.web_url()),
            ));
        };

        let mut files = tree.list_markdown(&repo).await.map_err(|e| {
            ProbeError::unavailable(
                StrategyKind::Repository,
                format!("listing {} failed: {e}", repo.web_url()),
            )
        })?;
        files.sort();

        let base = target.base_url();
        let items = files
            .into_iter()
            .filter_map(|file| {
                let site_path = repo.site_path(&file)?;
                let key = target.normalize(&site_path).ok()?;
                let raw_url = base.join(&site_path).ok()?.to_string();
                let mut item = DiscoveredUrl::new(key, raw_url);
                item.source = Some(SourceRef {
                    repo: repo.clone(),
                    file,
                });
                Some(item)
            })
            .collect();
        Ok(Discovery::new(items))
    }

    async fn extract(
        &self,
        _target: &ProbeTarget,
        url: &DiscoveredUrl,
    ) -> Result<PageCandidate, ProbeError> {
        let (Some(tree), Some(source)) = (&self.source_tree, &url.source) else {
            return Err(ProbeError::extraction(&url.raw_url, "no repository file for this page"));
        };

        let text = tree
            .read(&source.repo, &source.file)
            .await
            .map_err(|e| ProbeError::fetch(&source.file.path, e))?;
        let (front_title, body) = split_front_matter(&text);
        let title = front_title.or_else(|| markdown_title(body)).unwrap_or_default();
        if body.trim().is_empty() && title.is_empty() {
            return Err(ProbeError::extraction(&source.file.path, "empty Markdown file"));
        }

        Ok(PageCandidate::new(
            url.key.clone(),
            StrategyKind::Repository,
            &url.raw_url,
            title,
            body.trim(),
        ))
    }
}
