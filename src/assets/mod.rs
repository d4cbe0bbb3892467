//! Asset localization.
//!
//! Scans page bodies for images and downloadable files, gives each distinct
//! resource one deterministic local path, rewrites the references in place and
//! returns the download plan for the external fetch layer.
//!
//! Local paths are `<asset_dir>/<xxh3 of the resource key>.<ext>`, so the same
//! asset referenced from any number of pages maps to one file, and reruns
//! produce the same paths.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, anyhow};
use lol_html::{HtmlRewriter, Settings, element};
use regex::Captures;
use serde::{Deserialize, Serialize};
use url::Url;
use xxhash_rust::xxh3::xxh3_64;

use crate::canonical::{CanonicalKey, Normalizer};
use crate::config::FusionConfig;
use crate::fusion::CanonicalPage;
use crate::hierarchy::DocumentTree;
use crate::link_rewriter::MARKDOWN_LINK;
use crate::utils::{
    DEFAULT_ASSET_DIR, DEFAULT_ASSET_EXTENSIONS, compute_relative_path, document_path,
    is_fetchable_href, path_extension,
};

/// One asset reference made by one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Absolute URL as referenced, before localization.
    pub original_url: String,
    /// Path relative to the output root.
    pub local_path: String,
    pub owner: CanonicalKey,
}

/// One file the fetch layer should retrieve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDownload {
    pub source_url: String,
    pub local_path: String,
}

/// Downloads keyed by resource key, plus every reference in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPlan {
    pub downloads: BTreeMap<String, AssetDownload>,
    pub refs: Vec<AssetRef>,
}

impl AssetPlan {
    #[must_use]
    pub fn len(&self) -> usize {
        self.downloads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.downloads.is_empty()
    }

    /// Local path assigned to a resource key.
    #[must_use]
    pub fn local_path(&self, resource_key: &str) -> Option<&str> {
        self.downloads
            .get(resource_key)
            .map(|d| d.local_path.as_str())
    }

    /// Source URL to local path, for the file writer.
    #[must_use]
    pub fn rewrite_map(&self) -> BTreeMap<&str, &str> {
        self.downloads
            .values()
            .map(|d| (d.source_url.as_str(), d.local_path.as_str()))
            .collect()
    }
}

/// Rewrites asset references to local paths.
#[derive(Debug, Clone)]
pub struct AssetLocalizer {
    normalizer: Normalizer,
    asset_dir: String,
    extensions: Vec<String>,
}

impl AssetLocalizer {
    pub fn new(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            asset_dir: DEFAULT_ASSET_DIR.to_string(),
            extensions: DEFAULT_ASSET_EXTENSIONS
                .iter()
                .map(|e| (*e).to_string())
                .collect(),
        }
    }

    pub fn from_config(config: &FusionConfig, normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            asset_dir: config.asset_dir().to_string(),
            extensions: config.asset_extensions().to_vec(),
        }
    }

    #[must_use]
    pub fn with_asset_dir(mut self, dir: impl Into<String>) -> Self {
        self.asset_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Localize every page of `tree`.
    pub fn localize(&self, tree: DocumentTree) -> (DocumentTree, AssetPlan) {
        let mut plan = AssetPlan::default();
        let tree = tree.map_pages(|page| self.localize_page(page, &mut plan));
        log::info!(
            "Localized {} asset references to {} files",
            plan.refs.len(),
            plan.len()
        );
        (tree, plan)
    }

    /// Localize one page, recording its assets in `plan`.
    pub fn localize_page(&self, page: CanonicalPage, plan: &mut AssetPlan) -> CanonicalPage {
        let Some(base) = page_base(&page) else {
            log::debug!("No base URL for {}; assets left as-is", page.key);
            return page;
        };
        let page_file = document_path(&page.key);
        let mut refs: Vec<AssetRef> = Vec::new();

        let body = MARKDOWN_LINK
            .replace_all(&page.body, |caps: &Captures<'_>| {
                let whole = caps[0].to_string();
                let is_image = !caps[1].is_empty();
                match self.localize_ref(&caps[3], &base, is_image, &page_file, &page.key, plan, &mut refs) {
                    Some(local) => format!("{}[{}]({local}{})", &caps[1], &caps[2], &caps[4]),
                    None => whole,
                }
            })
            .into_owned();

        let body = if contains_html_asset_tag(&body) {
            match self.localize_html(&body, &base, &page_file, &page.key, plan, &mut refs) {
                Ok(rewritten) => rewritten,
                Err(e) => {
                    log::warn!("Skipping HTML asset rewrite for {}: {e:#}", page.key);
                    body
                }
            }
        } else {
            body
        };

        let mut ordered: Vec<AssetRef> = Vec::with_capacity(refs.len());
        for r in refs {
            if !ordered.iter().any(|o| o.local_path == r.local_path) {
                ordered.push(r);
            }
        }
        plan.refs.extend(ordered.iter().cloned());

        CanonicalPage {
            body,
            asset_refs: ordered,
            ..page
        }
    }

    /// Local link for `href` if it is an asset, recording it.
    #[allow(clippy::too_many_arguments)]
    fn localize_ref(
        &self,
        href: &str,
        base: &Url,
        is_image: bool,
        page_file: &Path,
        owner: &CanonicalKey,
        plan: &mut AssetPlan,
        refs: &mut Vec<AssetRef>,
    ) -> Option<String> {
        if !is_fetchable_href(href) {
            return None;
        }
        let resolved = base.join(href.trim()).ok()?;
        if !matches!(resolved.scheme(), "http" | "https") {
            return None;
        }
        let extension = asset_extension(&resolved);
        if !is_image
            && !extension
                .as_deref()
                .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        {
            return None;
        }

        let resource_key = self.normalizer.resource_key(resolved.as_str(), base).ok()?;
        let local_path = plan
            .downloads
            .entry(resource_key.clone())
            .or_insert_with(|| AssetDownload {
                source_url: resolved.to_string(),
                local_path: self.local_path(&resource_key, extension.as_deref()),
            })
            .local_path
            .clone();

        refs.push(AssetRef {
            original_url: resolved.to_string(),
            local_path: local_path.clone(),
            owner: owner.clone(),
        });
        compute_relative_path(page_file, Path::new(&local_path))
    }

    fn local_path(&self, resource_key: &str, extension: Option<&str>) -> String {
        let hash = format!("{:016x}", xxh3_64(resource_key.as_bytes()));
        match extension {
            Some(ext) => format!("{}/{hash}.{ext}", self.asset_dir),
            None => format!("{}/{hash}", self.asset_dir),
        }
    }

    fn localize_html(
        &self,
        body: &str,
        base: &Url,
        page_file: &Path,
        owner: &CanonicalKey,
        plan: &mut AssetPlan,
        refs: &mut Vec<AssetRef>,
    ) -> Result<String> {
        let mut output = Vec::with_capacity(body.len());
        let rewrite_count = AtomicUsize::new(0);
        // Both handlers record into the same plan.
        let state = std::cell::RefCell::new((plan, refs));

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("img[src]", |el| {
                        if let Some(src) = el.get_attribute("src") {
                            let mut guard = state.borrow_mut();
                            let (plan, refs) = &mut *guard;
                            if let Some(local) =
                                self.localize_ref(&src, base, true, page_file, owner, plan, refs)
                            {
                                el.set_attribute("src", &local)?;
                                el.remove_attribute("srcset");
                                rewrite_count.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Ok(())
                    }),
                    element!("a[href]", |el| {
                        if let Some(href) = el.get_attribute("href") {
                            let mut guard = state.borrow_mut();
                            let (plan, refs) = &mut *guard;
                            if let Some(local) =
                                self.localize_ref(&href, base, false, page_file, owner, plan, refs)
                            {
                                el.set_attribute("href", &local)?;
                                rewrite_count.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Ok(())
                    }),
                ],
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );

        rewriter
            .write(body.as_bytes())
            .map_err(|e| anyhow!("HTML rewrite error: {e}"))?;
        rewriter
            .end()
            .map_err(|e| anyhow!("HTML rewrite finalization error: {e}"))?;

        log::debug!(
            "Rewrote {} HTML asset references in {owner}",
            rewrite_count.load(Ordering::Relaxed)
        );
        String::from_utf8(output).context("Invalid UTF-8 in rewritten page body")
    }
}

/// URL relative references in the page body resolve against.
pub(crate) fn page_base(page: &CanonicalPage) -> Option<Url> {
    Url::parse(&page.source_url)
        .or_else(|_| Url::parse(page.key.as_str()))
        .ok()
}

fn contains_html_asset_tag(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("<img") || lower.contains("<a ")
}

/// Extension of the asset path, or of the wrapped URL for image proxies
/// like `/_next/image?url=%2Fimg%2Flogo.png`.
fn asset_extension(url: &Url) -> Option<String> {
    path_extension(url).or_else(|| {
        let (_, inner) = url.query_pairs().find(|(k, _)| k == "url")?;
        let inner = url.join(&inner).ok()?;
        path_extension(&inner)
    })
}
