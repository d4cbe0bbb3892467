//! Navigation strategy.
//!
//! Walks the rendered sidebar of the site root. This is the only strategy that
//! knows where a page sits in the author's table of contents: its nesting
//! depth, its order among siblings, its parent entry and the group header it
//! is filed under.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::extract::{element_text, scrape_candidate};
use super::{
    DiscoveredUrl, Discovery, NavPosition, PageCandidate, Probe, ProbeTarget, StrategyKind,
};
use crate::canonical::CanonicalKey;
use crate::error::ProbeError;
use crate::fetch::Fetcher;
use crate::utils::{
    DEFAULT_ASSET_EXTENSIONS, MAX_NESTING_DEPTH, MIN_SIDEBAR_LINKS, is_fetchable_href,
    path_extension,
};

static SIDEBAR_CANDIDATE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "nav, aside, div[class*='sidebar'], [data-testid='sidebar'], \
         [data-testid='toc-scroll-container']",
    )
    .expect("BUG: hardcoded sidebar candidate selector is invalid")
});

static TOC_CONTAINER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-testid='toc-scroll-container']")
        .expect("BUG: hardcoded toc container selector is invalid")
});

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href]").expect("BUG: hardcoded CSS selector 'a[href]' is invalid")
});

static LIST_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("ul, ol").expect("BUG: hardcoded list selector is invalid")
});

/// Paths that never hold documentation content.
static NON_CONTENT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)/(search|login|logout|signin|signup|register|edit|admin)(/|$)|/(assets|static|_next|~gitbook)/",
    )
    .expect("BUG: hardcoded non-content path regex is invalid")
});

/// Extensions of linked files that are not pages.
const NON_PAGE_EXTENSIONS: &[&str] = &["css", "js", "json", "xml", "txt", "woff", "woff2", "mp4"];

/// One parsed sidebar entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    pub key: CanonicalKey,
    pub raw_url: String,
    pub title: String,
    pub position: NavPosition,
}

/// True when `url` is an in-scope documentation page rather than chrome or an asset.
pub(crate) fn is_content_link(url: &Url, target: &ProbeTarget) -> bool {
    if !matches!(url.scheme(), "http" | "https") || NON_CONTENT_PATH.is_match(url.path()) {
        return false;
    }
    if let Some(ext) = path_extension(url)
        && (DEFAULT_ASSET_EXTENSIONS.contains(&ext.as_str()) || NON_PAGE_EXTENSIONS.contains(&ext.as_str()))
    {
        return false;
    }
    target
        .normalize(url.as_str())
        .is_ok_and(|key| target.in_scope(&key))
}

/// Parse the sidebar of a rendered page.
///
/// The sidebar is the candidate container with the most links, provided it
/// has at least [`MIN_SIDEBAR_LINKS`]; the first one wins a tie. Returns
/// `None` when the page has no such container.
#[must_use]
pub fn parse_sidebar(html: &str, page_url: &Url, target: &ProbeTarget) -> Option<Vec<SidebarEntry>> {
    let document = Html::parse_document(html);

    let mut sidebar: Option<ElementRef<'_>> = None;
    let mut max_links = 0;
    for candidate in document.select(&SIDEBAR_CANDIDATE_SELECTOR) {
        let count = candidate.select(&LINK_SELECTOR).count();
        if count > max_links && count >= MIN_SIDEBAR_LINKS {
            max_links = count;
            sidebar = Some(candidate);
        }
    }
    let sidebar = sidebar?;
    log::debug!("Selected sidebar with {max_links} links");

    let container = sidebar
        .select(&TOC_CONTAINER_SELECTOR)
        .next()
        .unwrap_or(sidebar);

    let mut parser = SidebarParser {
        page_url,
        target,
        order: 0,
        seen: HashSet::new(),
        entries: Vec::new(),
    };

    match container.select(&LIST_SELECTOR).next() {
        Some(root_list) => parser.parse_list(root_list, 0, None, None),
        None => {
            // No list markup: a flat run of links in document order.
            for link in container.select(&LINK_SELECTOR) {
                parser.accept(link, 0, None, None);
            }
        }
    }

    Some(parser.entries)
}

struct SidebarParser<'a> {
    page_url: &'a Url,
    target: &'a ProbeTarget,
    order: u32,
    seen: HashSet<CanonicalKey>,
    entries: Vec<SidebarEntry>,
}

impl SidebarParser<'_> {
    fn parse_list(
        &mut self,
        list: ElementRef<'_>,
        depth: u32,
        parent: Option<&CanonicalKey>,
        section: Option<&str>,
    ) {
        if depth as usize > MAX_NESTING_DEPTH {
            return;
        }
        let items = list
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "li");

        for item in items {
            let mut own_key = None;
            let mut next_section = section.map(str::to_string);

            if let Some(link) = direct_link(item) {
                own_key = self.accept(link, depth, parent, section);
            } else if let Some(header) = group_header(item) {
                log::debug!("Sidebar group: {header}");
                next_section = Some(header);
            }

            if let Some(nested) = item.select(&LIST_SELECTOR).next() {
                let (child_parent, child_depth) = match &own_key {
                    Some(key) => (Some(key), depth + 1),
                    None => (parent, depth),
                };
                self.parse_list(nested, child_depth, child_parent, next_section.as_deref());
            }
        }
    }

    /// Record a link entry; returns the key nested entries hang under.
    fn accept(
        &mut self,
        link: ElementRef<'_>,
        depth: u32,
        parent: Option<&CanonicalKey>,
        section: Option<&str>,
    ) -> Option<CanonicalKey> {
        let href = link.value().attr("href")?;
        if !is_fetchable_href(href) {
            return None;
        }
        let mut url = self.page_url.join(href.trim()).ok()?;
        url.set_fragment(None);
        if !is_content_link(&url, self.target) {
            return None;
        }
        let key = self.target.normalize(url.as_str()).ok()?;
        if !self.seen.insert(key.clone()) {
            return Some(key);
        }

        self.entries.push(SidebarEntry {
            key: key.clone(),
            raw_url: url.to_string(),
            title: element_text(link),
            position: NavPosition {
                parent: parent.cloned(),
                order: self.order,
                depth,
                section: section.map(str::to_string),
            },
        });
        self.order += 1;
        Some(key)
    }
}

/// `li > a` or `li > div > a`.
fn direct_link(item: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let children = || item.children().filter_map(ElementRef::wrap);
    children()
        .find(|el| el.value().name() == "a" && el.value().attr("href").is_some())
        .or_else(|| {
            children()
                .filter(|el| el.value().name() == "div")
                .find_map(|div| {
                    div.children()
                        .filter_map(ElementRef::wrap)
                        .find(|el| el.value().name() == "a" && el.value().attr("href").is_some())
                })
        })
}

/// Text of the first link-free `div` directly under the item.
fn group_header(item: ElementRef<'_>) -> Option<String> {
    item.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "div")
        .filter(|div| div.select(&LINK_SELECTOR).next().is_none())
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// Discovers pages from the site root's rendered sidebar.
pub struct NavigationProbe {
    fetcher: Arc<dyn Fetcher>,
}

impl NavigationProbe {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Probe for NavigationProbe {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Navigation
    }

    async fn discover(&self, target: &ProbeTarget) -> Result<Discovery, ProbeError> {
        let root = target.base_url().clone();
        let page = self.fetcher.fetch(root.as_str()).await.map_err(|e| {
            ProbeError::unavailable(StrategyKind::Navigation, format!("site root unavailable: {e}"))
        })?;

        let Some(entries) = parse_sidebar(&page.text(), &root, target) else {
            return Err(ProbeError::unavailable(
                StrategyKind::Navigation,
                "no sidebar found on the site root page",
            ));
        };
        log::info!("Sidebar lists {} pages", entries.len());

        let items = entries
            .into_iter()
            .map(|entry| DiscoveredUrl {
                key: entry.key,
                raw_url: entry.raw_url,
                title_hint: Some(entry.title).filter(|t| !t.is_empty()),
                nav: Some(entry.position),
                source: None,
            })
            .collect();
        Ok(Discovery::new(items))
    }

    async fn extract(
        &self,
        _target: &ProbeTarget,
        url: &DiscoveredUrl,
    ) -> Result<PageCandidate, ProbeError> {
        scrape_candidate(self.fetcher.as_ref(), StrategyKind::Navigation, url).await
    }
}
