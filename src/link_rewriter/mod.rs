//! Cross-link repair for fused pages.
//!
//! Internal links in page bodies are rewritten to the local document of the
//! page they point at:
//! 1. Markdown links `[text](url)` through a regex pass
//! 2. HTML anchors `<a href>` through a lol_html streaming pass
//!
//! A link is internal when it normalizes to a key in the tree, or to a key the
//! merger folded into another page (an alias). Everything else is left as-is.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, anyhow};
use lol_html::{HtmlRewriter, Settings, element};
use regex::{Captures, Regex};
use url::Url;

use crate::assets::page_base;
use crate::canonical::{CanonicalKey, Normalizer};
use crate::fusion::CanonicalPage;
use crate::hierarchy::DocumentTree;
use crate::utils::{compute_relative_path, document_path, is_fetchable_href, split_fragment};

/// Markdown link or image: `(!)` `[text]` `(url "title")`.
///
/// Capture groups: 1 = `!` for images, 2 = text, 3 = URL, 4 = optional title.
pub(crate) static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(!?)\[([^\[\]]*)\]\(\s*<?([^\s<>()]+)>?((?:\s+"[^"]*")?)\s*\)"#)
        .expect("BUG: hardcoded markdown link regex is invalid")
});

/// Rewrites internal links to relative local document paths.
#[derive(Debug, Clone)]
pub struct LinkRewriter {
    normalizer: Normalizer,
    known: BTreeSet<CanonicalKey>,
    aliases: BTreeMap<CanonicalKey, CanonicalKey>,
}

impl LinkRewriter {
    /// Rewriter with no known pages.
    pub fn new(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            known: BTreeSet::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Rewriter that knows every page and alias of `tree`.
    pub fn for_tree(tree: &DocumentTree, normalizer: Normalizer) -> Self {
        let mut rewriter = Self::new(normalizer);
        for page in tree.pages() {
            rewriter.register(page.key.clone());
        }
        for (alias, survivor) in tree.aliases() {
            rewriter.register_alias(alias.clone(), survivor.clone());
        }
        rewriter
    }

    pub fn register(&mut self, key: CanonicalKey) {
        self.known.insert(key);
    }

    pub fn register_alias(&mut self, alias: CanonicalKey, survivor: CanonicalKey) {
        self.aliases.insert(alias, survivor);
    }

    /// Known page `href` points at, resolving relative links against `base`.
    #[must_use]
    pub fn resolve(&self, href: &str, base: &Url) -> Option<&CanonicalKey> {
        if !is_fetchable_href(href) {
            return None;
        }
        let (target, _) = split_fragment(href.trim());
        let key = self.normalizer.key_relative_to(target, base).ok()?;
        let key = self.aliases.get(&key).cloned().unwrap_or(key);
        self.known.get(&key)
    }

    /// Local replacement for `href` as written on the page stored at `page_file`.
    fn local_href(&self, href: &str, base: &Url, page_file: &Path) -> Option<String> {
        let target = self.resolve(href, base)?;
        let (_, fragment) = split_fragment(href.trim());
        let relative = compute_relative_path(page_file, &document_path(target))?;
        Some(format!("{relative}{fragment}"))
    }

    /// Rewrite one page body. Returns the new body and the number of links changed.
    #[must_use]
    pub fn rewrite_page(&self, page: &CanonicalPage) -> (String, usize) {
        let Some(base) = page_base(page) else {
            return (page.body.clone(), 0);
        };
        let page_file = document_path(&page.key);

        let mut count = 0;
        let body = MARKDOWN_LINK
            .replace_all(&page.body, |caps: &Captures<'_>| {
                if !caps[1].is_empty() {
                    return caps[0].to_string();
                }
                match self.local_href(&caps[3], &base, &page_file) {
                    Some(local) if local != caps[3] => {
                        count += 1;
                        format!("[{}]({local}{})", &caps[2], &caps[4])
                    }
                    _ => caps[0].to_string(),
                }
            })
            .into_owned();

        if !body.to_ascii_lowercase().contains("<a ") {
            return (body, count);
        }
        match rewrite_links_in_html(&body, |href| self.local_href(href, &base, &page_file)) {
            Ok((rewritten, html_count)) => (rewritten, count + html_count),
            Err(e) => {
                log::warn!("Skipping HTML link rewrite for {}: {e:#}", page.key);
                (body, count)
            }
        }
    }

    /// Rewrite every page of `tree`. Returns the new tree and the total links changed.
    #[must_use]
    pub fn rewrite_tree(&self, tree: DocumentTree) -> (DocumentTree, usize) {
        let mut total = 0;
        let tree = tree.map_pages(|page| {
            let (body, count) = self.rewrite_page(&page);
            total += count;
            CanonicalPage { body, ..page }
        });
        log::info!("Rewrote {total} internal links to local paths");
        (tree, total)
    }

    /// Local document path of a known page, relative to the output root.
    #[must_use]
    pub fn document_path_of(&self, key: &CanonicalKey) -> Option<PathBuf> {
        let key = self.aliases.get(key).unwrap_or(key);
        self.known.contains(key).then(|| document_path(key))
    }
}

/// Core HTML rewriting using lol_html (streaming, efficient).
///
/// Rewrites href attributes on <a> tags when `replacement` maps them.
///
/// # Returns
/// Tuple of (rewritten HTML, number of links rewritten)
fn rewrite_links_in_html(
    html: &str,
    replacement: impl Fn(&str) -> Option<String>,
) -> Result<(String, usize)> {
    let mut output = Vec::with_capacity(html.len());
    let rewrite_count = AtomicUsize::new(0);

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("a[href]", |el| {
                if let Some(href) = el.get_attribute("href")
                    && let Some(local) = replacement(&href)
                    && local != href
                {
                    el.set_attribute("href", &local)?;
                    rewrite_count.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            })],
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    rewriter
        .write(html.as_bytes())
        .map_err(|e| anyhow!("HTML rewrite error: {e}"))?;
    rewriter
        .end()
        .map_err(|e| anyhow!("HTML rewrite finalization error: {e}"))?;

    let result = String::from_utf8(output).context("Invalid UTF-8 in rewritten page body")?;
    let count = rewrite_count.load(Ordering::Relaxed);

    Ok((result, count))
}
