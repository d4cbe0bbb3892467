//! HTML extraction helpers shared by the scraping probes.
//!
//! Turns a rendered documentation page into Markdown: pick the main content
//! container, drop page chrome, recover KaTeX sources, then convert with
//! `htmd`.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use ego_tree::NodeRef;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::ProbeError;
use crate::fetch::Fetcher;
use crate::probe::{DiscoveredUrl, ExtractionQuality, PageCandidate, StrategyKind};
use crate::utils::{MAX_NESTING_DEPTH, MAX_TITLE_CHARS, TITLE_SCAN_LINES, is_fetchable_href};

/// Main-content containers, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    "[data-testid=\"page-content\"]",
    ".page-content",
    "main",
    "article",
    ".content",
    ".post-content",
    ".entry-content",
];

/// Title sources tried when the Markdown carries no `# ` heading.
const TITLE_SELECTORS: &[&str] = &["h1", "[data-testid=\"page-title\"]", ".page-title", "title"];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

static UNWANTED_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "nav, header, footer, aside, script, style, noscript, template, \
         .sidebar, .navigation, .breadcrumb, .breadcrumbs, .page-edit-link, \
         .search, .share, .comments, .katex-html",
    )
    .expect("BUG: hardcoded unwanted-element selector is invalid")
});

static KATEX_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".katex").expect("BUG: hardcoded CSS selector '.katex' is invalid")
});

static KATEX_DISPLAY_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".katex-display")
        .expect("BUG: hardcoded CSS selector '.katex-display' is invalid")
});

static TEX_ANNOTATION_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("annotation[encoding=\"application/x-tex\"]")
        .expect("BUG: hardcoded TeX annotation selector is invalid")
});

static BODY_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("body").expect("BUG: hardcoded CSS selector 'body' is invalid")
});

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href]").expect("BUG: hardcoded CSS selector 'a[href]' is invalid")
});

static CONTENT_SELECTOR_LIST: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    CONTENT_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("BUG: hardcoded content selector is invalid"))
        .collect()
});

static TITLE_SELECTOR_LIST: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    TITLE_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("BUG: hardcoded title selector is invalid"))
        .collect()
});

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("BUG: hardcoded newline regex is invalid"));

/// Result of extracting one rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub markdown: String,
    /// True when no main-content container matched and the whole body was used.
    pub used_fallback: bool,
}

/// Extract title and Markdown body from a rendered page.
pub fn extract_page(html: &str) -> Result<ExtractedPage> {
    let document = Html::parse_document(html);

    let content = CONTENT_SELECTOR_LIST
        .iter()
        .find_map(|selector| document.select(selector).next());
    let used_fallback = content.is_none();
    let root = content.or_else(|| document.select(&BODY_SELECTOR).next());

    let Some(root) = root else {
        return Ok(ExtractedPage {
            title: html_title(&document),
            markdown: String::new(),
            used_fallback: true,
        });
    };

    let mut cleaned = String::with_capacity(html.len() / 2);
    serialize_children(*root, &mut cleaned, 0);

    let markdown = html_to_markdown(&cleaned)?;
    let title = markdown_title(&markdown)
        .or_else(|| title_within(root))
        .or_else(|| html_title(&document));

    Ok(ExtractedPage {
        title,
        markdown,
        used_fallback,
    })
}

/// Fetch a rendered page and extract it into a candidate.
///
/// Shared by the scraping strategies. HTML parsing and conversion run on the
/// blocking pool. A page whose main container could not be located is
/// downgraded to [`ExtractionQuality::Fallback`]; a page with neither body nor
/// title is an extraction failure.
pub(crate) async fn scrape_candidate(
    fetcher: &dyn Fetcher,
    strategy: StrategyKind,
    url: &DiscoveredUrl,
) -> Result<PageCandidate, ProbeError> {
    let response = fetcher
        .fetch(&url.raw_url)
        .await
        .map_err(|e| ProbeError::fetch(&url.raw_url, e))?;
    let html = response.text();

    let page = tokio::task::spawn_blocking(move || extract_page(&html))
        .await
        .map_err(|e| ProbeError::extraction(&url.raw_url, format!("extraction task failed: {e}")))?
        .map_err(|e| ProbeError::parse(&url.raw_url, &e))?;

    let title = url
        .title_hint
        .clone()
        .or(page.title)
        .unwrap_or_default();
    if page.markdown.trim().is_empty() && title.is_empty() {
        return Err(ProbeError::extraction(&url.raw_url, "page has no extractable content"));
    }

    let quality = if page.used_fallback {
        ExtractionQuality::Fallback
    } else {
        strategy.native_quality()
    };
    Ok(
        PageCandidate::new(url.key.clone(), strategy, &url.raw_url, title, page.markdown)
            .with_quality(quality)
            .with_nav(url.nav.clone()),
    )
}

/// Convert a cleaned HTML fragment to Markdown with collapsed blank lines.
pub fn html_to_markdown(html: &str) -> Result<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript"])
        .build();
    let markdown = converter
        .convert(html)
        .context("HTML to Markdown conversion failed")?;
    Ok(EXCESS_NEWLINES
        .replace_all(markdown.trim(), "\n\n")
        .into_owned())
}

/// First `# ` heading among the leading lines of a Markdown document.
#[must_use]
pub fn markdown_title(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .take(TITLE_SCAN_LINES)
        .find_map(|line| line.trim_start().strip_prefix("# "))
        .and_then(heading_title)
}

/// Split a leading YAML front-matter block off a Markdown document.
///
/// Returns the `title:` value if the block declares one, and the remaining body.
#[must_use]
pub fn split_front_matter(markdown: &str) -> (Option<String>, &str) {
    let trimmed = markdown.trim_start_matches('\u{feff}');
    let Some(rest) = trimmed.strip_prefix("---\n").or_else(|| trimmed.strip_prefix("---\r\n")) else {
        return (None, markdown);
    };
    let Some(end) = rest.find("\n---") else {
        return (None, markdown);
    };
    let block = &rest[..end];
    let body = rest[end + 4..].trim_start_matches(['\r', '\n']);
    let title = block
        .lines()
        .find_map(|line| line.strip_prefix("title:"))
        .map(|v| v.trim().trim_matches(['"', '\'']))
        .and_then(heading_title);
    (title, body)
}

/// Trim whitespace, drop a trailing site-name suffix and reject noise.
///
/// Meant for `<title>` text: `"Install | Acme Docs"` becomes `"Install"`.
/// Titles longer than [`MAX_TITLE_CHARS`] are rejected.
#[must_use]
pub fn clean_title(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let head = [" | ", " - ", " — "]
        .iter()
        .find_map(|sep| collapsed.split_once(sep).map(|(head, _)| head.trim()))
        .filter(|head| !head.is_empty())
        .unwrap_or(collapsed.as_str());
    heading_title(head)
}

/// Authored heading text, kept whole: whitespace collapsed, stray `#` trimmed,
/// length capped at [`MAX_TITLE_CHARS`].
#[must_use]
pub fn heading_title(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let title = collapsed.trim_matches('#').trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
        return None;
    }
    Some(title.to_string())
}

/// Absolute http(s) links of every `<a href>` in the document, deduplicated in order.
#[must_use]
pub fn extract_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = std::collections::HashSet::new();
    document
        .select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| is_fetchable_href(href))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|url| url.to_string())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Visible text of an element with whitespace collapsed.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_within(root: ElementRef<'_>) -> Option<String> {
    TITLE_SELECTOR_LIST
        .iter()
        .find_map(|selector| root.select(selector).next())
        .and_then(element_title)
}

fn html_title(document: &Html) -> Option<String> {
    TITLE_SELECTOR_LIST
        .iter()
        .find_map(|selector| document.select(selector).next())
        .and_then(element_title)
}

/// Only `<title>` carries a site-name suffix.
fn element_title(element: ElementRef<'_>) -> Option<String> {
    let text = element_text(element);
    if element.value().name() == "title" {
        clean_title(&text)
    } else {
        heading_title(&text)
    }
}

fn katex_source(element: ElementRef<'_>) -> Option<String> {
    let tex = element.select(&TEX_ANNOTATION_SELECTOR).next()?;
    let source: String = tex.text().collect();
    let source = source.trim();
    if source.is_empty() {
        return None;
    }
    let display = element
        .value()
        .classes()
        .any(|c| c == "katex-display")
        || element.select(&KATEX_DISPLAY_SELECTOR).next().is_some();
    Some(if display {
        format!("\n$$\n{source}\n$$\n")
    } else {
        format!("${source}$")
    })
}

/// Serialize the children of `node`, skipping page chrome and replacing
/// KaTeX renderings with their TeX source.
fn serialize_children(node: NodeRef<'_, Node>, output: &mut String, depth: usize) {
    if depth > MAX_NESTING_DEPTH {
        return;
    }
    for child in node.children() {
        match child.value() {
            Node::Text(text) => output.push_str(&html_escape::encode_text(&**text)),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    serialize_element(element, output, depth + 1);
                }
            }
            _ => {}
        }
    }
}

fn serialize_element(element: ElementRef<'_>, output: &mut String, depth: usize) {
    if KATEX_SELECTOR.matches(&element) {
        if let Some(source) = katex_source(element) {
            output.push_str(&html_escape::encode_text(&source));
            return;
        }
    }
    if UNWANTED_SELECTOR.matches(&element) {
        return;
    }

    let name = element.value().name();
    output.push('<');
    output.push_str(name);
    for (attr, value) in element.value().attrs() {
        output.push(' ');
        output.push_str(attr);
        output.push_str("=\"");
        output.push_str(&html_escape::encode_double_quoted_attribute(value));
        output.push('"');
    }
    output.push('>');

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    serialize_children(*element, output, depth);

    output.push_str("</");
    output.push_str(name);
    output.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prefers_content_container() {
        let html = r#"<html><head><title>Install | Acme</title></head><body>
            <nav><a href="/a">A</a></nav>
            <main><h1>Install</h1><p>Run the <strong>installer</strong>.</p>
            <footer>Footer text</footer></main>
            </body></html>"#;
        let page = extract_page(html).unwrap();
        assert_eq!(page.title.as_deref(), Some("Install"));
        assert!(!page.used_fallback);
        assert!(page.markdown.contains("installer"));
        assert!(!page.markdown.contains("Footer text"));
    }

    #[test]
    fn test_extract_falls_back_to_body() {
        let html = "<html><body><div><p>Only text</p></div><script>x()</script></body></html>";
        let page = extract_page(html).unwrap();
        assert!(page.used_fallback);
        assert!(page.markdown.contains("Only text"));
        assert!(!page.markdown.contains("x()"));
    }

    #[test]
    fn test_katex_source_recovered() {
        let html = r#"<html><body><main><p>Energy
            <span class="katex"><span class="katex-mathml"><math><semantics>
            <annotation encoding="application/x-tex">E = mc^2</annotation>
            </semantics></math></span><span class="katex-html">E=mc2</span></span>
            </p></main></body></html>"#;
        let page = extract_page(html).unwrap();
        assert!(page.markdown.contains("$E = mc"), "{}", page.markdown);
        assert!(!page.markdown.contains("E=mc2"));
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("  Getting   Started | Acme Docs "), Some("Getting Started".to_string()));
        assert_eq!(clean_title("API - Reference"), Some("API".to_string()));
        assert_eq!(clean_title("   "), None);
        assert_eq!(clean_title(&"x".repeat(MAX_TITLE_CHARS + 1)), None);
    }

    #[test]
    fn test_heading_title_keeps_separators() {
        assert_eq!(heading_title("  Git -  Branching basics "), Some("Git - Branching basics".to_string()));
        assert_eq!(heading_title("## "), None);
        assert_eq!(heading_title(&"x".repeat(MAX_TITLE_CHARS + 1)), None);
    }

    #[test]
    fn test_split_front_matter() {
        let md = "---\ntitle: \"Setup\"\ndescription: How to\n---\n\n# Setup\nBody";
        let (title, body) = split_front_matter(md);
        assert_eq!(title.as_deref(), Some("Setup"));
        assert_eq!(body, "# Setup\nBody");

        let (title, _) = split_front_matter("---\ntitle: Auth | OAuth flows\n---\nBody");
        assert_eq!(title.as_deref(), Some("Auth | OAuth flows"));

        let (title, body) = split_front_matter("# Plain\n");
        assert_eq!(title, None);
        assert_eq!(body, "# Plain\n");
    }

    #[test]
    fn test_markdown_title() {
        assert_eq!(markdown_title("\n# Quick Start\n\nBody"), Some("Quick Start".to_string()));
        assert_eq!(markdown_title("## Not a title\nBody"), None);
        assert_eq!(
            markdown_title("# Step 1 - Install the CLI\n\nBody"),
            Some("Step 1 - Install the CLI".to_string())
        );
    }

    #[test]
    fn test_page_heading_kept_whole_but_title_tag_trimmed() {
        let html = r#"<html><head><title>Branching | Acme Docs</title></head>
            <body><main><h1>Git - Branching basics</h1><p>Create a branch.</p></main></body></html>"#;
        let page = extract_page(html).unwrap();
        assert_eq!(page.title.as_deref(), Some("Git - Branching basics"));

        let html = r#"<html><head><title>Branching | Acme Docs</title></head><body></body></html>"#;
        let page = extract_page(html).unwrap();
        assert_eq!(page.title.as_deref(), Some("Branching"));
    }

    #[test]
    fn test_extract_links() {
        let base = Url::parse("https://docs.example.com/guide/").unwrap();
        let html = r##"<a href="intro">1</a><a href="/api">2</a><a href="#x">3</a>
            <a href="mailto:a@b.c">4</a><a href="intro">dup</a>"##;
        let links = extract_links(html, &base);
        assert_eq!(
            links,
            vec![
                "https://docs.example.com/guide/intro".to_string(),
                "https://docs.example.com/api".to_string(),
            ]
        );
    }
}
