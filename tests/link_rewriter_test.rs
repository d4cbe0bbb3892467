use std::path::PathBuf;

use docfusion::canonical::{CanonicalKey, Normalizer};
use docfusion::fusion::CanonicalPage;
use docfusion::link_rewriter::LinkRewriter;
use docfusion::probe::{ExtractionQuality, StrategyKind};
use url::Url;

mod common;

use common::key;

fn rewriter() -> LinkRewriter {
    let mut rewriter = LinkRewriter::new(Normalizer::new(Url::parse("https://docs.example.com/").unwrap()));
    for path in ["/", "/quickstart", "/guides/install", "/guides/install/linux", "/guides/configure"] {
        rewriter.register(key(path));
    }
    rewriter.register_alias(key("/old/configure"), key("/guides/configure"));
    rewriter
}

fn page(path: &str, body: &str) -> CanonicalPage {
    let key: CanonicalKey = key(path);
    CanonicalPage {
        source_url: key.to_string(),
        key,
        title: "Install".to_string(),
        body: body.to_string(),
        source_strategy: StrategyKind::Navigation,
        quality: ExtractionQuality::SidebarScrape,
        section: None,
        asset_refs: Vec::new(),
        children: Vec::new(),
        parent: None,
    }
}

#[test]
fn test_resolve_known_pages() {
    let rewriter = rewriter();
    let base = Url::parse("https://docs.example.com/guides/install").unwrap();

    assert_eq!(rewriter.resolve("/quickstart/", &base), Some(&key("/quickstart")));
    assert_eq!(rewriter.resolve("../quickstart", &base), Some(&key("/quickstart")));
    assert_eq!(
        rewriter.resolve("http://www.docs.example.com/guides/install/linux#apt", &base),
        Some(&key("/guides/install/linux"))
    );
    assert_eq!(rewriter.resolve("/old/configure", &base), Some(&key("/guides/configure")));

    assert_eq!(rewriter.resolve("/nowhere", &base), None);
    assert_eq!(rewriter.resolve("https://other.example.com/quickstart", &base), None);
    assert_eq!(rewriter.resolve("mailto:team@example.com", &base), None);
}

#[test]
fn test_rewrite_markdown_links() {
    let body = "See [quick](/quickstart), [apt](/guides/install/linux#apt), \
                [moved](/old/configure \"Moved\"), [ext](https://other.example.com/x), \
                ![shot](/img/a.png) and [missing](/nowhere).";
    let (rewritten, count) = rewriter().rewrite_page(&page("/guides/install", body));

    assert_eq!(count, 3);
    assert_eq!(
        rewritten,
        "See [quick](../../quickstart/index.md), [apt](linux/index.md#apt), \
         [moved](../configure/index.md \"Moved\"), [ext](https://other.example.com/x), \
         ![shot](/img/a.png) and [missing](/nowhere)."
    );
}

#[test]
fn test_rewrite_from_site_root() {
    let (rewritten, count) =
        rewriter().rewrite_page(&page("/", "Start with [quickstart](quickstart)."));
    assert_eq!(count, 1);
    assert_eq!(rewritten, "Start with [quickstart](quickstart/index.md).");
}

#[test]
fn test_rewrite_html_anchors() {
    let body = r#"<p><a href="/quickstart" class="btn">Go</a> <a href="https://other.example.com/">Out</a></p>"#;
    let (rewritten, count) = rewriter().rewrite_page(&page("/guides/install", body));

    assert_eq!(count, 1);
    assert!(rewritten.contains(r#"href="../../quickstart/index.md""#));
    assert!(rewritten.contains(r#"class="btn""#));
    assert!(rewritten.contains(r#"href="https://other.example.com/""#));
}

#[test]
fn test_unknown_links_leave_body_untouched() {
    let body = "Nothing to see at [here](/nowhere) or [there](#local).";
    let (rewritten, count) = rewriter().rewrite_page(&page("/guides/install", body));
    assert_eq!(count, 0);
    assert_eq!(rewritten, body);
}

#[test]
fn test_document_path_of_follows_aliases() {
    let rewriter = rewriter();
    assert_eq!(
        rewriter.document_path_of(&key("/old/configure")),
        Some(PathBuf::from("guides/configure/index.md"))
    );
    assert_eq!(rewriter.document_path_of(&key("/")), Some(PathBuf::from("index.md")));
    assert_eq!(rewriter.document_path_of(&key("/nowhere")), None);
}
