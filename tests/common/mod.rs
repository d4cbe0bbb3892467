//! Test utilities and helper functions for the docfusion test suite

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use docfusion::canonical::CanonicalKey;
use docfusion::fetch::{FetchError, FetchedContent, Fetcher};
use docfusion::probe::{DiscoveredUrl, Discovery, PageCandidate, Probe, ProbeTarget, StrategyKind};
use docfusion::source_tree::{RepoLocator, SourceFile, SourceTree};
use docfusion::ProbeError;

pub const SITE: &str = "https://docs.example.com";

/// Route `log` output through the test harness
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Route `tracing` events (orchestrator task loop) through the test harness
#[allow(dead_code)]
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Canonical key for a path on the test site
#[allow(dead_code)]
pub fn key(path: &str) -> CanonicalKey {
    format!("{SITE}{path}").parse().expect("test key must parse")
}

/// Absolute URL for a path on the test site
#[allow(dead_code)]
pub fn url(path: &str) -> String {
    format!("{SITE}{path}")
}

/// In-memory fetch layer. Unknown URLs answer 404.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, Result<FetchedContent, FetchError>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_html(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.responses.insert(
            url.into(),
            Ok(FetchedContent::new(html.into().into_bytes(), Some("text/html; charset=utf-8"))),
        );
        self
    }

    pub fn with_markdown(mut self, url: impl Into<String>, markdown: impl Into<String>) -> Self {
        self.responses.insert(
            url.into(),
            Ok(FetchedContent::new(markdown.into().into_bytes(), Some("text/markdown"))),
        );
        self
    }

    pub fn with_xml(mut self, url: impl Into<String>, xml: impl Into<String>) -> Self {
        self.responses.insert(
            url.into(),
            Ok(FetchedContent::new(xml.into().into_bytes(), Some("application/xml"))),
        );
        self
    }

    pub fn with_error(mut self, url: impl Into<String>, error: FetchError) -> Self {
        self.responses.insert(url.into(), Err(error));
        self
    }

    /// Delay every response by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every URL requested so far, in request order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("request log poisoned").clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        self.requests
            .lock()
            .expect("request log poisoned")
            .push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .get(url)
            .cloned()
            .unwrap_or(Err(FetchError::HttpStatus(404)))
    }
}

/// In-memory repository checkout, keyed by repository-relative path
#[allow(dead_code)]
#[derive(Default)]
pub struct MockSourceTree {
    files: BTreeMap<String, String>,
}

#[allow(dead_code)]
impl MockSourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, markdown: impl Into<String>) -> Self {
        self.files.insert(path.into(), markdown.into());
        self
    }
}

#[async_trait]
impl SourceTree for MockSourceTree {
    async fn list_markdown(&self, _repo: &RepoLocator) -> Result<Vec<SourceFile>, FetchError> {
        // Reverse order so callers cannot rely on listing order.
        Ok(self.files.keys().rev().map(SourceFile::new).collect())
    }

    async fn read(&self, _repo: &RepoLocator, file: &SourceFile) -> Result<String, FetchError> {
        self.files
            .get(&file.path)
            .cloned()
            .ok_or(FetchError::HttpStatus(404))
    }
}

#[allow(dead_code)]
#[derive(Clone)]
struct ScriptedPage {
    url: String,
    title: String,
    body: String,
    delay: Option<Duration>,
}

/// Probe with a fixed page list, for orchestrator and engine tests
#[allow(dead_code)]
pub struct ScriptedProbe {
    kind: StrategyKind,
    pages: Vec<ScriptedPage>,
    unavailable: bool,
    panic_on_extract: bool,
    failing: Vec<String>,
}

#[allow(dead_code)]
impl ScriptedProbe {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            pages: Vec::new(),
            unavailable: false,
            panic_on_extract: false,
            failing: Vec::new(),
        }
    }

    /// Page at `path` on the test site
    pub fn page(mut self, path: &str, title: &str, body: &str) -> Self {
        self.pages.push(ScriptedPage {
            url: url(path),
            title: title.to_string(),
            body: body.to_string(),
            delay: None,
        });
        self
    }

    /// Page whose extraction takes `delay`
    pub fn slow_page(mut self, path: &str, title: &str, body: &str, delay: Duration) -> Self {
        self.pages.push(ScriptedPage {
            url: url(path),
            title: title.to_string(),
            body: body.to_string(),
            delay: Some(delay),
        });
        self
    }

    /// Page that is discovered but fails to extract
    pub fn failing_page(mut self, path: &str) -> Self {
        self.failing.push(url(path));
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_extract = true;
        self
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn discover(&self, target: &ProbeTarget) -> Result<Discovery, ProbeError> {
        if self.unavailable {
            return Err(ProbeError::unavailable(self.kind, "not available for this site"));
        }
        let mut items = Vec::new();
        for raw in self.pages.iter().map(|p| &p.url).chain(&self.failing) {
            items.push(DiscoveredUrl::new(target.normalize(raw)?, raw.clone()));
        }
        Ok(Discovery::new(items))
    }

    async fn extract(
        &self,
        _target: &ProbeTarget,
        discovered: &DiscoveredUrl,
    ) -> Result<PageCandidate, ProbeError> {
        if self.panic_on_extract {
            panic!("{} extraction exploded", self.kind);
        }
        let Some(page) = self.pages.iter().find(|p| p.url == discovered.raw_url) else {
            return Err(ProbeError::extraction(&discovered.raw_url, "scripted failure"));
        };
        if let Some(delay) = page.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(PageCandidate::new(
            discovered.key.clone(),
            self.kind,
            &page.url,
            &page.title,
            &page.body,
        ))
    }
}

/// Sidebar of the fixture site: an introduction, a quickstart and a
/// "Guides" group with a nested page.
#[allow(dead_code)]
pub const SIDEBAR: &str = r#"<aside data-testid="sidebar"><ul>
  <li><a href="/">Introduction</a></li>
  <li><a href="/quickstart">Quickstart</a></li>
  <li><div>Guides</div><ul>
    <li><a href="/guides/install">Install</a><ul>
      <li><a href="/guides/install/linux">Linux</a></li>
    </ul></li>
    <li><a href="/guides/configure">Configure</a></li>
  </ul></li>
</ul></aside>"#;

/// Rendered documentation page with the fixture sidebar
#[allow(dead_code)]
pub fn docs_page(title: &str, main: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{} | Acme Docs</title>
</head>
<body>
    <header><a href="/">Acme</a><a href="/login">Log in</a></header>
    {SIDEBAR}
    <main>{main}</main>
    <footer>Copyright Acme</footer>
</body>
</html>"#,
        html_escape::encode_text(title),
    )
}

/// Sitemap `urlset` listing `paths` on the test site
#[allow(dead_code)]
pub fn sitemap_xml(paths: &[&str]) -> String {
    let entries: String = paths
        .iter()
        .map(|p| format!("  <url><loc>{}</loc></url>\n", url(p)))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{entries}</urlset>"
    )
}

/// Fetcher serving the complete fixture site
///
/// Six pages: five in the sidebar plus `/changelog`, which only the sitemap
/// lists. `/guides/configure` also publishes its Markdown source.
#[allow(dead_code)]
pub fn fixture_site() -> MockFetcher {
    MockFetcher::new()
        .with_html(
            url("/"),
            docs_page(
                "Acme",
                r#"<h1>Welcome</h1>
                <p>Acme ships documentation tooling. Start with the <a href="/quickstart">quickstart</a>.</p>
                <p><a href="https://github.com/acme/docs/blob/main/docs/README.md">Edit this page</a></p>"#,
            ),
        )
        .with_html(
            url("/quickstart"),
            docs_page(
                "Quickstart",
                r#"<h1>Quickstart</h1>
                <p>Install the CLI and run your first build.</p>
                <img src="/img/cli.png" alt="CLI">
                <p>Next, read <a href="/guides/install#linux">the install guide</a>.</p>"#,
            ),
        )
        .with_html(
            url("/guides/install"),
            docs_page(
                "Install",
                "<h1>Install</h1><p>Pick the package for your platform.</p>",
            ),
        )
        .with_html(
            url("/guides/install/linux"),
            docs_page(
                "Linux",
                "<h1>Linux</h1><p>Use the tarball on Linux hosts.</p>",
            ),
        )
        .with_html(
            url("/guides/configure"),
            docs_page(
                "Configure",
                "<h1>Configure</h1><p>Set the token before running.</p>",
            ),
        )
        .with_markdown(
            url("/guides/configure.md"),
            "---\ntitle: Configure\n---\n\n# Configure\n\nSet the token before running.\n\nRead access is enough.\n",
        )
        .with_html(
            url("/changelog"),
            docs_page(
                "Changelog",
                "<h1>Changelog</h1><p>Version 2 removed the legacy runner.</p>",
            ),
        )
        .with_xml(
            url("/sitemap.xml"),
            sitemap_xml(&[
                "/",
                "/quickstart",
                "/quickstart/",
                "/guides/install",
                "/guides/install/linux",
                "/guides/configure",
                "/changelog",
            ]),
        )
}
