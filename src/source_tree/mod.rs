//! Source repository seam for the Repository probe.
//!
//! Many hosted documentation sites are rendered from Markdown kept in a public
//! repository and link to it with "edit on GitHub" style buttons. When such a
//! link is found the Repository probe reads the Markdown directly through a
//! [`SourceTree`], which the embedding application backs with a checkout, an
//! API client or a fixture.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::fetch::FetchError;

/// Files that describe the book rather than being pages of it.
const NON_PAGE_FILES: &[&str] = &["summary.md", "changelog.md", "contributing.md", "license.md"];

/// Location of the repository that backs a documentation site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoLocator {
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Directory inside the repository that corresponds to the site root.
    /// Empty when the site is rendered from the repository root.
    pub docs_root: String,
}

/// One Markdown file inside the repository, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
}

impl SourceFile {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// A repository file together with the repository it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub repo: RepoLocator,
    pub file: SourceFile,
}

impl RepoLocator {
    /// Parse a `https://github.com/<owner>/<repo>/blob/<branch>/<path>` link.
    ///
    /// The directory holding the linked file becomes `docs_root`, since the
    /// link found on the site root page points at the root page's source.
    /// GitLab's `/-/blob/` form is accepted too.
    #[must_use]
    pub fn from_blob_link(href: &str) -> Option<Self> {
        let url = Url::parse(href.trim()).ok()?;
        let host = url.host_str()?.trim_start_matches("www.").to_ascii_lowercase();
        if host != "github.com" && host != "gitlab.com" {
            return None;
        }
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        let blob_at = segments.iter().position(|s| *s == "blob" || *s == "edit")?;
        if blob_at < 2 || segments.len() < blob_at + 3 {
            return None;
        }
        let owner = segments[0].to_string();
        let repo = segments[1].trim_end_matches(".git").to_string();
        let branch = segments[blob_at + 1].to_string();
        let file_path = &segments[blob_at + 2..];
        let docs_root = file_path[..file_path.len() - 1].join("/");

        Some(Self {
            host,
            owner,
            repo,
            branch,
            docs_root,
        })
    }

    /// Repository web URL.
    #[must_use]
    pub fn web_url(&self) -> String {
        format!("https://{}/{}/{}", self.host, self.owner, self.repo)
    }

    /// Site-relative path for a repository file, or `None` when the file is not a page.
    ///
    /// The returned path still carries its `.md` / `README.md` suffix; the
    /// canonical normalizer folds those onto the rendered page path.
    #[must_use]
    pub fn site_path(&self, file: &SourceFile) -> Option<String> {
        let path = file.path.trim_start_matches('/');
        let relative = if self.docs_root.is_empty() {
            path
        } else {
            path.strip_prefix(self.docs_root.as_str())?.strip_prefix('/')?
        };

        if !relative.to_ascii_lowercase().ends_with(".md") {
            return None;
        }
        if relative.split('/').any(|segment| segment.starts_with('.') || segment.starts_with('_')) {
            return None;
        }
        let file_name = relative.rsplit('/').next().unwrap_or(relative).to_ascii_lowercase();
        if NON_PAGE_FILES.contains(&file_name.as_str()) {
            return None;
        }
        Some(relative.to_string())
    }
}

/// Lists and reads Markdown files of a detected repository.
#[async_trait]
pub trait SourceTree: Send + Sync {
    /// Every Markdown file in the repository, in any order.
    async fn list_markdown(&self, repo: &RepoLocator) -> Result<Vec<SourceFile>, FetchError>;

    /// Raw Markdown of one file.
    async fn read(&self, repo: &RepoLocator, file: &SourceFile) -> Result<String, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_blob_link() {
        let repo = RepoLocator::from_blob_link(
            "https://github.com/acme/handbook/blob/main/docs/README.md",
        )
        .unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.repo, "handbook");
        assert_eq!(repo.branch, "main");
        assert_eq!(repo.docs_root, "docs");
        assert_eq!(repo.web_url(), "https://github.com/acme/handbook");
    }

    #[test]
    fn test_from_blob_link_rejects_other_links() {
        assert!(RepoLocator::from_blob_link("https://github.com/acme/handbook").is_none());
        assert!(RepoLocator::from_blob_link("https://example.com/acme/x/blob/main/a.md").is_none());
        assert!(RepoLocator::from_blob_link("not a url").is_none());
    }

    #[test]
    fn test_site_path_mapping() {
        let repo = RepoLocator::from_blob_link(
            "https://github.com/acme/handbook/blob/main/docs/README.md",
        )
        .unwrap();
        let path = |p: &str| repo.site_path(&SourceFile::new(p));
        assert_eq!(path("docs/guide/intro.md"), Some("guide/intro.md".to_string()));
        assert_eq!(path("docs/README.md"), Some("README.md".to_string()));
        assert_eq!(path("docs/SUMMARY.md"), None);
        assert_eq!(path("README.md"), None);
        assert_eq!(path("docs/.gitbook/x.md"), None);
        assert_eq!(path("docs/image.png"), None);
    }
}
