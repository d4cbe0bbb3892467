//! Single-document rendering of a document tree.
//!
//! Pages are emitted depth-first in tree order. Each page gets an
//! authoritative heading at `depth + 2` (the document title is the only H1)
//! and its own headings are shifted to sit beneath it.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::fusion::content_hash::content_hash;
use crate::fusion::CanonicalPage;
use crate::hierarchy::DocumentTree;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*#*\s*$").expect("BUG: hardcoded heading regex is invalid"));

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("BUG: hardcoded non-word regex is invalid"));

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{4,}").expect("BUG: hardcoded blank line regex is invalid"));

const MAX_HEADING_LEVEL: usize = 6;

/// Rendering options for [`consolidate`].
#[derive(Debug, Clone)]
pub struct ConsolidateOptions {
    /// Document title; defaults to the site host.
    pub title: Option<String>,
    /// Section path of a section-scoped run, shown in the header.
    pub section: Option<String>,
    pub include_header: bool,
    /// Insert a horizontal rule after every page.
    pub page_separators: bool,
}

impl Default for ConsolidateOptions {
    fn default() -> Self {
        Self {
            title: None,
            section: None,
            include_header: true,
            page_separators: true,
        }
    }
}

/// Render `tree` as one Markdown document.
#[must_use]
pub fn consolidate(tree: &DocumentTree, options: &ConsolidateOptions) -> String {
    let mut parts: Vec<String> = Vec::new();
    if options.include_header {
        parts.push(header(tree, options));
    }

    let mut seen_bodies = HashSet::new();
    let mut last_section: Option<&str> = None;

    for (depth, page) in tree.iter_depth_first() {
        let section = page.section.as_deref();
        if let Some(name) = section
            && last_section != section
        {
            parts.push(format!("## {name}\n"));
        }
        last_section = section;

        let level = (depth + 2).min(MAX_HEADING_LEVEL);
        let hash = content_hash(&page.body);
        let duplicate = !hash.is_empty() && !seen_bodies.insert(hash);
        if duplicate {
            log::debug!("Skipping duplicate body of {}", page.key);
        }
        parts.push(render_page(page, level, duplicate));
        if options.page_separators {
            parts.push("---\n".to_string());
        }
    }

    let document = parts.join("\n");
    let document = EXCESS_BLANK_LINES.replace_all(&document, "\n\n\n");
    format!("{}\n", document.trim_end())
}

fn header(tree: &DocumentTree, options: &ConsolidateOptions) -> String {
    let site = tree.site_root();
    let host = site
        .origin()
        .split("://")
        .nth(1)
        .unwrap_or(site.origin())
        .to_string();
    let mut title = options.title.clone().unwrap_or(host);
    if let Some(section) = &options.section {
        title.push_str(&format!(" - {}", section.replace('/', " / ")));
    }

    let mut header = format!("# {title}\n\n**Source:** {site}  \n**Pages:** {}  \n", tree.len());
    if let Some(section) = &options.section {
        header.push_str(&format!("**Section:** {section}  \n"));
    }
    header.push_str("\n---\n");
    header
}

fn render_page(page: &CanonicalPage, level: usize, skip_body: bool) -> String {
    let heading = format!("{} {}", "#".repeat(level), page.title.trim());
    if skip_body || page.body.trim().is_empty() {
        return format!("{heading}\n");
    }
    let body = shift_headings(&page.body, level, &page.title);
    format!("{heading}\n\n{body}\n")
}

/// Shift the body's headings so its shallowest heading lands at `page_level + 1`,
/// dropping a leading heading that repeats the page title.
fn shift_headings(body: &str, page_level: usize, page_title: &str) -> String {
    let lines: Vec<&str> = body.trim().lines().collect();

    let mut in_fence = false;
    let mut headings: Vec<(usize, usize)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence && let Some(caps) = HEADING.captures(line) {
            headings.push((idx, caps[1].len()));
        }
    }

    let Some(min_level) = headings.iter().map(|&(_, level)| level).min() else {
        return lines.join("\n");
    };
    let shift = (page_level + 1) as isize - min_level as isize;

    let leading_duplicate = headings.first().and_then(|&(idx, _)| {
        let is_leading = lines[..idx].iter().all(|l| l.trim().is_empty());
        let text = HEADING.captures(lines[idx])?.get(2)?.as_str();
        (is_leading && fuzzy_title_match(text, page_title)).then_some(idx)
    });

    let heading_lines: HashSet<usize> = headings.iter().map(|&(idx, _)| idx).collect();
    let mut out = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        if Some(idx) == leading_duplicate {
            continue;
        }
        if heading_lines.contains(&idx)
            && let Some(caps) = HEADING.captures(line)
        {
            let level = (caps[1].len() as isize + shift).clamp(1, MAX_HEADING_LEVEL as isize);
            out.push(format!("{} {}", "#".repeat(level as usize), &caps[2]));
        } else {
            out.push((*line).to_string());
        }
    }
    out.join("\n").trim().to_string()
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Loose heading/title equality: punctuation and case ignored, containment either way.
fn fuzzy_title_match(heading: &str, title: &str) -> bool {
    let clean = |s: &str| {
        NON_WORD
            .replace_all(&s.to_lowercase(), "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };
    let (heading, title) = (clean(heading), clean(title));
    if heading.is_empty() || title.is_empty() {
        return false;
    }
    heading == title || heading.contains(&title) || title.contains(&heading)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalKey;
    use crate::fusion::FusionMerger;
    use crate::hierarchy::HierarchyBuilder;
    use crate::probe::{NavPosition, PageCandidate, StrategyKind};

    fn placed(path: &str, title: &str, order: u32, section: Option<&str>) -> PageCandidate {
        let key: CanonicalKey = format!("https://docs.example.com{path}").parse().unwrap();
        PageCandidate::new(key.clone(), StrategyKind::Navigation, key.as_str(), title, title)
            .with_nav(Some(NavPosition {
                parent: None,
                order,
                depth: 0,
                section: section.map(str::to_string),
            }))
    }

    #[test]
    fn test_section_header_repeats_after_unsectioned_page() {
        let fused = FusionMerger::new().merge_candidates(vec![
            placed("/alpha", "Alpha", 0, Some("Guides")),
            placed("/beta", "Beta", 1, None),
            placed("/gamma", "Gamma", 2, Some("Guides")),
            placed("/delta", "Delta", 3, Some("Guides")),
        ]);
        let root: CanonicalKey = "https://docs.example.com/".parse().unwrap();
        let (tree, _) = HierarchyBuilder::new(root).build(fused);

        let document = consolidate(&tree, &ConsolidateOptions::default());
        assert_eq!(document.matches("\n## Guides\n").count(), 2, "{document}");
        let beta = document.find("\n## Beta\n").unwrap();
        let second = document.rfind("\n## Guides\n").unwrap();
        let gamma = document.find("\n## Gamma\n").unwrap();
        assert!(beta < second && second < gamma, "{document}");
    }

    #[test]
    fn test_shift_headings_drops_duplicate_title() {
        let body = "# Mission\n\nWhy we exist.\n\n## Goal\n\nText.";
        assert_eq!(
            shift_headings(body, 2, "Mission"),
            "Why we exist.\n\n### Goal\n\nText."
        );
    }

    #[test]
    fn test_shift_headings_keeps_other_heading() {
        let body = "# Introduction\n\n## Details";
        assert_eq!(
            shift_headings(body, 3, "Overview"),
            "#### Introduction\n\n##### Details"
        );
    }

    #[test]
    fn test_headings_in_code_fences_untouched() {
        let body = "## Usage\n\n```bash\n# not a heading\n```";
        assert_eq!(
            shift_headings(body, 2, "Other"),
            "### Usage\n\n```bash\n# not a heading\n```"
        );
    }

    #[test]
    fn test_fuzzy_title_match() {
        assert!(fuzzy_title_match("Getting Started!", "getting started"));
        assert!(fuzzy_title_match("Install", "Install the CLI"));
        assert!(!fuzzy_title_match("Usage", "Install"));
        assert!(!fuzzy_title_match("!!!", "Install"));
    }
}
