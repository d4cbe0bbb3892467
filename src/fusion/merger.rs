//! Candidate reconciliation.
//!
//! Merge order:
//! 1. group candidates by canonical key
//! 2. collapse groups whose representative bodies share a content hash onto
//!    the structurally shallowest key
//! 3. per surviving key, pick body, title, section and sidebar position
//!
//! Every ordering used below is total over candidate contents, so the output
//! never depends on the order strategies delivered their pages in.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::CanonicalKey;
use crate::config::FusionConfig;
use crate::orchestrator::StrategyResults;
use crate::probe::{ExtractionQuality, NavPosition, PageCandidate, StrategyKind};
use crate::utils::{DEFAULT_CONFLICT_RATIO, DEFAULT_PLACEHOLDER_TITLES};

use super::content_hash::ContentHash;
use super::title::{humanize_slug, is_placeholder};
use super::{CanonicalPage, ContentConflict, FusedPages, StructuralSignal};

/// Reconciles overlapping page sets into one page per identity.
#[derive(Debug, Clone)]
pub struct FusionMerger {
    conflict_ratio: f64,
    placeholder_titles: Vec<String>,
}

impl Default for FusionMerger {
    fn default() -> Self {
        Self {
            conflict_ratio: DEFAULT_CONFLICT_RATIO,
            placeholder_titles: DEFAULT_PLACEHOLDER_TITLES
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        }
    }
}

impl FusionMerger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            conflict_ratio: config.conflict_ratio(),
            placeholder_titles: config.placeholder_titles().to_vec(),
        }
    }

    #[must_use]
    pub fn with_conflict_ratio(mut self, ratio: f64) -> Self {
        self.conflict_ratio = ratio;
        self
    }

    #[must_use]
    pub fn with_placeholder_titles(mut self, titles: Vec<String>) -> Self {
        self.placeholder_titles = titles;
        self
    }

    /// Merge every strategy's candidates.
    #[must_use]
    pub fn merge(&self, results: StrategyResults) -> FusedPages {
        self.merge_candidates(results.into_candidates())
    }

    #[must_use]
    pub fn merge_candidates(&self, candidates: Vec<PageCandidate>) -> FusedPages {
        let mut groups: BTreeMap<CanonicalKey, Vec<PageCandidate>> = BTreeMap::new();
        for candidate in candidates {
            groups
                .entry(candidate.canonical_key().clone())
                .or_default()
                .push(candidate);
        }
        log::debug!("Merging {} canonical keys", groups.len());
        for (key, group) in &mut groups {
            group.sort_by(|a, b| rank(key, a, b));
        }

        let aliases = self.dedup_by_content(&groups);
        for (removed, survivor) in &aliases {
            log::info!("Duplicate content: {removed} folded into {survivor}");
        }

        let mut merged: BTreeMap<CanonicalKey, Vec<PageCandidate>> = BTreeMap::new();
        for (key, group) in groups {
            let survivor = aliases.get(&key).cloned().unwrap_or(key);
            merged.entry(survivor).or_default().extend(group);
        }

        let mut fused = FusedPages {
            aliases,
            ..FusedPages::default()
        };
        for (key, mut group) in merged {
            group.sort_by(|a, b| rank(&key, a, b));
            let (page, conflict) = self.select_fields(&key, &group);
            if let Some(conflict) = conflict {
                log::warn!(
                    "Content conflict on {}: {} ({} chars) kept over {} ({} chars)",
                    conflict.key,
                    conflict.kept_strategy,
                    conflict.kept_len,
                    conflict.dropped_strategy,
                    conflict.dropped_len
                );
                fused.conflicts.push(conflict);
            }
            fused.structure.insert(key.clone(), structural_signal(&group));
            fused.pages.insert(key, page);
        }
        fused
    }

    fn select_fields(
        &self,
        key: &CanonicalKey,
        group: &[PageCandidate],
    ) -> (CanonicalPage, Option<ContentConflict>) {
        let (winner, conflict) = self.select_body(key, group);

        let title = std::iter::once(winner)
            .chain(group.iter())
            .map(|c| c.title().trim())
            .find(|t| !is_placeholder(t, &self.placeholder_titles))
            .map_or_else(|| humanize_slug(key), str::to_string);

        let section = group
            .iter()
            .find_map(|c| c.section())
            .map(str::to_string);

        let page = CanonicalPage {
            key: key.clone(),
            title,
            body: winner.body().to_string(),
            source_url: winner.raw_url().to_string(),
            source_strategy: winner.source_strategy(),
            quality: winner.quality(),
            section,
            asset_refs: Vec::new(),
            children: Vec::new(),
            parent: None,
        };
        (page, conflict)
    }

    /// Highest-ranked non-empty body, unless two high-quality bodies differ in
    /// length beyond the conflict ratio, in which case the longest wins.
    fn select_body<'a>(
        &self,
        key: &CanonicalKey,
        group: &'a [PageCandidate],
    ) -> (&'a PageCandidate, Option<ContentConflict>) {
        let top = group
            .iter()
            .find(|c| !c.body().trim().is_empty())
            .unwrap_or(&group[0]);

        let high: Vec<(&PageCandidate, usize)> = group
            .iter()
            .filter(|c| c.quality() >= ExtractionQuality::SidebarScrape)
            .filter(|c| !c.body().trim().is_empty())
            .map(|c| (c, c.body().chars().count()))
            .collect();

        // First of the maximum / minimum in rank order.
        let longest = high
            .iter()
            .fold(None::<(&PageCandidate, usize)>, |best, &(c, len)| match best {
                Some((_, best_len)) if best_len >= len => best,
                _ => Some((c, len)),
            });
        let shortest = high
            .iter()
            .fold(None::<(&PageCandidate, usize)>, |best, &(c, len)| match best {
                Some((_, best_len)) if best_len <= len => best,
                _ => Some((c, len)),
            });

        if let (Some((long, long_len)), Some((short, short_len))) = (longest, shortest) {
            #[allow(clippy::cast_precision_loss)]
            let ratio = long_len as f64 / short_len.max(1) as f64;
            if ratio > self.conflict_ratio {
                let conflict = ContentConflict {
                    key: key.clone(),
                    kept_strategy: long.source_strategy(),
                    kept_len: long_len,
                    dropped_strategy: short.source_strategy(),
                    dropped_len: short_len,
                    ratio,
                };
                return (long, Some(conflict));
            }
        }
        (top, None)
    }
}

/// Deterministic candidate order within one surviving key; best first.
fn rank(key: &CanonicalKey, a: &PageCandidate, b: &PageCandidate) -> Ordering {
    b.quality()
        .cmp(&a.quality())
        .then_with(|| {
            a.source_strategy()
                .precedence()
                .cmp(&b.source_strategy().precedence())
        })
        .then_with(|| (a.canonical_key() != key).cmp(&(b.canonical_key() != key)))
        .then_with(|| a.body().trim().is_empty().cmp(&b.body().trim().is_empty()))
        .then_with(|| a.canonical_key().cmp(b.canonical_key()))
        .then_with(|| a.raw_url().cmp(b.raw_url()))
        .then_with(|| a.title().cmp(b.title()))
        .then_with(|| a.body().cmp(b.body()))
}

/// Survivor preference: sidebar-placed keys first by sidebar depth, then
/// shallower path, then shorter path, then lexicographic.
fn survivor_order(
    a: (&CanonicalKey, SurvivorDepth),
    b: (&CanonicalKey, SurvivorDepth),
) -> Ordering {
    a.1.cmp(&b.1)
        .then_with(|| a.0.depth().cmp(&b.0.depth()))
        .then_with(|| a.0.path().len().cmp(&b.0.path().len()))
        .then_with(|| a.0.cmp(b.0))
}

/// `(no sidebar position, structural depth)` for one key group.
type SurvivorDepth = (bool, u32);

fn survivor_depth(group: &[PageCandidate]) -> SurvivorDepth {
    let sidebar = group
        .iter()
        .filter(|c| c.nav().is_some())
        .map(PageCandidate::structural_depth)
        .min();
    match sidebar {
        Some(depth) => (false, depth),
        None => (
            true,
            group
                .iter()
                .map(PageCandidate::structural_depth)
                .min()
                .unwrap_or(u32::MAX),
        ),
    }
}

impl FusionMerger {
    /// Map every key whose content duplicates another key's onto the surviving key.
    ///
    /// Each group is represented by the body it would keep on its own; keys are
    /// connected when those representative hashes match. Groups must already be
    /// sorted by `rank`.
    fn dedup_by_content(
        &self,
        groups: &BTreeMap<CanonicalKey, Vec<PageCandidate>>,
    ) -> BTreeMap<CanonicalKey, CanonicalKey> {
        let keys: Vec<&CanonicalKey> = groups.keys().collect();
        let depths: Vec<SurvivorDepth> = groups.values().map(|g| survivor_depth(g)).collect();
        let mut parent: Vec<usize> = (0..keys.len()).collect();

        let mut by_hash: BTreeMap<ContentHash, Vec<usize>> = BTreeMap::new();
        for (idx, (key, group)) in groups.iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let hash = self.select_body(key, group).0.content_hash();
            if !hash.is_empty() {
                by_hash.entry(hash).or_default().push(idx);
            }
        }

        for members in by_hash.values() {
            for pair in members.windows(2) {
                union(&mut parent, pair[0], pair[1]);
            }
        }

        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for idx in 0..keys.len() {
            let root = find(&mut parent, idx);
            components.entry(root).or_default().push(idx);
        }

        let mut aliases = BTreeMap::new();
        for members in components.values().filter(|m| m.len() > 1) {
            let Some(&survivor) = members
                .iter()
                .min_by(|&&a, &&b| survivor_order((keys[a], depths[a]), (keys[b], depths[b])))
            else {
                continue;
            };
            for &idx in members {
                if idx != survivor {
                    aliases.insert(keys[idx].clone(), keys[survivor].clone());
                }
            }
        }
        aliases
    }
}

fn find(parent: &mut [usize], mut idx: usize) -> usize {
    while parent[idx] != idx {
        parent[idx] = parent[parent[idx]];
        idx = parent[idx];
    }
    idx
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[high] = low;
    }
}

fn structural_signal(group: &[PageCandidate]) -> StructuralSignal {
    let nav: Option<NavPosition> = group
        .iter()
        .filter_map(PageCandidate::nav)
        .min_by_key(|nav| nav.order)
        .cloned();
    let strategies: BTreeSet<StrategyKind> =
        group.iter().map(PageCandidate::source_strategy).collect();
    StructuralSignal {
        nav,
        strategies: strategies.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> CanonicalKey {
        format!("https://docs.example.com{path}").parse().unwrap()
    }

    fn candidate(strategy: StrategyKind, path: &str, title: &str, body: &str) -> PageCandidate {
        let k = key(path);
        PageCandidate::new(k.clone(), strategy, k.as_str(), title, body)
    }

    #[test]
    fn test_survivor_order() {
        let no_sidebar = (true, 0);
        let mut keys = vec![key("/guide/setup-copy"), key("/setup"), key("/guide/setup")];
        keys.sort_by(|a, b| survivor_order((a, no_sidebar), (b, no_sidebar)));
        assert_eq!(keys[0], key("/setup"));
        assert_eq!(keys[1], key("/guide/setup"));

        let (deep, shallow) = (key("/guide/setup"), key("/setup"));
        assert_eq!(
            survivor_order((&deep, (false, 0)), (&shallow, (true, 1))),
            Ordering::Less
        );
        assert_eq!(
            survivor_order((&deep, (false, 2)), (&shallow, (false, 0))),
            Ordering::Greater
        );
    }

    #[test]
    fn test_survivor_depth_prefers_sidebar() {
        let plain = candidate(StrategyKind::Sitemap, "/a/b/c", "C", "body");
        assert_eq!(survivor_depth(std::slice::from_ref(&plain)), (true, 3));

        let placed = candidate(StrategyKind::Navigation, "/a/b/c", "C", "body").with_nav(Some(
            NavPosition {
                parent: None,
                order: 0,
                depth: 1,
                section: None,
            },
        ));
        assert_eq!(survivor_depth(&[plain, placed]), (false, 1));
    }

    #[test]
    fn test_shared_shell_does_not_merge_distinct_pages() {
        let fused = FusionMerger::new().merge_candidates(vec![
            candidate(StrategyKind::DirectFile, "/a", "A", "Page a covers tokens."),
            candidate(StrategyKind::Sitemap, "/a", "A", "Loading..."),
            candidate(StrategyKind::DirectFile, "/b", "B", "Page b covers exports."),
            candidate(StrategyKind::Sitemap, "/b", "B", "Loading..."),
        ]);
        assert_eq!(fused.len(), 2);
        assert!(fused.aliases.is_empty());
    }

    #[test]
    fn test_empty_bodies_never_merge() {
        let fused = FusionMerger::new().merge_candidates(vec![
            candidate(StrategyKind::Sitemap, "/a", "A", ""),
            candidate(StrategyKind::Sitemap, "/b", "B", ""),
        ]);
        assert_eq!(fused.len(), 2);
        assert!(fused.aliases.is_empty());
    }

    #[test]
    fn test_top_ranked_body_wins_without_conflict() {
        let fused = FusionMerger::new().merge_candidates(vec![
            candidate(StrategyKind::Sitemap, "/a", "A", "scraped text of a"),
            candidate(StrategyKind::Repository, "/a", "A", "source text of a"),
        ]);
        let page = &fused.pages[&key("/a")];
        assert_eq!(page.body, "source text of a");
        assert_eq!(page.source_strategy, StrategyKind::Repository);
        assert!(fused.conflicts.is_empty());
        assert_eq!(
            fused.structure[&key("/a")].strategies,
            vec![StrategyKind::Repository, StrategyKind::Sitemap]
        );
    }

    #[test]
    fn test_sitemap_length_never_conflicts() {
        let long = "word ".repeat(100);
        let fused = FusionMerger::new().merge_candidates(vec![
            candidate(StrategyKind::Sitemap, "/a", "A", &long),
            candidate(StrategyKind::DirectFile, "/a", "A", "short"),
        ]);
        assert_eq!(fused.pages[&key("/a")].body, "short");
        assert!(fused.conflicts.is_empty());
    }
}
