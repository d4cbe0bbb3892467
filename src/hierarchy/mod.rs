//! Document tree reconstruction.
//!
//! The tree follows the most trustworthy structural signal available:
//! the rendered sidebar when any strategy saw one, otherwise URL path nesting
//! (`/api/auth` under `/api`), otherwise a flat list. Pages the sidebar did not
//! place fall back to path nesting so every page lands somewhere.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalKey;
use crate::fusion::{CanonicalPage, FusedPages, StructuralSignal};
use crate::report::RunWarning;

/// Which signal shaped the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureSource {
    Navigation,
    PathNesting,
    Flat,
}

/// Root-anchored forest of pages with strict sibling order.
///
/// Invariants: acyclic, every non-root page has exactly one parent that is in
/// the tree, and every key appears exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTree {
    site_root: CanonicalKey,
    pages: BTreeMap<CanonicalKey, CanonicalPage>,
    roots: Vec<CanonicalKey>,
    aliases: BTreeMap<CanonicalKey, CanonicalKey>,
    source: StructureSource,
}

impl DocumentTree {
    #[must_use]
    pub fn site_root(&self) -> &CanonicalKey {
        &self.site_root
    }

    #[must_use]
    pub fn source(&self) -> StructureSource {
        self.source
    }

    #[must_use]
    pub fn roots(&self) -> &[CanonicalKey] {
        &self.roots
    }

    #[must_use]
    pub fn get(&self, key: &CanonicalKey) -> Option<&CanonicalPage> {
        self.pages.get(key)
    }

    /// Pages in key order.
    pub fn pages(&self) -> impl Iterator<Item = &CanonicalPage> {
        self.pages.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &CanonicalKey) -> bool {
        self.pages.contains_key(key)
    }

    #[must_use]
    pub fn aliases(&self) -> &BTreeMap<CanonicalKey, CanonicalKey> {
        &self.aliases
    }

    /// The page key `key` refers to after dedup, if it is in the tree.
    #[must_use]
    pub fn resolve(&self, key: &CanonicalKey) -> Option<&CanonicalKey> {
        let key = self.aliases.get(key).unwrap_or(key);
        self.pages.get_key_value(key).map(|(k, _)| k)
    }

    #[must_use]
    pub fn parent_of(&self, key: &CanonicalKey) -> Option<&CanonicalKey> {
        self.pages.get(key)?.parent.as_ref()
    }

    #[must_use]
    pub fn children_of(&self, key: &CanonicalKey) -> &[CanonicalKey] {
        self.pages
            .get(key)
            .map_or(&[][..], |page| page.children.as_slice())
    }

    /// Pages in document order with their depth (roots at 0).
    #[must_use]
    pub fn iter_depth_first(&self) -> Vec<(usize, &CanonicalPage)> {
        let mut out = Vec::with_capacity(self.pages.len());
        let mut stack: Vec<(usize, &CanonicalKey)> =
            self.roots.iter().rev().map(|k| (0, k)).collect();
        let mut visited = BTreeSet::new();

        while let Some((depth, key)) = stack.pop() {
            if !visited.insert(key) {
                continue;
            }
            let Some(page) = self.pages.get(key) else {
                continue;
            };
            out.push((depth, page));
            stack.extend(page.children.iter().rev().map(|k| (depth + 1, k)));
        }
        out
    }

    /// Check the tree invariants.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = BTreeSet::new();
        for root in &self.roots {
            let page = self
                .pages
                .get(root)
                .ok_or_else(|| format!("root {root} is not a page"))?;
            if page.parent.is_some() {
                return Err(format!("root {root} has a parent"));
            }
        }
        for (key, page) in &self.pages {
            match &page.parent {
                None => {
                    if !self.roots.contains(key) {
                        return Err(format!("{key} has no parent but is not a root"));
                    }
                }
                Some(parent) => {
                    let parent_page = self
                        .pages
                        .get(parent)
                        .ok_or_else(|| format!("{key} has dangling parent {parent}"))?;
                    if !parent_page.children.contains(key) {
                        return Err(format!("{parent} does not list child {key}"));
                    }
                }
            }
            for child in &page.children {
                if self.pages.get(child).and_then(|c| c.parent.as_ref()) != Some(key) {
                    return Err(format!("{child} listed under {key} but parented elsewhere"));
                }
            }
        }
        for (_, page) in self.iter_depth_first() {
            if !seen.insert(&page.key) {
                return Err(format!("{} visited twice", page.key));
            }
        }
        if seen.len() != self.pages.len() {
            return Err(format!(
                "{} of {} pages reachable from the roots",
                seen.len(),
                self.pages.len()
            ));
        }
        Ok(())
    }

    /// New tree with every page passed through `f`; structure is kept.
    #[must_use]
    pub fn map_pages(mut self, mut f: impl FnMut(CanonicalPage) -> CanonicalPage) -> Self {
        let pages = std::mem::take(&mut self.pages);
        self.pages = pages
            .into_iter()
            .map(|(key, page)| {
                let mut mapped = f(page);
                mapped.key = key.clone();
                (key, mapped)
            })
            .collect();
        self
    }
}

/// Builds a [`DocumentTree`] from fused pages.
#[derive(Debug, Clone)]
pub struct HierarchyBuilder {
    site_root: CanonicalKey,
}

impl HierarchyBuilder {
    /// `site_root` bounds path nesting: pages nest under ancestors strictly below it.
    #[must_use]
    pub fn new(site_root: CanonicalKey) -> Self {
        Self { site_root }
    }

    /// Build the tree. Cycles and missing parents are repaired and reported.
    #[must_use]
    pub fn build(&self, fused: FusedPages) -> (DocumentTree, Vec<RunWarning>) {
        let FusedPages {
            mut pages,
            structure,
            aliases,
            ..
        } = fused;
        let mut warnings = Vec::new();

        let has_navigation = structure.values().any(|s| s.nav.is_some());
        let mut parents: BTreeMap<CanonicalKey, Option<CanonicalKey>> = BTreeMap::new();
        for key in pages.keys() {
            let signal = structure.get(key);
            let parent = if has_navigation {
                self.navigation_parent(key, signal, &pages, &aliases, &mut warnings)
            } else {
                self.path_parent(key, &pages)
            };
            parents.insert(key.clone(), parent);
        }

        break_cycles(&mut parents, &mut warnings);

        let source = if has_navigation {
            StructureSource::Navigation
        } else if parents.values().any(Option::is_some) {
            StructureSource::PathNesting
        } else {
            StructureSource::Flat
        };
        log::info!("Building document tree from {source:?} for {} pages", pages.len());

        let order = |key: &CanonicalKey| -> (bool, u32, CanonicalKey) {
            let nav_order = structure.get(key).and_then(|s| s.nav.as_ref()).map(|n| n.order);
            (nav_order.is_none(), nav_order.unwrap_or(u32::MAX), key.clone())
        };

        let mut children: BTreeMap<CanonicalKey, Vec<CanonicalKey>> = BTreeMap::new();
        let mut roots = Vec::new();
        for (key, parent) in &parents {
            match parent {
                Some(parent) => children.entry(parent.clone()).or_default().push(key.clone()),
                None => roots.push(key.clone()),
            }
        }
        for list in children.values_mut() {
            list.sort_by_cached_key(|k| order(k));
        }
        roots.sort_by_cached_key(|k| (k != &self.site_root, order(k)));

        for (key, page) in &mut pages {
            page.parent = parents.get(key).cloned().flatten();
            page.children = children.remove(key).unwrap_or_default();
        }

        let tree = DocumentTree {
            site_root: self.site_root.clone(),
            pages,
            roots,
            aliases,
            source,
        };
        (tree, warnings)
    }

    /// Parent from the sidebar, resolved through dedup aliases; path nesting
    /// for pages the sidebar did not place or placed under a missing page.
    fn navigation_parent(
        &self,
        key: &CanonicalKey,
        signal: Option<&StructuralSignal>,
        pages: &BTreeMap<CanonicalKey, CanonicalPage>,
        aliases: &BTreeMap<CanonicalKey, CanonicalKey>,
        warnings: &mut Vec<RunWarning>,
    ) -> Option<CanonicalKey> {
        let Some(nav) = signal.and_then(|s| s.nav.as_ref()) else {
            return self.path_parent(key, pages);
        };
        let Some(raw_parent) = &nav.parent else {
            return None;
        };
        let parent = aliases.get(raw_parent).unwrap_or(raw_parent);
        if parent == key {
            // Parent was folded into this page by dedup.
            return self.path_parent(key, pages);
        }
        if pages.contains_key(parent) {
            return Some(parent.clone());
        }
        warnings.push(RunWarning::OrphanedPage {
            key: key.clone(),
            missing_parent: parent.clone(),
        });
        log::warn!("Sidebar parent {parent} of {key} is not in the tree");
        self.path_parent(key, pages)
    }

    /// Nearest existing path ancestor strictly below the site root.
    fn path_parent(
        &self,
        key: &CanonicalKey,
        pages: &BTreeMap<CanonicalKey, CanonicalPage>,
    ) -> Option<CanonicalKey> {
        if key == &self.site_root {
            return None;
        }
        let mut current = key.path_parent();
        while let Some(ancestor) = current {
            if ancestor == self.site_root || !ancestor.is_within(&self.site_root) {
                return None;
            }
            if pages.contains_key(&ancestor) {
                return Some(ancestor);
            }
            current = ancestor.path_parent();
        }
        None
    }
}

/// Demote the first key (in key order) of every parent cycle to a root.
fn break_cycles(
    parents: &mut BTreeMap<CanonicalKey, Option<CanonicalKey>>,
    warnings: &mut Vec<RunWarning>,
) {
    let keys: Vec<CanonicalKey> = parents.keys().cloned().collect();
    for key in keys {
        let mut seen = BTreeSet::new();
        let mut current = parents.get(&key).cloned().flatten();
        while let Some(ancestor) = current {
            if ancestor == key {
                if let Some(Some(parent)) = parents.insert(key.clone(), None) {
                    log::warn!("Cycle detected at {key} through {parent}; demoted to root");
                    warnings.push(RunWarning::CycleDetected {
                        key: key.clone(),
                        parent,
                    });
                }
                break;
            }
            if !seen.insert(ancestor.clone()) {
                break;
            }
            current = parents.get(&ancestor).cloned().flatten();
        }
    }
}
