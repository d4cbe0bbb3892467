//! Run report: per-strategy statistics plus every non-fatal problem of a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalKey;
use crate::error::ProbeError;
use crate::fusion::ContentConflict;
use crate::hierarchy::{DocumentTree, StructureSource};
use crate::orchestrator::StrategyResults;
use crate::probe::StrategyKind;

/// A non-fatal problem recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    /// A strategy was unavailable, or one of its pages failed to extract.
    Probe {
        strategy: StrategyKind,
        error: ProbeError,
    },
    /// `key` would have been its own ancestor through `parent`; it became a root.
    CycleDetected {
        key: CanonicalKey,
        parent: CanonicalKey,
    },
    /// The sidebar named a parent that is not in the tree.
    OrphanedPage {
        key: CanonicalKey,
        missing_parent: CanonicalKey,
    },
    ContentConflict {
        key: CanonicalKey,
        kept: StrategyKind,
        dropped: StrategyKind,
        ratio: f64,
    },
    DeadlineExceeded { cancelled: Vec<StrategyKind> },
    /// The assembled tree broke one of its structural invariants.
    InvalidTree { reason: String },
}

impl std::fmt::Display for RunWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunWarning::Probe { strategy, error } => write!(f, "[{strategy}] {error}"),
            RunWarning::CycleDetected { key, parent } => {
                write!(f, "Cycle through {parent} detected at {key}; demoted to root")
            }
            RunWarning::OrphanedPage {
                key,
                missing_parent,
            } => write!(f, "Parent {missing_parent} of {key} is not in the tree"),
            RunWarning::ContentConflict {
                key,
                kept,
                dropped,
                ratio,
            } => write!(
                f,
                "Content length conflict on {key}: kept {kept} over {dropped} (ratio {ratio:.2})"
            ),
            RunWarning::DeadlineExceeded { cancelled } => {
                let names: Vec<&str> = cancelled.iter().map(StrategyKind::as_str).collect();
                write!(f, "Deadline exceeded; cancelled: {}", names.join(", "))
            }
            RunWarning::InvalidTree { reason } => {
                write!(f, "Document tree failed validation: {reason}")
            }
        }
    }
}

/// Counters for one strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub strategy: StrategyKind,
    pub discovered: usize,
    pub filtered: usize,
    pub extracted: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Summary of one run, serializable for external reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub site_root: String,
    pub strategies: Vec<StrategyStats>,
    pub structure: Option<StructureSource>,
    pub pages: usize,
    pub warnings: Vec<RunWarning>,
    pub conflicts: Vec<ContentConflict>,
    pub aliases: BTreeMap<CanonicalKey, CanonicalKey>,
    pub rewritten_links: usize,
    pub assets: usize,
}

impl RunReport {
    pub fn new(site_root: impl Into<String>) -> Self {
        Self {
            site_root: site_root.into(),
            ..Self::default()
        }
    }

    /// Record a warning, logging it as it is recorded.
    pub fn warn(&mut self, warning: RunWarning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Record per-strategy statistics and failures from the orchestrator.
    pub fn record_strategies(&mut self, results: &StrategyResults) {
        for outcome in results.iter() {
            self.strategies.push(StrategyStats {
                strategy: outcome.strategy,
                discovered: outcome.discovered,
                filtered: outcome.filtered,
                extracted: outcome.candidates.len(),
                failed: outcome.failures.len(),
                cancelled: outcome.cancelled,
            });
        }
        for (strategy, error) in results.failures() {
            self.warn(RunWarning::Probe {
                strategy,
                error: error.clone(),
            });
        }
        if results.deadline_exceeded() {
            let cancelled = results
                .iter()
                .filter(|o| o.cancelled)
                .map(|o| o.strategy)
                .collect();
            self.warn(RunWarning::DeadlineExceeded { cancelled });
        }
    }

    /// Record merge conflicts, both as data and as warnings.
    pub fn record_conflicts(&mut self, conflicts: &[ContentConflict]) {
        for conflict in conflicts {
            self.warn(RunWarning::ContentConflict {
                key: conflict.key.clone(),
                kept: conflict.kept_strategy,
                dropped: conflict.dropped_strategy,
                ratio: conflict.ratio,
            });
        }
        self.conflicts.extend_from_slice(conflicts);
    }

    /// Validate the tree and record any broken invariant.
    pub fn record_tree_check(&mut self, tree: &DocumentTree) {
        if let Err(reason) = tree.validate() {
            log::error!("Document tree failed validation: {reason}");
            self.warn(RunWarning::InvalidTree { reason });
        }
    }

    #[must_use]
    pub fn stats(&self, strategy: StrategyKind) -> Option<&StrategyStats> {
        self.strategies.iter().find(|s| s.strategy == strategy)
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::FusionMerger;
    use crate::hierarchy::HierarchyBuilder;
    use crate::orchestrator::StrategyOutcome;
    use crate::probe::PageCandidate;

    #[test]
    fn test_record_strategies() {
        let results = StrategyResults::new([
            StrategyOutcome::empty(StrategyKind::Repository).with_failure(ProbeError::unavailable(
                StrategyKind::Repository,
                "no source repository link",
            )),
            StrategyOutcome::empty(StrategyKind::Sitemap),
        ]);
        let mut report = RunReport::new("https://docs.example.com/");
        report.record_strategies(&results);

        assert_eq!(report.strategies.len(), 2);
        assert_eq!(report.stats(StrategyKind::Repository).unwrap().failed, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            report.warnings[0],
            RunWarning::Probe {
                strategy: StrategyKind::Repository,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_tree_is_recorded() {
        let root: CanonicalKey = "https://docs.example.com/".parse().unwrap();
        let page: CanonicalKey = "https://docs.example.com/intro".parse().unwrap();
        let fused = FusionMerger::new().merge_candidates(vec![PageCandidate::new(
            page.clone(),
            StrategyKind::Sitemap,
            page.as_str(),
            "Intro",
            "Hello.",
        )]);
        let (tree, _) = HierarchyBuilder::new(root).build(fused);

        let mut report = RunReport::new("https://docs.example.com/");
        report.record_tree_check(&tree);
        assert!(!report.has_warnings());

        let broken = tree.map_pages(|mut p| {
            p.parent = Some(p.key.clone());
            p
        });
        report.record_tree_check(&broken);
        assert_eq!(report.warnings.len(), 1);
        let RunWarning::InvalidTree { reason } = &report.warnings[0] else {
            panic!("expected InvalidTree, got {:?}", report.warnings[0]);
        };
        assert!(reason.contains("has a parent"), "{reason}");
        assert_eq!(
            serde_json::to_value(&report.warnings[0]).unwrap()["kind"],
            "invalid_tree"
        );
    }

    #[test]
    fn test_warning_serializes_tagged() {
        let warning = RunWarning::CycleDetected {
            key: "https://docs.example.com/a".parse().unwrap(),
            parent: "https://docs.example.com/b".parse().unwrap(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "cycle_detected");
        assert_eq!(json["key"], "https://docs.example.com/a");
    }
}
