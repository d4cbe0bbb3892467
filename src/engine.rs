//! End-to-end fusion run.
//!
//! [`FusionEngine`] wires the four probes, the orchestrator and the post-acquisition
//! stages together: merge, hierarchy, link repair, asset localization.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::assets::{AssetLocalizer, AssetPlan};
use crate::config::FusionConfig;
use crate::error::FusionError;
use crate::fetch::Fetcher;
use crate::fusion::FusionMerger;
use crate::hierarchy::{DocumentTree, HierarchyBuilder};
use crate::link_rewriter::LinkRewriter;
use crate::orchestrator::{Orchestrator, StrategyResults};
use crate::probe::{
    DirectFileProbe, NavigationProbe, Probe, ProbeTarget, RepositoryProbe, SitemapProbe,
};
use crate::progress::{NoOpProgress, ProgressReporter};
use crate::report::RunReport;
use crate::source_tree::SourceTree;

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct FusionRun {
    pub tree: DocumentTree,
    /// Assets to download and where each one goes.
    pub assets: AssetPlan,
    pub report: RunReport,
}

/// Acquires one documentation site with every enabled strategy and fuses the results.
pub struct FusionEngine {
    config: FusionConfig,
    fetcher: Arc<dyn Fetcher>,
    source_tree: Option<Arc<dyn SourceTree>>,
    progress: Arc<dyn ProgressReporter>,
}

impl FusionEngine {
    pub fn new(config: FusionConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            fetcher,
            source_tree: None,
            progress: Arc::new(NoOpProgress),
        }
    }

    /// Source tree for the Repository strategy; without one it reports itself unavailable.
    #[must_use]
    pub fn with_source_tree(mut self, source_tree: Arc<dyn SourceTree>) -> Self {
        self.source_tree = Some(source_tree);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    fn probes(&self) -> Vec<Arc<dyn Probe>> {
        vec![
            Arc::new(RepositoryProbe::new(
                self.fetcher.clone(),
                self.source_tree.clone(),
            )),
            Arc::new(SitemapProbe::new(self.fetcher.clone())),
            Arc::new(NavigationProbe::new(self.fetcher.clone())),
            Arc::new(DirectFileProbe::new(self.fetcher.clone())),
        ]
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.probes())
            .with_max_concurrent(self.config.max_concurrent_extractions())
            .with_max_pages(self.config.max_pages_per_strategy())
            .with_progress(self.progress.clone())
    }

    /// Run every active strategy until completion or the configured deadline.
    pub async fn run(&self) -> Result<FusionRun, FusionError> {
        self.run_with_cancel(CancellationToken::new()).await
    }

    /// As [`FusionEngine::run`], additionally stopping acquisition when `cancel` fires.
    ///
    /// Pages extracted before cancellation are still fused.
    pub async fn run_with_cancel(&self, cancel: CancellationToken) -> Result<FusionRun, FusionError> {
        let target = ProbeTarget::from_config(&self.config)?;
        let strategies = self.config.active_strategies();
        log::info!(
            "Starting fusion run for {} with {} strategies",
            target.root_key(),
            strategies.len()
        );

        let results = self
            .orchestrator()
            .run_with_cancel(&target, &strategies, self.config.deadline(), cancel)
            .await;
        self.fuse(&target, results)
    }

    /// Post-acquisition stages over finished strategy results.
    pub fn fuse(
        &self,
        target: &ProbeTarget,
        results: StrategyResults,
    ) -> Result<FusionRun, FusionError> {
        let mut report = RunReport::new(target.root_key().as_str());
        report.record_strategies(&results);

        if results.total_candidates() == 0 {
            return Err(FusionError::AllStrategiesEmpty {
                strategies: results.strategies(),
            });
        }

        self.progress.report_stage("merge");
        let fused = FusionMerger::from_config(&self.config).merge(results);
        report.record_conflicts(&fused.conflicts);
        report.aliases = fused.aliases.clone();

        self.progress.report_stage("hierarchy");
        let (tree, warnings) = HierarchyBuilder::new(target.root_key().clone()).build(fused);
        for warning in warnings {
            report.warn(warning);
        }
        report.record_tree_check(&tree);

        self.progress.report_stage("links");
        let (tree, rewritten) =
            LinkRewriter::for_tree(&tree, target.normalizer().clone()).rewrite_tree(tree);
        report.rewritten_links = rewritten;

        self.progress.report_stage("assets");
        let (tree, assets) =
            AssetLocalizer::from_config(&self.config, target.normalizer().clone()).localize(tree);
        report.assets = assets.len();

        report.pages = tree.len();
        report.structure = Some(tree.source());
        self.progress.report_completed(tree.len());
        log::info!(
            "Fusion complete: {} pages ({:?} structure), {} warnings",
            tree.len(),
            tree.source(),
            report.warnings.len()
        );

        Ok(FusionRun {
            tree,
            assets,
            report,
        })
    }
}
