pub mod assets;
pub mod canonical;
pub mod config;
pub mod consolidate;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod fusion;
pub mod hierarchy;
pub mod link_rewriter;
pub mod orchestrator;
pub mod probe;
pub mod progress;
pub mod report;
pub mod source_tree;
pub mod utils;

pub use assets::{AssetLocalizer, AssetPlan, AssetRef};
pub use canonical::{CanonicalKey, Normalizer, normalize};
pub use config::{FusionConfig, FusionConfigBuilder};
pub use consolidate::{ConsolidateOptions, consolidate};
pub use engine::{FusionEngine, FusionRun};
pub use error::{FusionError, ProbeError};
pub use fetch::{FetchError, FetchedContent, Fetcher};
pub use fusion::{CanonicalPage, ContentConflict, FusedPages, FusionMerger};
pub use hierarchy::{DocumentTree, HierarchyBuilder, StructureSource};
pub use link_rewriter::LinkRewriter;
pub use orchestrator::{Orchestrator, StrategyOutcome, StrategyResults};
pub use probe::{
    DirectFileProbe, DiscoveredUrl, Discovery, ExtractionQuality, NavigationProbe, PageCandidate,
    Probe, ProbeTarget, RepositoryProbe, SitemapProbe, StrategyKind,
};
pub use progress::{NoOpProgress, ProgressReporter};
pub use report::{RunReport, RunWarning};
pub use source_tree::{RepoLocator, SourceFile, SourceTree};

/// Acquire `config`'s site with every active strategy, using `fetcher` for all network access.
pub async fn fuse_site(
    config: FusionConfig,
    fetcher: std::sync::Arc<dyn Fetcher>,
) -> Result<FusionRun, FusionError> {
    FusionEngine::new(config, fetcher).run().await
}
