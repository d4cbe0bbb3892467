//! Progress reporting abstraction for fusion runs
//!
//! Defines the `ProgressReporter` trait for lifecycle event reporting
//! and provides a no-op implementation for simple use cases.

use crate::probe::StrategyKind;

/// Trait for reporting run progress at key lifecycle events
///
/// Implementations can send updates to channels, log to console, update UI, etc.
/// Probe-level methods are called from the orchestrator's collector loop, never
/// concurrently for the same run.
pub trait ProgressReporter: Send + Sync {
    /// Report that a strategy task has started discovery
    fn report_strategy_started(&self, strategy: StrategyKind);

    /// Report how many URLs a strategy will extract after filtering
    fn report_discovered(&self, strategy: StrategyKind, count: usize);

    /// Report that a page was extracted
    fn report_page_extracted(&self, strategy: StrategyKind, url: &str);

    /// Report that a page or discovery step failed
    fn report_extraction_failed(&self, strategy: StrategyKind, error: &str);

    /// Report that a strategy has finished or been cancelled
    fn report_strategy_finished(&self, strategy: StrategyKind, candidates: usize, cancelled: bool);

    /// Report that a post-acquisition stage (merge, hierarchy, links, assets) has started
    fn report_stage(&self, stage: &str);

    /// Report that the run has produced its document tree
    fn report_completed(&self, pages: usize);
}

/// Progress reporter that does nothing
///
/// The default for `FusionEngine`. All methods are no-ops and will be
/// inlined away by the compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {
    #[inline(always)]
    fn report_strategy_started(&self, _strategy: StrategyKind) {}

    #[inline(always)]
    fn report_discovered(&self, _strategy: StrategyKind, _count: usize) {}

    #[inline(always)]
    fn report_page_extracted(&self, _strategy: StrategyKind, _url: &str) {}

    #[inline(always)]
    fn report_extraction_failed(&self, _strategy: StrategyKind, _error: &str) {}

    #[inline(always)]
    fn report_strategy_finished(&self, _strategy: StrategyKind, _candidates: usize, _cancelled: bool) {}

    #[inline(always)]
    fn report_stage(&self, _stage: &str) {}

    #[inline(always)]
    fn report_completed(&self, _pages: usize) {}
}
