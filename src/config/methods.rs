//! Builder methods available for all states
//!
//! This module contains methods that can be called on the builder
//! regardless of its current type state.

use std::time::Duration;

use super::builder::FusionConfigBuilder;
use crate::probe::StrategyKind;

impl<State> FusionConfigBuilder<State> {
    /// Replace the set of strategies run concurrently.
    #[must_use]
    pub fn enabled_strategies(mut self, strategies: impl IntoIterator<Item = StrategyKind>) -> Self {
        self.enabled_strategies = strategies.into_iter().collect();
        self
    }

    /// Run exactly one strategy, ignoring the enabled set.
    ///
    /// # Example
    /// ```rust
    /// # use docfusion::config::FusionConfig;
    /// # use docfusion::probe::StrategyKind;
    /// # fn main() -> anyhow::Result<()> {
    /// let config = FusionConfig::builder()
    ///     .site_root("https://docs.example.com")
    ///     .forced_strategy(Some(StrategyKind::Sitemap))
    ///     .build()?;
    /// assert_eq!(config.active_strategies(), vec![StrategyKind::Sitemap]);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn forced_strategy(mut self, strategy: Option<StrategyKind>) -> Self {
        self.forced_strategy = strategy;
        self
    }

    /// Keep only pages under this path, relative to the site root (e.g. `"api"`).
    #[must_use]
    pub fn section_prefix(mut self, prefix: Option<String>) -> Self {
        self.section_prefix = prefix;
        self
    }

    /// Glob patterns (`*` wildcard) matched against canonical keys and paths.
    /// Entries may themselves be comma-separated lists.
    #[must_use]
    pub fn excluded_patterns(mut self, patterns: Option<Vec<String>>) -> Self {
        self.excluded_patterns = patterns;
        self
    }

    #[must_use]
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn conflict_ratio(mut self, ratio: f64) -> Self {
        self.conflict_ratio = ratio;
        self
    }

    #[must_use]
    pub fn placeholder_titles(mut self, titles: Vec<String>) -> Self {
        self.placeholder_titles = titles;
        self
    }

    #[must_use]
    pub fn max_concurrent_extractions(mut self, max: usize) -> Self {
        self.max_concurrent_extractions = max;
        self
    }

    #[must_use]
    pub fn max_pages_per_strategy(mut self, max: Option<usize>) -> Self {
        self.max_pages_per_strategy = max;
        self
    }

    #[must_use]
    pub fn asset_dir(mut self, dir: impl Into<String>) -> Self {
        self.asset_dir = dir.into();
        self
    }

    #[must_use]
    pub fn asset_extensions(mut self, extensions: Vec<String>) -> Self {
        self.asset_extensions = extensions;
        self
    }
}
