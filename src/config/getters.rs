//! Getter methods for `FusionConfig`
//!
//! This module provides all the accessor methods for retrieving configuration
//! values from a `FusionConfig` instance.

use std::time::Duration;

use super::types::FusionConfig;
use crate::probe::StrategyKind;

impl FusionConfig {
    #[must_use]
    pub fn site_root(&self) -> &str {
        &self.site_root
    }

    #[must_use]
    pub fn enabled_strategies(&self) -> &[StrategyKind] {
        &self.enabled_strategies
    }

    #[must_use]
    pub fn forced_strategy(&self) -> Option<StrategyKind> {
        self.forced_strategy
    }

    /// Strategies a run actually starts: the forced one alone, else every enabled one.
    #[must_use]
    pub fn active_strategies(&self) -> Vec<StrategyKind> {
        match self.forced_strategy {
            Some(forced) => vec![forced],
            None => self.enabled_strategies.clone(),
        }
    }

    #[must_use]
    pub fn section_prefix(&self) -> Option<&str> {
        self.section_prefix.as_deref()
    }

    #[must_use]
    pub fn excluded_patterns(&self) -> Option<&Vec<String>> {
        self.excluded_patterns.as_ref()
    }

    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    #[must_use]
    pub fn conflict_ratio(&self) -> f64 {
        self.conflict_ratio
    }

    #[must_use]
    pub fn placeholder_titles(&self) -> &[String] {
        &self.placeholder_titles
    }

    /// True for empty titles and configured placeholders like "Untitled".
    #[must_use]
    pub fn is_placeholder_title(&self, title: &str) -> bool {
        crate::fusion::title::is_placeholder(title, &self.placeholder_titles)
    }

    #[must_use]
    pub fn max_concurrent_extractions(&self) -> usize {
        self.max_concurrent_extractions
    }

    #[must_use]
    pub fn max_pages_per_strategy(&self) -> Option<usize> {
        self.max_pages_per_strategy
    }

    #[must_use]
    pub fn asset_dir(&self) -> &str {
        &self.asset_dir
    }

    #[must_use]
    pub fn asset_extensions(&self) -> &[String] {
        &self.asset_extensions
    }

    #[must_use]
    pub fn is_asset_extension(&self, extension: &str) -> bool {
        self.asset_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }
}
