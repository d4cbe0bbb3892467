//! Core configuration types for fusion runs
//!
//! This module contains the main `FusionConfig` struct that defines the
//! parameters of one acquisition run: which site, which strategies, which
//! filters, and the thresholds the merger applies.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::probe::StrategyKind;
use crate::utils::{
    DEFAULT_ASSET_DIR, DEFAULT_ASSET_EXTENSIONS, DEFAULT_CONFLICT_RATIO, DEFAULT_DEADLINE,
    DEFAULT_MAX_CONCURRENT_EXTRACTIONS, DEFAULT_PLACEHOLDER_TITLES,
};

use super::builder::compile_glob_pattern;

/// Main configuration struct for fusion runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Root URL of the documentation site.
    ///
    /// **INVARIANT:** Always an absolute `http(s)` URL (validated in builder).
    pub(crate) site_root: String,

    /// Strategies run concurrently, in declaration order.
    pub(crate) enabled_strategies: Vec<StrategyKind>,

    /// When set, only this strategy runs regardless of `enabled_strategies`.
    pub(crate) forced_strategy: Option<StrategyKind>,

    /// Section-scoped runs keep only pages beneath this path.
    pub(crate) section_prefix: Option<String>,

    pub(crate) excluded_patterns: Option<Vec<String>>,

    /// Compiled regex patterns from `excluded_patterns`
    /// Pre-compiled at config creation so discovery filtering never compiles
    #[serde(skip)]
    pub(crate) excluded_patterns_compiled: Vec<regex::Regex>,

    /// Overall run deadline covering discovery and extraction.
    ///
    /// Default: 300 seconds
    pub(crate) deadline: Duration,

    /// Body-length ratio beyond which two high-quality candidates conflict.
    ///
    /// Default: 2.0
    pub(crate) conflict_ratio: f64,

    /// Titles treated as missing, compared case-insensitively.
    pub(crate) placeholder_titles: Vec<String>,

    /// Maximum page extractions in flight inside one probe.
    /// Default: 8
    pub(crate) max_concurrent_extractions: usize,

    /// Upper bound on pages extracted by one strategy. `None` means unbounded.
    pub(crate) max_pages_per_strategy: Option<usize>,

    /// Directory localized assets are placed in, relative to the output root.
    pub(crate) asset_dir: String,

    /// Extensions that make a plain link an asset reference.
    pub(crate) asset_extensions: Vec<String>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            site_root: String::new(),
            enabled_strategies: StrategyKind::ALL.to_vec(),
            forced_strategy: None,
            section_prefix: None,
            excluded_patterns: None,
            excluded_patterns_compiled: Vec::new(),
            deadline: DEFAULT_DEADLINE,
            conflict_ratio: DEFAULT_CONFLICT_RATIO,
            placeholder_titles: DEFAULT_PLACEHOLDER_TITLES
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
            max_concurrent_extractions: DEFAULT_MAX_CONCURRENT_EXTRACTIONS,
            max_pages_per_strategy: None,
            asset_dir: DEFAULT_ASSET_DIR.to_string(),
            asset_extensions: DEFAULT_ASSET_EXTENSIONS
                .iter()
                .map(|e| (*e).to_string())
                .collect(),
        }
    }
}

impl FusionConfig {
    /// Get the pre-compiled excluded patterns
    ///
    /// These patterns are compiled once at config creation time.
    /// A deserialized config has none until [`FusionConfig::recompile_patterns`] runs.
    #[must_use]
    pub fn excluded_patterns_compiled(&self) -> &[regex::Regex] {
        &self.excluded_patterns_compiled
    }

    /// Compile `excluded_patterns` again, e.g. after deserializing.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern does not compile.
    pub fn recompile_patterns(mut self) -> anyhow::Result<Self> {
        self.excluded_patterns_compiled = match &self.excluded_patterns {
            Some(patterns) => patterns
                .iter()
                .map(|p| compile_glob_pattern(p))
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(self)
    }
}
