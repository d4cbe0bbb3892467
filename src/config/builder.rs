//! Type-safe builder for `FusionConfig` using the typestate pattern
//!
//! This module provides a fluent builder interface with compile-time validation
//! ensuring that the site root is set before building a `FusionConfig`.

use anyhow::{Result, anyhow, bail};
use regex::Regex;
use std::marker::PhantomData;
use std::time::Duration;
use url::Url;

use super::types::FusionConfig;
use crate::probe::StrategyKind;

/// Compile a glob pattern into a regex
///
/// Converts glob patterns (where * matches any sequence) into proper regex patterns.
/// Everything except `*` is matched literally.
///
/// # Errors
///
/// Returns an error if the resulting regex pattern is invalid.
pub(crate) fn compile_glob_pattern(pattern: &str) -> Result<Regex> {
    let regex_pattern = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    // Anchor pattern to match full string
    let anchored = format!("(?i)^{regex_pattern}$");

    Regex::new(&anchored).map_err(|e| anyhow!("Invalid glob pattern '{pattern}': {e}"))
}

/// Split comma-separated pattern lists and drop blanks.
fn split_pattern_list(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .flat_map(|p| p.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

// Type states for the builder
pub struct WithSiteRoot;

pub struct FusionConfigBuilder<State = ()> {
    pub(crate) site_root: Option<String>,
    pub(crate) enabled_strategies: Vec<StrategyKind>,
    pub(crate) forced_strategy: Option<StrategyKind>,
    pub(crate) section_prefix: Option<String>,
    pub(crate) excluded_patterns: Option<Vec<String>>,
    pub(crate) deadline: Duration,
    pub(crate) conflict_ratio: f64,
    pub(crate) placeholder_titles: Vec<String>,
    pub(crate) max_concurrent_extractions: usize,
    pub(crate) max_pages_per_strategy: Option<usize>,
    pub(crate) asset_dir: String,
    pub(crate) asset_extensions: Vec<String>,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for FusionConfigBuilder<()> {
    fn default() -> Self {
        let defaults = FusionConfig::default();
        Self {
            site_root: None,
            enabled_strategies: defaults.enabled_strategies,
            forced_strategy: None,
            section_prefix: None,
            excluded_patterns: None,
            deadline: defaults.deadline,
            conflict_ratio: defaults.conflict_ratio,
            placeholder_titles: defaults.placeholder_titles,
            max_concurrent_extractions: defaults.max_concurrent_extractions,
            max_pages_per_strategy: None,
            asset_dir: defaults.asset_dir,
            asset_extensions: defaults.asset_extensions,
            _phantom: PhantomData,
        }
    }
}

impl FusionConfig {
    /// Create a builder for configuring a `FusionConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> FusionConfigBuilder<()> {
        FusionConfigBuilder::default()
    }
}

impl FusionConfigBuilder<()> {
    pub fn site_root(self, url: impl Into<String>) -> FusionConfigBuilder<WithSiteRoot> {
        let url_string = url.into().trim().to_string();

        // Normalize URL: add https:// if no scheme is present
        let normalized_url =
            if url_string.starts_with("http://") || url_string.starts_with("https://") {
                url_string
            } else {
                format!("https://{url_string}")
            };

        FusionConfigBuilder {
            site_root: Some(normalized_url),
            enabled_strategies: self.enabled_strategies,
            forced_strategy: self.forced_strategy,
            section_prefix: self.section_prefix,
            excluded_patterns: self.excluded_patterns,
            deadline: self.deadline,
            conflict_ratio: self.conflict_ratio,
            placeholder_titles: self.placeholder_titles,
            max_concurrent_extractions: self.max_concurrent_extractions,
            max_pages_per_strategy: self.max_pages_per_strategy,
            asset_dir: self.asset_dir,
            asset_extensions: self.asset_extensions,
            _phantom: PhantomData,
        }
    }
}

// Build method only available when the site root is set
impl FusionConfigBuilder<WithSiteRoot> {
    pub fn build(self) -> Result<FusionConfig> {
        let site_root = self
            .site_root
            .ok_or_else(|| anyhow!("site_root is required"))?;
        let parsed =
            Url::parse(&site_root).map_err(|e| anyhow!("Invalid site root '{site_root}': {e}"))?;
        if parsed.host_str().is_none() {
            bail!("Site root '{site_root}' has no host");
        }

        if self.enabled_strategies.is_empty() && self.forced_strategy.is_none() {
            bail!("At least one strategy must be enabled");
        }
        if !self.conflict_ratio.is_finite() || self.conflict_ratio < 1.0 {
            bail!(
                "conflict_ratio must be a finite value >= 1.0, got {}",
                self.conflict_ratio
            );
        }
        if self.max_concurrent_extractions == 0 {
            bail!("max_concurrent_extractions must be at least 1");
        }
        if self.deadline.is_zero() {
            bail!("deadline must be greater than zero");
        }
        if self.asset_dir.trim().is_empty() || self.asset_dir.contains("..") {
            bail!("asset_dir must be a non-empty relative directory name");
        }

        // Compile excluded patterns once at config creation
        let excluded_patterns = self.excluded_patterns.map(|p| split_pattern_list(&p));
        let excluded_patterns_compiled = if let Some(ref patterns) = excluded_patterns {
            patterns
                .iter()
                .map(|p| compile_glob_pattern(p))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let mut enabled_strategies = Vec::new();
        for strategy in self.enabled_strategies {
            if !enabled_strategies.contains(&strategy) {
                enabled_strategies.push(strategy);
            }
        }

        Ok(FusionConfig {
            site_root,
            enabled_strategies,
            forced_strategy: self.forced_strategy,
            section_prefix: self
                .section_prefix
                .map(|p| p.trim().trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            excluded_patterns,
            excluded_patterns_compiled,
            deadline: self.deadline,
            conflict_ratio: self.conflict_ratio,
            placeholder_titles: self
                .placeholder_titles
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
            max_concurrent_extractions: self.max_concurrent_extractions,
            max_pages_per_strategy: self.max_pages_per_strategy,
            asset_dir: self.asset_dir.trim().trim_matches('/').to_string(),
            asset_extensions: self
                .asset_extensions
                .into_iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        })
    }
}
