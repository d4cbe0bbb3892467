//! Error types for fusion runs.
//!
//! [`FusionError`] is the only error a run returns. Everything that goes wrong
//! for a single strategy or page is a [`ProbeError`], collected into the run
//! report instead of aborting the run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canonical::NormalizeError;
use crate::fetch::FetchError;
use crate::probe::StrategyKind;

/// Fatal errors that abort a run or reject a configuration.
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    InvalidUrl(#[from] NormalizeError),

    #[error("All enabled strategies produced zero candidates ({})", join_strategies(.strategies))]
    AllStrategiesEmpty { strategies: Vec<StrategyKind> },
}

impl From<anyhow::Error> for FusionError {
    fn from(err: anyhow::Error) -> Self {
        FusionError::Config(format!("{err:#}"))
    }
}

/// Non-fatal failure of one strategy or one page.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ProbeError {
    #[error("{strategy} discovery unavailable: {reason}")]
    DiscoveryUnavailable {
        strategy: StrategyKind,
        reason: String,
    },

    #[error("Extraction failed for {url}: {reason}")]
    ExtractionFailure { url: String, reason: String },

    #[error(transparent)]
    InvalidUrl(#[from] NormalizeError),

    #[error("{strategy} probe terminated unexpectedly: {reason}")]
    TaskFailed {
        strategy: StrategyKind,
        reason: String,
    },
}

impl ProbeError {
    pub fn unavailable(strategy: StrategyKind, reason: impl Into<String>) -> Self {
        ProbeError::DiscoveryUnavailable {
            strategy,
            reason: reason.into(),
        }
    }

    pub fn extraction(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ProbeError::ExtractionFailure {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap a fetch failure for `url`.
    pub fn fetch(url: impl Into<String>, err: FetchError) -> Self {
        Self::extraction(url, err)
    }

    /// Wrap an internal parsing failure, keeping its context chain.
    pub fn parse(url: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::extraction(url, format!("{err:#}"))
    }
}

fn join_strategies(strategies: &[StrategyKind]) -> String {
    if strategies.is_empty() {
        return "none enabled".to_string();
    }
    strategies
        .iter()
        .map(StrategyKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
