//! Fusion of overlapping strategy results.
//!
//! The [`FusionMerger`] turns every strategy's candidates into one page per
//! canonical identity: candidates are grouped by key, groups with matching
//! content are collapsed onto one surviving key, and each field of the
//! surviving page is taken from the most trustworthy candidate that has it.

pub mod content_hash;
pub mod merger;
pub mod title;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::assets::AssetRef;
use crate::canonical::CanonicalKey;
use crate::probe::{ExtractionQuality, NavPosition, StrategyKind};

pub use content_hash::{ContentHash, content_hash};
pub use merger::FusionMerger;

/// One page after fusion. Later stages return new versions rather than mutating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPage {
    pub key: CanonicalKey,
    pub title: String,
    pub body: String,
    /// URL the chosen body was read from.
    pub source_url: String,
    pub source_strategy: StrategyKind,
    pub quality: ExtractionQuality,
    /// Sidebar group the page sits under.
    pub section: Option<String>,
    /// Localized assets in order of first reference.
    pub asset_refs: Vec<AssetRef>,
    pub children: Vec<CanonicalKey>,
    pub parent: Option<CanonicalKey>,
}

/// Structural evidence kept for the hierarchy builder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructuralSignal {
    /// Sidebar position, from the earliest sidebar entry that named the page.
    pub nav: Option<NavPosition>,
    /// Strategies that produced a candidate for the page.
    pub strategies: Vec<StrategyKind>,
}

/// Two high-quality extractions of one page whose lengths disagree too much.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentConflict {
    pub key: CanonicalKey,
    pub kept_strategy: StrategyKind,
    pub kept_len: usize,
    pub dropped_strategy: StrategyKind,
    pub dropped_len: usize,
    pub ratio: f64,
}

/// Output of the merger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedPages {
    pub pages: BTreeMap<CanonicalKey, CanonicalPage>,
    pub structure: BTreeMap<CanonicalKey, StructuralSignal>,
    /// Keys removed by content dedup, mapped to the key that absorbed them.
    pub aliases: BTreeMap<CanonicalKey, CanonicalKey>,
    pub conflicts: Vec<ContentConflict>,
}

impl FusedPages {
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// The surviving key for `key`: itself, or the key that absorbed it.
    #[must_use]
    pub fn resolve<'a>(&'a self, key: &'a CanonicalKey) -> &'a CanonicalKey {
        self.aliases.get(key).unwrap_or(key)
    }
}
