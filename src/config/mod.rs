//! Configuration module for fusion runs
//!
//! This module provides the `FusionConfig` struct and its type-safe builder
//! for configuring acquisition runs with validation and sensible defaults.

// Sub-modules
pub mod builder;
pub mod getters;
pub mod methods;
pub mod types;

// Re-exports for public API
pub use builder::{FusionConfigBuilder, WithSiteRoot};
pub use types::FusionConfig;
