//! FWA reference-table and scoring-config rule documents.
//!
//! This crate provides:
//! - YAML-based rule definition with serde deserialization
//! - Scoring weights, risk thresholds, and recommendation boundaries
//! - Medical code reference tables (E/M hierarchies, bundles, holidays)
//! - Provider pattern-analysis thresholds
//! - Filesystem loader with `extends` inheritance
//! - Compiled defaults embedded from `data/rules/fwa/`

pub mod code_sets;
pub mod loader;
pub mod pattern_config;
pub mod ruleset;
pub mod schema;
pub mod scoring_config;

pub use ruleset::RuleSet;
