//! YAML DSL schema types with serde deserialization.
//!
//! Defines the rule document hierarchy:
//! - `RuleEnvelope`: lightweight first-pass header (apiVersion, kind, metadata)
//! - `RuleDocument`: enum dispatching to kind-specific types
//!
//! New rule kinds are added as `RuleDocument` variants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Rule kind enum ──────────────────────────────────────────────────

/// Supported rule kinds for two-pass deserialization dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    ScoringConfig,
    CodeSetConfig,
    PatternConfig,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::ScoringConfig => write!(f, "ScoringConfig"),
            RuleKind::CodeSetConfig => write!(f, "CodeSetConfig"),
            RuleKind::PatternConfig => write!(f, "PatternConfig"),
        }
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ScoringConfig" => Ok(RuleKind::ScoringConfig),
            "CodeSetConfig" => Ok(RuleKind::CodeSetConfig),
            "PatternConfig" => Ok(RuleKind::PatternConfig),
            other => Err(format!("unknown rule kind: '{}'", other)),
        }
    }
}

// ── Common metadata ─────────────────────────────────────────────────

/// Metadata shared by every rule document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommonMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Parent rule ID for inheritance. The loader deep-merges the parent's
    /// spec into this rule, with child fields taking precedence.
    #[serde(default)]
    pub extends: Option<String>,
}

fn default_true() -> bool {
    true
}

// ── Rule envelope (first-pass) ──────────────────────────────────────

/// Lightweight first-pass deserializer that reads only the header fields.
///
/// Used during two-pass loading: first extract `kind` to determine the
/// concrete type, then deserialize the full document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEnvelope {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    /// Remaining fields captured as raw YAML for second-pass deserialization.
    #[serde(flatten)]
    pub rest: serde_yaml::Value,
}

impl RuleEnvelope {
    /// Parse the `kind` field into a typed [`RuleKind`].
    pub fn rule_kind(&self) -> std::result::Result<RuleKind, String> {
        self.kind.parse()
    }

    /// Two-pass: reconstruct the full YAML and deserialize into the concrete type.
    pub fn parse_full(&self) -> std::result::Result<RuleDocument, String> {
        let yaml = serde_yaml::to_string(self).map_err(|e| e.to_string())?;
        match self.rule_kind()? {
            RuleKind::ScoringConfig => {
                let rule: crate::scoring_config::ScoringConfigRule =
                    serde_yaml::from_str(&yaml).map_err(|e| e.to_string())?;
                Ok(RuleDocument::ScoringConfig(rule))
            }
            RuleKind::CodeSetConfig => {
                let rule: crate::code_sets::CodeSetConfigRule =
                    serde_yaml::from_str(&yaml).map_err(|e| e.to_string())?;
                Ok(RuleDocument::CodeSetConfig(rule))
            }
            RuleKind::PatternConfig => {
                let rule: crate::pattern_config::PatternConfigRule =
                    serde_yaml::from_str(&yaml).map_err(|e| e.to_string())?;
                Ok(RuleDocument::PatternConfig(rule))
            }
        }
    }
}

// ── Rule document (multi-kind container) ────────────────────────────

/// A fully deserialized rule of any supported kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleDocument {
    /// Scoring config — fusion weights, risk thresholds, recommendation bands.
    ScoringConfig(crate::scoring_config::ScoringConfigRule),
    /// Code set config — E/M hierarchies, bundles, holidays, reference sets.
    CodeSetConfig(crate::code_sets::CodeSetConfigRule),
    /// Pattern config — provider behavior thresholds and service limits.
    PatternConfig(crate::pattern_config::PatternConfigRule),
}

impl RuleDocument {
    /// Get the rule's metadata regardless of kind.
    pub fn metadata(&self) -> &CommonMetadata {
        match self {
            RuleDocument::ScoringConfig(rule) => &rule.metadata,
            RuleDocument::CodeSetConfig(rule) => &rule.metadata,
            RuleDocument::PatternConfig(rule) => &rule.metadata,
        }
    }

    /// Get the rule kind.
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleDocument::ScoringConfig(_) => RuleKind::ScoringConfig,
            RuleDocument::CodeSetConfig(_) => RuleKind::CodeSetConfig,
            RuleDocument::PatternConfig(_) => RuleKind::PatternConfig,
        }
    }

    /// Try to extract as a `ScoringConfigRule` reference.
    pub fn as_scoring_config(&self) -> Option<&crate::scoring_config::ScoringConfigRule> {
        match self {
            RuleDocument::ScoringConfig(rule) => Some(rule),
            _ => None,
        }
    }

    /// Try to extract as a `CodeSetConfigRule` reference.
    pub fn as_code_set_config(&self) -> Option<&crate::code_sets::CodeSetConfigRule> {
        match self {
            RuleDocument::CodeSetConfig(rule) => Some(rule),
            _ => None,
        }
    }

    /// Try to extract as a `PatternConfigRule` reference.
    pub fn as_pattern_config(&self) -> Option<&crate::pattern_config::PatternConfigRule> {
        match self {
            RuleDocument::PatternConfig(rule) => Some(rule),
            _ => None,
        }
    }
}
