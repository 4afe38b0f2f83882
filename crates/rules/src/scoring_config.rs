//! ScoringConfig rule kind — risk fusion weights, risk-level thresholds,
//! recommendation boundaries, and duplicate similarity bands.

use serde::{Deserialize, Serialize};

use crate::schema::CommonMetadata;

// ── YAML-level types ────────────────────────────────────────────────

/// Top-level ScoringConfig rule document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfigRule {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    pub spec: ScoringConfigSpec,
}

/// Specification section of a ScoringConfig rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfigSpec {
    /// Weights for the four fused score components (must sum to ~1.0).
    pub fusion_weights: FusionWeights,
    /// Ascending risk-level boundaries. Scores below `medium` are Low,
    /// below `high` are Medium, below `critical` are High, else Critical.
    pub risk_thresholds: RiskThresholds,
    /// Score boundaries driving the recommendation ladder.
    pub recommendation_thresholds: RecommendationThresholds,
    /// Similarity bands for duplicate classification.
    pub duplicate_bands: DuplicateBands,
}

/// Weights for flag, claim-characteristic, provider, and member components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FusionWeights {
    pub flags: f64,
    pub claim: f64,
    pub provider: f64,
    pub member: f64,
}

/// Risk-level boundaries, exclusive on the upper side (`score < medium` = Low).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

/// Recommendation boundaries, inclusive (`score >= deny` = Deny).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RecommendationThresholds {
    pub deny: f64,
    pub investigate: f64,
    pub review: f64,
}

/// Duplicate similarity bands. `possible <= sim < definite` marks a possible
/// duplicate; `sim >= definite` marks a duplicate. Mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DuplicateBands {
    pub possible: f64,
    pub definite: f64,
}

// ── Compiled (hot-path) types ───────────────────────────────────────

/// Pre-compiled scoring config — all fields are already typed, no lookup needed.
/// Kept as a separate type for consistency with the compiled pattern.
pub type CompiledScoringConfig = ScoringConfigSpec;

impl ScoringConfigRule {
    /// Compile the YAML config (trivial — spec is already typed).
    pub fn compile(&self) -> CompiledScoringConfig {
        self.spec.clone()
    }
}

impl ScoringConfigSpec {
    /// Structural validation: weights sum to 1, thresholds strictly ascending,
    /// bands ordered, everything inside [0, 1].
    pub fn validate(&self) -> std::result::Result<(), String> {
        let w = &self.fusion_weights;
        let sum = w.flags + w.claim + w.provider + w.member;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("fusion weights must sum to 1.0, got {}", sum));
        }

        let t = &self.risk_thresholds;
        if !(0.0 < t.medium && t.medium < t.high && t.high < t.critical && t.critical <= 1.0) {
            return Err(format!(
                "risk thresholds must be ascending in (0, 1]: {}/{}/{}",
                t.medium, t.high, t.critical
            ));
        }

        let r = &self.recommendation_thresholds;
        if !(0.0 < r.review && r.review < r.investigate && r.investigate < r.deny && r.deny <= 1.0)
        {
            return Err(format!(
                "recommendation thresholds must be ascending in (0, 1]: {}/{}/{}",
                r.review, r.investigate, r.deny
            ));
        }

        let b = &self.duplicate_bands;
        if !(0.0 < b.possible && b.possible < b.definite && b.definite <= 1.0) {
            return Err(format!(
                "duplicate bands must satisfy 0 < possible < definite <= 1: {}/{}",
                b.possible, b.definite
            ));
        }

        Ok(())
    }
}
