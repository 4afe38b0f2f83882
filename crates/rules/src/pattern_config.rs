//! PatternConfig rule kind — provider behavior thresholds, daily volume
//! ceilings, rolling-window service limits, and heuristic cutoffs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::schema::CommonMetadata;

// ── YAML-level types ────────────────────────────────────────────────

/// Top-level PatternConfig rule document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PatternConfigRule {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    pub spec: PatternConfigSpec,
}

/// Specification section of a PatternConfig rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PatternConfigSpec {
    /// Unique patients a provider can plausibly see in one day.
    pub max_patients_per_day: u32,
    /// Procedures a provider can plausibly perform in one day.
    pub max_procedures_per_day: u32,
    /// Peer benchmark denial rate; flagged above 2x this value.
    pub peer_denial_rate: f64,
    /// Peer benchmark average claim amount; flagged above 2x this value.
    pub peer_avg_charge: f64,
    /// Weekend-claim ratio above which temporal scoring triggers.
    pub weekend_ratio_threshold: f64,
    /// Rolling window length for frequency checks, in days.
    pub window_days: i64,
    /// Per-category service occurrence limits within the rolling window.
    pub service_limits: HashMap<String, u32>,
    /// Weights for the four behavior sub-scores (must sum to ~1.0).
    pub behavior_weights: BehaviorWeights,
    /// Ascending boundaries bucketing the overall behavior score.
    pub behavior_thresholds: BehaviorThresholds,
    /// Unconditional claim heuristics applied by the orchestrator.
    pub heuristics: HeuristicThresholds,
}

/// Weights for billing-volume, denial, peer-comparison, temporal sub-scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BehaviorWeights {
    pub volume: f64,
    pub denial: f64,
    pub peer: f64,
    pub temporal: f64,
}

/// Bucket boundaries for the overall behavior score (descending checks).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BehaviorThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

/// Cutoffs for the orchestrator's unconditional checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HeuristicThresholds {
    /// Total charge above which a high-dollar flag is raised.
    pub high_dollar_threshold: f64,
    /// Procedure count per claim above which a flag is raised.
    pub max_procedures_per_claim: usize,
}

// ── Compiled (hot-path) types ───────────────────────────────────────

/// Pre-compiled pattern config — spec fields are already typed.
pub type CompiledPatternConfig = PatternConfigSpec;

impl PatternConfigRule {
    /// Compile the YAML config (trivial — spec is already typed).
    pub fn compile(&self) -> CompiledPatternConfig {
        self.spec.clone()
    }
}

impl PatternConfigSpec {
    /// Structural validation: positive ceilings, weights sum to 1,
    /// descending bucket boundaries.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_patients_per_day == 0 || self.max_procedures_per_day == 0 {
            return Err("daily ceilings must be positive".to_string());
        }
        if self.window_days <= 0 {
            return Err(format!("window_days must be positive, got {}", self.window_days));
        }

        let w = &self.behavior_weights;
        let sum = w.volume + w.denial + w.peer + w.temporal;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("behavior weights must sum to 1.0, got {}", sum));
        }

        let t = &self.behavior_thresholds;
        if !(t.critical > t.high && t.high > t.medium && t.medium > 0.0) {
            return Err(format!(
                "behavior thresholds must be descending: {}/{}/{}",
                t.critical, t.high, t.medium
            ));
        }

        Ok(())
    }
}
