//! Engine result types: anomaly scores, discrete flags, and the per-claim
//! verdict. All detector and action types are closed enums with exhaustive
//! handling; no string-keyed dispatch.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use clearclaim_core::ClaimId;
use clearclaim_rules::scoring_config::RiskThresholds;

use crate::detectors::duplicate::DuplicateCheck;
use crate::detectors::patterns::{PatternAnomaly, ProviderBehaviorScore};
use crate::detectors::unbundling::UnbundlingCheck;
use crate::detectors::upcoding::UpcodingCheck;

// ── Anomaly model output ────────────────────────────────────────────

/// Category tag attached to an anomaly signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyCategory {
    Cost,
    Billing,
    Timing,
    Frequency,
    Provider,
}

impl std::fmt::Display for AnomalyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyCategory::Cost => write!(f, "Cost"),
            AnomalyCategory::Billing => write!(f, "Billing"),
            AnomalyCategory::Timing => write!(f, "Timing"),
            AnomalyCategory::Frequency => write!(f, "Frequency"),
            AnomalyCategory::Provider => write!(f, "Provider"),
        }
    }
}

/// Output of an anomaly model for one claim. `anomaly_score` is always in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub claim_id: ClaimId,
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    pub category: Option<AnomalyCategory>,
    pub confidence: f64,
    pub contributing_factors: Vec<String>,
    pub explanation: String,
}

impl AnomalyScore {
    /// Safe neutral score for models that have not been fitted yet. Online
    /// callers may invoke detection before training history exists.
    pub fn neutral(claim_id: impl Into<ClaimId>) -> Self {
        Self {
            claim_id: claim_id.into(),
            is_anomaly: false,
            anomaly_score: 0.5,
            category: None,
            confidence: 0.0,
            contributing_factors: Vec::new(),
            explanation: "model not fitted; neutral score".to_string(),
        }
    }
}

// ── Flags ───────────────────────────────────────────────────────────

/// Discrete rule triggers accumulated into a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagType {
    DuplicateClaim,
    Upcoding,
    Unbundling,
    ImpossibleDay,
    ExcessiveServices,
    ProviderBehavior,
    HighDollar,
    WeekendService,
    HighProcedureCount,
    MlAnomaly,
    StatisticalAnomaly,
}

impl std::fmt::Display for FlagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagType::DuplicateClaim => write!(f, "DuplicateClaim"),
            FlagType::Upcoding => write!(f, "Upcoding"),
            FlagType::Unbundling => write!(f, "Unbundling"),
            FlagType::ImpossibleDay => write!(f, "ImpossibleDay"),
            FlagType::ExcessiveServices => write!(f, "ExcessiveServices"),
            FlagType::ProviderBehavior => write!(f, "ProviderBehavior"),
            FlagType::HighDollar => write!(f, "HighDollar"),
            FlagType::WeekendService => write!(f, "WeekendService"),
            FlagType::HighProcedureCount => write!(f, "HighProcedureCount"),
            FlagType::MlAnomaly => write!(f, "MlAnomaly"),
            FlagType::StatisticalAnomaly => write!(f, "StatisticalAnomaly"),
        }
    }
}

/// Flag severity, ordered Low < Medium < High < Critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A single rule trigger. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FwaFlag {
    pub flag_type: FlagType,
    pub severity: Severity,
    pub description: String,
    /// Bounded contribution to the fused flag score, in [0, 1].
    pub score_contribution: f64,
    /// Structured evidence payload for reviewers.
    pub evidence: serde_json::Value,
    pub rule_id: String,
}

impl FwaFlag {
    pub fn new(
        flag_type: FlagType,
        severity: Severity,
        description: impl Into<String>,
        score_contribution: f64,
        rule_id: impl Into<String>,
    ) -> Self {
        Self {
            flag_type,
            severity,
            description: description.into(),
            score_contribution: score_contribution.clamp(0.0, 1.0),
            evidence: serde_json::Value::Null,
            rule_id: rule_id.into(),
        }
    }

    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = evidence;
        self
    }
}

// ── Risk level and recommendation ───────────────────────────────────

/// Bucketed risk level for a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a score with exclusive upper boundaries: `score < medium` is
    /// Low, `score < high` is Medium, `score < critical` is High, else
    /// Critical. The same convention applies everywhere a score is bucketed.
    pub fn from_score(score: f64, thresholds: &RiskThresholds) -> Self {
        if score < thresholds.medium {
            RiskLevel::Low
        } else if score < thresholds.high {
            RiskLevel::Medium
        } else if score < thresholds.critical {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::High => write!(f, "High"),
            RiskLevel::Critical => write!(f, "Critical"),
        }
    }
}

/// Routing decision attached to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recommendation {
    Approve,
    Review,
    Investigate,
    Deny,
    SuspendProvider,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::Approve => write!(f, "Approve"),
            Recommendation::Review => write!(f, "Review"),
            Recommendation::Investigate => write!(f, "Investigate"),
            Recommendation::Deny => write!(f, "Deny"),
            Recommendation::SuspendProvider => write!(f, "SuspendProvider"),
        }
    }
}

// ── Consolidated result ─────────────────────────────────────────────

/// The per-claim verdict. Built once per `analyze_claim` call; serialized
/// for API and storage by an external layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FwaResult {
    pub claim_id: ClaimId,
    /// Unique id for this analysis run.
    pub analysis_id: Uuid,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub recommendation: Recommendation,
    pub flags: Vec<FwaFlag>,
    pub duplicate: Option<DuplicateCheck>,
    pub upcoding: Option<UpcodingCheck>,
    pub unbundling: Option<UnbundlingCheck>,
    pub pattern_anomalies: Vec<PatternAnomaly>,
    pub provider_behavior: Option<ProviderBehaviorScore>,
    pub ml_score: Option<AnomalyScore>,
    pub statistical_score: Option<AnomalyScore>,
    pub rules_evaluated: u32,
    pub processing_time_ms: u64,
    /// Free-text notes, e.g. degraded-analysis explanations.
    pub notes: Vec<String>,
}
