//! Weighted risk fusion.
//!
//! Combines flag contributions, claim characteristics, provider behavior,
//! and member history into one calibrated risk score, then derives the risk
//! level and routing recommendation. The fused score is monotonically
//! non-decreasing as positive-contribution flags are added.

use serde::{Deserialize, Serialize};
use tracing::debug;

use clearclaim_rules::scoring_config::CompiledScoringConfig;

use crate::detectors::patterns::ProviderBehaviorScore;
use crate::features::ClaimFeatures;
use crate::types::{FlagType, FwaFlag, Recommendation, RiskLevel, Severity};

/// Upper bound on the complexity-driven score correction.
const MAX_ML_ADJUSTMENT: f64 = 0.1;

/// Adjustment earned per procedure or diagnosis code on the claim.
const ML_ADJUSTMENT_PER_CODE: f64 = 0.005;

/// Component breakdown of one fused score, kept for explainability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub flag_score: f64,
    pub claim_score: f64,
    pub provider_score: f64,
    pub member_score: f64,
    pub ml_adjustment: f64,
    pub final_score: f64,
}

/// Fuses all signals into one score, level, and recommendation.
#[derive(Debug, Clone)]
pub struct FwaRiskScorer {
    config: CompiledScoringConfig,
}

impl FwaRiskScorer {
    pub fn new(config: CompiledScoringConfig) -> Self {
        Self { config }
    }

    /// Full weighted fusion.
    pub fn score(
        &self,
        features: &ClaimFeatures,
        flags: &[FwaFlag],
        provider_behavior: Option<&ProviderBehaviorScore>,
    ) -> (ScoreBreakdown, RiskLevel, Recommendation) {
        let flag_score = capped_flag_sum(flags);
        let claim_score = claim_characteristics_score(features);
        let provider_score = provider_behavior
            .map(|b| b.overall)
            .unwrap_or_else(|| provider_fallback_score(features));
        let member_score = member_score(features);

        let w = &self.config.fusion_weights;
        let combined = flag_score * w.flags
            + claim_score * w.claim
            + provider_score * w.provider
            + member_score * w.member;

        let ml_adjustment = ml_adjustment(features);
        let final_score = (combined * (1.0 + ml_adjustment)).min(1.0);

        let risk_level = RiskLevel::from_score(final_score, &self.config.risk_thresholds);
        let recommendation = self.recommendation(final_score, flags);

        debug!(
            claim_id = %features.claim_id,
            flag_score,
            claim_score,
            provider_score,
            member_score,
            final_score,
            "risk fused"
        );

        (
            ScoreBreakdown {
                flag_score,
                claim_score,
                provider_score,
                member_score,
                ml_adjustment,
                final_score,
            },
            risk_level,
            recommendation,
        )
    }

    /// Flags-only scoring for the skip-ML path: the capped flag sum is the
    /// score, and the recommendation derives purely from flag severities.
    pub fn flags_only(&self, flags: &[FwaFlag]) -> (f64, RiskLevel, Recommendation) {
        let score = capped_flag_sum(flags);
        let risk_level = RiskLevel::from_score(score, &self.config.risk_thresholds);

        let max_severity = flags.iter().map(|f| f.severity).max();
        let recommendation = match max_severity {
            Some(Severity::Critical) => Recommendation::Deny,
            Some(Severity::High) => Recommendation::Investigate,
            Some(Severity::Medium) => Recommendation::Review,
            Some(Severity::Low) | None => Recommendation::Approve,
        };

        (score, risk_level, recommendation)
    }

    /// Recommendation precedence: critical flags or a deny-band score first,
    /// then duplicates and the investigate band, then the review band.
    fn recommendation(&self, score: f64, flags: &[FwaFlag]) -> Recommendation {
        let t = &self.config.recommendation_thresholds;
        let has_critical = flags.iter().any(|f| f.severity == Severity::Critical);
        let critical_provider = flags
            .iter()
            .any(|f| f.severity == Severity::Critical && f.flag_type == FlagType::ProviderBehavior);
        let has_duplicate = flags.iter().any(|f| f.flag_type == FlagType::DuplicateClaim);

        if has_critical || score >= t.deny {
            if critical_provider {
                Recommendation::SuspendProvider
            } else {
                Recommendation::Deny
            }
        } else if score >= t.investigate || has_duplicate {
            Recommendation::Investigate
        } else if score >= t.review {
            Recommendation::Review
        } else {
            Recommendation::Approve
        }
    }
}

/// Sum of flag contributions, capped at 1.
fn capped_flag_sum(flags: &[FwaFlag]) -> f64 {
    flags
        .iter()
        .map(|f| f.score_contribution)
        .sum::<f64>()
        .min(1.0)
}

/// Intrinsic riskiness of the claim itself: charge magnitude, procedure
/// volume, temporal placement, and high-value procedures.
fn claim_characteristics_score(features: &ClaimFeatures) -> f64 {
    let mut score = (features.total_charged / 20_000.0).min(0.4);
    score += (features.num_procedures as f64 / 20.0).min(0.2);
    if features.is_weekend {
        score += 0.1;
    }
    if features.is_holiday {
        score += 0.1;
    }
    if features.has_high_value_procedure {
        score += 0.2;
    }
    score.clamp(0.0, 1.0)
}

/// Provider risk from supplied aggregates when no behavior analysis ran.
fn provider_fallback_score(features: &ClaimFeatures) -> f64 {
    let denial = (features.provider_denial_rate * 2.0).min(1.0);
    let specialty = features.provider_specialty_risk.clamp(0.0, 1.0);
    denial * 0.6 + specialty * 0.4
}

/// Member risk from trailing-window aggregates.
fn member_score(features: &ClaimFeatures) -> f64 {
    let frequency = (features.member_claims_30d as f64 / 15.0).min(1.0);
    let charges = (features.member_charges_30d / 20_000.0).min(1.0);
    frequency * 0.7 + charges * 0.3
}

/// Small bounded correction from claim complexity.
fn ml_adjustment(features: &ClaimFeatures) -> f64 {
    let complexity = (features.num_procedures + features.num_diagnoses) as f64;
    (complexity * ML_ADJUSTMENT_PER_CODE).min(MAX_ML_ADJUSTMENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clearclaim_core::ClaimRecord;
    use clearclaim_rules::RuleSet;

    fn scorer() -> FwaRiskScorer {
        FwaRiskScorer::new(RuleSet::embedded().unwrap().scoring)
    }

    fn features_for(claim: &ClaimRecord) -> ClaimFeatures {
        let engineer =
            crate::features::FeatureEngineer::new(RuleSet::embedded().unwrap().code_sets);
        engineer.engineer(claim, None, None)
    }

    fn plain_features() -> ClaimFeatures {
        let claim = ClaimRecord::new(
            "C1",
            "M1",
            "P1",
            NaiveDate::from_ymd_opt(2024, 3, 13).unwrap(),
        )
        .with_charge(200.0)
        .with_procedures(["99213"]);
        features_for(&claim)
    }

    fn flag(contribution: f64, severity: Severity) -> FwaFlag {
        FwaFlag::new(FlagType::HighDollar, severity, "test flag", contribution, "t-1")
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let scorer = scorer();
        let features = plain_features();

        let heavy: Vec<FwaFlag> = (0..10).map(|_| flag(0.9, Severity::High)).collect();
        let (breakdown, _, _) = scorer.score(&features, &heavy, None);
        assert!(breakdown.final_score <= 1.0);
        assert!(breakdown.final_score >= 0.0);
        assert_eq!(breakdown.flag_score, 1.0);
    }

    #[test]
    fn adding_flags_never_lowers_the_score() {
        let scorer = scorer();
        let features = plain_features();

        let mut flags: Vec<FwaFlag> = Vec::new();
        let mut previous = 0.0;
        for _ in 0..8 {
            flags.push(flag(0.2, Severity::Medium));
            let (breakdown, _, _) = scorer.score(&features, &flags, None);
            assert!(
                breakdown.final_score >= previous,
                "score dropped from {} to {}",
                previous,
                breakdown.final_score
            );
            previous = breakdown.final_score;
        }
    }

    #[test]
    fn clean_claim_approves() {
        let scorer = scorer();
        let (breakdown, level, recommendation) = scorer.score(&plain_features(), &[], None);
        assert!(breakdown.final_score < 0.3);
        assert_eq!(level, RiskLevel::Low);
        assert_eq!(recommendation, Recommendation::Approve);
    }

    #[test]
    fn critical_flag_forces_deny() {
        let scorer = scorer();
        let flags = vec![flag(0.1, Severity::Critical)];
        let (_, _, recommendation) = scorer.score(&plain_features(), &flags, None);
        assert_eq!(recommendation, Recommendation::Deny);
    }

    #[test]
    fn duplicate_flag_forces_investigate() {
        let scorer = scorer();
        let flags = vec![FwaFlag::new(
            FlagType::DuplicateClaim,
            Severity::Medium,
            "possible duplicate",
            0.1,
            "dup-1",
        )];
        let (_, _, recommendation) = scorer.score(&plain_features(), &flags, None);
        assert_eq!(recommendation, Recommendation::Investigate);
    }

    #[test]
    fn critical_provider_behavior_suspends() {
        let scorer = scorer();
        let flags = vec![FwaFlag::new(
            FlagType::ProviderBehavior,
            Severity::Critical,
            "critical provider behavior",
            0.5,
            "pb-1",
        )];
        let (_, _, recommendation) = scorer.score(&plain_features(), &flags, None);
        assert_eq!(recommendation, Recommendation::SuspendProvider);
    }

    #[test]
    fn provider_behavior_feeds_provider_component() {
        let scorer = scorer();
        let features = plain_features();

        let behavior = ProviderBehaviorScore {
            provider_id: "P1".to_string(),
            overall: 1.0,
            volume_score: 1.0,
            denial_score: 1.0,
            peer_score: 1.0,
            temporal_score: 1.0,
            risk_level: RiskLevel::Critical,
            findings: vec![],
            claims_analyzed: 50,
        };

        let (without, _, _) = scorer.score(&features, &[], None);
        let (with, _, _) = scorer.score(&features, &[], Some(&behavior));
        assert!(with.final_score > without.final_score);
        assert_eq!(with.provider_score, 1.0);
    }

    #[test]
    fn flags_only_thresholds() {
        let scorer = scorer();

        let (score, level, recommendation) = scorer.flags_only(&[]);
        assert_eq!(score, 0.0);
        assert_eq!(level, RiskLevel::Low);
        assert_eq!(recommendation, Recommendation::Approve);

        // Exactly at the medium boundary.
        let (score, level, recommendation) =
            scorer.flags_only(&[flag(0.3, Severity::Medium)]);
        assert_eq!(score, 0.3);
        assert_eq!(level, RiskLevel::Medium);
        assert_eq!(recommendation, Recommendation::Review);

        // Exactly at the high boundary.
        let (score, level, _) = scorer.flags_only(&[
            flag(0.3, Severity::Medium),
            flag(0.3, Severity::Medium),
        ]);
        assert_eq!(score, 0.6);
        assert_eq!(level, RiskLevel::High);

        // Exactly at the critical boundary.
        let (score, level, _) = scorer.flags_only(&[
            flag(0.4, Severity::Medium),
            flag(0.4, Severity::Medium),
        ]);
        assert_eq!(score, 0.8);
        assert_eq!(level, RiskLevel::Critical);

        let (_, _, recommendation) = scorer.flags_only(&[flag(0.2, Severity::Critical)]);
        assert_eq!(recommendation, Recommendation::Deny);

        let (_, _, recommendation) = scorer.flags_only(&[flag(0.2, Severity::High)]);
        assert_eq!(recommendation, Recommendation::Investigate);
    }

    #[test]
    fn ml_adjustment_is_bounded() {
        let claim = ClaimRecord::new(
            "C1",
            "M1",
            "P1",
            NaiveDate::from_ymd_opt(2024, 3, 13).unwrap(),
        )
        .with_charge(200.0)
        .with_procedures((0..50).map(|i| format!("9{:04}", i)))
        .with_diagnoses((0..50).map(|i| format!("D{:02}", i)));

        let features = features_for(&claim);
        assert_eq!(ml_adjustment(&features), MAX_ML_ADJUSTMENT);
    }
}
