//! Statistical outlier detector.
//!
//! Five independent tests against statistics fitted from historical claims:
//! charge z-score, procedure-count IQR bounds, high-charge weekend service,
//! member 30-day frequency, and provider denial rate. Triggered tests fold
//! into one combined [`AnomalyScore`].

use tracing::{debug, info};

use clearclaim_core::{ClaimRecord, ClearClaimError};

use crate::features::ClaimFeatures;
use crate::stats::FeatureStatistics;
use crate::types::{AnomalyCategory, AnomalyScore};

use super::AnomalyModel;

/// Z-score magnitude above which the charge test triggers.
const DEFAULT_Z_THRESHOLD: f64 = 3.0;

/// IQR multiplier for the procedure-count bounds.
const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

/// Weekend claims charging above this trigger the timing test.
const WEEKEND_CHARGE_THRESHOLD: f64 = 5000.0;

/// Member claims in the trailing 30 days above this trigger the frequency test.
const MEMBER_FREQUENCY_LIMIT: usize = 15;

/// Provider denial rate above this triggers the provider test.
const PROVIDER_DENIAL_LIMIT: f64 = 0.25;

/// Per-feature statistics fitted from historical claim records.
#[derive(Debug, Clone)]
pub struct ClaimPopulationStats {
    pub total_charged: FeatureStatistics,
    pub num_procedures: FeatureStatistics,
    pub num_diagnoses: FeatureStatistics,
    pub charge_per_procedure: FeatureStatistics,
    pub sample_count: usize,
}

/// One triggered statistical test.
#[derive(Debug, Clone)]
pub struct IndividualAnomaly {
    pub category: AnomalyCategory,
    pub score: f64,
    pub confidence: f64,
    pub explanation: String,
}

/// Z-score/IQR based outlier detector with precomputed per-feature
/// statistics, reused for every prediction until refit.
#[derive(Debug, Clone)]
pub struct StatisticalAnomalyModel {
    z_threshold: f64,
    iqr_multiplier: f64,
    fitted: Option<ClaimPopulationStats>,
}

impl Default for StatisticalAnomalyModel {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticalAnomalyModel {
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_Z_THRESHOLD, DEFAULT_IQR_MULTIPLIER)
    }

    pub fn with_thresholds(z_threshold: f64, iqr_multiplier: f64) -> Self {
        Self {
            z_threshold,
            iqr_multiplier,
            fitted: None,
        }
    }

    /// Compute per-feature statistics from historical claim records.
    pub fn fit(&mut self, claims: &[ClaimRecord]) -> Result<(), ClearClaimError> {
        if claims.is_empty() {
            return Err(ClearClaimError::Model(
                "statistical model needs at least one historical claim".to_string(),
            ));
        }

        let charges: Vec<f64> = claims.iter().map(|c| c.total_charged).collect();
        let procedures: Vec<f64> = claims
            .iter()
            .map(|c| c.procedure_codes.len() as f64)
            .collect();
        let diagnoses: Vec<f64> = claims
            .iter()
            .map(|c| c.diagnosis_codes.len() as f64)
            .collect();
        let per_procedure: Vec<f64> = claims
            .iter()
            .map(|c| c.total_charged / c.procedure_codes.len().max(1) as f64)
            .collect();

        self.fitted = Some(ClaimPopulationStats {
            total_charged: FeatureStatistics::from_values(&charges),
            num_procedures: FeatureStatistics::from_values(&procedures),
            num_diagnoses: FeatureStatistics::from_values(&diagnoses),
            charge_per_procedure: FeatureStatistics::from_values(&per_procedure),
            sample_count: claims.len(),
        });

        info!(samples = claims.len(), "statistical model fitted");
        Ok(())
    }

    /// Run every independent test. Returns an empty list when the model has
    /// not been fitted (callers see the neutral score via `predict`).
    pub fn detect_anomalies(&self, features: &ClaimFeatures) -> Vec<IndividualAnomaly> {
        let Some(stats) = self.fitted.as_ref() else {
            return Vec::new();
        };

        let mut anomalies = Vec::new();

        // (a) Charge z-score. Zero-variance history cannot rank the value,
        // so a deviating charge falls back to the neutral 0.5 score.
        if stats.total_charged.is_degenerate() {
            if (features.total_charged - stats.total_charged.mean).abs() > f64::EPSILON {
                anomalies.push(IndividualAnomaly {
                    category: AnomalyCategory::Cost,
                    score: 0.5,
                    confidence: 0.3,
                    explanation: format!(
                        "charge {:.2} deviates from zero-variance history at {:.2}",
                        features.total_charged, stats.total_charged.mean
                    ),
                });
            }
        } else {
            let z = stats.total_charged.z_score(features.total_charged);
            if z.abs() > self.z_threshold {
                anomalies.push(IndividualAnomaly {
                    category: AnomalyCategory::Cost,
                    score: (z.abs() / (2.0 * self.z_threshold)).min(1.0),
                    confidence: (z.abs() / (2.0 * self.z_threshold)).min(1.0),
                    explanation: format!(
                        "total charged {:.2} is {:.1} standard deviations from mean {:.2}",
                        features.total_charged, z, stats.total_charged.mean
                    ),
                });
            }
        }

        // (b) Procedure-count IQR bounds.
        let iqr = stats.num_procedures.iqr();
        let lower = stats.num_procedures.p25 - self.iqr_multiplier * iqr;
        let upper = stats.num_procedures.p75 + self.iqr_multiplier * iqr;
        let procedures = features.num_procedures as f64;
        if procedures < lower || procedures > upper {
            anomalies.push(IndividualAnomaly {
                category: AnomalyCategory::Billing,
                score: 0.6,
                confidence: 0.7,
                explanation: format!(
                    "procedure count {} outside IQR bounds [{:.1}, {:.1}]",
                    features.num_procedures, lower, upper
                ),
            });
        }

        // (c) High-charge weekend service.
        if features.is_weekend && features.total_charged > WEEKEND_CHARGE_THRESHOLD {
            anomalies.push(IndividualAnomaly {
                category: AnomalyCategory::Timing,
                score: 0.5,
                confidence: 0.6,
                explanation: format!(
                    "weekend service charging {:.2}",
                    features.total_charged
                ),
            });
        }

        // (d) Member 30-day frequency.
        if features.member_claims_30d > MEMBER_FREQUENCY_LIMIT {
            anomalies.push(IndividualAnomaly {
                category: AnomalyCategory::Frequency,
                score: 0.55,
                confidence: 0.7,
                explanation: format!(
                    "{} member claims in trailing 30 days (limit {})",
                    features.member_claims_30d, MEMBER_FREQUENCY_LIMIT
                ),
            });
        }

        // (e) Provider denial rate.
        if features.provider_denial_rate > PROVIDER_DENIAL_LIMIT {
            anomalies.push(IndividualAnomaly {
                category: AnomalyCategory::Provider,
                score: 0.6,
                confidence: 0.65,
                explanation: format!(
                    "provider denial rate {:.2} exceeds {:.2}",
                    features.provider_denial_rate, PROVIDER_DENIAL_LIMIT
                ),
            });
        }

        debug!(
            claim_id = %features.claim_id,
            triggered = anomalies.len(),
            "statistical tests evaluated"
        );
        anomalies
    }

    /// Statistics from the last fit, exposed for reporting alongside
    /// predictions.
    pub fn population_stats(&self) -> Option<&ClaimPopulationStats> {
        self.fitted.as_ref()
    }
}

impl AnomalyModel for StatisticalAnomalyModel {
    /// Fold all triggered tests into one score: `min(1, sum/2)` combined
    /// score, mean confidence, the highest-scoring test's category, and up
    /// to three explanations.
    fn predict(&self, features: &ClaimFeatures) -> AnomalyScore {
        if self.fitted.is_none() {
            return AnomalyScore::neutral(features.claim_id.clone());
        }

        let anomalies = self.detect_anomalies(features);
        if anomalies.is_empty() {
            return AnomalyScore {
                claim_id: features.claim_id.clone(),
                is_anomaly: false,
                anomaly_score: 0.0,
                category: None,
                confidence: 0.0,
                contributing_factors: Vec::new(),
                explanation: "no statistical anomalies detected".to_string(),
            };
        }

        let combined: f64 =
            (anomalies.iter().map(|a| a.score).sum::<f64>() / 2.0).min(1.0);
        let confidence =
            anomalies.iter().map(|a| a.confidence).sum::<f64>() / anomalies.len() as f64;
        let primary = anomalies
            .iter()
            .max_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|a| a.category);

        let explanation = anomalies
            .iter()
            .take(3)
            .map(|a| a.explanation.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        AnomalyScore {
            claim_id: features.claim_id.clone(),
            is_anomaly: true,
            anomaly_score: combined,
            category: primary,
            confidence,
            contributing_factors: anomalies.iter().map(|a| a.explanation.clone()).collect(),
            explanation,
        }
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clearclaim_core::ClaimRecord;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Unremarkable history: charges near 200, two procedures each.
    fn history() -> Vec<ClaimRecord> {
        (0..40)
            .map(|i| {
                ClaimRecord::new(format!("H{}", i), "M1", "P1", date(2024, 1, 1))
                    .with_charge(180.0 + (i % 5) as f64 * 10.0)
                    .with_procedures(["99213", "80053"])
            })
            .collect()
    }

    fn features_for(claim: &ClaimRecord) -> ClaimFeatures {
        use clearclaim_rules::RuleSet;
        let engineer =
            crate::features::FeatureEngineer::new(RuleSet::embedded().unwrap().code_sets);
        engineer.engineer(claim, None, None)
    }

    #[test]
    fn predict_before_fit_is_neutral() {
        let model = StatisticalAnomalyModel::new();
        let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 15)).with_charge(99999.0);
        let score = model.predict(&features_for(&claim));
        assert!(!score.is_anomaly);
        assert_eq!(score.anomaly_score, 0.5);
    }

    #[test]
    fn normal_claim_scores_zero() {
        let mut model = StatisticalAnomalyModel::new();
        model.fit(&history()).unwrap();

        let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 13))
            .with_charge(200.0)
            .with_procedures(["99213", "80053"]);
        let score = model.predict(&features_for(&claim));
        assert!(!score.is_anomaly);
        assert_eq!(score.anomaly_score, 0.0);
    }

    #[test]
    fn extreme_charge_triggers_cost_anomaly() {
        let mut model = StatisticalAnomalyModel::new();
        model.fit(&history()).unwrap();

        let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 13))
            .with_charge(50_000.0)
            .with_procedures(["99213", "80053"]);
        let score = model.predict(&features_for(&claim));
        assert!(score.is_anomaly);
        assert_eq!(score.category, Some(AnomalyCategory::Cost));
        assert!(score.anomaly_score > 0.0 && score.anomaly_score <= 1.0);
    }

    #[test]
    fn procedure_count_iqr_outlier() {
        let mut model = StatisticalAnomalyModel::new();
        model.fit(&history()).unwrap();

        let codes: Vec<String> = (0..20).map(|i| format!("9{:04}", i)).collect();
        let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 13))
            .with_charge(200.0)
            .with_procedures(codes);
        let anomalies = model.detect_anomalies(&features_for(&claim));
        assert!(anomalies
            .iter()
            .any(|a| a.category == AnomalyCategory::Billing && a.score == 0.6));
    }

    #[test]
    fn weekend_high_charge_triggers_timing() {
        let mut model = StatisticalAnomalyModel::new();
        model.fit(&history()).unwrap();

        // 2024-03-16 is a Saturday.
        let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 16))
            .with_charge(6000.0)
            .with_procedures(["99213", "80053"]);
        let anomalies = model.detect_anomalies(&features_for(&claim));
        assert!(anomalies.iter().any(|a| a.category == AnomalyCategory::Timing));
    }

    #[test]
    fn zero_variance_history_falls_back_to_neutral_score() {
        let mut model = StatisticalAnomalyModel::new();
        let flat: Vec<ClaimRecord> = (0..10)
            .map(|i| {
                ClaimRecord::new(format!("H{}", i), "M1", "P1", date(2024, 1, 1))
                    .with_charge(100.0)
                    .with_procedures(["99213"])
            })
            .collect();
        model.fit(&flat).unwrap();

        let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 13))
            .with_charge(100_000.0)
            .with_procedures(["99213"]);
        let anomalies = model.detect_anomalies(&features_for(&claim));
        let cost = anomalies
            .iter()
            .find(|a| a.category == AnomalyCategory::Cost)
            .unwrap();
        assert_eq!(cost.score, 0.5);
    }

    #[test]
    fn combined_score_caps_at_one() {
        let mut model = StatisticalAnomalyModel::new();
        model.fit(&history()).unwrap();

        // Trigger as many tests as possible at once.
        let codes: Vec<String> = (0..25).map(|i| format!("9{:04}", i)).collect();
        let mut claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 16))
            .with_charge(100_000.0)
            .with_procedures(codes);
        claim.quantity = 3;

        let mut features = features_for(&claim);
        features.member_claims_30d = 20;
        features.provider_denial_rate = 0.4;

        let score = model.predict(&features);
        assert!(score.is_anomaly);
        assert!(score.anomaly_score <= 1.0);
        // Explanation concatenates at most three individual explanations.
        assert!(score.explanation.matches("; ").count() <= 2);
    }
}
