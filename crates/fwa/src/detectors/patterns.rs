//! Provider behavioral scoring and volume anomaly checks.
//!
//! - `analyze_provider_patterns` — weighted behavior score over billing
//!   volume, denial pattern, peer comparison, and temporal pattern
//! - `detect_impossible_day` — physically implausible daily volume
//! - `detect_excessive_services` — rolling-window per-category frequency

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use clearclaim_core::{ClaimRecord, ProviderId};
use clearclaim_rules::pattern_config::CompiledPatternConfig;
use clearclaim_rules::code_sets::CompiledCodeSets;
use clearclaim_rules::scoring_config::RiskThresholds;

use crate::types::RiskLevel;

/// Kind of volume/frequency anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternAnomalyType {
    /// Daily procedure count beyond the plausible ceiling.
    ProcedureVolume,
    /// Daily unique-patient count beyond the plausible ceiling.
    PatientVolume,
    /// Category occurrences beyond the rolling-window limit.
    ExcessiveServices,
}

impl std::fmt::Display for PatternAnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternAnomalyType::ProcedureVolume => write!(f, "ProcedureVolume"),
            PatternAnomalyType::PatientVolume => write!(f, "PatientVolume"),
            PatternAnomalyType::ExcessiveServices => write!(f, "ExcessiveServices"),
        }
    }
}

/// One detected volume/frequency anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternAnomaly {
    pub anomaly_type: PatternAnomalyType,
    pub description: String,
    /// Overage ratio `min(1, (observed - limit) / limit)`.
    pub deviation_score: f64,
    pub observed: u32,
    pub limit: u32,
}

/// Weighted provider behavior score. Sub-scores are each in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderBehaviorScore {
    pub provider_id: ProviderId,
    pub overall: f64,
    pub volume_score: f64,
    pub denial_score: f64,
    pub peer_score: f64,
    pub temporal_score: f64,
    pub risk_level: RiskLevel,
    pub findings: Vec<String>,
    pub claims_analyzed: usize,
}

/// Provider pattern analyzer over caller-supplied claim corpora.
#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    config: CompiledPatternConfig,
    code_sets: CompiledCodeSets,
}

impl PatternAnalyzer {
    pub fn new(config: CompiledPatternConfig, code_sets: CompiledCodeSets) -> Self {
        Self { config, code_sets }
    }

    /// Score a provider's behavior from its claim corpus.
    pub fn analyze_provider_patterns(
        &self,
        provider_id: &str,
        claims: &[ClaimRecord],
    ) -> ProviderBehaviorScore {
        let own: Vec<&ClaimRecord> = claims
            .iter()
            .filter(|c| c.provider_id == provider_id)
            .collect();

        let mut findings = Vec::new();

        if own.is_empty() {
            return ProviderBehaviorScore {
                provider_id: provider_id.to_string(),
                overall: 0.0,
                volume_score: 0.0,
                denial_score: 0.0,
                peer_score: 0.0,
                temporal_score: 0.0,
                risk_level: RiskLevel::Low,
                findings,
                claims_analyzed: 0,
            };
        }

        let volume_score = self.volume_score(&own, &mut findings);
        let denial_score = self.denial_score(&own, &mut findings);
        let peer_score = self.peer_score(&own, &mut findings);
        let temporal_score = self.temporal_score(&own, &mut findings);

        let w = &self.config.behavior_weights;
        let overall = (volume_score * w.volume
            + denial_score * w.denial
            + peer_score * w.peer
            + temporal_score * w.temporal)
            .clamp(0.0, 1.0);

        let t = &self.config.behavior_thresholds;
        let risk_level = RiskLevel::from_score(
            overall,
            &RiskThresholds {
                medium: t.medium,
                high: t.high,
                critical: t.critical,
            },
        );

        debug!(
            provider_id,
            overall,
            claims = own.len(),
            "provider behavior scored"
        );

        ProviderBehaviorScore {
            provider_id: provider_id.to_string(),
            overall,
            volume_score,
            denial_score,
            peer_score,
            temporal_score,
            risk_level,
            findings,
            claims_analyzed: own.len(),
        }
    }

    /// Worst-day unique-patient overage against the daily ceiling.
    fn volume_score(&self, claims: &[&ClaimRecord], findings: &mut Vec<String>) -> f64 {
        let mut patients_by_day: HashMap<NaiveDate, HashSet<&str>> = HashMap::new();
        for claim in claims {
            patients_by_day
                .entry(claim.service_date)
                .or_default()
                .insert(claim.member_id.as_str());
        }

        let ceiling = self.config.max_patients_per_day;
        let worst = patients_by_day
            .values()
            .map(|patients| patients.len() as u32)
            .max()
            .unwrap_or(0);

        if worst > ceiling {
            findings.push(format!(
                "peak of {} unique patients in one day (ceiling {})",
                worst, ceiling
            ));
            overage_ratio(worst, ceiling)
        } else {
            0.0
        }
    }

    /// Denial rate against twice the peer benchmark.
    fn denial_score(&self, claims: &[&ClaimRecord], findings: &mut Vec<String>) -> f64 {
        let peer = self.config.peer_denial_rate;
        if peer <= f64::EPSILON {
            return 0.0;
        }

        let denied = claims.iter().filter(|c| c.is_denied()).count();
        let rate = denied as f64 / claims.len() as f64;
        let trigger = 2.0 * peer;

        if rate > trigger {
            findings.push(format!(
                "denial rate {:.0}% vs peer benchmark {:.0}%",
                rate * 100.0,
                peer * 100.0
            ));
            (rate / trigger - 1.0).min(1.0)
        } else {
            0.0
        }
    }

    /// Average claim amount against twice the peer average.
    fn peer_score(&self, claims: &[&ClaimRecord], findings: &mut Vec<String>) -> f64 {
        let peer = self.config.peer_avg_charge;
        if peer <= f64::EPSILON {
            return 0.0;
        }

        let avg =
            claims.iter().map(|c| c.total_charged).sum::<f64>() / claims.len() as f64;
        let trigger = 2.0 * peer;

        if avg > trigger {
            findings.push(format!(
                "average claim {:.2} vs peer average {:.2}",
                avg, peer
            ));
            (avg / trigger - 1.0).min(1.0)
        } else {
            0.0
        }
    }

    /// Weekend-claim ratio against the fixed threshold.
    fn temporal_score(&self, claims: &[&ClaimRecord], findings: &mut Vec<String>) -> f64 {
        let threshold = self.config.weekend_ratio_threshold;
        if threshold >= 1.0 {
            return 0.0;
        }

        let weekend = claims
            .iter()
            .filter(|c| {
                matches!(
                    c.service_date.weekday(),
                    chrono::Weekday::Sat | chrono::Weekday::Sun
                )
            })
            .count();
        let ratio = weekend as f64 / claims.len() as f64;

        if ratio > threshold {
            findings.push(format!(
                "{:.0}% of claims on weekends (threshold {:.0}%)",
                ratio * 100.0,
                threshold * 100.0
            ));
            ((ratio - threshold) / (1.0 - threshold)).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Flag a provider/date whose total procedures or unique patients exceed
    /// physically plausible daily ceilings.
    pub fn detect_impossible_day(
        &self,
        provider_id: &str,
        date: NaiveDate,
        claims: &[ClaimRecord],
    ) -> Vec<PatternAnomaly> {
        let day_claims: Vec<&ClaimRecord> = claims
            .iter()
            .filter(|c| c.provider_id == provider_id && c.service_date == date)
            .collect();

        if day_claims.is_empty() {
            return Vec::new();
        }

        let procedures: u32 = day_claims
            .iter()
            .map(|c| c.procedure_codes.len() as u32)
            .sum();
        let patients = day_claims
            .iter()
            .map(|c| c.member_id.as_str())
            .collect::<HashSet<_>>()
            .len() as u32;

        let mut anomalies = Vec::new();

        let max_procedures = self.config.max_procedures_per_day;
        if procedures > max_procedures {
            anomalies.push(PatternAnomaly {
                anomaly_type: PatternAnomalyType::ProcedureVolume,
                description: format!(
                    "provider {} billed {} procedures on {} (ceiling {})",
                    provider_id, procedures, date, max_procedures
                ),
                deviation_score: overage_ratio(procedures, max_procedures),
                observed: procedures,
                limit: max_procedures,
            });
        }

        let max_patients = self.config.max_patients_per_day;
        if patients > max_patients {
            anomalies.push(PatternAnomaly {
                anomaly_type: PatternAnomalyType::PatientVolume,
                description: format!(
                    "provider {} saw {} unique patients on {} (ceiling {})",
                    provider_id, patients, date, max_patients
                ),
                deviation_score: overage_ratio(patients, max_patients),
                observed: patients,
                limit: max_patients,
            });
        }

        anomalies
    }

    /// Count category occurrences in the member's rolling window ending at
    /// the claim's service date (the claim's own codes included) against the
    /// configured per-category limits.
    pub fn detect_excessive_services(
        &self,
        claim: &ClaimRecord,
        member_history: &[ClaimRecord],
    ) -> Vec<PatternAnomaly> {
        let window_start = claim.service_date - chrono::Duration::days(self.config.window_days);

        let mut counts: HashMap<&str, u32> = HashMap::new();
        let mut count_codes = |codes: &[String]| {
            for code in codes {
                if let Some(category) = self.code_sets.category_of(code) {
                    *counts.entry(category).or_default() += 1;
                }
            }
        };

        count_codes(&claim.procedure_codes);
        for prior in member_history {
            if prior.id == claim.id || prior.member_id != claim.member_id {
                continue;
            }
            if prior.service_date > window_start && prior.service_date <= claim.service_date {
                count_codes(&prior.procedure_codes);
            }
        }

        let mut anomalies = Vec::new();
        let mut categories: Vec<_> = self.config.service_limits.iter().collect();
        categories.sort_by_key(|(category, _)| category.as_str());

        for (category, &limit) in categories {
            let observed = counts.get(category.as_str()).copied().unwrap_or(0);
            if observed > limit {
                anomalies.push(PatternAnomaly {
                    anomaly_type: PatternAnomalyType::ExcessiveServices,
                    description: format!(
                        "member {} had {} {} services in {} days (limit {})",
                        claim.member_id, observed, category, self.config.window_days, limit
                    ),
                    deviation_score: overage_ratio(observed, limit),
                    observed,
                    limit,
                });
            }
        }

        anomalies
    }
}

/// `min(1, (observed - limit) / limit)` overage ratio.
fn overage_ratio(observed: u32, limit: u32) -> f64 {
    if limit == 0 {
        return 1.0;
    }
    ((observed.saturating_sub(limit)) as f64 / limit as f64).min(1.0)
}
