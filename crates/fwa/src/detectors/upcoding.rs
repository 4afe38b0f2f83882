//! Upcoding detection over E/M visit hierarchies.
//!
//! Two independent triggers:
//! - **statistical** — the provider's historical usage rate of a
//!   high-complexity code exceeds twice its expected population rate;
//! - **clinical implausibility** — a high-complexity code co-occurs only
//!   with low-acuity diagnoses, regardless of usage statistics.

use serde::{Deserialize, Serialize};
use tracing::debug;

use clearclaim_core::{ClaimRecord, ProviderProfile};
use clearclaim_rules::code_sets::CompiledCodeSets;

/// Usage-rate multiple over the expected rate that triggers the
/// statistical check.
const USAGE_RATE_MULTIPLE: f64 = 2.0;

/// Fixed score for the clinical-implausibility trigger.
const CLINICAL_IMPLAUSIBILITY_SCORE: f64 = 0.75;

/// How many lower levels to suggest as alternatives.
const SUGGESTED_ALTERNATIVES: usize = 2;

/// Outcome of an upcoding check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcodingCheck {
    pub is_upcoding_detected: bool,
    /// Strongest trigger's score, capped at 1.0.
    pub upcoding_score: f64,
    /// High-complexity codes that triggered either check.
    pub flagged_codes: Vec<String>,
    /// Lower-level alternatives for clinically implausible codes.
    pub suggested_codes: Vec<String>,
    pub reasons: Vec<String>,
}

impl UpcodingCheck {
    fn clean() -> Self {
        Self {
            is_upcoding_detected: false,
            upcoding_score: 0.0,
            flagged_codes: Vec::new(),
            suggested_codes: Vec::new(),
            reasons: Vec::new(),
        }
    }
}

/// Rule- and statistics-based E/M level inflation detector.
#[derive(Debug, Clone)]
pub struct UpcodingDetector {
    code_sets: CompiledCodeSets,
}

impl UpcodingDetector {
    pub fn new(code_sets: CompiledCodeSets) -> Self {
        Self { code_sets }
    }

    /// Check one claim. The provider profile (with its historical code usage
    /// distribution) enables the statistical trigger; without it only the
    /// clinical check runs.
    pub fn check(&self, claim: &ClaimRecord, provider: Option<&ProviderProfile>) -> UpcodingCheck {
        let mut check = UpcodingCheck::clean();

        for code in &claim.procedure_codes {
            let Some((category, idx)) = self.code_sets.level_index.get(code) else {
                continue;
            };
            let level = &self.code_sets.em_hierarchies[category][*idx];
            if !level.high_complexity {
                continue;
            }

            // Statistical: provider bills this level far above expectation.
            if let Some(profile) = provider {
                if let Some(&rate) = profile.code_usage.get(code) {
                    if rate > USAGE_RATE_MULTIPLE * level.expected_rate {
                        let score = (rate / level.expected_rate - 1.0).min(1.0);
                        check.record(
                            code,
                            score,
                            format!(
                                "provider bills {} at {:.0}% vs expected {:.0}%",
                                code,
                                rate * 100.0,
                                level.expected_rate * 100.0
                            ),
                        );
                    }
                }
            }

            // Clinical implausibility: a high-complexity visit supported
            // only by low-acuity diagnoses.
            if !claim.diagnosis_codes.is_empty()
                && claim
                    .diagnosis_codes
                    .iter()
                    .all(|dx| self.code_sets.low_acuity_diagnoses.contains(dx))
            {
                check.record(
                    code,
                    CLINICAL_IMPLAUSIBILITY_SCORE,
                    format!("{} supported only by low-acuity diagnoses", code),
                );
                for alternative in self
                    .code_sets
                    .lower_levels(code)
                    .into_iter()
                    .take(SUGGESTED_ALTERNATIVES)
                {
                    if !check.suggested_codes.contains(&alternative.code) {
                        check.suggested_codes.push(alternative.code.clone());
                    }
                }
            }
        }

        debug!(
            claim_id = %claim.id,
            detected = check.is_upcoding_detected,
            score = check.upcoding_score,
            "upcoding check completed"
        );
        check
    }
}

impl UpcodingCheck {
    fn record(&mut self, code: &str, score: f64, reason: String) {
        self.is_upcoding_detected = true;
        self.upcoding_score = self.upcoding_score.max(score.min(1.0));
        if !self.flagged_codes.iter().any(|c| c == code) {
            self.flagged_codes.push(code.to_string());
        }
        self.reasons.push(reason);
    }
}
