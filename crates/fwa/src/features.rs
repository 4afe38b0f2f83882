//! Claim feature engineering.
//!
//! Turns a raw claim (plus optional provider profile and member history)
//! into a fixed numeric feature set consumed by both anomaly models via a
//! fixed-order vector projection.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use clearclaim_core::{ClaimId, ClaimRecord, ProviderProfile};
use clearclaim_rules::code_sets::CompiledCodeSets;

/// Feature vector dimensionality. The order of [`ClaimFeatures::to_vector`]
/// and [`feature_names`] is part of the model contract: fitted artifacts are
/// only valid against vectors of the same layout.
pub const FEATURE_DIM: usize = 17;

/// Vector index of `total_charged`.
pub const IDX_TOTAL_CHARGED: usize = 0;
/// Vector index of `num_procedures`.
pub const IDX_NUM_PROCEDURES: usize = 1;
/// Vector index of `is_weekend`.
pub const IDX_IS_WEEKEND: usize = 6;
/// Vector index of `provider_denial_rate`.
pub const IDX_PROVIDER_DENIAL_RATE: usize = 12;

/// Fixed feature names, index-aligned with [`ClaimFeatures::to_vector`].
pub fn feature_names() -> [&'static str; FEATURE_DIM] {
    [
        "total_charged",
        "num_procedures",
        "num_diagnoses",
        "charge_per_procedure",
        "diagnosis_procedure_ratio",
        "quantity",
        "is_weekend",
        "is_holiday",
        "is_month_end",
        "is_year_end",
        "provider_claim_count",
        "provider_avg_charge",
        "provider_denial_rate",
        "provider_specialty_risk",
        "member_claims_30d",
        "member_charges_30d",
        "has_high_value_procedure",
    ]
}

/// Immutable numeric/boolean feature set for one claim. Created once per
/// analysis; pure function of its inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimFeatures {
    pub claim_id: ClaimId,
    pub total_charged: f64,
    pub num_procedures: usize,
    pub num_diagnoses: usize,
    pub charge_per_procedure: f64,
    pub diagnosis_procedure_ratio: f64,
    pub quantity: u32,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub is_month_end: bool,
    pub is_year_end: bool,
    pub provider_claim_count: f64,
    pub provider_avg_charge: f64,
    pub provider_denial_rate: f64,
    pub provider_specialty_risk: f64,
    pub member_claims_30d: usize,
    pub member_charges_30d: f64,
    pub has_high_value_procedure: bool,
}

impl ClaimFeatures {
    /// Project into the fixed-order numeric vector. Booleans encode as 0/1.
    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.total_charged,
            self.num_procedures as f64,
            self.num_diagnoses as f64,
            self.charge_per_procedure,
            self.diagnosis_procedure_ratio,
            self.quantity as f64,
            bool_to_f64(self.is_weekend),
            bool_to_f64(self.is_holiday),
            bool_to_f64(self.is_month_end),
            bool_to_f64(self.is_year_end),
            self.provider_claim_count,
            self.provider_avg_charge,
            self.provider_denial_rate,
            self.provider_specialty_risk,
            self.member_claims_30d as f64,
            self.member_charges_30d,
            bool_to_f64(self.has_high_value_procedure),
        ]
    }
}

fn bool_to_f64(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Day-of-month at or beyond which a date counts as month-end.
const MONTH_END_DAY: u32 = 28;

/// Rolling window for member aggregates, in days.
const MEMBER_WINDOW_DAYS: i64 = 30;

/// Engineers [`ClaimFeatures`] from raw claims against the compiled
/// reference tables (holidays, high-value procedure set).
#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    code_sets: CompiledCodeSets,
}

impl FeatureEngineer {
    pub fn new(code_sets: CompiledCodeSets) -> Self {
        Self { code_sets }
    }

    /// Build the feature set for one claim. Provider aggregates default to
    /// zero when no profile is supplied; member aggregates are computed by
    /// filtering the supplied history to a 30-day window ending at the
    /// claim's service date (the claim itself excluded).
    pub fn engineer(
        &self,
        claim: &ClaimRecord,
        provider: Option<&ProviderProfile>,
        member_history: Option<&[ClaimRecord]>,
    ) -> ClaimFeatures {
        let date = claim.service_date;
        let num_procedures = claim.procedure_codes.len();
        let num_diagnoses = claim.diagnosis_codes.len();

        let charge_per_procedure = claim.total_charged / num_procedures.max(1) as f64;
        let diagnosis_procedure_ratio = num_diagnoses as f64 / num_procedures.max(1) as f64;

        let is_weekend = matches!(
            date.weekday(),
            chrono::Weekday::Sat | chrono::Weekday::Sun
        );
        let is_holiday = self.code_sets.is_federal_holiday(date.month(), date.day());
        let is_month_end = date.day() >= MONTH_END_DAY;
        let is_year_end = date.month() == 12 && date.day() >= MONTH_END_DAY;

        let (member_claims_30d, member_charges_30d) = match member_history {
            Some(history) => member_window_aggregates(claim, history),
            None => (0, 0.0),
        };

        let has_high_value_procedure = claim
            .procedure_codes
            .iter()
            .any(|code| self.code_sets.high_value_procedures.contains(code));

        ClaimFeatures {
            claim_id: claim.id.clone(),
            total_charged: claim.total_charged,
            num_procedures,
            num_diagnoses,
            charge_per_procedure,
            diagnosis_procedure_ratio,
            quantity: claim.quantity,
            is_weekend,
            is_holiday,
            is_month_end,
            is_year_end,
            provider_claim_count: provider.map_or(0.0, |p| p.claim_count as f64),
            provider_avg_charge: provider.map_or(0.0, |p| p.avg_charge),
            provider_denial_rate: provider.map_or(0.0, |p| p.denial_rate),
            provider_specialty_risk: provider.map_or(0.0, |p| p.specialty_risk),
            member_claims_30d,
            member_charges_30d,
            has_high_value_procedure,
        }
    }
}

/// Count and sum the member's other claims within the trailing window.
fn member_window_aggregates(claim: &ClaimRecord, history: &[ClaimRecord]) -> (usize, f64) {
    let window_start = claim.service_date - chrono::Duration::days(MEMBER_WINDOW_DAYS);
    let mut count = 0usize;
    let mut charges = 0.0;

    for prior in history {
        if prior.id == claim.id || prior.member_id != claim.member_id {
            continue;
        }
        if prior.service_date > window_start && prior.service_date <= claim.service_date {
            count += 1;
            charges += prior.total_charged;
        }
    }

    (count, charges)
}
