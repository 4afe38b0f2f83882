use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Claim identifier as issued by the upstream claims store.
pub type ClaimId = String;

/// Member (patient) identifier.
pub type MemberId = String;

/// Billing provider identifier (NPI or internal).
pub type ProviderId = String;

/// Adjudication status of a claim as known to the caller at analysis time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimStatus {
    Submitted,
    Paid,
    Denied,
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimStatus::Submitted => write!(f, "Submitted"),
            ClaimStatus::Paid => write!(f, "Paid"),
            ClaimStatus::Denied => write!(f, "Denied"),
        }
    }
}

/// Coarse claim category. Emergency claims are exempt from the
/// weekend-service heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimType {
    Professional,
    Institutional,
    Pharmacy,
    Dental,
    Emergency,
}

impl std::fmt::Display for ClaimType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimType::Professional => write!(f, "Professional"),
            ClaimType::Institutional => write!(f, "Institutional"),
            ClaimType::Pharmacy => write!(f, "Pharmacy"),
            ClaimType::Dental => write!(f, "Dental"),
            ClaimType::Emergency => write!(f, "Emergency"),
        }
    }
}

/// The claim projection this engine analyzes. Callers build it from their
/// own claim model; nothing here is fetched by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub id: ClaimId,
    pub member_id: MemberId,
    pub provider_id: ProviderId,
    pub service_date: NaiveDate,
    pub total_charged: f64,
    pub procedure_codes: Vec<String>,
    pub diagnosis_codes: Vec<String>,
    pub quantity: u32,
    pub claim_type: ClaimType,
    pub status: ClaimStatus,
}

impl ClaimRecord {
    /// Build a claim with defaulted optional fields: quantity 1, charge 0,
    /// empty code lists, Professional type, Submitted status.
    pub fn new(
        id: impl Into<ClaimId>,
        member_id: impl Into<MemberId>,
        provider_id: impl Into<ProviderId>,
        service_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            member_id: member_id.into(),
            provider_id: provider_id.into(),
            service_date,
            total_charged: 0.0,
            procedure_codes: Vec::new(),
            diagnosis_codes: Vec::new(),
            quantity: 1,
            claim_type: ClaimType::Professional,
            status: ClaimStatus::Submitted,
        }
    }

    pub fn with_charge(mut self, total_charged: f64) -> Self {
        self.total_charged = total_charged;
        self
    }

    pub fn with_procedures<S: Into<String>>(mut self, codes: impl IntoIterator<Item = S>) -> Self {
        self.procedure_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_diagnoses<S: Into<String>>(mut self, codes: impl IntoIterator<Item = S>) -> Self {
        self.diagnosis_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_type(mut self, claim_type: ClaimType) -> Self {
        self.claim_type = claim_type;
        self
    }

    pub fn with_status(mut self, status: ClaimStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_denied(&self) -> bool {
        self.status == ClaimStatus::Denied
    }
}

/// Pre-aggregated provider history, supplied by the caller. All fields
/// default to zero when the provider is unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub provider_id: ProviderId,
    /// Total historical claims submitted by this provider.
    pub claim_count: u64,
    /// Mean charged amount across the provider's history.
    pub avg_charge: f64,
    /// Fraction of the provider's claims that were denied, in [0, 1].
    pub denial_rate: f64,
    /// Risk weighting for the provider's specialty, in [0, 1].
    pub specialty_risk: f64,
    /// Historical usage rate per procedure code (code -> fraction of the
    /// provider's claims billing that code). Used for upcoding detection.
    #[serde(default)]
    pub code_usage: HashMap<String, f64>,
}

impl ProviderProfile {
    pub fn new(provider_id: impl Into<ProviderId>) -> Self {
        Self {
            provider_id: provider_id.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn claim_defaults() {
        let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 15));
        assert_eq!(claim.quantity, 1);
        assert_eq!(claim.total_charged, 0.0);
        assert!(claim.procedure_codes.is_empty());
        assert_eq!(claim.claim_type, ClaimType::Professional);
        assert_eq!(claim.status, ClaimStatus::Submitted);
        assert!(!claim.is_denied());
    }

    #[test]
    fn builder_chain() {
        let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 15))
            .with_charge(1250.0)
            .with_procedures(["99213", "80053"])
            .with_diagnoses(["E11.9"])
            .with_status(ClaimStatus::Denied);

        assert_eq!(claim.total_charged, 1250.0);
        assert_eq!(claim.procedure_codes.len(), 2);
        assert_eq!(claim.diagnosis_codes, vec!["E11.9"]);
        assert!(claim.is_denied());
    }

    #[test]
    fn provider_profile_defaults_to_zero() {
        let profile = ProviderProfile::new("P1");
        assert_eq!(profile.claim_count, 0);
        assert_eq!(profile.denial_rate, 0.0);
        assert!(profile.code_usage.is_empty());
    }
}
