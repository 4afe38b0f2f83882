//! Analysis context assembled by callers.
//!
//! The engine performs no I/O: existing claims, provider corpora, and
//! member history are all pre-fetched by the caller and attached here.

use serde::{Deserialize, Serialize};

use clearclaim_core::{ClaimRecord, ProviderProfile};

/// Everything the engine needs to analyze one claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub claim: ClaimRecord,
    /// Pre-aggregated provider history for feature engineering and the
    /// statistical upcoding trigger.
    pub provider_profile: Option<ProviderProfile>,
    /// The member's prior claims, enabling member aggregates and the
    /// excessive-services check.
    pub member_history: Option<Vec<ClaimRecord>>,
    /// Candidate corpus for duplicate matching.
    pub existing_claims: Option<Vec<ClaimRecord>>,
    /// The provider's claim corpus for pattern analysis.
    pub provider_claims: Option<Vec<ClaimRecord>>,
    /// Skip both anomaly models and score from flags alone.
    pub skip_ml_scoring: bool,
    /// Skip provider pattern analysis even when a corpus is supplied.
    pub skip_pattern_analysis: bool,
}

impl AnalysisContext {
    pub fn new(claim: ClaimRecord) -> Self {
        Self {
            claim,
            provider_profile: None,
            member_history: None,
            existing_claims: None,
            provider_claims: None,
            skip_ml_scoring: false,
            skip_pattern_analysis: false,
        }
    }

    pub fn with_provider_profile(mut self, profile: ProviderProfile) -> Self {
        self.provider_profile = Some(profile);
        self
    }

    pub fn with_member_history(mut self, history: Vec<ClaimRecord>) -> Self {
        self.member_history = Some(history);
        self
    }

    pub fn with_existing_claims(mut self, claims: Vec<ClaimRecord>) -> Self {
        self.existing_claims = Some(claims);
        self
    }

    pub fn with_provider_claims(mut self, claims: Vec<ClaimRecord>) -> Self {
        self.provider_claims = Some(claims);
        self
    }

    pub fn skip_ml(mut self) -> Self {
        self.skip_ml_scoring = true;
        self
    }

    pub fn skip_patterns(mut self) -> Self {
        self.skip_pattern_analysis = true;
        self
    }
}
