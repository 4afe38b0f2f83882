//! Weighted fuzzy duplicate-claim matching.
//!
//! Compares the probe claim against a supplied candidate corpus across six
//! fields with fixed weights. Similarity is symmetric by construction, and
//! the duplicate/possible-duplicate bands are mutually exclusive.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use clearclaim_core::{ClaimId, ClaimRecord};
use clearclaim_rules::scoring_config::DuplicateBands;

/// Field weights: member, provider, service date, procedure overlap,
/// diagnosis overlap, charged amount.
const WEIGHT_MEMBER: f64 = 0.20;
const WEIGHT_PROVIDER: f64 = 0.15;
const WEIGHT_DATE: f64 = 0.25;
const WEIGHT_PROCEDURES: f64 = 0.25;
const WEIGHT_DIAGNOSES: f64 = 0.05;
const WEIGHT_AMOUNT: f64 = 0.10;

/// Service dates farther apart than this many days score zero.
const DEFAULT_DATE_WINDOW_DAYS: i64 = 3;

/// Outcome of a duplicate check. The two booleans are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub is_possible_duplicate: bool,
    /// Aggregate similarity of the best match, in [0, 1].
    pub similarity: f64,
    /// Claim id of the best match, if any candidate was compared.
    pub matched_claim_id: Option<ClaimId>,
    pub candidates_compared: usize,
}

impl DuplicateCheck {
    fn no_match() -> Self {
        Self {
            is_duplicate: false,
            is_possible_duplicate: false,
            similarity: 0.0,
            matched_claim_id: None,
            candidates_compared: 0,
        }
    }
}

/// Multi-field weighted fuzzy matcher.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    bands: DuplicateBands,
    date_window_days: i64,
}

impl DuplicateDetector {
    pub fn new(bands: DuplicateBands) -> Self {
        Self {
            bands,
            date_window_days: DEFAULT_DATE_WINDOW_DAYS,
        }
    }

    pub fn with_date_window(mut self, days: i64) -> Self {
        self.date_window_days = days.max(1);
        self
    }

    /// Find the best match for `claim` among `existing` (the claim itself is
    /// excluded by id) and band it.
    pub fn check(&self, claim: &ClaimRecord, existing: &[ClaimRecord]) -> DuplicateCheck {
        let mut best: Option<(&ClaimRecord, f64)> = None;
        let mut compared = 0usize;

        for candidate in existing {
            if candidate.id == claim.id {
                continue;
            }
            compared += 1;
            let score = self.similarity(claim, candidate);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }

        let Some((matched, similarity)) = best else {
            return DuplicateCheck::no_match();
        };

        let is_duplicate = similarity >= self.bands.definite;
        let is_possible_duplicate = !is_duplicate && similarity >= self.bands.possible;

        debug!(
            claim_id = %claim.id,
            matched = %matched.id,
            similarity,
            compared,
            "duplicate check completed"
        );

        DuplicateCheck {
            is_duplicate,
            is_possible_duplicate,
            similarity,
            matched_claim_id: Some(matched.id.clone()),
            candidates_compared: compared,
        }
    }

    /// Weighted aggregate similarity of two claims. Symmetric:
    /// `similarity(a, b) == similarity(b, a)`.
    pub fn similarity(&self, a: &ClaimRecord, b: &ClaimRecord) -> f64 {
        let member = if a.member_id == b.member_id { 1.0 } else { 0.0 };
        let provider = if a.provider_id == b.provider_id { 1.0 } else { 0.0 };
        let date = self.date_similarity(a, b);
        let procedures = jaccard(&a.procedure_codes, &b.procedure_codes);
        let diagnoses = jaccard(&a.diagnosis_codes, &b.diagnosis_codes);
        let amount = amount_similarity(a.total_charged, b.total_charged);

        member * WEIGHT_MEMBER
            + provider * WEIGHT_PROVIDER
            + date * WEIGHT_DATE
            + procedures * WEIGHT_PROCEDURES
            + diagnoses * WEIGHT_DIAGNOSES
            + amount * WEIGHT_AMOUNT
    }

    /// Exact day match scores 1.0; within the tolerance window the score
    /// decays linearly to 0 at the window edge.
    fn date_similarity(&self, a: &ClaimRecord, b: &ClaimRecord) -> f64 {
        let days = (a.service_date - b.service_date).num_days().abs();
        if days >= self.date_window_days {
            return 0.0;
        }
        1.0 - days as f64 / self.date_window_days as f64
    }
}

/// Jaccard similarity of two code lists. Two empty lists are identical (1.0);
/// one empty list shares nothing (0.0).
fn jaccard(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Banded amount similarity on relative difference: equal 1.0, within 1%
/// 0.95, within 5% 0.8, within 10% 0.5, else 0.
fn amount_similarity(a: f64, b: f64) -> f64 {
    if a == b {
        return 1.0;
    }
    let denom = a.abs().max(b.abs());
    if denom <= f64::EPSILON {
        return 1.0;
    }
    let relative = (a - b).abs() / denom;
    if relative <= 0.01 {
        0.95
    } else if relative <= 0.05 {
        0.8
    } else if relative <= 0.10 {
        0.5
    } else {
        0.0
    }
}
