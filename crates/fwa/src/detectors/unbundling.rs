//! Unbundling detection.
//!
//! Flags claims that bill a component assay alongside the bundled panel
//! that already covers it, and claims that fragment a panel into three or
//! more separately billed components without any bundle code.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use clearclaim_core::ClaimRecord;
use clearclaim_rules::code_sets::CompiledCodeSets;

/// Score when a component is billed together with its bundle.
const PAIR_SCORE: f64 = 0.5;

/// Score when components are fragmented with no bundle code present.
const FRAGMENTATION_SCORE: f64 = 0.3;

/// Distinct component codes required for the fragmentation trigger.
const FRAGMENTATION_MIN_COMPONENTS: usize = 3;

/// One component billed alongside the bundle covering it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbundlingViolation {
    pub bundled_code: String,
    pub component_code: String,
}

/// Outcome of an unbundling check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnbundlingCheck {
    pub is_unbundling_detected: bool,
    pub unbundling_score: f64,
    /// Component/bundle pairs billed together on this claim.
    pub violations: Vec<UnbundlingViolation>,
    /// Distinct component codes billed without any bundle code present.
    pub fragmented_components: Vec<String>,
}

/// Fixed-lookup component/bundle co-occurrence detector.
#[derive(Debug, Clone)]
pub struct UnbundlingDetector {
    code_sets: CompiledCodeSets,
}

impl UnbundlingDetector {
    pub fn new(code_sets: CompiledCodeSets) -> Self {
        Self { code_sets }
    }

    pub fn check(&self, claim: &ClaimRecord) -> UnbundlingCheck {
        let codes: HashSet<&str> = claim.procedure_codes.iter().map(String::as_str).collect();

        let mut violations = Vec::new();
        let mut score: f64 = 0.0;

        // A component and its covering bundle on the same claim.
        for code in &codes {
            let Some(bundles) = self.code_sets.bundles_for_component.get(*code) else {
                continue;
            };
            for bundle in bundles {
                if codes.contains(bundle.as_str()) {
                    let violation = UnbundlingViolation {
                        bundled_code: bundle.clone(),
                        component_code: (*code).to_string(),
                    };
                    if !violations.contains(&violation) {
                        violations.push(violation);
                    }
                    score = score.max(PAIR_SCORE);
                }
            }
        }

        // Fragmented billing: several components, no bundle code at all.
        let any_bundle_present = codes
            .iter()
            .any(|code| self.code_sets.bundle_components.contains_key(*code));
        let mut fragmented_components: Vec<String> = if any_bundle_present {
            Vec::new()
        } else {
            let mut components: Vec<String> = codes
                .iter()
                .filter(|code| self.code_sets.bundles_for_component.contains_key(**code))
                .map(|code| (*code).to_string())
                .collect();
            components.sort();
            components
        };

        if fragmented_components.len() >= FRAGMENTATION_MIN_COMPONENTS {
            score = score.max(FRAGMENTATION_SCORE);
        } else {
            fragmented_components.clear();
        }

        violations.sort_by(|a, b| {
            (a.bundled_code.as_str(), a.component_code.as_str())
                .cmp(&(b.bundled_code.as_str(), b.component_code.as_str()))
        });

        debug!(
            claim_id = %claim.id,
            violations = violations.len(),
            fragments = fragmented_components.len(),
            "unbundling check completed"
        );

        UnbundlingCheck {
            is_unbundling_detected: score > 0.0,
            unbundling_score: score,
            violations,
            fragmented_components,
        }
    }
}
