//! Per-claim orchestration.
//!
//! `FwaService` owns one instance of each detector and scorer (explicit
//! dependency injection, no lazy globals) and runs them in sequence:
//! duplicate matching when a corpus is supplied, upcoding/unbundling always,
//! pattern analysis when provider claims are supplied, both anomaly models
//! unless skipped, plus unconditional heuristics. Every sub-check failure is
//! caught at this boundary and converted into a conservative Medium/Review
//! result — the service never propagates errors to its caller.

use std::time::Instant;

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use clearclaim_core::config::EngineConfig;
use clearclaim_core::{ClaimRecord, ClaimType, ClearClaimError, Config};
use clearclaim_rules::pattern_config::HeuristicThresholds;
use clearclaim_rules::RuleSet;

use crate::context::AnalysisContext;
use crate::detectors::duplicate::DuplicateDetector;
use crate::detectors::patterns::PatternAnalyzer;
use crate::detectors::unbundling::UnbundlingDetector;
use crate::detectors::upcoding::UpcodingDetector;
use crate::features::{ClaimFeatures, FeatureEngineer};
use crate::models::{AnomalyModel, IsolationForestModel, StatisticalAnomalyModel};
use crate::scoring::FwaRiskScorer;
use crate::types::{
    FlagType, FwaFlag, FwaResult, Recommendation, RiskLevel, Severity,
};

/// Risk score assigned when analysis degrades.
const DEGRADED_RISK_SCORE: f64 = 0.5;

/// The FWA engine facade. Construct once, share read-only; `fit_models` is
/// the only mutating entry point and is intended for offline retraining.
pub struct FwaService {
    engineer: FeatureEngineer,
    forest: IsolationForestModel,
    statistical: StatisticalAnomalyModel,
    duplicates: DuplicateDetector,
    upcoding: UpcodingDetector,
    unbundling: UnbundlingDetector,
    patterns: PatternAnalyzer,
    scorer: FwaRiskScorer,
    heuristics: HeuristicThresholds,
    engine: EngineConfig,
}

impl FwaService {
    /// Wire every detector from the runtime config and compiled rules.
    pub fn new(config: &Config, rules: &RuleSet) -> Self {
        Self {
            engineer: FeatureEngineer::new(rules.code_sets.clone()),
            forest: IsolationForestModel::new(config.forest.clone()),
            statistical: StatisticalAnomalyModel::new(),
            duplicates: DuplicateDetector::new(rules.scoring.duplicate_bands.clone()),
            upcoding: UpcodingDetector::new(rules.code_sets.clone()),
            unbundling: UnbundlingDetector::new(rules.code_sets.clone()),
            patterns: PatternAnalyzer::new(rules.patterns.clone(), rules.code_sets.clone()),
            scorer: FwaRiskScorer::new(rules.scoring.clone()),
            heuristics: rules.patterns.heuristics.clone(),
            engine: config.engine.clone(),
        }
    }

    /// Convenience constructor using the rule set embedded in the binary.
    pub fn with_embedded_rules(config: &Config) -> Result<Self, ClearClaimError> {
        Ok(Self::new(config, &RuleSet::embedded()?))
    }

    /// Fit both anomaly models on historical claims. Offline, not
    /// thread-safe; predictions afterwards are read-only and safe to share.
    pub fn fit_models(&mut self, history: &[ClaimRecord]) -> Result<(), ClearClaimError> {
        let features: Vec<ClaimFeatures> = history
            .iter()
            .map(|claim| self.engineer.engineer(claim, None, None))
            .collect();
        self.forest.fit(&features)?;
        self.statistical.fit(history)?;
        info!(history = history.len(), "anomaly models fitted");
        Ok(())
    }

    /// Whether both anomaly models carry fitted artifacts.
    pub fn models_fitted(&self) -> bool {
        self.forest.is_fitted() && self.statistical.is_fitted()
    }

    /// Analyze one claim. Never fails: sub-check errors degrade to a
    /// Medium-risk, Review-recommendation result with an explanatory note.
    pub fn analyze_claim(&self, ctx: &AnalysisContext) -> FwaResult {
        let started = Instant::now();
        match self.try_analyze(ctx, &started) {
            Ok(result) => result,
            Err(error) => {
                warn!(claim_id = %ctx.claim.id, %error, "analysis degraded");
                self.degraded(ctx, &error, &started)
            }
        }
    }

    fn try_analyze(
        &self,
        ctx: &AnalysisContext,
        started: &Instant,
    ) -> Result<FwaResult, ClearClaimError> {
        let claim = &ctx.claim;
        let features = self.engineer.engineer(
            claim,
            ctx.provider_profile.as_ref(),
            ctx.member_history.as_deref(),
        );

        let mut flags: Vec<FwaFlag> = Vec::new();
        let mut rules_evaluated = 0u32;

        // Duplicate matching, only against a supplied corpus.
        let duplicate = ctx.existing_claims.as_deref().map(|existing| {
            rules_evaluated += 1;
            let check = self.duplicates.check(claim, existing);
            if check.is_duplicate {
                flags.push(
                    FwaFlag::new(
                        FlagType::DuplicateClaim,
                        Severity::Critical,
                        format!(
                            "claim duplicates {} (similarity {:.2})",
                            check.matched_claim_id.as_deref().unwrap_or("?"),
                            check.similarity
                        ),
                        0.9,
                        "dup-definite",
                    )
                    .with_evidence(json!({
                        "matched_claim_id": check.matched_claim_id,
                        "similarity": check.similarity,
                    })),
                );
            } else if check.is_possible_duplicate {
                // Possible duplicates escalate once similarity clears the
                // configured engine threshold.
                let escalated = check.similarity >= self.engine.duplicate_similarity_threshold;
                let (severity, contribution) = if escalated {
                    (Severity::High, 0.6)
                } else {
                    (Severity::Medium, 0.45)
                };
                flags.push(
                    FwaFlag::new(
                        FlagType::DuplicateClaim,
                        severity,
                        format!(
                            "claim possibly duplicates {} (similarity {:.2})",
                            check.matched_claim_id.as_deref().unwrap_or("?"),
                            check.similarity
                        ),
                        contribution,
                        "dup-possible",
                    )
                    .with_evidence(json!({
                        "matched_claim_id": check.matched_claim_id,
                        "similarity": check.similarity,
                    })),
                );
            }
            check
        });

        // Upcoding and unbundling always run.
        rules_evaluated += 1;
        let upcoding = self.upcoding.check(claim, ctx.provider_profile.as_ref());
        if upcoding.is_upcoding_detected {
            flags.push(
                FwaFlag::new(
                    FlagType::Upcoding,
                    Severity::High,
                    upcoding.reasons.join("; "),
                    upcoding.upcoding_score * 0.7,
                    "upcode-em",
                )
                .with_evidence(json!({
                    "flagged_codes": upcoding.flagged_codes,
                    "suggested_codes": upcoding.suggested_codes,
                })),
            );
        }

        rules_evaluated += 1;
        let unbundling = self.unbundling.check(claim);
        if unbundling.is_unbundling_detected {
            flags.push(
                FwaFlag::new(
                    FlagType::Unbundling,
                    Severity::Medium,
                    describe_unbundling(&unbundling),
                    unbundling.unbundling_score,
                    "unbundle-components",
                )
                .with_evidence(json!({
                    "violations": unbundling.violations,
                    "fragmented_components": unbundling.fragmented_components,
                })),
            );
        }

        // Pattern analysis, only against a supplied provider corpus.
        let mut pattern_anomalies = Vec::new();
        let mut provider_behavior = None;
        if let Some(provider_claims) = ctx.provider_claims.as_deref() {
            if !ctx.skip_pattern_analysis {
                rules_evaluated += 1;
                for anomaly in self.patterns.detect_impossible_day(
                    &claim.provider_id,
                    claim.service_date,
                    provider_claims,
                ) {
                    flags.push(
                        FwaFlag::new(
                            FlagType::ImpossibleDay,
                            Severity::High,
                            anomaly.description.clone(),
                            0.3 + anomaly.deviation_score * 0.4,
                            "impossible-day",
                        )
                        .with_evidence(json!({
                            "observed": anomaly.observed,
                            "limit": anomaly.limit,
                        })),
                    );
                    pattern_anomalies.push(anomaly);
                }

                rules_evaluated += 1;
                let behavior = self
                    .patterns
                    .analyze_provider_patterns(&claim.provider_id, provider_claims);
                if behavior.risk_level == RiskLevel::High
                    || behavior.risk_level == RiskLevel::Critical
                {
                    let severity = if behavior.risk_level == RiskLevel::Critical {
                        Severity::Critical
                    } else {
                        Severity::High
                    };
                    let contribution = if severity == Severity::Critical { 0.6 } else { 0.4 };
                    flags.push(
                        FwaFlag::new(
                            FlagType::ProviderBehavior,
                            severity,
                            behavior.findings.join("; "),
                            contribution,
                            "provider-behavior",
                        )
                        .with_evidence(json!({ "overall": behavior.overall })),
                    );
                }
                provider_behavior = Some(behavior);
            }
        }

        // Excessive-services needs member history.
        if let Some(member_history) = ctx.member_history.as_deref() {
            rules_evaluated += 1;
            for anomaly in self.patterns.detect_excessive_services(claim, member_history) {
                flags.push(
                    FwaFlag::new(
                        FlagType::ExcessiveServices,
                        Severity::Medium,
                        anomaly.description.clone(),
                        0.2 + anomaly.deviation_score * 0.3,
                        "excessive-services",
                    )
                    .with_evidence(json!({
                        "observed": anomaly.observed,
                        "limit": anomaly.limit,
                    })),
                );
                pattern_anomalies.push(anomaly);
            }
        }

        // Anomaly models.
        let mut ml_score = None;
        let mut statistical_score = None;
        if !ctx.skip_ml_scoring {
            rules_evaluated += 1;
            let statistical = self.statistical.predict(&features);
            if statistical.is_anomaly {
                flags.push(
                    FwaFlag::new(
                        FlagType::StatisticalAnomaly,
                        severity_for_score(statistical.anomaly_score),
                        statistical.explanation.clone(),
                        statistical.anomaly_score * 0.5,
                        "stat-outlier",
                    )
                    .with_evidence(json!({
                        "score": statistical.anomaly_score,
                        "factors": statistical.contributing_factors,
                    })),
                );
            }
            statistical_score = Some(statistical);

            rules_evaluated += 1;
            let forest = self.forest.try_predict(&features)?;
            if forest.is_anomaly {
                flags.push(
                    FwaFlag::new(
                        FlagType::MlAnomaly,
                        severity_for_score(forest.anomaly_score),
                        forest.explanation.clone(),
                        forest.anomaly_score * 0.5,
                        "iforest",
                    )
                    .with_evidence(json!({
                        "score": forest.anomaly_score,
                        "factors": forest.contributing_factors,
                    })),
                );
            }
            ml_score = Some(forest);
        }

        // Unconditional heuristics.
        rules_evaluated += 3;
        if claim.total_charged > self.heuristics.high_dollar_threshold {
            flags.push(FwaFlag::new(
                FlagType::HighDollar,
                Severity::Medium,
                format!(
                    "total charged {:.2} exceeds {:.2}",
                    claim.total_charged, self.heuristics.high_dollar_threshold
                ),
                0.3,
                "high-dollar",
            ));
        }
        if features.is_weekend && claim.claim_type != ClaimType::Emergency {
            flags.push(FwaFlag::new(
                FlagType::WeekendService,
                Severity::Low,
                "non-emergency service on a weekend",
                0.15,
                "weekend-service",
            ));
        }
        if claim.procedure_codes.len() > self.heuristics.max_procedures_per_claim {
            flags.push(FwaFlag::new(
                FlagType::HighProcedureCount,
                Severity::Medium,
                format!(
                    "{} procedures on one claim (limit {})",
                    claim.procedure_codes.len(),
                    self.heuristics.max_procedures_per_claim
                ),
                0.25,
                "procedure-count",
            ));
        }

        // Final fusion: full weighted score, or flags-only when ML was skipped.
        let (risk_score, risk_level, mut recommendation) = if ctx.skip_ml_scoring {
            self.scorer.flags_only(&flags)
        } else {
            let (breakdown, level, recommendation) =
                self.scorer.score(&features, &flags, provider_behavior.as_ref());
            (breakdown.final_score, level, recommendation)
        };

        // Engine thresholds from the runtime config override the routing:
        // a score past the hold threshold never auto-routes below
        // Investigate, and a clean claim under the auto-approve threshold
        // goes straight through.
        if risk_score >= self.engine.fwa_threshold
            && matches!(
                recommendation,
                Recommendation::Approve | Recommendation::Review
            )
        {
            recommendation = Recommendation::Investigate;
        } else if risk_score <= self.engine.auto_approve_threshold && flags.is_empty() {
            recommendation = Recommendation::Approve;
        }

        debug!(
            claim_id = %claim.id,
            risk_score,
            flags = flags.len(),
            rules_evaluated,
            "claim analyzed"
        );

        Ok(FwaResult {
            claim_id: claim.id.clone(),
            analysis_id: Uuid::new_v4(),
            risk_score,
            risk_level,
            recommendation,
            flags,
            duplicate,
            upcoding: Some(upcoding),
            unbundling: Some(unbundling),
            pattern_anomalies,
            provider_behavior,
            ml_score,
            statistical_score,
            rules_evaluated,
            processing_time_ms: started.elapsed().as_millis() as u64,
            notes: Vec::new(),
        })
    }

    /// Conservative fallback when a sub-check fails: defer to human review
    /// rather than silently approving or blocking.
    fn degraded(
        &self,
        ctx: &AnalysisContext,
        error: &ClearClaimError,
        started: &Instant,
    ) -> FwaResult {
        FwaResult {
            claim_id: ctx.claim.id.clone(),
            analysis_id: Uuid::new_v4(),
            risk_score: DEGRADED_RISK_SCORE,
            risk_level: RiskLevel::Medium,
            recommendation: Recommendation::Review,
            flags: Vec::new(),
            duplicate: None,
            upcoding: None,
            unbundling: None,
            pattern_anomalies: Vec::new(),
            provider_behavior: None,
            ml_score: None,
            statistical_score: None,
            rules_evaluated: 0,
            processing_time_ms: started.elapsed().as_millis() as u64,
            notes: vec![format!("analysis degraded: {}", error)],
        }
    }

    /// Cheap path for latency-sensitive call sites: duplicate matching plus
    /// upcoding/unbundling, scored from flags alone.
    pub fn quick_check(
        &self,
        claim: &ClaimRecord,
        existing_claims: Option<&[ClaimRecord]>,
    ) -> (f64, RiskLevel, Recommendation) {
        let mut flags = Vec::new();

        if let Some(existing) = existing_claims {
            let check = self.duplicates.check(claim, existing);
            if check.is_duplicate {
                flags.push(FwaFlag::new(
                    FlagType::DuplicateClaim,
                    Severity::Critical,
                    "duplicate claim",
                    0.9,
                    "dup-definite",
                ));
            } else if check.is_possible_duplicate {
                flags.push(FwaFlag::new(
                    FlagType::DuplicateClaim,
                    Severity::Medium,
                    "possible duplicate claim",
                    0.45,
                    "dup-possible",
                ));
            }
        }

        let upcoding = self.upcoding.check(claim, None);
        if upcoding.is_upcoding_detected {
            flags.push(FwaFlag::new(
                FlagType::Upcoding,
                Severity::High,
                "upcoding indicators",
                upcoding.upcoding_score * 0.7,
                "upcode-em",
            ));
        }

        let unbundling = self.unbundling.check(claim);
        if unbundling.is_unbundling_detected {
            flags.push(FwaFlag::new(
                FlagType::Unbundling,
                Severity::Medium,
                "unbundled components",
                unbundling.unbundling_score,
                "unbundle-components",
            ));
        }

        self.scorer.flags_only(&flags)
    }
}

fn severity_for_score(score: f64) -> Severity {
    if score > 0.7 {
        Severity::High
    } else {
        Severity::Medium
    }
}

fn describe_unbundling(check: &crate::detectors::unbundling::UnbundlingCheck) -> String {
    if !check.violations.is_empty() {
        let pairs: Vec<String> = check
            .violations
            .iter()
            .map(|v| format!("{} with {}", v.component_code, v.bundled_code))
            .collect();
        format!("components billed alongside their bundle: {}", pairs.join(", "))
    } else {
        format!(
            "{} bundle components billed separately",
            check.fragmented_components.len()
        )
    }
}
