//! End-to-end scenarios through the full engine: orchestration, flag
//! accumulation, and fused scoring against the embedded rule set.

use chrono::NaiveDate;

use clearclaim_core::{ClaimRecord, ClaimStatus, Config, ProviderProfile};
use clearclaim_fwa::types::{FlagType, Recommendation, RiskLevel, Severity};
use clearclaim_fwa::{AnalysisContext, FwaService};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn service() -> FwaService {
    FwaService::with_embedded_rules(&Config::default()).unwrap()
}

/// Routine history for model fitting: weekday office visits around 200.
fn training_history() -> Vec<ClaimRecord> {
    (0..80)
        .map(|i| {
            ClaimRecord::new(
                format!("H{}", i),
                format!("M{}", i % 10),
                "P1",
                date(2024, 1, 2 + (i % 20) as u32),
            )
            .with_charge(150.0 + (i % 7) as f64 * 25.0)
            .with_procedures(["99213", "80053"])
            .with_diagnoses(["E11.9"])
        })
        .collect()
}

#[test]
fn resubmitted_weekend_claim_is_denied_or_investigated() {
    let service = service();

    // 15,000 charged across 12 procedures on a Saturday, resubmitting an
    // identical claim: member, provider, date, and codes all match.
    let codes: Vec<String> = (0..12).map(|i| format!("9{:04}", i)).collect();
    let original = ClaimRecord::new("C-orig", "M1", "P1", date(2024, 3, 16))
        .with_charge(15_000.0)
        .with_procedures(codes.clone())
        .with_diagnoses(["E11.9"]);
    let resubmission = ClaimRecord::new("C-resub", "M1", "P1", date(2024, 3, 16))
        .with_charge(15_000.0)
        .with_procedures(codes)
        .with_diagnoses(["E11.9"]);

    let ctx = AnalysisContext::new(resubmission).with_existing_claims(vec![original]);
    let result = service.analyze_claim(&ctx);

    let duplicate = result.duplicate.expect("duplicate check ran");
    assert!(duplicate.is_duplicate);
    assert!(!duplicate.is_possible_duplicate);

    let flag = result
        .flags
        .iter()
        .find(|f| f.flag_type == FlagType::DuplicateClaim)
        .expect("duplicate flag raised");
    assert!(matches!(flag.severity, Severity::Critical | Severity::High));

    assert!(matches!(
        result.recommendation,
        Recommendation::Deny | Recommendation::Investigate
    ));
    assert!(result.risk_score >= 0.0 && result.risk_score <= 1.0);
}

#[test]
fn chronic_level_five_biller_is_flagged_for_upcoding() {
    let service = service();

    // Provider bills 99215 on 40% of claims against a 10% expected rate.
    let mut profile = ProviderProfile::new("P1");
    profile.claim_count = 500;
    profile.code_usage.insert("99215".to_string(), 0.40);

    let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 13))
        .with_charge(400.0)
        .with_procedures(["99215"])
        .with_diagnoses(["E11.9"]);

    let ctx = AnalysisContext::new(claim).with_provider_profile(profile);
    let result = service.analyze_claim(&ctx);

    let upcoding = result.upcoding.expect("upcoding check ran");
    assert!(upcoding.is_upcoding_detected);
    assert_eq!(upcoding.upcoding_score, 1.0);
    assert!(result.flags.iter().any(|f| f.flag_type == FlagType::Upcoding));
}

#[test]
fn metabolic_panel_with_glucose_is_unbundling() {
    let service = service();

    let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 13))
        .with_charge(120.0)
        .with_procedures(["80053", "82947"])
        .with_diagnoses(["E11.9"]);

    let result = service.analyze_claim(&AnalysisContext::new(claim));

    let unbundling = result.unbundling.expect("unbundling check ran");
    assert!(unbundling.is_unbundling_detected);
    assert_eq!(unbundling.violations.len(), 1);
    assert_eq!(unbundling.violations[0].bundled_code, "80053");
    assert_eq!(unbundling.violations[0].component_code, "82947");
    assert!(result.flags.iter().any(|f| f.flag_type == FlagType::Unbundling));
}

#[test]
fn impossible_day_raises_both_volume_flags() {
    let service = service();

    // 35 unique patients and 60 procedures billed by one provider in one day.
    let day = date(2024, 3, 5);
    let provider_claims: Vec<ClaimRecord> = (0..35)
        .map(|i| {
            let codes: Vec<String> = if i < 25 {
                vec!["99213".into(), "80053".into()]
            } else {
                vec!["99213".into()]
            };
            ClaimRecord::new(format!("D{}", i), format!("M{}", i), "P1", day)
                .with_procedures(codes)
                .with_charge(150.0)
        })
        .collect();

    let claim = ClaimRecord::new("C1", "M99", "P1", day)
        .with_charge(150.0)
        .with_procedures(["99213"])
        .with_diagnoses(["E11.9"]);

    let ctx = AnalysisContext::new(claim).with_provider_claims(provider_claims);
    let result = service.analyze_claim(&ctx);

    let impossible: Vec<_> = result
        .flags
        .iter()
        .filter(|f| f.flag_type == FlagType::ImpossibleDay)
        .collect();
    assert_eq!(impossible.len(), 2);
    assert_eq!(result.pattern_anomalies.len(), 2);

    // Deviation scores reflect the overage ratios: (60-50)/50 and (35-30)/30.
    let deviations: Vec<f64> = result
        .pattern_anomalies
        .iter()
        .map(|a| a.deviation_score)
        .collect();
    assert!(deviations.iter().any(|d| (d - 0.2).abs() < 1e-10));
    assert!(deviations.iter().any(|d| (d - 5.0 / 30.0).abs() < 1e-10));
}

#[test]
fn fitted_models_score_outliers_above_routine_claims() {
    let mut service = service();
    service.fit_models(&training_history()).unwrap();
    assert!(service.models_fitted());

    let routine = ClaimRecord::new("C-routine", "M1", "P1", date(2024, 3, 13))
        .with_charge(200.0)
        .with_procedures(["99213", "80053"])
        .with_diagnoses(["E11.9"]);
    let outlier = ClaimRecord::new("C-outlier", "M1", "P1", date(2024, 3, 16))
        .with_charge(90_000.0)
        .with_procedures((0..15).map(|i| format!("9{:04}", i)))
        .with_diagnoses(["E11.9"]);

    let routine_result = service.analyze_claim(&AnalysisContext::new(routine));
    let outlier_result = service.analyze_claim(&AnalysisContext::new(outlier));

    assert!(outlier_result.risk_score > routine_result.risk_score);
    let stat = outlier_result.statistical_score.expect("statistical ran");
    assert!(stat.is_anomaly);
    assert!(stat.anomaly_score > 0.0 && stat.anomaly_score <= 1.0);
}

#[test]
fn identically_seeded_services_agree() {
    let history = training_history();

    let mut first = service();
    first.fit_models(&history).unwrap();
    let mut second = service();
    second.fit_models(&history).unwrap();

    let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 16))
        .with_charge(12_000.0)
        .with_procedures((0..11).map(|i| format!("9{:04}", i)))
        .with_diagnoses(["E11.9"]);

    let a = first.analyze_claim(&AnalysisContext::new(claim.clone()));
    let b = second.analyze_claim(&AnalysisContext::new(claim));

    assert_eq!(a.risk_score, b.risk_score);
    assert_eq!(a.risk_level, b.risk_level);
    assert_eq!(a.recommendation, b.recommendation);
    assert_eq!(
        a.ml_score.unwrap().anomaly_score,
        b.ml_score.unwrap().anomaly_score
    );
}

#[test]
fn malformed_claims_still_produce_wellformed_results() {
    let service = service();

    // Empty code lists, zero charge, degenerate history.
    let bare = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 13));
    let ctx = AnalysisContext::new(bare)
        .with_existing_claims(Vec::new())
        .with_provider_claims(Vec::new())
        .with_member_history(Vec::new());

    let result = service.analyze_claim(&ctx);
    assert!(result.risk_score >= 0.0 && result.risk_score <= 1.0);
    assert!(result.notes.is_empty());
    assert_eq!(result.claim_id, "C1");
}

#[test]
fn denial_heavy_provider_raises_behavior_flag() {
    let service = service();

    // Sixty percent of the provider's claims denied, all on weekends, at
    // inflated charges: behavior score lands in the High/Critical band.
    let provider_claims: Vec<ClaimRecord> = (0..20)
        .map(|i| {
            let day = if i % 2 == 0 { date(2024, 3, 9) } else { date(2024, 3, 10) };
            let status = if i < 12 { ClaimStatus::Denied } else { ClaimStatus::Paid };
            ClaimRecord::new(format!("D{}", i), format!("M{}", i % 6), "P1", day)
                .with_charge(900.0)
                .with_procedures(["99214"])
                .with_status(status)
        })
        .collect();

    let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 11))
        .with_charge(900.0)
        .with_procedures(["99214"])
        .with_diagnoses(["E11.9"]);

    let ctx = AnalysisContext::new(claim).with_provider_claims(provider_claims);
    let result = service.analyze_claim(&ctx);

    let behavior = result.provider_behavior.expect("behavior analysis ran");
    assert!(behavior.overall > 0.6);
    assert!(matches!(
        behavior.risk_level,
        RiskLevel::High | RiskLevel::Critical
    ));
    assert!(result
        .flags
        .iter()
        .any(|f| f.flag_type == FlagType::ProviderBehavior));
}

#[test]
fn quick_check_and_full_analysis_agree_on_duplicates() {
    let service = service();

    let claim = ClaimRecord::new("C1", "M1", "P1", date(2024, 3, 13))
        .with_charge(300.0)
        .with_procedures(["99213"])
        .with_diagnoses(["E11.9"]);
    let existing = vec![ClaimRecord::new("C0", "M1", "P1", date(2024, 3, 13))
        .with_charge(300.0)
        .with_procedures(["99213"])
        .with_diagnoses(["E11.9"])];

    let (quick_score, _, quick_rec) = service.quick_check(&claim, Some(&existing));
    let full = service.analyze_claim(
        &AnalysisContext::new(claim).with_existing_claims(existing),
    );

    assert!(quick_score > 0.0);
    assert_eq!(quick_rec, Recommendation::Deny);
    assert!(full.duplicate.unwrap().is_duplicate);
}
