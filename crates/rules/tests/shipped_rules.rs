//! Integration tests that verify every shipped YAML rule document in
//! `data/rules/fwa/` deserializes, validates, and compiles.

use clearclaim_rules::loader::load_rules_dir;
use clearclaim_rules::schema::{RuleEnvelope, RuleKind};
use clearclaim_rules::RuleSet;

/// Resolve the shipped rules directory relative to the workspace root.
/// Integration tests run from the crate directory, so we go up two levels.
fn rules_dir() -> std::path::PathBuf {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../data/rules/fwa")
}

fn load_envelope(filename: &str) -> RuleEnvelope {
    let path = rules_dir().join(filename);
    let yaml = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    serde_yaml::from_str(&yaml)
        .unwrap_or_else(|e| panic!("Failed to parse {}: {}", path.display(), e))
}

#[test]
fn every_shipped_document_parses() {
    let mut kinds = Vec::new();
    for entry in std::fs::read_dir(rules_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("yml") {
            continue;
        }
        let yaml = std::fs::read_to_string(&path).unwrap();
        let envelope: RuleEnvelope = serde_yaml::from_str(&yaml)
            .unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
        envelope
            .parse_full()
            .unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
        kinds.push(envelope.rule_kind().unwrap());
    }

    // One document of each kind ships by default.
    assert!(kinds.contains(&RuleKind::ScoringConfig));
    assert!(kinds.contains(&RuleKind::CodeSetConfig));
    assert!(kinds.contains(&RuleKind::PatternConfig));
}

#[test]
fn scoring_config_matches_embedded_defaults() {
    let envelope = load_envelope("scoring-config.yml");
    assert_eq!(envelope.metadata.id, "fwa-scoring-default");
    assert!(envelope.metadata.enabled);

    let compiled = envelope
        .parse_full()
        .unwrap()
        .as_scoring_config()
        .unwrap()
        .compile();
    let embedded = RuleSet::embedded().unwrap();
    assert_eq!(compiled, embedded.scoring);
}

#[test]
fn code_sets_reference_each_other() {
    let rules = RuleSet::embedded().unwrap();

    // Every service-limit category names a shipped service category.
    for category in rules.patterns.service_limits.keys() {
        assert!(
            rules.code_sets.service_categories.contains_key(category),
            "service limit references unknown category '{}'",
            category
        );
    }

    // Every bundle component maps back to its bundle.
    for (bundle, components) in &rules.code_sets.bundle_components {
        for component in components {
            assert!(
                rules.code_sets.bundles_for_component[component].contains(bundle),
                "component {} missing reverse mapping to {}",
                component,
                bundle
            );
        }
    }
}

#[test]
fn loading_shipped_directory_equals_embedded() {
    let loaded = load_rules_dir(&rules_dir()).unwrap();
    let embedded = RuleSet::embedded().unwrap();
    assert_eq!(loaded.scoring, embedded.scoring);
    assert_eq!(loaded.patterns, embedded.patterns);
    assert_eq!(
        loaded.code_sets.federal_holidays,
        embedded.code_sets.federal_holidays
    );
}
