//! Compiled rule-set container and embedded defaults.
//!
//! The engine consumes a [`RuleSet`] — one compiled document of each kind.
//! `RuleSet::embedded()` builds the set shipped in `data/rules/fwa/`, used
//! when no rules directory is configured.

use clearclaim_core::ClearClaimError;

use crate::code_sets::{CodeSetConfigRule, CompiledCodeSets};
use crate::pattern_config::{CompiledPatternConfig, PatternConfigRule};
use crate::scoring_config::{CompiledScoringConfig, ScoringConfigRule};

/// One compiled document of each rule kind, shared read-only by detectors.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub scoring: CompiledScoringConfig,
    pub code_sets: CompiledCodeSets,
    pub patterns: CompiledPatternConfig,
}

const DEFAULT_SCORING: &str = include_str!("../../../data/rules/fwa/scoring-config.yml");
const DEFAULT_CODE_SETS: &str = include_str!("../../../data/rules/fwa/code-sets.yml");
const DEFAULT_PATTERNS: &str = include_str!("../../../data/rules/fwa/pattern-config.yml");

impl RuleSet {
    /// Build the rule set embedded in the binary.
    pub fn embedded() -> Result<Self, ClearClaimError> {
        let scoring: ScoringConfigRule = parse(DEFAULT_SCORING, "scoring-config.yml")?;
        scoring.spec.validate().map_err(ClearClaimError::Rule)?;

        let code_sets: CodeSetConfigRule = parse(DEFAULT_CODE_SETS, "code-sets.yml")?;
        code_sets.spec.validate().map_err(ClearClaimError::Rule)?;

        let patterns: PatternConfigRule = parse(DEFAULT_PATTERNS, "pattern-config.yml")?;
        patterns.spec.validate().map_err(ClearClaimError::Rule)?;

        Ok(Self {
            scoring: scoring.compile(),
            code_sets: code_sets.compile(),
            patterns: patterns.compile(),
        })
    }
}

fn parse<T: serde::de::DeserializeOwned>(yaml: &str, label: &str) -> Result<T, ClearClaimError> {
    serde_yaml::from_str(yaml)
        .map_err(|e| ClearClaimError::Rule(format!("embedded {} is invalid: {}", label, e)))
}
