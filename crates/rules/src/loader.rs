//! Filesystem rule loader.
//!
//! Reads YAML rule documents from a directory, resolves `extends`
//! inheritance with deep-merge, and compiles the result into a [`RuleSet`].
//! Rules are loaded once at startup; documents missing from the directory
//! fall back to the embedded defaults.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use clearclaim_core::ClearClaimError;

use crate::ruleset::RuleSet;
use crate::schema::{RuleDocument, RuleEnvelope};

// ── Deep-merge for `extends` inheritance ────────────────────────────

/// Maximum inheritance chain depth to prevent infinite loops.
const MAX_EXTENDS_DEPTH: usize = 5;

/// Deep-merge two YAML `Value` maps: child fields win, arrays replace entirely.
///
/// For map values: recursively merge. For all other types (scalars, arrays):
/// child value replaces parent.
pub fn deep_merge(parent: &serde_yaml::Value, child: &serde_yaml::Value) -> serde_yaml::Value {
    match (parent, child) {
        (serde_yaml::Value::Mapping(pm), serde_yaml::Value::Mapping(cm)) => {
            let mut merged = pm.clone();
            for (key, child_val) in cm {
                if let Some(parent_val) = pm.get(key) {
                    merged.insert(key.clone(), deep_merge(parent_val, child_val));
                } else {
                    merged.insert(key.clone(), child_val.clone());
                }
            }
            serde_yaml::Value::Mapping(merged)
        }
        // For scalars, arrays, etc.: child wins.
        (_, child) => child.clone(),
    }
}

/// Resolve `extends` chains: for each rule with an `extends` field,
/// find the parent and deep-merge the YAML values.
///
/// Returns a new map with all extends chains resolved.
pub fn resolve_extends(
    raw_values: &HashMap<String, serde_yaml::Value>,
) -> std::result::Result<HashMap<String, serde_yaml::Value>, String> {
    let mut resolved: HashMap<String, serde_yaml::Value> = HashMap::new();
    let mut in_progress: std::collections::HashSet<String> = std::collections::HashSet::new();

    for id in raw_values.keys() {
        resolve_single(id, raw_values, &mut resolved, &mut in_progress, 0)?;
    }

    Ok(resolved)
}

fn resolve_single(
    id: &str,
    raw_values: &HashMap<String, serde_yaml::Value>,
    resolved: &mut HashMap<String, serde_yaml::Value>,
    in_progress: &mut std::collections::HashSet<String>,
    depth: usize,
) -> std::result::Result<serde_yaml::Value, String> {
    // Already resolved.
    if let Some(val) = resolved.get(id) {
        return Ok(val.clone());
    }

    // Cycle detection.
    if in_progress.contains(id) {
        return Err(format!("circular extends chain detected for rule '{}'", id));
    }

    if depth > MAX_EXTENDS_DEPTH {
        return Err(format!("extends chain for rule '{}' exceeds depth {}", id, MAX_EXTENDS_DEPTH));
    }

    let raw = raw_values
        .get(id)
        .ok_or_else(|| format!("extends target '{}' not found", id))?;

    let parent_id = raw
        .get("metadata")
        .and_then(|m| m.get("extends"))
        .and_then(|v| v.as_str())
        .map(str::to_owned);

    let value = match parent_id {
        Some(parent_id) => {
            in_progress.insert(id.to_string());
            let parent = resolve_single(&parent_id, raw_values, resolved, in_progress, depth + 1)?;
            in_progress.remove(id);
            deep_merge(&parent, raw)
        }
        None => raw.clone(),
    };

    resolved.insert(id.to_string(), value.clone());
    Ok(value)
}

// ── Directory loading ───────────────────────────────────────────────

/// Load and compile all rule documents under `dir`.
///
/// Each `*.yml`/`*.yaml` file holds one document. Disabled rules are
/// skipped; when two enabled documents share a kind, the lexically last
/// file wins. Kinds absent from the directory use the embedded defaults.
pub fn load_rules_dir(dir: &Path) -> Result<RuleSet, ClearClaimError> {
    let mut raw_values: HashMap<String, serde_yaml::Value> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml") | Some("yaml")
            )
        })
        .collect();
    paths.sort();

    for path in &paths {
        let text = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&text)
            .map_err(|e| ClearClaimError::Rule(format!("{}: {}", path.display(), e)))?;
        let id = value
            .get("metadata")
            .and_then(|m| m.get("id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ClearClaimError::Rule(format!("{}: missing metadata.id", path.display()))
            })?
            .to_string();
        if raw_values.insert(id.clone(), value).is_some() {
            warn!(rule_id = %id, "duplicate rule id, later file wins");
        } else {
            order.push(id);
        }
    }

    let resolved = resolve_extends(&raw_values).map_err(ClearClaimError::Rule)?;

    let defaults = RuleSet::embedded()?;
    let mut rules = defaults;
    let mut loaded = 0usize;

    for id in &order {
        let value = &resolved[id];
        let envelope: RuleEnvelope = serde_yaml::from_value(value.clone())
            .map_err(|e| ClearClaimError::Rule(format!("rule '{}': {}", id, e)))?;

        if !envelope.metadata.enabled {
            warn!(rule_id = %id, "rule disabled, skipping");
            continue;
        }

        let document = envelope.parse_full().map_err(ClearClaimError::Rule)?;
        match &document {
            RuleDocument::ScoringConfig(rule) => {
                rule.spec.validate().map_err(ClearClaimError::Rule)?;
                rules.scoring = rule.compile();
            }
            RuleDocument::CodeSetConfig(rule) => {
                rule.spec.validate().map_err(ClearClaimError::Rule)?;
                rules.code_sets = rule.compile();
            }
            RuleDocument::PatternConfig(rule) => {
                rule.spec.validate().map_err(ClearClaimError::Rule)?;
                rules.patterns = rule.compile();
            }
        }
        loaded += 1;
        info!(rule_id = %id, kind = %document.kind(), "rule loaded");
    }

    info!(dir = %dir.display(), loaded, "rules directory loaded");
    Ok(rules)
}
