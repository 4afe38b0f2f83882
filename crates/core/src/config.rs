use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_f64(profile: &str, key: &str, default: f64) -> f64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub engine: EngineConfig,
    pub forest: ForestConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CLEARCLAIM_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CLEARCLAIM_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            engine: EngineConfig::from_env_profiled(p),
            forest: ForestConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  engine:  duplicate_threshold={}, auto_approve={}, fwa_threshold={}",
            self.engine.duplicate_similarity_threshold,
            self.engine.auto_approve_threshold,
            self.engine.fwa_threshold
        );
        tracing::info!(
            "  forest:  n_estimators={}, max_samples={}, contamination={}, seed={}",
            self.forest.n_estimators,
            self.forest.max_samples,
            self.forest.contamination,
            self.forest.seed
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            engine: EngineConfig::default(),
            forest: ForestConfig::default(),
        }
    }
}

// ── Engine thresholds ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Aggregate similarity above which a duplicate flag escalates severity.
    pub duplicate_similarity_threshold: f64,
    /// Risk score at or below which a claim may auto-approve.
    pub auto_approve_threshold: f64,
    /// Risk score at or above which a claim is held for FWA review.
    pub fwa_threshold: f64,
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            duplicate_similarity_threshold: profiled_env_f64(p, "FWA_DUPLICATE_THRESHOLD", 0.85),
            auto_approve_threshold: profiled_env_f64(p, "FWA_AUTO_APPROVE_THRESHOLD", 0.3),
            fwa_threshold: profiled_env_f64(p, "FWA_THRESHOLD", 0.7),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            duplicate_similarity_threshold: 0.85,
            auto_approve_threshold: 0.3,
            fwa_threshold: 0.7,
        }
    }
}

// ── Isolation forest ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of isolation trees in the ensemble.
    pub n_estimators: usize,
    /// Subsample size per tree (capped at dataset size during fit).
    pub max_samples: usize,
    /// Assumed anomalous fraction of training data, in (0, 0.5].
    pub contamination: f64,
    /// Master seed for tree construction.
    pub seed: u64,
}

impl ForestConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            n_estimators: profiled_env_usize(p, "FWA_FOREST_ESTIMATORS", 100),
            max_samples: profiled_env_usize(p, "FWA_FOREST_MAX_SAMPLES", 256),
            contamination: profiled_env_f64(p, "FWA_FOREST_CONTAMINATION", 0.1),
            seed: profiled_env_u64(p, "FWA_FOREST_SEED", 42),
        }
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}
