//! Isolation-forest anomaly scorer.
//!
//! Outliers are easier to isolate: random recursive partitioning reaches
//! them in fewer splits, so shorter average path lengths mean higher
//! anomaly scores. Scores are normalized to [0, 1] via the standard
//! `2^(-E[h]/c(n))` transform.
//!
//! Randomness comes from a seeded generator owned by the model instance,
//! not process-global state: per-tree seeds are drawn sequentially from the
//! master generator, then trees build in parallel, keeping `fit()`
//! deterministic for a given seed regardless of thread scheduling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use clearclaim_core::config::ForestConfig;
use clearclaim_core::ClearClaimError;

use crate::features::{
    ClaimFeatures, IDX_IS_WEEKEND, IDX_NUM_PROCEDURES, IDX_PROVIDER_DENIAL_RATE,
    IDX_TOTAL_CHARGED,
};
use crate::stats::FeatureStatistics;
use crate::types::{AnomalyCategory, AnomalyScore};

use super::AnomalyModel;

/// Euler–Mascheroni constant, used in the average-path approximation.
const EULER_GAMMA: f64 = 0.577_215_664_9;

/// One node of an isolation tree. Trees are immutable after `fit()` and
/// exclusively owned by their model's artifact.
#[derive(Debug, Clone)]
enum TreeNode {
    /// Terminal node holding `size` training samples.
    Leaf { size: usize },
    /// Binary split: rows with `vector[feature] < threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// The fitted forest: trees, per-feature statistics, and the calibrated
/// anomaly threshold. An explicitly owned, versioned value — refitting
/// replaces the whole artifact, making retraining and rollback explicit.
#[derive(Debug, Clone)]
pub struct ForestArtifact {
    /// Monotonically increasing fit counter.
    pub version: u32,
    trees: Vec<TreeNode>,
    feature_stats: Vec<FeatureStatistics>,
    threshold: f64,
    sample_size: usize,
    dim: usize,
}

impl ForestArtifact {
    /// The calibrated anomaly threshold (scores above it are anomalous).
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Per-feature statistics over the fit set, vector-index aligned.
    pub fn feature_stats(&self) -> &[FeatureStatistics] {
        &self.feature_stats
    }

    /// Number of trees in the ensemble.
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// Unsupervised ensemble anomaly scorer over claim feature vectors.
#[derive(Debug)]
pub struct IsolationForestModel {
    config: ForestConfig,
    rng: StdRng,
    artifact: Option<ForestArtifact>,
}

impl IsolationForestModel {
    pub fn new(config: ForestConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            artifact: None,
        }
    }

    /// The current fitted artifact, if any.
    pub fn artifact(&self) -> Option<&ForestArtifact> {
        self.artifact.as_ref()
    }

    /// Fit the ensemble on engineered claim features.
    pub fn fit(&mut self, data: &[ClaimFeatures]) -> Result<(), ClearClaimError> {
        let vectors: Vec<Vec<f64>> = data.iter().map(ClaimFeatures::to_vector).collect();
        self.fit_vectors(&vectors)
    }

    /// Fit the ensemble on raw feature vectors.
    ///
    /// Builds `n_estimators` trees over uniform subsamples (without
    /// replacement) of size `max_samples` capped at the dataset size, then
    /// calibrates the anomaly threshold at the contamination percentile of
    /// the descending-sorted training scores.
    pub fn fit_vectors(&mut self, vectors: &[Vec<f64>]) -> Result<(), ClearClaimError> {
        let n = vectors.len();
        if n < 2 {
            return Err(ClearClaimError::Model(format!(
                "isolation forest needs at least 2 samples, got {}",
                n
            )));
        }
        let dim = vectors[0].len();
        if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
            return Err(ClearClaimError::Model(
                "isolation forest requires uniform non-empty feature vectors".to_string(),
            ));
        }

        let sample_size = self.config.max_samples.min(n).max(2);
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;

        // Per-tree seeds drawn sequentially keep the build deterministic
        // under parallel construction.
        let seeds: Vec<u64> = (0..self.config.n_estimators)
            .map(|_| self.rng.gen())
            .collect();

        let trees: Vec<TreeNode> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let rows = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                build_tree(vectors, &rows, 0, max_depth, dim, &mut rng)
            })
            .collect();

        let feature_stats: Vec<FeatureStatistics> = (0..dim)
            .map(|d| {
                let column: Vec<f64> = vectors.iter().map(|v| v[d]).collect();
                FeatureStatistics::from_values(&column)
            })
            .collect();

        // Score every training point and cut at the contamination fraction.
        let mut training_scores: Vec<f64> = vectors
            .par_iter()
            .map(|v| normalized_score(&trees, v, sample_size))
            .collect();
        training_scores
            .sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let cutoff = ((self.config.contamination * n as f64).ceil() as usize).clamp(1, n);
        let threshold = training_scores[cutoff - 1];

        let version = self.artifact.as_ref().map_or(1, |a| a.version + 1);
        self.artifact = Some(ForestArtifact {
            version,
            trees,
            feature_stats,
            threshold,
            sample_size,
            dim,
        });

        info!(
            samples = n,
            sample_size,
            trees = self.config.n_estimators,
            threshold,
            version,
            "isolation forest fitted"
        );
        Ok(())
    }

    /// Normalized anomaly score for a raw vector.
    ///
    /// Errors when the model is unfitted or the vector does not match the
    /// fitted layout (stale artifact after a feature-schema change).
    pub fn score_vector(&self, vector: &[f64]) -> Result<f64, ClearClaimError> {
        let artifact = self
            .artifact
            .as_ref()
            .ok_or_else(|| ClearClaimError::Model("isolation forest not fitted".to_string()))?;
        if vector.len() != artifact.dim {
            return Err(ClearClaimError::Model(format!(
                "feature vector has {} dimensions, fitted artifact expects {}",
                vector.len(),
                artifact.dim
            )));
        }
        Ok(normalized_score(
            &artifact.trees,
            vector,
            artifact.sample_size,
        ))
    }

    /// Score one claim's features, surfacing layout mismatches as errors.
    /// An unfitted model yields the neutral score rather than an error.
    pub fn try_predict(&self, features: &ClaimFeatures) -> Result<AnomalyScore, ClearClaimError> {
        let Some(artifact) = self.artifact.as_ref() else {
            debug!(claim_id = %features.claim_id, "predict before fit, returning neutral");
            return Ok(AnomalyScore::neutral(features.claim_id.clone()));
        };

        let vector = features.to_vector();
        let score = self.score_vector(&vector)?;
        let is_anomaly = score > artifact.threshold;

        let factors = contributing_factors(&vector, artifact.feature_stats());
        let category = primary_category(&factors);

        Ok(AnomalyScore {
            claim_id: features.claim_id.clone(),
            is_anomaly,
            anomaly_score: score,
            category,
            confidence: ((score - artifact.threshold).abs() * 2.0).min(1.0),
            contributing_factors: factors.into_iter().map(|f| f.1).collect(),
            explanation: format!(
                "isolation score {:.3} vs threshold {:.3} across {} trees",
                score,
                artifact.threshold,
                artifact.tree_count()
            ),
        })
    }
}

impl AnomalyModel for IsolationForestModel {
    fn predict(&self, features: &ClaimFeatures) -> AnomalyScore {
        self.try_predict(features).unwrap_or_else(|e| {
            let mut score = AnomalyScore::neutral(features.claim_id.clone());
            score.explanation = e.to_string();
            score
        })
    }

    fn is_fitted(&self) -> bool {
        self.artifact.is_some()
    }
}

// ── Tree construction and traversal ──────────────────────────

/// Recursively build one isolation tree over `rows`.
///
/// Stops at singleton subsets, depth limit, or a constant feature draw.
fn build_tree(
    vectors: &[Vec<f64>],
    rows: &[usize],
    depth: usize,
    max_depth: usize,
    dim: usize,
    rng: &mut StdRng,
) -> TreeNode {
    if rows.len() <= 1 || depth >= max_depth {
        return TreeNode::Leaf { size: rows.len() };
    }

    let feature = rng.gen_range(0..dim);
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for &row in rows {
        let v = vectors[row][feature];
        min = min.min(v);
        max = max.max(v);
    }

    // All values equal on the drawn feature: nothing to split.
    if max - min <= f64::EPSILON {
        return TreeNode::Leaf { size: rows.len() };
    }

    let threshold = rng.gen_range(min..max);
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .copied()
        .partition(|&row| vectors[row][feature] < threshold);

    // Degenerate draw at the boundary: treat as unsplittable.
    if left_rows.is_empty() || right_rows.is_empty() {
        return TreeNode::Leaf { size: rows.len() };
    }

    TreeNode::Split {
        feature,
        threshold,
        left: Box::new(build_tree(vectors, &left_rows, depth + 1, max_depth, dim, rng)),
        right: Box::new(build_tree(vectors, &right_rows, depth + 1, max_depth, dim, rng)),
    }
}

/// Path length of a vector through one tree. Leaves holding more than one
/// sample extend the path by the average-depth approximation `c(size)`;
/// singleton leaves contribute the raw depth.
fn path_length(node: &TreeNode, vector: &[f64], depth: usize) -> f64 {
    match node {
        TreeNode::Leaf { size } => {
            if *size > 1 {
                depth as f64 + average_path_length(*size)
            } else {
                depth as f64
            }
        }
        TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if vector[*feature] < *threshold {
                path_length(left, vector, depth + 1)
            } else {
                path_length(right, vector, depth + 1)
            }
        }
    }
}

/// Harmonic approximation of the average unsuccessful-search path length in
/// a binary tree over `n` samples: `c(n) = 2(ln(n-1) + γ) - 2(n-1)/n`.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let nf = n as f64;
    2.0 * ((nf - 1.0).ln() + EULER_GAMMA) - 2.0 * (nf - 1.0) / nf
}

/// Average path length across the ensemble, normalized to [0, 1].
fn normalized_score(trees: &[TreeNode], vector: &[f64], sample_size: usize) -> f64 {
    if trees.is_empty() {
        return 0.5;
    }
    let total: f64 = trees
        .iter()
        .map(|tree| path_length(tree, vector, 0))
        .sum();
    let avg = total / trees.len() as f64;
    let c = average_path_length(sample_size.max(2));
    2f64.powf(-avg / c).clamp(0.0, 1.0)
}

/// Compare the input against fitted 75th percentiles on the fields most
/// useful to reviewers: charge, procedure count, weekend flag, denial rate.
fn contributing_factors(
    vector: &[f64],
    stats: &[FeatureStatistics],
) -> Vec<(usize, String)> {
    let mut factors = Vec::new();

    if let Some(s) = stats.get(IDX_TOTAL_CHARGED) {
        if vector[IDX_TOTAL_CHARGED] > s.p75 {
            factors.push((
                IDX_TOTAL_CHARGED,
                format!(
                    "total charged {:.2} above 75th percentile {:.2}",
                    vector[IDX_TOTAL_CHARGED], s.p75
                ),
            ));
        }
    }
    if let Some(s) = stats.get(IDX_NUM_PROCEDURES) {
        if vector[IDX_NUM_PROCEDURES] > s.p75 {
            factors.push((
                IDX_NUM_PROCEDURES,
                format!(
                    "procedure count {} above 75th percentile {:.1}",
                    vector[IDX_NUM_PROCEDURES] as usize, s.p75
                ),
            ));
        }
    }
    if let Some(s) = stats.get(IDX_IS_WEEKEND) {
        if vector[IDX_IS_WEEKEND] > s.p75 {
            factors.push((IDX_IS_WEEKEND, "weekend service".to_string()));
        }
    }
    if let Some(s) = stats.get(IDX_PROVIDER_DENIAL_RATE) {
        if vector[IDX_PROVIDER_DENIAL_RATE] > s.p75 {
            factors.push((
                IDX_PROVIDER_DENIAL_RATE,
                format!(
                    "provider denial rate {:.2} above 75th percentile {:.2}",
                    vector[IDX_PROVIDER_DENIAL_RATE], s.p75
                ),
            ));
        }
    }

    factors
}

/// Map the strongest contributing factor to an anomaly category.
fn primary_category(factors: &[(usize, String)]) -> Option<AnomalyCategory> {
    factors.first().map(|(idx, _)| match *idx {
        IDX_TOTAL_CHARGED => AnomalyCategory::Cost,
        IDX_NUM_PROCEDURES => AnomalyCategory::Billing,
        IDX_IS_WEEKEND => AnomalyCategory::Timing,
        _ => AnomalyCategory::Provider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> ForestConfig {
        ForestConfig {
            n_estimators: 50,
            max_samples: 64,
            contamination: 0.1,
            seed,
        }
    }

    /// Tight cluster around the origin plus a few far outliers.
    fn clustered_vectors() -> Vec<Vec<f64>> {
        let mut vectors = Vec::new();
        for i in 0..60 {
            let jitter = (i % 7) as f64 * 0.1;
            vectors.push(vec![10.0 + jitter, 2.0 + jitter * 0.5, 1.0]);
        }
        vectors.push(vec![500.0, 40.0, 30.0]);
        vectors.push(vec![450.0, 35.0, 25.0]);
        vectors
    }

    #[test]
    fn fit_rejects_tiny_datasets() {
        let mut model = IsolationForestModel::new(config(7));
        assert!(model.fit_vectors(&[]).is_err());
        assert!(model.fit_vectors(&[vec![1.0]]).is_err());
    }

    #[test]
    fn fit_rejects_ragged_vectors() {
        let mut model = IsolationForestModel::new(config(7));
        let err = model
            .fit_vectors(&[vec![1.0, 2.0], vec![1.0]])
            .unwrap_err();
        assert!(err.to_string().contains("uniform"));
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let mut model = IsolationForestModel::new(config(7));
        let vectors = clustered_vectors();
        model.fit_vectors(&vectors).unwrap();

        for vector in &vectors {
            let score = model.score_vector(vector).unwrap();
            assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
        }
    }

    #[test]
    fn outliers_score_higher_than_cluster_points() {
        let mut model = IsolationForestModel::new(config(7));
        let vectors = clustered_vectors();
        model.fit_vectors(&vectors).unwrap();

        let cluster_score = model.score_vector(&vectors[0]).unwrap();
        let outlier_score = model.score_vector(&vectors[60]).unwrap();
        assert!(
            outlier_score > cluster_score,
            "outlier {} <= cluster {}",
            outlier_score,
            cluster_score
        );
        assert!(outlier_score > model.artifact().unwrap().threshold());
    }

    #[test]
    fn seeded_fit_is_deterministic() {
        let vectors = clustered_vectors();

        let mut first = IsolationForestModel::new(config(99));
        first.fit_vectors(&vectors).unwrap();
        let mut second = IsolationForestModel::new(config(99));
        second.fit_vectors(&vectors).unwrap();

        assert_eq!(
            first.artifact().unwrap().threshold(),
            second.artifact().unwrap().threshold()
        );
        for vector in &vectors {
            assert_eq!(
                first.score_vector(vector).unwrap(),
                second.score_vector(vector).unwrap()
            );
        }
    }

    #[test]
    fn different_seeds_differ() {
        let vectors = clustered_vectors();

        let mut first = IsolationForestModel::new(config(1));
        first.fit_vectors(&vectors).unwrap();
        let mut second = IsolationForestModel::new(config(2));
        second.fit_vectors(&vectors).unwrap();

        let diverged = vectors.iter().any(|v| {
            first.score_vector(v).unwrap() != second.score_vector(v).unwrap()
        });
        assert!(diverged);
    }

    #[test]
    fn refit_bumps_version() {
        let mut model = IsolationForestModel::new(config(7));
        let vectors = clustered_vectors();
        model.fit_vectors(&vectors).unwrap();
        assert_eq!(model.artifact().unwrap().version, 1);
        model.fit_vectors(&vectors).unwrap();
        assert_eq!(model.artifact().unwrap().version, 2);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let mut model = IsolationForestModel::new(config(7));
        model.fit_vectors(&clustered_vectors()).unwrap();
        let err = model.score_vector(&[1.0]).unwrap_err();
        assert!(err.to_string().contains("dimensions"));
    }

    #[test]
    fn trait_predict_is_neutral_before_fit() {
        use chrono::NaiveDate;
        use clearclaim_core::ClaimRecord;
        use clearclaim_rules::RuleSet;

        let model = IsolationForestModel::new(config(7));
        let engineer =
            crate::features::FeatureEngineer::new(RuleSet::embedded().unwrap().code_sets);
        let claim = ClaimRecord::new(
            "C1",
            "M1",
            "P1",
            NaiveDate::from_ymd_opt(2024, 3, 13).unwrap(),
        );
        let features = engineer.engineer(&claim, None, None);

        let model_ref: &dyn AnomalyModel = &model;
        let score = model_ref.predict(&features);
        assert!(!score.is_anomaly);
        assert_eq!(score.anomaly_score, 0.5);
        assert!(!model_ref.is_fitted());
    }

    #[test]
    fn average_path_length_known_values() {
        assert_eq!(average_path_length(1), 0.0);
        // c(2) = 2(ln(1) + gamma) - 1 = 2*gamma - 1
        let expected = 2.0 * EULER_GAMMA - 1.0;
        assert!((average_path_length(2) - expected).abs() < 1e-9);
        // c(n) grows with n.
        assert!(average_path_length(256) > average_path_length(16));
    }
}
