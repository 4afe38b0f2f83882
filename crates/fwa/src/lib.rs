//! Fraud, Waste, and Abuse detection engine.
//!
//! A self-contained, CPU-bound analytics pipeline over claim projections:
//!
//! - [`features`] — numeric feature engineering per claim
//! - [`models`] — unsupervised anomaly scorers (isolation forest, statistical)
//! - [`detectors`] — duplicate, upcoding, unbundling, and pattern detectors
//! - [`scoring`] — weighted fusion into one risk score and recommendation
//! - [`service`] — per-claim orchestration with a never-raise boundary
//!
//! The engine performs no I/O: callers pre-fetch claim history and pass it
//! through an [`AnalysisContext`].

pub mod context;
pub mod detectors;
pub mod features;
pub mod models;
pub mod scoring;
pub mod service;
pub mod stats;
pub mod types;

pub use context::AnalysisContext;
pub use features::{ClaimFeatures, FeatureEngineer, FEATURE_DIM};
pub use models::{AnomalyModel, IsolationForestModel, StatisticalAnomalyModel};
pub use scoring::FwaRiskScorer;
pub use service::FwaService;
pub use types::{
    AnomalyCategory, AnomalyScore, FlagType, FwaFlag, FwaResult, Recommendation, RiskLevel,
    Severity,
};
