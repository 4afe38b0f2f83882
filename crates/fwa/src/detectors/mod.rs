//! Rule- and statistics-based billing detectors.
//!
//! - [`duplicate`] — weighted fuzzy matching against existing claims
//! - [`upcoding`] — E/M level inflation (statistical + clinical triggers)
//! - [`unbundling`] — component/bundle co-occurrence and fragmentation
//! - [`patterns`] — provider behavior, impossible days, excessive services

pub mod duplicate;
pub mod patterns;
pub mod unbundling;
pub mod upcoding;

pub use duplicate::{DuplicateCheck, DuplicateDetector};
pub use patterns::{PatternAnalyzer, PatternAnomaly, PatternAnomalyType, ProviderBehaviorScore};
pub use unbundling::{UnbundlingCheck, UnbundlingDetector};
pub use upcoding::{UpcodingCheck, UpcodingDetector};
