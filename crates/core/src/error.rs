use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClearClaimError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Rule error: {0}")]
    Rule(String),

    #[error("Invalid claim: {0}")]
    InvalidClaim(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("{0}")]
    Other(String),
}
