//! Error types for the scoring pipeline

use thiserror::Error;

/// Malformed transaction rejected at the ingestion boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("transaction has no user id")]
    MissingUserId,

    #[error("transaction amount must be positive, got {0}")]
    NonPositiveAmount(f64),

    #[error("transaction amount is not a finite number")]
    NonFiniteAmount,
}

/// Reason a training pass, or a single scorer within it, did not produce a model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    #[error("training batch is empty")]
    EmptyBatch,

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("labels contain a single class only")]
    SingleClass,

    #[error("training diverged: {0}")]
    Diverged(String),
}

/// Failure to load, validate or persist a model artifact.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}
