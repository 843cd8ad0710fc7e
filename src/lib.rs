//! Fraud Scoring Pipeline Library
//!
//! Behavioral feature derivation, rule-synthesized training labels and an
//! ensemble of anomaly and classifier scorers that turns bank transactions
//! into risk decisions.

pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod labeler;
pub mod metrics;
pub mod models;
pub mod service;
pub mod training;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::AppConfig;
pub use error::{ArtifactError, TrainingError, ValidationError};
pub use feature_extractor::{FeatureExtractor, FeatureVector};
pub use labeler::RuleLabeler;
pub use models::{EnsembleCombiner, ModelArtifact};
pub use service::{ScoringService, ServiceHealth};
pub use training::{TrainingPipeline, TrainingReport};
pub use types::{decision::RiskDecision, transaction::Transaction};
