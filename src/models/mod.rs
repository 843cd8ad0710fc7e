//! Scorers, their persisted artifact, and the ensemble combiner

pub mod aggregator;
pub mod artifact;
pub mod decision_tree;
pub mod ensemble;
pub mod isolation_forest;
pub mod neural_network;
pub mod random_forest;
pub mod scaler;

pub use aggregator::ScoreAggregator;
pub use artifact::{Classifier, ModelArtifact};
pub use ensemble::EnsembleCombiner;
pub use isolation_forest::IsolationForest;
pub use neural_network::NeuralNetwork;
pub use random_forest::RandomForest;
pub use scaler::StandardScaler;

/// Unsupervised outlier model over scaled feature vectors.
pub trait AnomalyScorer: Send + Sync {
    /// Higher means more anomalous
    fn score(&self, scaled: &[f64]) -> f64;

    /// Decision against the fitted boundary
    fn is_outlier(&self, scaled: &[f64]) -> bool;
}

/// Supervised fraud model over scaled feature vectors.
pub trait ClassifierScorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn predict(&self, scaled: &[f64]) -> bool;

    /// Fraud probability when the algorithm has one
    fn probability(&self, scaled: &[f64]) -> Option<f64>;
}

impl AnomalyScorer for IsolationForest {
    fn score(&self, scaled: &[f64]) -> f64 {
        IsolationForest::score(self, scaled)
    }

    fn is_outlier(&self, scaled: &[f64]) -> bool {
        IsolationForest::is_outlier(self, scaled)
    }
}

impl ClassifierScorer for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn predict(&self, scaled: &[f64]) -> bool {
        RandomForest::predict(self, scaled)
    }

    fn probability(&self, scaled: &[f64]) -> Option<f64> {
        Some(self.predict_proba(scaled))
    }
}

impl ClassifierScorer for NeuralNetwork {
    fn name(&self) -> &'static str {
        "neural_network"
    }

    fn predict(&self, scaled: &[f64]) -> bool {
        NeuralNetwork::predict(self, scaled)
    }

    fn probability(&self, scaled: &[f64]) -> Option<f64> {
        Some(self.predict_proba(scaled))
    }
}

/// One scorer's contribution to the ensemble, normalized to [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerOutput {
    pub name: &'static str,
    pub score: f64,
}

impl ScorerOutput {
    pub fn new(name: &'static str, score: f64) -> Self {
        Self { name, score }
    }
}
