//! Offline training pass: batch features, synthesized labels, fitted scorers

use crate::config::{AppConfig, ModelsConfig};
use crate::error::TrainingError;
use crate::feature_extractor::FeatureExtractor;
use crate::labeler::RuleLabeler;
use crate::models::isolation_forest::IsolationForestParams;
use crate::models::neural_network::NeuralNetworkParams;
use crate::models::random_forest::RandomForestParams;
use crate::models::{
    Classifier, IsolationForest, ModelArtifact, NeuralNetwork, RandomForest, StandardScaler,
};
use crate::types::transaction::Transaction;
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

/// What happened to one scorer during training.
#[derive(Debug, Clone, PartialEq)]
pub enum ScorerOutcome {
    Trained,
    /// Not attempted, with the reason
    Skipped(String),
    /// Attempted and failed; the scorer is left out of the artifact
    Failed(TrainingError),
}

impl fmt::Display for ScorerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScorerOutcome::Trained => write!(f, "trained"),
            ScorerOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            ScorerOutcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Result of a training pass
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub artifact: ModelArtifact,
    pub n_samples: usize,
    pub n_positive: usize,
    /// Outcome per scorer, in training order
    pub outcomes: Vec<(&'static str, ScorerOutcome)>,
}

impl TrainingReport {
    pub fn positive_rate(&self) -> f64 {
        if self.n_samples == 0 {
            0.0
        } else {
            self.n_positive as f64 / self.n_samples as f64
        }
    }

    pub fn outcome(&self, scorer: &str) -> Option<&ScorerOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| *name == scorer)
            .map(|(_, outcome)| outcome)
    }

    pub fn trained_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == ScorerOutcome::Trained)
            .count()
    }
}

/// Builds a [`ModelArtifact`] from a historical batch.
pub struct TrainingPipeline {
    extractor: FeatureExtractor,
    labeler: RuleLabeler,
    models: ModelsConfig,
}

impl TrainingPipeline {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(&config.features),
            labeler: RuleLabeler::new(config.labeling.clone()),
            models: config.models.clone(),
        }
    }

    /// Train every scorer the batch supports.
    ///
    /// Fails only when no feature matrix can be built. A scorer that cannot be
    /// trained is recorded in the report and left out, so the artifact may hold
    /// any subset of scorers, including none.
    pub fn run(&self, batch: &[Transaction]) -> Result<TrainingReport, TrainingError> {
        if batch.is_empty() {
            return Err(TrainingError::EmptyBatch);
        }
        let start = Instant::now();

        let mut ordered = batch.to_vec();
        ordered.sort_by(|a, b| {
            a.user_id()
                .cmp(b.user_id())
                .then_with(|| a.timestamp().cmp(&b.timestamp()))
        });

        let features = self.extractor.extract_batch(&ordered);
        let labels = self.labeler.label_batch(&features);
        let n_positive = labels.iter().filter(|&&l| l).count();

        let rows: Vec<Vec<f64>> = features.iter().map(|f| f.to_array().to_vec()).collect();
        let scaler = StandardScaler::fit(&rows)?;
        let scaled = scaler.transform_all(&rows);

        info!(
            samples = ordered.len(),
            positives = n_positive,
            positive_rate = n_positive as f64 / ordered.len() as f64,
            "Training batch prepared"
        );

        let mut artifact = ModelArtifact::new(scaler, FeatureExtractor::batch_stats(&ordered));
        let mut outcomes = Vec::new();

        let params = IsolationForestParams {
            n_trees: self.models.isolation_trees,
            max_samples: self.models.isolation_max_samples,
            contamination: self.models.contamination,
            seed: self.models.seed,
        };
        let outcome = match IsolationForest::fit(&scaled, &params) {
            Ok(forest) => {
                info!(
                    trees = forest.n_trees(),
                    threshold = forest.threshold(),
                    "Isolation forest fitted"
                );
                artifact.anomaly = Some(forest);
                ScorerOutcome::Trained
            }
            Err(e) => ScorerOutcome::Failed(e),
        };
        outcomes.push(("isolation_forest", outcome));

        if n_positive < self.models.min_positive_labels {
            let reason = format!(
                "{} positive labels, need {}",
                n_positive, self.models.min_positive_labels
            );
            outcomes.push(("random_forest", ScorerOutcome::Skipped(reason.clone())));
            outcomes.push(("neural_network", ScorerOutcome::Skipped(reason)));
        } else {
            let rf = &self.models.random_forest;
            let params = RandomForestParams {
                n_trees: rf.n_trees,
                max_depth: rf.max_depth,
                min_samples_split: rf.min_samples_split,
                min_samples_leaf: rf.min_samples_leaf,
                seed: self.models.seed,
            };
            let outcome = match RandomForest::fit(&scaled, &labels, &params) {
                Ok(model) => {
                    artifact.classifiers.push(Classifier::RandomForest(model));
                    ScorerOutcome::Trained
                }
                Err(e) => ScorerOutcome::Failed(e),
            };
            outcomes.push(("random_forest", outcome));

            let nn = &self.models.neural_network;
            let outcome = if nn.enabled {
                let params = NeuralNetworkParams {
                    hidden_units: nn.hidden_units,
                    epochs: nn.epochs,
                    batch_size: nn.batch_size,
                    learning_rate: nn.learning_rate,
                    seed: self.models.seed,
                };
                match NeuralNetwork::fit(&scaled, &labels, &params) {
                    Ok(model) => {
                        artifact.classifiers.push(Classifier::NeuralNetwork(model));
                        ScorerOutcome::Trained
                    }
                    Err(e) => ScorerOutcome::Failed(e),
                }
            } else {
                ScorerOutcome::Skipped("disabled by configuration".to_string())
            };
            outcomes.push(("neural_network", outcome));
        }

        for (scorer, outcome) in &outcomes {
            match outcome {
                ScorerOutcome::Failed(_) => warn!(scorer = scorer, outcome = %outcome, "Scorer not trained"),
                _ => info!(scorer = scorer, outcome = %outcome, "Scorer training finished"),
            }
        }

        let report = TrainingReport {
            artifact,
            n_samples: ordered.len(),
            n_positive,
            outcomes,
        };

        info!(
            trained = report.trained_count(),
            scorers = ?report.artifact.scorer_names(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training pass complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::synthetic_batch;

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.models.isolation_trees = 30;
        config.models.random_forest.n_trees = 10;
        config.models.neural_network.epochs = 5;
        config
    }

    #[test]
    fn test_empty_batch_fails() {
        let pipeline = TrainingPipeline::new(&AppConfig::default());
        assert_eq!(pipeline.run(&[]).err(), Some(TrainingError::EmptyBatch));
    }

    #[test]
    fn test_trains_all_scorers() {
        let (batch, _) = synthetic_batch(400, 1);
        let report = TrainingPipeline::new(&fast_config()).run(&batch).unwrap();

        assert_eq!(report.n_samples, 400);
        assert!(report.n_positive >= 6);
        assert_eq!(report.trained_count(), 3);
        assert_eq!(
            report.artifact.scorer_names(),
            vec!["isolation_forest", "random_forest", "neural_network"]
        );
        assert_eq!(report.artifact.amount_stats.count(), 400);
    }

    #[test]
    fn test_classifiers_skipped_without_enough_positives() {
        // All daytime mid-range amounts, hours apart: only first transactions
        // could be labeled, and the gate keeps those out
        let (batch, injected) = synthetic_batch(200, 2);
        let normal: Vec<Transaction> = batch
            .into_iter()
            .zip(injected)
            .filter(|(_, outlier)| !outlier)
            .map(|(tx, _)| tx)
            .collect();

        let mut config = fast_config();
        config.labeling.repeat_requires_prior = true;
        let report = TrainingPipeline::new(&config).run(&normal).unwrap();

        assert!(report.n_positive < 6);
        assert!(matches!(
            report.outcome("random_forest"),
            Some(ScorerOutcome::Skipped(_))
        ));
        assert!(matches!(
            report.outcome("neural_network"),
            Some(ScorerOutcome::Skipped(_))
        ));
        assert_eq!(report.outcome("isolation_forest"), Some(&ScorerOutcome::Trained));
        assert_eq!(report.artifact.scorer_names(), vec!["isolation_forest"]);
    }

    #[test]
    fn test_disabled_network_is_skipped() {
        let mut config = fast_config();
        config.models.neural_network.enabled = false;
        let (batch, _) = synthetic_batch(300, 3);

        let report = TrainingPipeline::new(&config).run(&batch).unwrap();
        assert_eq!(report.outcome("random_forest"), Some(&ScorerOutcome::Trained));
        assert_eq!(
            report.outcome("neural_network"),
            Some(&ScorerOutcome::Skipped("disabled by configuration".to_string()))
        );
    }

    #[test]
    fn test_single_transaction_degrades_to_no_scorers() {
        let batch = vec![Transaction::new("user_001", 50_000.0).unwrap()];
        let report = TrainingPipeline::new(&fast_config()).run(&batch).unwrap();

        assert!(matches!(
            report.outcome("isolation_forest"),
            Some(ScorerOutcome::Failed(TrainingError::InsufficientData(_)))
        ));
        assert!(!report.artifact.has_scorers());
    }

    #[test]
    fn test_labels_close_to_injected_rate() {
        let (batch, injected) = synthetic_batch(1000, 4);
        let report = TrainingPipeline::new(&fast_config()).run(&batch).unwrap();

        let injected_count = injected.iter().filter(|&&o| o).count();
        assert_eq!(injected_count, 100);
        // Small outliers, high ones beyond three sigma, and each user's first
        assert!(report.n_positive >= 90, "positives {}", report.n_positive);
        assert!(report.n_positive <= 140, "positives {}", report.n_positive);
        assert!((0.09..=0.14).contains(&report.positive_rate()));
    }

    #[test]
    fn test_labels_recover_injected_rows() {
        let config = fast_config();
        let (batch, injected) = synthetic_batch(1000, 5);
        let features = FeatureExtractor::new(&config.features).extract_batch(&batch);
        let labels = RuleLabeler::new(config.labeling.clone()).label_batch(&features);

        // Injected rows are spread over many users
        let outlier_users: std::collections::HashSet<&str> = batch
            .iter()
            .zip(&injected)
            .filter(|(_, outlier)| **outlier)
            .map(|(tx, _)| tx.user_id())
            .collect();
        assert!(outlier_users.len() >= 15, "{} users", outlier_users.len());

        let mut overlap = 0;
        let rows = batch.iter().zip(&injected).zip(labels.iter().zip(&features));
        for ((tx, &outlier), (&label, f)) in rows {
            if outlier && tx.amount() < 1_000.0 {
                assert!(label, "small injected row not labeled: {}", tx.amount());
            }
            if label && outlier {
                overlap += 1;
            }
            if label && !outlier {
                // Ordinary rows are only labeled as a user's first transaction
                assert_eq!(f.user_count, 0.0);
            }
        }

        let positives = labels.iter().filter(|&&l| l).count();
        assert!(overlap * 4 >= positives * 3, "overlap {overlap} of {positives}");
        assert!(overlap >= 80, "overlap {overlap}");
    }
}
