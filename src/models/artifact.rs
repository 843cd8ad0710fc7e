//! Persisted model artifact: scaler, amount statistics and trained scorers

use super::{
    AnomalyScorer, ClassifierScorer, IsolationForest, NeuralNetwork, RandomForest, ScorerOutput,
    StandardScaler,
};
use crate::error::ArtifactError;
use crate::feature_extractor::{AmountStats, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Artifact format version
pub const ARTIFACT_VERSION: u32 = 1;

/// Name the anomaly scorer reports under
pub const ISOLATION_FOREST: &str = "isolation_forest";

/// A trained supervised scorer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    RandomForest(RandomForest),
    NeuralNetwork(NeuralNetwork),
}

impl Classifier {
    fn scorer(&self) -> &dyn ClassifierScorer {
        match self {
            Classifier::RandomForest(model) => model,
            Classifier::NeuralNetwork(model) => model,
        }
    }
}

impl ClassifierScorer for Classifier {
    fn name(&self) -> &'static str {
        self.scorer().name()
    }

    fn predict(&self, scaled: &[f64]) -> bool {
        self.scorer().predict(scaled)
    }

    fn probability(&self, scaled: &[f64]) -> Option<f64> {
        self.scorer().probability(scaled)
    }
}

/// Immutable output of a training pass.
///
/// The scoring service only ever reads it; replacing it means building a new
/// artifact and swapping the whole value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Feature schema the scaler and scorers were fitted on
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    /// Training-batch amount distribution, seeds the serving-time estimate
    pub amount_stats: AmountStats,
    pub anomaly: Option<IsolationForest>,
    pub classifiers: Vec<Classifier>,
}

impl ModelArtifact {
    /// Artifact with no scorers yet.
    pub fn new(scaler: StandardScaler, amount_stats: AmountStats) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            created_at: Utc::now(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            scaler,
            amount_stats,
            anomaly: None,
            classifiers: Vec::new(),
        }
    }

    /// Load and validate an artifact from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ArtifactError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let artifact = Self::from_json(&content)?;

        info!(
            path = %path.display(),
            scorers = ?artifact.scorer_names(),
            created_at = %artifact.created_at,
            "Model artifact loaded"
        );
        Ok(artifact)
    }

    /// Parse and validate an artifact.
    pub fn from_json(content: &str) -> Result<Self, ArtifactError> {
        let artifact: ModelArtifact = serde_json::from_str(content)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Write the artifact as JSON, replacing any previous file in one rename.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;

        info!(path = %path.display(), scorers = ?self.scorer_names(), "Model artifact saved");
        Ok(())
    }

    fn validate(&self) -> Result<(), ArtifactError> {
        if self.version != ARTIFACT_VERSION {
            return Err(ArtifactError::SchemaMismatch(format!(
                "artifact version {} (expected {})",
                self.version, ARTIFACT_VERSION
            )));
        }
        if self.feature_names.len() != FEATURE_COUNT
            || self.feature_names.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(ArtifactError::SchemaMismatch(format!(
                "feature names {:?}",
                self.feature_names
            )));
        }
        if self.scaler.n_features() != FEATURE_COUNT {
            return Err(ArtifactError::SchemaMismatch(format!(
                "scaler fitted on {} features",
                self.scaler.n_features()
            )));
        }
        Ok(())
    }

    /// Names of the trained scorers, anomaly scorer first.
    pub fn scorer_names(&self) -> Vec<&'static str> {
        self.anomaly
            .iter()
            .map(|_| ISOLATION_FOREST)
            .chain(self.classifiers.iter().map(|c| c.name()))
            .collect()
    }

    pub fn has_scorers(&self) -> bool {
        self.anomaly.is_some() || !self.classifiers.is_empty()
    }

    /// Normalized output of every scorer that produces a usable value.
    ///
    /// The anomaly scorer contributes its outlier decision (1 or 0);
    /// classifiers contribute their fraud probability. A scorer yielding a
    /// non-finite value is left out.
    pub fn score(&self, features: &FeatureVector) -> Vec<ScorerOutput> {
        let scaled = self.scaler.transform(&features.to_array());
        let mut outputs = Vec::with_capacity(1 + self.classifiers.len());

        if let Some(forest) = &self.anomaly {
            let raw = AnomalyScorer::score(forest, &scaled);
            if raw.is_finite() {
                let flagged = AnomalyScorer::is_outlier(forest, &scaled);
                outputs.push(ScorerOutput::new(ISOLATION_FOREST, if flagged { 1.0 } else { 0.0 }));
            } else {
                warn!(scorer = ISOLATION_FOREST, "Non-finite anomaly score, scorer skipped");
            }
        }

        for classifier in &self.classifiers {
            let score = classifier
                .probability(&scaled)
                .unwrap_or_else(|| if classifier.predict(&scaled) { 1.0 } else { 0.0 });
            if score.is_finite() {
                outputs.push(ScorerOutput::new(classifier.name(), score.clamp(0.0, 1.0)));
            } else {
                warn!(scorer = classifier.name(), "Non-finite probability, scorer skipped");
            }
        }

        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::isolation_forest::IsolationForestParams;

    fn rows() -> Vec<Vec<f64>> {
        (0..50)
            .map(|i| (0..FEATURE_COUNT).map(|f| ((i * (f + 1)) % 17) as f64).collect())
            .collect()
    }

    fn artifact_with_forest() -> ModelArtifact {
        let data = rows();
        let scaler = StandardScaler::fit(&data).unwrap();
        let scaled = scaler.transform_all(&data);
        let mut artifact = ModelArtifact::new(scaler, AmountStats::from_amounts([1.0, 2.0, 3.0]));
        artifact.anomaly = Some(
            IsolationForest::fit(
                &scaled,
                &IsolationForestParams {
                    n_trees: 10,
                    ..IsolationForestParams::default()
                },
            )
            .unwrap(),
        );
        artifact
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("artifact.json");
        let artifact = artifact_with_forest();

        artifact.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();

        assert_eq!(loaded.scorer_names(), vec![ISOLATION_FOREST]);
        assert_eq!(loaded.amount_stats, artifact.amount_stats);

        let features = FeatureVector {
            amount: 3.0,
            ..FeatureVector::default()
        };
        assert_eq!(loaded.score(&features), artifact.score(&features));
    }

    #[test]
    fn test_load_rejects_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();

        let missing = ModelArtifact::load(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(ArtifactError::NotFound(_))));

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, b"{ not json").unwrap();
        assert!(matches!(ModelArtifact::load(&corrupt), Err(ArtifactError::Parse(_))));
    }

    #[test]
    fn test_load_rejects_schema_mismatch() {
        let mut artifact = artifact_with_forest();
        artifact.feature_names.pop();
        let json = serde_json::to_string(&artifact).unwrap();

        assert!(matches!(
            ModelArtifact::from_json(&json),
            Err(ArtifactError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_empty_artifact_scores_nothing() {
        let scaler = StandardScaler::fit(&rows()).unwrap();
        let artifact = ModelArtifact::new(scaler, AmountStats::default());

        assert!(!artifact.has_scorers());
        assert!(artifact.score(&FeatureVector::default()).is_empty());
    }

    #[test]
    fn test_anomaly_output_is_binary() {
        let artifact = artifact_with_forest();
        let outputs = artifact.score(&FeatureVector {
            amount: 1e9,
            ..FeatureVector::default()
        });
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].score == 0.0 || outputs[0].score == 1.0);
    }
}
