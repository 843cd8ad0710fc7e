//! Configuration management for the scoring pipeline

use crate::types::decision::ContextThresholds;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub labeling: LabelingConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Model training and artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Where the trained artifact is saved and loaded from
    pub artifact_path: String,
    /// Expected share of anomalies for the isolation forest
    pub contamination: f64,
    /// Trees in the isolation forest
    pub isolation_trees: usize,
    /// Subsample size per isolation tree
    pub isolation_max_samples: usize,
    /// Seed for every randomized model
    pub seed: u64,
    /// Positive labels required before any classifier is trained
    pub min_positive_labels: usize,
    /// Per-scorer ensemble weights; empty means a plain mean
    pub weights: HashMap<String, f64>,
    pub random_forest: RandomForestConfig,
    pub neural_network: NeuralNetworkConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            artifact_path: "models/artifact.json".to_string(),
            contamination: 0.05,
            isolation_trees: 100,
            isolation_max_samples: 256,
            seed: 42,
            min_positive_labels: 6,
            weights: HashMap::new(),
            random_forest: RandomForestConfig::default(),
            neural_network: NeuralNetworkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NeuralNetworkConfig {
    pub enabled: bool,
    pub hidden_units: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}

impl Default for NeuralNetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hidden_units: 16,
            epochs: 30,
            batch_size: 32,
            learning_rate: 0.05,
        }
    }
}

/// Thresholds used to synthesize training labels
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    pub very_large_amount: f64,
    pub very_small_amount: f64,
    pub max_count_1h: f64,
    pub max_total_1h: f64,
    pub min_time_diff_sec: f64,
    pub max_amount_zscore: f64,
    /// Apply the sub-minute clause only when the user has an earlier
    /// transaction. Off by default: a first transaction has
    /// `time_diff_sec = 0` and is labeled.
    pub repeat_requires_prior: bool,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            very_large_amount: 10_000_000.0,
            very_small_amount: 1_000.0,
            max_count_1h: 8.0,
            max_total_1h: 15_000_000.0,
            min_time_diff_sec: 60.0,
            max_amount_zscore: 3.0,
            repeat_requires_prior: false,
        }
    }
}

/// Serving-time rule engine: override thresholds and fallback score increments
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub very_large_amount: f64,
    pub very_large_score: f64,
    pub very_small_amount: f64,
    pub very_small_score: f64,
    pub large_amount: f64,
    pub large_score: f64,
    /// First off-hour, inclusive
    pub off_hours_start: u32,
    /// Last off-hour, inclusive
    pub off_hours_end: u32,
    pub off_hours_score: f64,
    pub max_count_1h: f64,
    pub min_time_diff_sec: f64,
    /// Report a sub-minute repeat only when the user has an earlier transaction
    pub repeat_requires_prior: bool,
    /// Append the critical-risk reason above this score
    pub critical_score: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            very_large_amount: 10_000_000.0,
            very_large_score: 0.6,
            very_small_amount: 1_000.0,
            very_small_score: 0.4,
            large_amount: 5_000_000.0,
            large_score: 0.3,
            off_hours_start: 2,
            off_hours_end: 6,
            off_hours_score: 0.2,
            max_count_1h: 8.0,
            min_time_diff_sec: 60.0,
            repeat_requires_prior: false,
            critical_score: 0.8,
        }
    }
}

/// Score thresholds per calling context
///
/// Each block may set any subset of its thresholds; the rest keep that
/// context's defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "DetectionOverrides")]
pub struct DetectionConfig {
    /// Used when at least one trained scorer contributes
    pub ensemble: ContextThresholds,
    /// Used when the rule engine scores alone
    pub rule_only: ContextThresholds,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DetectionOverrides {
    ensemble: ThresholdOverrides,
    rule_only: ThresholdOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThresholdOverrides {
    suspicious: Option<f64>,
    medium: Option<f64>,
    high: Option<f64>,
}

impl ThresholdOverrides {
    fn apply(self, base: ContextThresholds) -> ContextThresholds {
        ContextThresholds {
            suspicious: self.suspicious.unwrap_or(base.suspicious),
            medium: self.medium.unwrap_or(base.medium),
            high: self.high.unwrap_or(base.high),
        }
    }
}

impl From<DetectionOverrides> for DetectionConfig {
    fn from(overrides: DetectionOverrides) -> Self {
        Self {
            ensemble: overrides.ensemble.apply(ContextThresholds::ensemble()),
            rule_only: overrides.rule_only.apply(ContextThresholds::rule_only()),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            ensemble: ContextThresholds::ensemble(),
            rule_only: ContextThresholds::rule_only(),
        }
    }
}

/// Feature derivation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Trailing window for `total_1h` / `count_1h`, in seconds
    pub window_secs: i64,
    /// Most recent transactions kept per user when streaming
    pub history_capacity: usize,
    /// Fixed timezone for `hour` and `day_of_week`
    pub utc_offset_hours: i32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window_secs: 3600,
            history_capacity: 256,
            utc_offset_hours: 0,
        }
    }
}

/// Batch runner configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent scoring workers
    pub workers: usize,
    /// JSON-lines transaction file
    pub input_path: String,
    /// Train a new artifact even when one exists
    pub retrain: bool,
    /// Seconds between periodic metrics summaries, 0 disables them
    pub metrics_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            input_path: "data/transactions.jsonl".to_string(),
            retrain: false,
            metrics_interval_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models: ModelsConfig::default(),
            labeling: LabelingConfig::default(),
            rules: RulesConfig::default(),
            detection: DetectionConfig::default(),
            features: FeatureConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
