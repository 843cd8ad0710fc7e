//! Fraud Scoring Pipeline - Main Entry Point
//!
//! Reads JSON-lines transactions, trains a model artifact when none exists,
//! and scores the stream on a bounded pool of workers.

use anyhow::{Context, Result};
use fraud_scoring_pipeline::{
    config::{AppConfig, LoggingConfig},
    metrics::MetricsReporter,
    models::ModelArtifact,
    service::ScoringService,
    training::TrainingPipeline,
    Transaction,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/config.toml".to_string());
    let config = if Path::new(&config_path).exists() {
        AppConfig::load_from_path(&config_path)?
    } else {
        AppConfig::default()
    };

    init_tracing(&config.logging);
    info!(config = %config_path, "Starting Fraud Scoring Pipeline");
    info!(
        "Thresholds: ensemble suspicious>{:.2}, rule-only suspicious>{:.2}, medium>{:.2}, high>{:.2}",
        config.detection.ensemble.suspicious,
        config.detection.rule_only.suspicious,
        config.detection.ensemble.medium,
        config.detection.ensemble.high
    );

    let transactions = read_transactions(&config.pipeline.input_path)?;
    info!(
        count = transactions.len(),
        path = %config.pipeline.input_path,
        "Transactions loaded"
    );

    let artifact = prepare_artifact(&config, &transactions);
    let service = Arc::new(ScoringService::new(&config, artifact));
    let metrics = service.metrics();

    if config.pipeline.metrics_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
        tokio::spawn(reporter.start());
    }

    let num_workers = config.pipeline.workers.max(1);
    info!(workers = num_workers, "Scoring transactions");

    // Scoring is CPU-bound: permits bound the blocking tasks in flight
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let start = Instant::now();
    let mut handles = Vec::with_capacity(transactions.len());

    for transaction in transactions {
        let permit = semaphore.clone().acquire_owned().await?;
        let service = service.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            let decision = service.score(&transaction);
            drop(permit);

            if decision.is_suspicious {
                info!(
                    decision_id = %decision.decision_id,
                    user_id = %decision.user_id,
                    amount = decision.amount,
                    risk_score = %format!("{:.3}", decision.risk_score),
                    risk_level = decision.risk_level.as_str(),
                    model_used = decision.model_used.as_str(),
                    reasons = ?decision.reasons,
                    "🚨 SUSPICIOUS TRANSACTION"
                );
            }
            decision.is_suspicious
        }));
    }

    let mut suspicious = 0usize;
    let total = handles.len();
    for handle in handles {
        if handle.await? {
            suspicious += 1;
        }
    }

    info!(
        checked = total,
        suspicious = suspicious,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Scoring complete"
    );
    info!(health = ?service.health(), "Service health");
    metrics.print_summary();

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Parse a JSON-lines file, skipping lines that fail validation.
fn read_transactions(path: &str) -> Result<Vec<Transaction>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transactions from {path}"))?;

    let mut transactions = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Transaction>(line) {
            Ok(tx) => transactions.push(tx),
            Err(e) => warn!(line = line_no + 1, error = %e, "Rejected transaction"),
        }
    }
    Ok(transactions)
}

/// Load the configured artifact, training and saving a new one when it is
/// missing or retraining is requested.
fn prepare_artifact(config: &AppConfig, transactions: &[Transaction]) -> Option<ModelArtifact> {
    let path = &config.models.artifact_path;

    if !config.pipeline.retrain && Path::new(path).exists() {
        match ModelArtifact::load(path) {
            Ok(artifact) => return Some(artifact),
            Err(e) => warn!(path = %path, error = %e, "Stored artifact unusable, retraining"),
        }
    }

    let report = match TrainingPipeline::new(config).run(transactions) {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "Training failed, scoring with rules only");
            return None;
        }
    };
    info!(
        samples = report.n_samples,
        positives = report.n_positive,
        positive_rate = %format!("{:.3}", report.positive_rate()),
        "Training report"
    );

    if let Err(e) = report.artifact.save(path) {
        warn!(path = %path, error = %e, "Failed to persist artifact");
    }
    Some(report.artifact)
}
