//! Online scoring service.
//!
//! Holds the active [`ModelArtifact`] behind an atomic pointer swap and one
//! rolling history window per user. Scoring a transaction derives its
//! features under that user's lock, runs whichever scorers the artifact
//! carries, and hands the outputs to the [`EnsembleCombiner`].

use crate::config::AppConfig;
use crate::error::ArtifactError;
use crate::feature_extractor::{
    AmountStats, FeatureExtractor, FeatureVector, HistoryPoint, UserSummary,
};
use crate::metrics::PipelineMetrics;
use crate::models::{EnsembleCombiner, ModelArtifact};
use crate::types::decision::{BatchSummary, ModelUsed, RiskDecision};
use crate::types::transaction::Transaction;
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Bounded, timestamp-ordered history of one user.
///
/// Entries pushed out by the capacity are folded into a summary, so user
/// aggregates keep covering every transaction seen while lags and the
/// trailing window come from the retained entries.
#[derive(Debug)]
pub struct UserWindow {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
    evicted: UserSummary,
}

impl UserWindow {
    /// At least three entries are kept so the lag features stay exact.
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::new(),
            capacity: capacity.max(3),
            evicted: UserSummary::default(),
        }
    }

    /// Entries at or before `ts`, oldest first.
    pub fn history_before(&mut self, ts: DateTime<Utc>) -> &[HistoryPoint] {
        let points = self.points.make_contiguous();
        let end = points.partition_point(|p| p.timestamp <= ts);
        &points[..end]
    }

    /// Retained entries at or before `ts`, plus a summary of everything the
    /// user did up to then, evicted entries included.
    pub fn view(&mut self, ts: DateTime<Utc>) -> (&[HistoryPoint], UserSummary) {
        let evicted = self.evicted;
        let recent = self.history_before(ts);
        let summary = evicted.merge(&UserSummary::from_points(recent));
        (recent, summary)
    }

    /// Insert in timestamp order after equal timestamps, evicting the oldest
    /// entry once over capacity.
    pub fn insert(&mut self, point: HistoryPoint) {
        let pos = self.points.partition_point(|p| p.timestamp <= point.timestamp);
        self.points.insert(pos, point);
        while self.points.len() > self.capacity {
            if let Some(old) = self.points.pop_front() {
                self.evicted.push(old.amount);
            }
        }
    }

    /// Timestamp of the newest entry
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.points.back().map(|p| p.timestamp)
    }

    /// Retained entries
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Every transaction seen, evicted ones included
    pub fn total_seen(&self) -> u64 {
        self.evicted.count() + self.points.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// No trained scorer is loaded; decisions come from the rule engine
    Degraded,
}

/// Snapshot of the service state
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    pub model_loaded: bool,
    pub models_available: Vec<String>,
    pub total_checks: u64,
    pub tracked_users: usize,
}

/// Scores transactions against the active model artifact.
pub struct ScoringService {
    artifact: ArcSwapOption<ModelArtifact>,
    windows: DashMap<String, Arc<Mutex<UserWindow>>>,
    /// Running amount distribution for `amount_zscore`
    running: Mutex<AmountStats>,
    extractor: FeatureExtractor,
    combiner: EnsembleCombiner,
    history_capacity: usize,
    metrics: Arc<PipelineMetrics>,
}

impl ScoringService {
    /// Build a service, optionally with an artifact already loaded.
    ///
    /// The running amount estimate starts from the artifact's training
    /// statistics.
    pub fn new(config: &AppConfig, artifact: Option<ModelArtifact>) -> Self {
        let running = artifact
            .as_ref()
            .map(|a| a.amount_stats)
            .unwrap_or_default();

        if artifact.is_none() {
            warn!("Scoring service started without a model artifact, using rule engine only");
        }

        Self {
            artifact: ArcSwapOption::from(artifact.map(Arc::new)),
            windows: DashMap::new(),
            running: Mutex::new(running),
            extractor: FeatureExtractor::new(&config.features),
            combiner: EnsembleCombiner::from_config(config),
            history_capacity: config.features.history_capacity,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Score one transaction. Always returns a decision.
    pub fn score(&self, tx: &Transaction) -> RiskDecision {
        let start = Instant::now();
        // Pinned for the whole call; a concurrent reload does not affect it
        let artifact = self.artifact.load_full();

        let features = self.observe(tx);

        let outputs = match artifact.as_deref() {
            Some(artifact) => artifact.score(&features),
            None => Vec::new(),
        };
        if outputs.is_empty() && artifact.as_ref().is_some_and(|a| a.has_scorers()) {
            warn!(user_id = %tx.user_id(), "No scorer produced output, falling back to rules");
        }

        let decision = self.combiner.decide(tx, &features, &outputs);
        self.metrics.record_decision(&decision, start.elapsed());

        if decision.is_suspicious {
            debug!(
                user_id = %decision.user_id,
                amount = decision.amount,
                risk_score = decision.risk_score,
                risk_level = decision.risk_level.as_str(),
                "Suspicious transaction"
            );
        }

        decision
    }

    /// Derive the features of `tx` from its user's window, then append it.
    ///
    /// Runs under the user's lock, so concurrent calls for one user serialize
    /// while different users proceed independently.
    pub fn observe(&self, tx: &Transaction) -> FeatureVector {
        let window = self
            .windows
            .entry(tx.user_id().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserWindow::new(self.history_capacity))))
            .clone();

        let global = {
            let mut running = self.running.lock();
            running.push(tx.amount());
            *running
        };

        let mut window = window.lock();
        let (recent, user) = window.view(tx.timestamp());
        let features = self
            .extractor
            .extract_with_summary(tx, recent, &user, &global);
        window.insert(HistoryPoint::from(tx));
        features
    }

    /// Score a batch in input order.
    pub fn score_batch(&self, transactions: &[Transaction]) -> BatchSummary {
        let results: Vec<RiskDecision> = transactions.iter().map(|tx| self.score(tx)).collect();
        let summary = BatchSummary::from_results(results);

        info!(
            checked = summary.checked_count,
            suspicious = summary.suspicious_count,
            "Batch check complete"
        );
        summary
    }

    /// Replace the active artifact with the one at `path`.
    ///
    /// On any failure the current artifact stays active.
    pub fn reload<P: AsRef<Path>>(&self, path: P) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        match ModelArtifact::load(path) {
            Ok(artifact) => {
                self.replace_artifact(artifact);
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Artifact reload failed, keeping current models");
                Err(e)
            }
        }
    }

    /// Swap in an already built artifact.
    pub fn replace_artifact(&self, artifact: ModelArtifact) {
        let scorers = artifact.scorer_names();
        self.artifact.store(Some(Arc::new(artifact)));
        info!(scorers = ?scorers, "Model artifact activated");
    }

    /// The artifact scoring calls currently use
    pub fn artifact(&self) -> Option<Arc<ModelArtifact>> {
        self.artifact.load_full()
    }

    pub fn health(&self) -> ServiceHealth {
        let artifact = self.artifact.load_full();
        let models_available: Vec<String> = artifact
            .as_ref()
            .map(|a| a.scorer_names().into_iter().map(String::from).collect())
            .unwrap_or_default();

        let status = if models_available.is_empty() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        ServiceHealth {
            status,
            model_loaded: artifact.is_some(),
            models_available,
            total_checks: self.metrics.total_checks(),
            tracked_users: self.windows.len(),
        }
    }

    /// Scoring path a call would take right now
    pub fn mode(&self) -> ModelUsed {
        match &*self.artifact.load() {
            Some(a) if a.has_scorers() => ModelUsed::Ensemble,
            _ => ModelUsed::RulesOnly,
        }
    }

    /// Entries held in a user's window
    pub fn history_len(&self, user_id: &str) -> usize {
        self.windows
            .get(user_id)
            .map(|w| w.lock().len())
            .unwrap_or(0)
    }

    /// Drop the windows of users whose newest transaction is before `cutoff`.
    ///
    /// Windows are otherwise kept for every user ever scored. A pruned user
    /// starts over with an empty history. Windows in use are left alone.
    /// Returns how many were dropped.
    pub fn prune_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let mut pruned = 0;
        self.windows.retain(|_, window| {
            let keep = match window.try_lock() {
                Some(window) => window.latest().is_some_and(|ts| ts >= cutoff),
                None => true,
            };
            if !keep {
                pruned += 1;
            }
            keep
        });

        if pruned > 0 {
            info!(pruned = pruned, remaining = self.windows.len(), "Pruned idle user windows");
        }
        pruned
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }
}
