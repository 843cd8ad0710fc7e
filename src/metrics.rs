//! Scoring statistics for the pipeline and the service health surface.

use crate::types::decision::{ModelUsed, RiskDecision, RiskLevel};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for scoring decisions
pub struct PipelineMetrics {
    /// Total decisions produced
    pub decisions: AtomicU64,
    /// Decisions flagged suspicious
    pub suspicious: AtomicU64,
    /// Decisions scored by the rule engine alone
    pub rules_only: AtomicU64,
    /// Decisions by risk level
    by_level: RwLock<HashMap<RiskLevel, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Risk score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
    /// Scorer agreement per ensemble decision
    model_agreements: RwLock<Vec<f64>>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            decisions: AtomicU64::new(0),
            suspicious: AtomicU64::new(0),
            rules_only: AtomicU64::new(0),
            by_level: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
            model_agreements: RwLock::new(Vec::with_capacity(1000)),
        }
    }

    /// Record one decision and how long it took to produce
    pub fn record_decision(&self, decision: &RiskDecision, processing_time: Duration) {
        self.decisions.fetch_add(1, Ordering::Relaxed);
        if decision.is_suspicious {
            self.suspicious.fetch_add(1, Ordering::Relaxed);
        }
        if decision.model_used == ModelUsed::RulesOnly {
            self.rules_only.fetch_add(1, Ordering::Relaxed);
        }

        *self.by_level.write().entry(decision.risk_level).or_insert(0) += 1;

        {
            let mut times = self.processing_times.write();
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent window
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = (decision.risk_score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        self.score_buckets.write()[bucket] += 1;

        self.record_model_agreement(&decision.model_scores);
    }

    /// Record scorer agreement (1 - std dev of scores)
    fn record_model_agreement(&self, model_scores: &BTreeMap<String, f64>) {
        if model_scores.len() < 2 {
            return;
        }

        let n = model_scores.len() as f64;
        let mean = model_scores.values().sum::<f64>() / n;
        let variance = model_scores.values().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let agreement = 1.0 - variance.sqrt().min(1.0);

        let mut agreements = self.model_agreements.write();
        agreements.push(agreement);
        if agreements.len() > 1000 {
            agreements.drain(0..500);
        }
    }

    pub fn total_checks(&self) -> u64 {
        self.decisions.load(Ordering::Relaxed)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = self.processing_times.read().clone();
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get average scorer agreement
    pub fn get_avg_agreement(&self) -> f64 {
        let agreements = self.model_agreements.read();
        if agreements.is_empty() {
            return 0.0;
        }
        agreements.iter().sum::<f64>() / agreements.len() as f64
    }

    /// Decisions per second since creation
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_checks() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read()
    }

    pub fn get_decisions_by_level(&self) -> HashMap<RiskLevel, u64> {
        self.by_level.read().clone()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let checks = self.total_checks();
        let suspicious = self.suspicious.load(Ordering::Relaxed);
        let rules_only = self.rules_only.load(Ordering::Relaxed);
        let suspicious_rate = if checks > 0 {
            (suspicious as f64 / checks as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let by_level = self.get_decisions_by_level();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            FRAUD SCORING PIPELINE - METRICS SUMMARY          ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Transactions Checked:   {:>8}  │  Throughput: {:>6.1} tx/s ║",
            checks,
            self.get_throughput()
        );
        info!(
            "║ Suspicious:             {:>8}  │  Rate:       {:>6.1}%     ║",
            suspicious, suspicious_rate
        );
        info!(
            "║ Rule-only decisions:    {:>8}                              ║",
            rules_only
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!(
            "║ Scorer Agreement: {:>5.1}% (higher = scorers agree more)     ║",
            self.get_avg_agreement() * 100.0
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Decisions by Risk Level:                                     ║");
        for level in [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low] {
            let count = by_level.get(&level).copied().unwrap_or(0);
            let pct = if checks > 0 {
                (count as f64 / checks as f64) * 100.0
            } else {
                0.0
            };
            info!(
                "║   {:10}: {:>6} ({:>5.1}%)                                ║",
                level.as_str(),
                count,
                pct
            );
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Risk Score Distribution:                                     ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn decision(score: f64, level: RiskLevel, suspicious: bool, used: ModelUsed) -> RiskDecision {
        RiskDecision {
            decision_id: "d".to_string(),
            user_id: "user_001".to_string(),
            amount: 1_000.0,
            risk_score: score,
            risk_level: level,
            is_suspicious: suspicious,
            reasons: Vec::new(),
            model_used: used,
            model_scores: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_decision(
            &decision(0.9, RiskLevel::High, true, ModelUsed::Ensemble),
            Duration::from_micros(100),
        );
        metrics.record_decision(
            &decision(0.1, RiskLevel::Low, false, ModelUsed::RulesOnly),
            Duration::from_micros(300),
        );

        assert_eq!(metrics.total_checks(), 2);
        assert_eq!(metrics.suspicious.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.rules_only.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.get_decisions_by_level()[&RiskLevel::High], 1);

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[9], 1);
        assert_eq!(dist[1], 1);

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean_us, 200);
        assert_eq!(stats.max_us, 300);
    }

    #[test]
    fn test_out_of_range_score_is_bucketed() {
        let metrics = PipelineMetrics::new();
        metrics.record_decision(
            &decision(1.4, RiskLevel::High, true, ModelUsed::RulesOnly),
            Duration::from_micros(1),
        );
        assert_eq!(metrics.get_score_distribution()[9], 1);
    }

    #[test]
    fn test_model_agreement() {
        let metrics = PipelineMetrics::new();
        let mut d = decision(0.8, RiskLevel::High, true, ModelUsed::Ensemble);
        d.model_scores.insert("isolation_forest".to_string(), 0.8);
        d.model_scores.insert("random_forest".to_string(), 0.82);
        d.model_scores.insert("neural_network".to_string(), 0.79);

        metrics.record_decision(&d, Duration::from_micros(10));
        assert!(metrics.get_avg_agreement() > 0.9);
    }
}
