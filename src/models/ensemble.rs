//! Ensemble combiner: scorer outputs plus rule overrides into one decision

use super::{ScoreAggregator, ScorerOutput};
use crate::config::{AppConfig, DetectionConfig, RulesConfig};
use crate::feature_extractor::FeatureVector;
use crate::types::decision::{ModelUsed, RiskDecision, RiskLevel};
use crate::types::transaction::Transaction;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::debug;

/// Turns a feature vector and whatever scorer outputs are available into a
/// [`RiskDecision`].
#[derive(Debug, Clone)]
pub struct EnsembleCombiner {
    rules: RulesConfig,
    detection: DetectionConfig,
    aggregator: ScoreAggregator,
}

impl EnsembleCombiner {
    pub fn new(rules: RulesConfig, detection: DetectionConfig, aggregator: ScoreAggregator) -> Self {
        Self {
            rules,
            detection,
            aggregator,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rules.clone(),
            config.detection.clone(),
            ScoreAggregator::new(config.models.weights.clone()),
        )
    }

    /// Combine scorer outputs into a decision.
    ///
    /// With no usable output the rule engine scores alone and the rule-only
    /// thresholds apply.
    pub fn decide(
        &self,
        transaction: &Transaction,
        features: &FeatureVector,
        outputs: &[ScorerOutput],
    ) -> RiskDecision {
        let (risk_score, model_used, thresholds) = match self.aggregator.aggregate(outputs) {
            Some(score) => (score, ModelUsed::Ensemble, &self.detection.ensemble),
            None => (self.rule_score(features), ModelUsed::RulesOnly, &self.detection.rule_only),
        };

        let risk_level = RiskLevel::from_score(risk_score, thresholds);
        let is_suspicious = risk_score > thresholds.suspicious;
        let reasons = self.reasons(features, risk_score, risk_level);

        debug!(
            user_id = %transaction.user_id(),
            risk_score = risk_score,
            model_used = model_used.as_str(),
            votes = ScoreAggregator::voting_score(outputs, 0.5),
            "Ensemble decision"
        );

        let model_scores: BTreeMap<String, f64> = outputs
            .iter()
            .map(|o| (o.name.to_string(), o.score))
            .collect();

        RiskDecision {
            decision_id: uuid::Uuid::new_v4().to_string(),
            user_id: transaction.user_id().to_string(),
            amount: transaction.amount(),
            risk_score,
            risk_level,
            is_suspicious,
            reasons,
            model_used,
            model_scores,
            timestamp: Utc::now(),
        }
    }

    /// Rule-threshold score used when no scorer is available, capped at 1.
    pub fn rule_score(&self, features: &FeatureVector) -> f64 {
        let rules = &self.rules;
        let mut score = 0.0;

        if features.amount > rules.very_large_amount {
            score += rules.very_large_score;
        } else if features.amount < rules.very_small_amount {
            score += rules.very_small_score;
        } else if features.amount > rules.large_amount {
            score += rules.large_score;
        }

        if self.is_off_hours(features) {
            score += rules.off_hours_score;
        }

        f64::min(score, 1.0)
    }

    fn is_off_hours(&self, features: &FeatureVector) -> bool {
        let hour = features.hour as u32;
        (self.rules.off_hours_start..=self.rules.off_hours_end).contains(&hour)
    }

    /// Amount reasons, then timing reasons, then score reasons.
    fn reasons(&self, features: &FeatureVector, risk_score: f64, level: RiskLevel) -> Vec<String> {
        let rules = &self.rules;
        let mut reasons = Vec::new();

        // Same tier order as `rule_score`
        if features.amount > rules.very_large_amount {
            reasons.push("Very large transaction amount".to_string());
        } else if features.amount < rules.very_small_amount {
            reasons.push("Suspiciously small amount".to_string());
        } else if features.amount > rules.large_amount {
            reasons.push("Large transaction amount".to_string());
        }

        if self.is_off_hours(features) {
            reasons.push(format!("Off-hours transaction at {:02}:00", features.hour as u32));
        }
        if features.count_1h > rules.max_count_1h {
            reasons.push(format!(
                "{} transactions within the last hour",
                features.count_1h as u64
            ));
        }
        let repeat_applies = !rules.repeat_requires_prior || features.user_count > 0.0;
        if repeat_applies && features.time_diff_sec < rules.min_time_diff_sec {
            reasons.push(format!(
                "Repeat transaction after {:.0} seconds",
                features.time_diff_sec
            ));
        }

        match level {
            RiskLevel::High => reasons.push("High combined risk score".to_string()),
            RiskLevel::Medium => reasons.push("Medium risk level".to_string()),
            RiskLevel::Low => {}
        }
        if risk_score > rules.critical_score {
            reasons.push("Critical risk level, verification required".to_string());
        }

        reasons
    }
}

impl Default for EnsembleCombiner {
    fn default() -> Self {
        Self::new(
            RulesConfig::default(),
            DetectionConfig::default(),
            ScoreAggregator::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(amount: f64, hour: f64) -> FeatureVector {
        FeatureVector {
            amount,
            hour,
            user_count: 3.0,
            count_1h: 1.0,
            time_diff_sec: 3600.0,
            amount_ratio: 1.0,
            ..FeatureVector::default()
        }
    }

    fn tx(amount: f64) -> Transaction {
        Transaction::new("user_001", amount).unwrap()
    }

    #[test]
    fn test_rule_only_fallback_is_complete() {
        let combiner = EnsembleCombiner::default();
        let decision = combiner.decide(&tx(15_000_000.0), &features(15_000_000.0, 3.0), &[]);

        assert_eq!(decision.model_used, ModelUsed::RulesOnly);
        assert!((decision.risk_score - 0.8).abs() < 1e-12);
        assert_eq!(decision.risk_level, RiskLevel::High);
        assert!(decision.is_suspicious);
        assert!(decision.model_scores.is_empty());
        assert_eq!(
            decision.reasons,
            vec![
                "Very large transaction amount".to_string(),
                "Off-hours transaction at 03:00".to_string(),
                "High combined risk score".to_string(),
            ]
        );
        assert!(!decision.decision_id.is_empty());
    }

    #[test]
    fn test_rule_score_tiers() {
        let combiner = EnsembleCombiner::default();
        assert_eq!(combiner.rule_score(&features(50_000.0, 12.0)), 0.0);
        assert_eq!(combiner.rule_score(&features(500.0, 12.0)), 0.4);
        assert_eq!(combiner.rule_score(&features(6_000_000.0, 12.0)), 0.3);
        assert_eq!(combiner.rule_score(&features(20_000_000.0, 12.0)), 0.6);
        assert!((combiner.rule_score(&features(500.0, 6.0)) - 0.6).abs() < 1e-12);
        assert_eq!(combiner.rule_score(&features(50_000.0, 7.0)), 0.0);
    }

    #[test]
    fn test_context_thresholds_differ() {
        let combiner = EnsembleCombiner::default();

        // Rule-only: 0.4 is medium but not above the 0.5 suspicious bar
        let rules_only = combiner.decide(&tx(500.0), &features(500.0, 12.0), &[]);
        assert_eq!(rules_only.risk_level, RiskLevel::Medium);
        assert!(!rules_only.is_suspicious);

        // Ensemble: 0.4 clears the 0.3 bar
        let outputs = [
            ScorerOutput::new("isolation_forest", 0.0),
            ScorerOutput::new("random_forest", 0.8),
        ];
        let ensemble = combiner.decide(&tx(50_000.0), &features(50_000.0, 12.0), &outputs);
        assert_eq!(ensemble.model_used, ModelUsed::Ensemble);
        assert!((ensemble.risk_score - 0.4).abs() < 1e-12);
        assert!(ensemble.is_suspicious);
        assert_eq!(ensemble.model_scores.len(), 2);
    }

    #[test]
    fn test_ensemble_ignores_rule_score() {
        let combiner = EnsembleCombiner::default();
        let outputs = [ScorerOutput::new("isolation_forest", 0.0)];
        let decision = combiner.decide(&tx(20_000_000.0), &features(20_000_000.0, 12.0), &outputs);

        assert_eq!(decision.risk_score, 0.0);
        assert_eq!(decision.risk_level, RiskLevel::Low);
        // Amount reason is still reported
        assert_eq!(decision.reasons, vec!["Very large transaction amount".to_string()]);
    }

    #[test]
    fn test_reason_order() {
        let combiner = EnsembleCombiner::default();
        let mut f = features(300.0, 4.0);
        f.count_1h = 12.0;
        f.time_diff_sec = 20.0;
        let outputs = [
            ScorerOutput::new("isolation_forest", 1.0),
            ScorerOutput::new("random_forest", 0.9),
        ];

        let decision = combiner.decide(&tx(300.0), &f, &outputs);
        assert_eq!(
            decision.reasons,
            vec![
                "Suspiciously small amount".to_string(),
                "Off-hours transaction at 04:00".to_string(),
                "12 transactions within the last hour".to_string(),
                "Repeat transaction after 20 seconds".to_string(),
                "High combined risk score".to_string(),
                "Critical risk level, verification required".to_string(),
            ]
        );
    }

    #[test]
    fn test_first_transaction_repeat_reason() {
        let mut f = features(50_000.0, 12.0);
        f.user_count = 0.0;
        f.time_diff_sec = 0.0;

        let combiner = EnsembleCombiner::default();
        let decision = combiner.decide(&tx(50_000.0), &f, &[]);
        assert_eq!(decision.reasons, vec!["Repeat transaction after 0 seconds".to_string()]);
        assert_eq!(decision.risk_level, RiskLevel::Low);

        let gated = EnsembleCombiner::new(
            RulesConfig {
                repeat_requires_prior: true,
                ..RulesConfig::default()
            },
            DetectionConfig::default(),
            ScoreAggregator::default(),
        );
        assert!(gated.decide(&tx(50_000.0), &f, &[]).reasons.is_empty());
    }

    #[test]
    fn test_reason_tier_matches_score_tier() {
        // Overlapping tiers: small takes precedence over large in both places
        let combiner = EnsembleCombiner::new(
            RulesConfig {
                very_small_amount: 8_000_000.0,
                ..RulesConfig::default()
            },
            DetectionConfig::default(),
            ScoreAggregator::default(),
        );
        let f = features(6_000_000.0, 12.0);

        assert_eq!(combiner.rule_score(&f), 0.4);
        let decision = combiner.decide(&tx(6_000_000.0), &f, &[]);
        assert_eq!(decision.reasons[0], "Suspiciously small amount");
    }
}
