//! Training-label synthesis from derived features.
//!
//! Historical batches carry no ground truth, so the classifier scorers are
//! supervised with labels produced here. Serving never calls into this module;
//! the ensemble combiner has its own rule engine.

use crate::config::LabelingConfig;
use crate::feature_extractor::FeatureVector;
use serde::Serialize;

/// One labeling clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelRule {
    VeryLargeAmount,
    VerySmallAmount,
    RapidRepetition,
    HighHourlyVolume,
    SubMinuteRepeat,
    StatisticalOutlier,
}

/// Deterministic fraud labeler: a logical OR of threshold clauses.
#[derive(Debug, Clone, Default)]
pub struct RuleLabeler {
    config: LabelingConfig,
}

impl RuleLabeler {
    pub fn new(config: LabelingConfig) -> Self {
        Self { config }
    }

    /// Fraud label of one feature vector.
    pub fn label(&self, features: &FeatureVector) -> bool {
        !self.triggered(features).is_empty()
    }

    /// Every clause the vector trips, in declaration order.
    ///
    /// A user's first transaction has `time_diff_sec = 0` and so trips the
    /// sub-minute clause unless `repeat_requires_prior` is set.
    pub fn triggered(&self, features: &FeatureVector) -> Vec<LabelRule> {
        let c = &self.config;
        let repeat_applies = !c.repeat_requires_prior || features.user_count > 0.0;

        [
            (features.amount > c.very_large_amount, LabelRule::VeryLargeAmount),
            (features.amount < c.very_small_amount, LabelRule::VerySmallAmount),
            (features.count_1h > c.max_count_1h, LabelRule::RapidRepetition),
            (features.total_1h > c.max_total_1h, LabelRule::HighHourlyVolume),
            (
                repeat_applies && features.time_diff_sec < c.min_time_diff_sec,
                LabelRule::SubMinuteRepeat,
            ),
            (
                features.amount_zscore > c.max_amount_zscore,
                LabelRule::StatisticalOutlier,
            ),
        ]
        .into_iter()
        .filter_map(|(hit, rule)| hit.then_some(rule))
        .collect()
    }

    /// Labels for a batch, in input order.
    pub fn label_batch(&self, features: &[FeatureVector]) -> Vec<bool> {
        features.iter().map(|f| self.label(f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A mid-sized daytime transaction with an unremarkable history.
    fn nominal() -> FeatureVector {
        FeatureVector {
            amount: 50_000.0,
            user_mean: 60_000.0,
            user_std: 10_000.0,
            user_min: 40_000.0,
            user_max: 80_000.0,
            user_count: 10.0,
            hour: 14.0,
            day_of_week: 2.0,
            is_weekend: 0.0,
            total_1h: 50_000.0,
            count_1h: 1.0,
            prev_amount_1: 55_000.0,
            prev_amount_2: 60_000.0,
            prev_amount_3: 45_000.0,
            amount_ratio: 0.9,
            time_diff_sec: 3600.0,
            amount_zscore: 0.1,
            user_amount_zscore: 1.0,
        }
    }

    #[test]
    fn test_nominal_is_not_fraud() {
        let labeler = RuleLabeler::default();
        assert!(!labeler.label(&nominal()));
        assert!(labeler.triggered(&nominal()).is_empty());
    }

    #[test]
    fn test_amount_clauses() {
        let labeler = RuleLabeler::default();

        let large = FeatureVector {
            amount: 15_000_000.0,
            total_1h: 15_000_000.0,
            ..nominal()
        };
        assert!(labeler.label(&large));
        assert_eq!(labeler.triggered(&large), vec![LabelRule::VeryLargeAmount]);

        let small = FeatureVector {
            amount: 500.0,
            total_1h: 500.0,
            ..nominal()
        };
        assert!(labeler.label(&small));
        assert_eq!(labeler.triggered(&small), vec![LabelRule::VerySmallAmount]);
    }

    #[test]
    fn test_behavioral_clauses() {
        let labeler = RuleLabeler::default();

        let burst = FeatureVector {
            count_1h: 9.0,
            ..nominal()
        };
        assert_eq!(labeler.triggered(&burst), vec![LabelRule::RapidRepetition]);

        let volume = FeatureVector {
            total_1h: 15_000_001.0,
            ..nominal()
        };
        assert_eq!(labeler.triggered(&volume), vec![LabelRule::HighHourlyVolume]);

        let repeat = FeatureVector {
            time_diff_sec: 30.0,
            ..nominal()
        };
        assert_eq!(labeler.triggered(&repeat), vec![LabelRule::SubMinuteRepeat]);

        let outlier = FeatureVector {
            amount_zscore: 3.5,
            ..nominal()
        };
        assert_eq!(labeler.triggered(&outlier), vec![LabelRule::StatisticalOutlier]);
    }

    #[test]
    fn test_boundaries_are_strict() {
        let labeler = RuleLabeler::default();
        let edge = FeatureVector {
            amount: 10_000_000.0,
            total_1h: 15_000_000.0,
            count_1h: 8.0,
            time_diff_sec: 60.0,
            amount_zscore: 3.0,
            ..nominal()
        };
        assert!(!labeler.label(&edge));
    }

    #[test]
    fn test_empty_history_trips_sub_minute_clause() {
        let first = FeatureVector {
            amount: 50_000.0,
            count_1h: 1.0,
            total_1h: 50_000.0,
            amount_ratio: 1.0,
            time_diff_sec: 0.0,
            user_count: 0.0,
            ..FeatureVector::default()
        };

        let labeler = RuleLabeler::default();
        assert!(labeler.label(&first));
        assert_eq!(labeler.triggered(&first), vec![LabelRule::SubMinuteRepeat]);

        let gated = RuleLabeler::new(LabelingConfig {
            repeat_requires_prior: true,
            ..LabelingConfig::default()
        });
        assert!(!gated.label(&first));
        // An actual repeat still counts
        let repeat = FeatureVector {
            user_count: 1.0,
            time_diff_sec: 20.0,
            ..first
        };
        assert!(gated.label(&repeat));
    }

    #[test]
    fn test_deterministic_and_configurable() {
        let labeler = RuleLabeler::default();
        let features = FeatureVector {
            amount: 700.0,
            ..nominal()
        };
        let first = labeler.label_batch(&[features, nominal()]);
        for _ in 0..10 {
            assert_eq!(labeler.label_batch(&[features, nominal()]), first);
        }

        let relaxed = RuleLabeler::new(LabelingConfig {
            very_small_amount: 500.0,
            ..LabelingConfig::default()
        });
        assert!(!relaxed.label(&features));
    }
}
