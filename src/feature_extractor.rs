//! Behavioral feature derivation for fraud scoring.
//!
//! Turns a transaction plus its user's prior history into the fixed
//! [`FeatureVector`] schema shared by the rule labeler, every trained scorer
//! and the ensemble combiner.
//!
//! User aggregates (`user_mean`, `user_std`, ...) are always computed over the
//! history *before* the current transaction. Batch derivation for training and
//! streaming derivation in the scoring service follow the same convention, so
//! the models never see a different feature distribution at serving time.

use crate::config::FeatureConfig;
use crate::types::transaction::Transaction;
use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of features in the schema.
pub const FEATURE_COUNT: usize = 18;

/// Feature names, in the column order used by the scaler and the models.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "amount",
    "user_mean",
    "user_std",
    "user_min",
    "user_max",
    "user_count",
    "hour",
    "day_of_week",
    "is_weekend",
    "total_1h",
    "count_1h",
    "prev_amount_1",
    "prev_amount_2",
    "prev_amount_3",
    "amount_ratio",
    "time_diff_sec",
    "amount_zscore",
    "user_amount_zscore",
];

/// Fixed-schema numeric summary of one transaction.
///
/// Every field is a concrete number; insufficient history resolves to the
/// documented fallbacks (`0`, or `1` for `amount_ratio`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub amount: f64,
    pub user_mean: f64,
    pub user_std: f64,
    pub user_min: f64,
    pub user_max: f64,
    pub user_count: f64,
    pub hour: f64,
    /// Monday = 0 .. Sunday = 6
    pub day_of_week: f64,
    pub is_weekend: f64,
    pub total_1h: f64,
    pub count_1h: f64,
    pub prev_amount_1: f64,
    pub prev_amount_2: f64,
    pub prev_amount_3: f64,
    pub amount_ratio: f64,
    pub time_diff_sec: f64,
    pub amount_zscore: f64,
    pub user_amount_zscore: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.amount,
            self.user_mean,
            self.user_std,
            self.user_min,
            self.user_max,
            self.user_count,
            self.hour,
            self.day_of_week,
            self.is_weekend,
            self.total_1h,
            self.count_1h,
            self.prev_amount_1,
            self.prev_amount_2,
            self.prev_amount_3,
            self.amount_ratio,
            self.time_diff_sec,
            self.amount_zscore,
            self.user_amount_zscore,
        ]
    }

    /// Look up a feature by schema name.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| self.to_array()[i])
    }

    /// True when no field is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Amount and instant of one past transaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Transaction> for HistoryPoint {
    fn from(tx: &Transaction) -> Self {
        Self {
            amount: tx.amount(),
            timestamp: tx.timestamp(),
        }
    }
}

/// Running mean / variance of amounts (Welford).
///
/// Built over the full batch at training time and carried in the model
/// artifact; the scoring service keeps updating a copy as a running estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AmountStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl AmountStats {
    pub fn from_amounts<I: IntoIterator<Item = f64>>(amounts: I) -> Self {
        let mut stats = Self::default();
        for amount in amounts {
            stats.push(amount);
        }
        stats
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample standard deviation, 0 with fewer than two points.
    pub fn std(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / (self.count - 1) as f64).sqrt()
    }

    /// `|value - mean| / std`, 0 when the spread is zero.
    pub fn zscore(&self, value: f64) -> f64 {
        let std = self.std();
        if std > 0.0 {
            (value - self.mean).abs() / std
        } else {
            0.0
        }
    }

    /// Combine two disjoint sets of statistics (Chan et al.).
    pub fn merge(&self, other: &Self) -> Self {
        if other.count == 0 {
            return *self;
        }
        if self.count == 0 {
            return *other;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let (n_a, n_b, n) = (self.count as f64, other.count as f64, count as f64);
        Self {
            count,
            mean: self.mean + delta * n_b / n,
            m2: self.m2 + other.m2 + delta * delta * n_a * n_b / n,
        }
    }
}

/// Amount aggregates over a user's past transactions.
///
/// The scoring service keeps one of these for entries evicted from a bounded
/// window, so user aggregates still cover the full history.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UserSummary {
    stats: AmountStats,
    min: f64,
    max: f64,
}

impl UserSummary {
    pub fn from_points(points: &[HistoryPoint]) -> Self {
        let mut summary = Self::default();
        for point in points {
            summary.push(point.amount);
        }
        summary
    }

    pub fn push(&mut self, amount: f64) {
        if self.stats.count() == 0 {
            self.min = amount;
            self.max = amount;
        } else {
            self.min = self.min.min(amount);
            self.max = self.max.max(amount);
        }
        self.stats.push(amount);
    }

    pub fn merge(&self, other: &Self) -> Self {
        match (self.count(), other.count()) {
            (_, 0) => *self,
            (0, _) => *other,
            _ => Self {
                stats: self.stats.merge(&other.stats),
                min: self.min.min(other.min),
                max: self.max.max(other.max),
            },
        }
    }

    pub fn count(&self) -> u64 {
        self.stats.count()
    }

    pub fn mean(&self) -> f64 {
        self.stats.mean()
    }

    pub fn std(&self) -> f64 {
        self.stats.std()
    }

    /// 0 for an empty summary
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 0 for an empty summary
    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Feature extractor that transforms transactions into model input features.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    window: Duration,
    offset: FixedOffset,
}

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new(config: &FeatureConfig) -> Self {
        let offset = config
            .utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());

        Self {
            window: Duration::seconds(config.window_secs.max(0)),
            offset,
        }
    }

    /// Derive the feature vector of `tx`.
    ///
    /// `history` holds the same user's earlier transactions, sorted by
    /// timestamp ascending and excluding `tx` itself. `global` supplies the
    /// amount distribution for `amount_zscore`.
    pub fn extract(
        &self,
        tx: &Transaction,
        history: &[HistoryPoint],
        global: &AmountStats,
    ) -> FeatureVector {
        self.extract_with_summary(tx, history, &UserSummary::from_points(history), global)
    }

    /// Derive the feature vector of `tx` when only the most recent history is
    /// at hand.
    ///
    /// `history` feeds the lags and the trailing window, in the same order
    /// `extract` expects. `user` summarizes everything the user did before
    /// `tx`, of which `history` is the newest part.
    pub fn extract_with_summary(
        &self,
        tx: &Transaction,
        history: &[HistoryPoint],
        user: &UserSummary,
        global: &AmountStats,
    ) -> FeatureVector {
        let amount = tx.amount();
        let now = tx.timestamp();

        let user_count = user.count() as usize;
        let (user_min, user_max) = (user.min(), user.max());
        let user_mean = user.mean();
        let user_std = user.std();

        let local = now.with_timezone(&self.offset);
        let day_of_week = local.weekday().num_days_from_monday();

        // Window start is inclusive; the current transaction counts once
        let window_start = now - self.window;
        let (window_total, window_count) = history
            .iter()
            .rev()
            .take_while(|p| p.timestamp >= window_start)
            .filter(|p| p.timestamp <= now)
            .fold((0.0, 0usize), |(sum, n), p| (sum + p.amount, n + 1));

        let lag = |k: usize| {
            history
                .len()
                .checked_sub(k)
                .map(|i| history[i].amount)
                .unwrap_or(0.0)
        };
        let prev_amount_1 = lag(1);

        let amount_ratio = if prev_amount_1 > 0.0 {
            let ratio = amount / prev_amount_1;
            if ratio.is_finite() {
                ratio
            } else {
                1.0
            }
        } else {
            1.0
        };

        let time_diff_sec = history
            .last()
            .map(|p| (now - p.timestamp).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        let user_amount_zscore = if user_count > 0 && user_std > 0.0 {
            (amount - user_mean).abs() / user_std
        } else {
            0.0
        };

        FeatureVector {
            amount,
            user_mean,
            user_std,
            user_min,
            user_max,
            user_count: user_count as f64,
            hour: local.hour() as f64,
            day_of_week: day_of_week as f64,
            is_weekend: if day_of_week >= 5 { 1.0 } else { 0.0 },
            total_1h: window_total + amount,
            count_1h: (window_count + 1) as f64,
            prev_amount_1,
            prev_amount_2: lag(2),
            prev_amount_3: lag(3),
            amount_ratio,
            time_diff_sec,
            amount_zscore: global.zscore(amount),
            user_amount_zscore,
        }
    }

    /// Derive features for a whole historical batch.
    ///
    /// Output is in input order. Each transaction sees the earlier transactions
    /// of its user within the batch as history (ties on timestamp keep input
    /// order); `amount_zscore` is computed against the full batch.
    pub fn extract_batch(&self, batch: &[Transaction]) -> Vec<FeatureVector> {
        let global = Self::batch_stats(batch);

        let mut by_user: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, tx) in batch.iter().enumerate() {
            by_user.entry(tx.user_id()).or_default().push(i);
        }

        let mut features = vec![FeatureVector::default(); batch.len()];
        for indices in by_user.values_mut() {
            indices.sort_by_key(|&i| (batch[i].timestamp(), i));

            let mut history: Vec<HistoryPoint> = Vec::with_capacity(indices.len());
            for &i in indices.iter() {
                features[i] = self.extract(&batch[i], &history, &global);
                history.push(HistoryPoint::from(&batch[i]));
            }
        }

        features
    }

    /// Amount distribution of a batch.
    pub fn batch_stats(batch: &[Transaction]) -> AmountStats {
        AmountStats::from_amounts(batch.iter().map(|tx| tx.amount()))
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names in column order.
    pub fn feature_names(&self) -> Vec<&'static str> {
        FEATURE_NAMES.to_vec()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(&FeatureConfig::default())
    }
}
