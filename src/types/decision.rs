//! Risk decision data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Determine risk level from score and thresholds.
    ///
    /// Both bounds are exclusive: a score equal to `high` is still `Medium`.
    pub fn from_score(score: f64, thresholds: &ContextThresholds) -> Self {
        if score > thresholds.high {
            RiskLevel::High
        } else if score > thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

/// Score thresholds for one calling context.
///
/// Batch ensemble scoring and single rule-only checks each get their own
/// block, see `DetectionConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextThresholds {
    /// `is_suspicious` when the score is strictly above this
    pub suspicious: f64,
    /// `Medium` when the score is strictly above this
    pub medium: f64,
    /// `High` when the score is strictly above this
    pub high: f64,
}

impl ContextThresholds {
    pub fn ensemble() -> Self {
        Self {
            suspicious: 0.3,
            medium: 0.3,
            high: 0.7,
        }
    }

    pub fn rule_only() -> Self {
        Self {
            suspicious: 0.5,
            medium: 0.3,
            high: 0.7,
        }
    }
}

/// Which scoring path produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelUsed {
    /// At least one trained scorer contributed
    Ensemble,
    /// No scorer was available, rule engine only
    RulesOnly,
}

impl ModelUsed {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelUsed::Ensemble => "ensemble",
            ModelUsed::RulesOnly => "rules_only",
        }
    }
}

/// Output of scoring one transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    /// Unique decision identifier
    pub decision_id: String,

    /// Scored user
    pub user_id: String,

    /// Scored amount
    pub amount: f64,

    /// Combined risk score, conventionally in [0, 1]
    pub risk_score: f64,

    /// Risk level classification
    pub risk_level: RiskLevel,

    pub is_suspicious: bool,

    /// Human-readable reasons: amount-based, then time-based, then model-based
    pub reasons: Vec<String>,

    /// Scoring path
    pub model_used: ModelUsed,

    /// Normalized score per contributing scorer
    pub model_scores: BTreeMap<String, f64>,

    /// Decision timestamp
    pub timestamp: DateTime<Utc>,
}

/// Result of a batch check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub checked_count: usize,
    pub suspicious_count: usize,
    pub results: Vec<RiskDecision>,
}

impl BatchSummary {
    pub fn from_results(results: Vec<RiskDecision>) -> Self {
        let suspicious_count = results.iter().filter(|d| d.is_suspicious).count();
        Self {
            checked_count: results.len(),
            suspicious_count,
            results,
        }
    }

    /// Share of suspicious decisions, 0 for an empty batch
    pub fn suspicious_rate(&self) -> f64 {
        if self.checked_count == 0 {
            0.0
        } else {
            self.suspicious_count as f64 / self.checked_count as f64
        }
    }
}
