//! Score aggregation for the scorer ensemble

use super::ScorerOutput;
use std::collections::HashMap;

/// Combines normalized scorer outputs into a single risk score.
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    /// Scorer weights for the weighted average
    weights: HashMap<String, f64>,
    /// Weight for scorers not in the weights map
    default_weight: f64,
}

impl ScoreAggregator {
    /// Aggregator with per-scorer weights; unlisted scorers weigh 1.
    pub fn new(weights: HashMap<String, f64>) -> Self {
        Self {
            weights,
            default_weight: 1.0,
        }
    }

    /// Aggregator where every scorer counts the same (a plain mean).
    pub fn equal_weights() -> Self {
        Self::new(HashMap::new())
    }

    /// Weighted mean of the outputs, or `None` when nothing contributed.
    pub fn aggregate(&self, outputs: &[ScorerOutput]) -> Option<f64> {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for output in outputs {
            let weight = self.weight(output.name);
            weighted_sum += output.score * weight;
            total_weight += weight;
        }

        (total_weight > 0.0).then(|| (weighted_sum / total_weight).clamp(0.0, 1.0))
    }

    /// Fraction of outputs at or above `threshold`
    pub fn voting_score(outputs: &[ScorerOutput], threshold: f64) -> f64 {
        if outputs.is_empty() {
            return 0.0;
        }
        let votes = outputs.iter().filter(|o| o.score >= threshold).count();
        votes as f64 / outputs.len() as f64
    }

    pub fn weight(&self, name: &str) -> f64 {
        self.weights
            .get(name)
            .copied()
            .unwrap_or(self.default_weight)
            .max(0.0)
    }
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        Self::equal_weights()
    }
}
