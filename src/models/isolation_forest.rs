//! Isolation Forest anomaly scorer
//!
//! Random axis-aligned partitioning: points that are isolated after few splits
//! are anomalous. The decision boundary is calibrated on the training scores so
//! that roughly `contamination` of the training batch lies above it.

use crate::error::TrainingError;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Isolation Tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
enum IsolationNode {
    Internal {
        feature_idx: usize,
        split_value: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

/// Single Isolation Tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    /// Build an isolation tree over the rows of `data` selected by `indices`.
    fn build(data: &[Vec<f64>], indices: &[usize], max_depth: usize, rng: &mut ChaCha8Rng) -> Self {
        Self {
            root: Self::build_node(data, indices, 0, max_depth, rng),
        }
    }

    fn build_node(
        data: &[Vec<f64>],
        indices: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> IsolationNode {
        if depth >= max_depth || indices.len() <= 1 {
            return IsolationNode::Leaf {
                size: indices.len(),
            };
        }

        let n_features = data[indices[0]].len();

        // Only features with spread in this node can split it
        let splittable: Vec<(usize, f64, f64)> = (0..n_features)
            .filter_map(|f| {
                let (lo, hi) = indices.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &i| (lo.min(data[i][f]), hi.max(data[i][f])),
                );
                (hi - lo > 1e-10).then_some((f, lo, hi))
            })
            .collect();

        if splittable.is_empty() {
            return IsolationNode::Leaf {
                size: indices.len(),
            };
        }

        let (feature_idx, min_val, max_val) = splittable[rng.gen_range(0..splittable.len())];
        let split_value = rng.gen_range(min_val..max_val);

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| data[i][feature_idx] < split_value);

        let left = Box::new(Self::build_node(data, &left_idx, depth + 1, max_depth, rng));
        let right = Box::new(Self::build_node(data, &right_idx, depth + 1, max_depth, rng));

        IsolationNode::Internal {
            feature_idx,
            split_value,
            left,
            right,
        }
    }

    /// Calculate path length for a sample
    pub fn path_length(&self, sample: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationNode::Leaf { size } => return depth as f64 + average_path_length(*size),
                IsolationNode::Internal {
                    feature_idx,
                    split_value,
                    left,
                    right,
                } => {
                    let value = sample.get(*feature_idx).copied().unwrap_or(0.0);
                    node = if value < *split_value { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful search in a BST of `n` nodes
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + 0.577_215_664_9) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Isolation Forest training parameters
#[derive(Debug, Clone)]
pub struct IsolationForestParams {
    pub n_trees: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.05,
            seed: 42,
        }
    }
}

/// Trained Isolation Forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// Subsample size each tree was grown on
    sample_size: usize,
    contamination: f64,
    /// Scores strictly above this are outliers
    threshold: f64,
}

impl IsolationForest {
    /// Fit the forest on (already scaled) training rows.
    pub fn fit(data: &[Vec<f64>], params: &IsolationForestParams) -> Result<Self, TrainingError> {
        if data.len() < 2 {
            return Err(TrainingError::InsufficientData(format!(
                "isolation forest needs at least 2 rows, got {}",
                data.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(TrainingError::InsufficientData(
                "isolation forest needs at least one tree".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let sample_size = params.max_samples.clamp(2, data.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..params.n_trees)
            .map(|_| {
                let indices = sample(&mut rng, data.len(), sample_size).into_vec();
                IsolationTree::build(data, &indices, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            contamination: params.contamination.clamp(0.0, 0.5),
            threshold: 0.5,
        };

        // Calibrate threshold based on contamination
        let mut scores: Vec<f64> = data.iter().map(|row| forest.score(row)).collect();
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(TrainingError::Diverged(
                "non-finite isolation score".to_string(),
            ));
        }
        scores.sort_by(|a, b| b.total_cmp(a));
        let threshold_idx = (forest.contamination * scores.len() as f64) as usize;
        forest.threshold = scores[threshold_idx.min(scores.len() - 1)];

        Ok(forest)
    }

    /// Anomaly score in (0, 1), higher = more anomalous: `2^(-E(h(x)) / c(n))`.
    pub fn score(&self, sample: &[f64]) -> f64 {
        let avg_path_length: f64 = self.trees.iter().map(|t| t.path_length(sample)).sum::<f64>()
            / self.trees.len() as f64;

        let c_n = average_path_length(self.sample_size);
        if c_n < 1e-10 {
            return 0.5;
        }

        2.0_f64.powf(-avg_path_length / c_n)
    }

    /// Outlier decision against the calibrated boundary.
    pub fn is_outlier(&self, sample: &[f64]) -> bool {
        self.score(sample) > self.threshold
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
