//! Weighted Gini decision tree for binary classification

use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree configuration
#[derive(Debug, Clone)]
pub struct TreeParams {
    /// Maximum depth of tree
    pub max_depth: usize,
    /// Minimum samples required to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf node
    pub min_samples_leaf: usize,
    /// Features considered per split
    pub max_features: usize,
}

/// Tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    Leaf {
        /// Weighted share of the positive class
        probability: f64,
        n_samples: usize,
    },
}

/// Decision Tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: TreeNode,
    feature_importances: Vec<f64>,
}

/// Weighted class totals of a node
#[derive(Debug, Clone, Copy, Default)]
struct ClassWeights {
    positive: f64,
    total: f64,
}

impl ClassWeights {
    fn add(&mut self, label: bool, weight: f64) {
        if label {
            self.positive += weight;
        }
        self.total += weight;
    }

    fn probability(&self) -> f64 {
        if self.total > 0.0 {
            self.positive / self.total
        } else {
            0.0
        }
    }

    /// Gini impurity `2p(1-p)`
    fn gini(&self) -> f64 {
        let p = self.probability();
        2.0 * p * (1.0 - p)
    }
}

/// Borrowed training set shared by every node
struct TrainingView<'a> {
    data: &'a [Vec<f64>],
    labels: &'a [bool],
    weights: &'a [f64],
}

impl DecisionTree {
    /// Grow a tree over the rows selected by `indices` (duplicates allowed,
    /// which is how bootstrap samples arrive).
    pub fn fit(
        data: &[Vec<f64>],
        labels: &[bool],
        weights: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let n_features = indices.first().map(|&i| data[i].len()).unwrap_or(0);
        let mut importances = vec![0.0; n_features];
        let view = TrainingView {
            data,
            labels,
            weights,
        };

        let root = Self::build(&view, indices, 0, params, rng, &mut importances);

        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut importances {
                *imp /= sum;
            }
        }

        Self {
            root,
            feature_importances: importances,
        }
    }

    fn build(
        view: &TrainingView<'_>,
        indices: &[usize],
        depth: usize,
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
        importances: &mut [f64],
    ) -> TreeNode {
        let mut node = ClassWeights::default();
        for &i in indices {
            node.add(view.labels[i], view.weights[i]);
        }

        let leaf = TreeNode::Leaf {
            probability: node.probability(),
            n_samples: indices.len(),
        };

        if depth >= params.max_depth
            || indices.len() < params.min_samples_split.max(2)
            || node.gini() <= 0.0
            || importances.is_empty()
        {
            return leaf;
        }

        let n_features = importances.len();
        let k = params.max_features.clamp(1, n_features);
        let candidates = sample(rng, n_features, k).into_vec();

        let Some((feature_idx, threshold, impurity)) =
            Self::best_split(view, indices, &candidates, params.min_samples_leaf.max(1))
        else {
            return leaf;
        };

        let decrease = node.gini() * node.total - impurity;
        if decrease <= 1e-12 {
            return leaf;
        }
        importances[feature_idx] += decrease;

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| view.data[i][feature_idx] <= threshold);

        let left = Box::new(Self::build(view, &left_idx, depth + 1, params, rng, importances));
        let right = Box::new(Self::build(view, &right_idx, depth + 1, params, rng, importances));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
        }
    }

    /// Best `(feature, threshold, weighted child impurity)` among `candidates`.
    fn best_split(
        view: &TrainingView<'_>,
        indices: &[usize],
        candidates: &[usize],
        min_samples_leaf: usize,
    ) -> Option<(usize, f64, f64)> {
        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = indices.to_vec();

        for &feature in candidates {
            sorted.sort_by(|&a, &b| view.data[a][feature].total_cmp(&view.data[b][feature]));

            let mut total = ClassWeights::default();
            for &i in &sorted {
                total.add(view.labels[i], view.weights[i]);
            }

            let mut left = ClassWeights::default();
            for pos in 0..sorted.len() - 1 {
                let i = sorted[pos];
                left.add(view.labels[i], view.weights[i]);

                let here = view.data[i][feature];
                let next = view.data[sorted[pos + 1]][feature];
                if next - here <= 1e-12 {
                    continue;
                }
                let n_left = pos + 1;
                if n_left < min_samples_leaf || sorted.len() - n_left < min_samples_leaf {
                    continue;
                }

                let right = ClassWeights {
                    positive: total.positive - left.positive,
                    total: total.total - left.total,
                };
                let impurity = left.gini() * left.total + right.gini() * right.total;

                if best.map_or(true, |(_, _, b)| impurity < b) {
                    best = Some((feature, (here + next) / 2.0, impurity));
                }
            }
        }

        best
    }

    /// Positive-class probability of the leaf `sample` falls into.
    pub fn predict_proba(&self, sample: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { probability, .. } => return *probability,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                } => {
                    let value = sample.get(*feature_idx).copied().unwrap_or(0.0);
                    node = if value <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Leaves reachable from the root
    pub fn n_leaves(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => count(left) + count(right),
            }
        }
        count(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 2,
        }
    }

    #[test]
    fn test_learns_threshold() {
        let data: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 0.0]).collect();
        let labels: Vec<bool> = (0..20).map(|i| i >= 15).collect();
        let weights = vec![1.0; 20];
        let indices: Vec<usize> = (0..20).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let tree = DecisionTree::fit(&data, &labels, &weights, &indices, &params(), &mut rng);

        assert_eq!(tree.predict_proba(&[18.0, 0.0]), 1.0);
        assert_eq!(tree.predict_proba(&[3.0, 0.0]), 0.0);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.feature_importances()[0], 1.0);
    }

    #[test]
    fn test_pure_node_is_leaf() {
        let data = vec![vec![1.0], vec![2.0], vec![3.0]];
        let labels = vec![false; 3];
        let weights = vec![1.0; 3];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let tree = DecisionTree::fit(&data, &labels, &weights, &[0, 1, 2], &params(), &mut rng);
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict_proba(&[2.0]), 0.0);
    }

    #[test]
    fn test_weights_shift_leaf_probability() {
        // Inseparable rows: the leaf probability is the weighted positive share
        let data = vec![vec![1.0]; 4];
        let labels = vec![true, false, false, false];
        let weights = vec![3.0, 1.0, 1.0, 1.0];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let tree = DecisionTree::fit(&data, &labels, &weights, &[0, 1, 2, 3], &params(), &mut rng);
        assert!((tree.predict_proba(&[1.0]) - 0.5).abs() < 1e-12);
    }
}
