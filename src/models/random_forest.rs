//! Random Forest classifier scorer

use super::decision_tree::{DecisionTree, TreeParams};
use crate::error::TrainingError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random Forest configuration
#[derive(Debug, Clone)]
pub struct RandomForestParams {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Random seed
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

/// Balanced class weights `n / (2 * n_class)` per sample.
///
/// Keeps a rare fraud class from being outvoted by the majority.
pub fn balanced_weights(labels: &[bool]) -> Result<Vec<f64>, TrainingError> {
    let n = labels.len() as f64;
    let positives = labels.iter().filter(|&&l| l).count() as f64;
    let negatives = n - positives;
    if positives == 0.0 || negatives == 0.0 {
        return Err(TrainingError::SingleClass);
    }

    let w_pos = n / (2.0 * positives);
    let w_neg = n / (2.0 * negatives);
    Ok(labels
        .iter()
        .map(|&l| if l { w_pos } else { w_neg })
        .collect())
}

impl RandomForest {
    /// Train on scaled rows with class-balanced bootstrap trees, built in parallel.
    pub fn fit(
        data: &[Vec<f64>],
        labels: &[bool],
        params: &RandomForestParams,
    ) -> Result<Self, TrainingError> {
        if data.len() != labels.len() {
            return Err(TrainingError::InsufficientData(format!(
                "{} rows but {} labels",
                data.len(),
                labels.len()
            )));
        }
        if data.is_empty() || params.n_trees == 0 {
            return Err(TrainingError::InsufficientData(
                "random forest needs rows and at least one tree".to_string(),
            ));
        }
        let weights = balanced_weights(labels)?;

        let n = data.len();
        let n_features = data[0].len();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: (n_features as f64).sqrt().ceil() as usize,
        };

        let trees: Vec<DecisionTree> = (0..params.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(i as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(data, labels, &weights, &bootstrap, &tree_params, &mut rng)
            })
            .collect();

        // Aggregate feature importances
        let mut feature_importances = vec![0.0; n_features];
        for tree in &trees {
            for (total, &imp) in feature_importances.iter_mut().zip(tree.feature_importances()) {
                *total += imp;
            }
        }
        let sum: f64 = feature_importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut feature_importances {
                *imp /= sum;
            }
        }

        Ok(Self {
            trees,
            feature_importances,
        })
    }

    /// Mean leaf probability across trees.
    pub fn predict_proba(&self, sample: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict_proba(sample)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn predict(&self, sample: &[f64]) -> bool {
        self.predict_proba(sample) > 0.5
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 200 rows, positives (8) far out on the first feature.
    fn imbalanced() -> (Vec<Vec<f64>>, Vec<bool>) {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in 0..200 {
            let positive = i % 25 == 0;
            let x = if positive {
                rng.gen_range(4.0..6.0)
            } else {
                rng.gen_range(-1.0..1.0)
            };
            data.push(vec![x, rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)]);
            labels.push(positive);
        }
        (data, labels)
    }

    #[test]
    fn test_balanced_weights() {
        let weights = balanced_weights(&[true, false, false, false]).unwrap();
        assert_eq!(weights, vec![2.0, 2.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0]);
        assert_eq!(balanced_weights(&[false, false]), Err(TrainingError::SingleClass));
    }

    #[test]
    fn test_separates_minority_class() {
        let (data, labels) = imbalanced();
        let forest = RandomForest::fit(&data, &labels, &RandomForestParams::default()).unwrap();

        assert_eq!(forest.n_trees(), 50);
        assert!(forest.predict(&[5.0, 0.0, 0.0]));
        assert!(!forest.predict(&[0.0, 0.0, 0.0]));
        assert!(forest.predict_proba(&[5.0, 0.0, 0.0]) > forest.predict_proba(&[0.0, 0.0, 0.0]));

        let importances = forest.feature_importances();
        assert!(importances[0] > importances[1]);
        assert!(importances[0] > importances[2]);
    }

    #[test]
    fn test_parallel_fit_is_reproducible() {
        let (data, labels) = imbalanced();
        let params = RandomForestParams::default();
        let a = RandomForest::fit(&data, &labels, &params).unwrap();
        let b = RandomForest::fit(&data, &labels, &params).unwrap();
        assert_eq!(a.predict_proba(&[2.5, 0.1, -0.3]), b.predict_proba(&[2.5, 0.1, -0.3]));
    }

    #[test]
    fn test_single_class_fails() {
        let data = vec![vec![1.0], vec![2.0]];
        let result = RandomForest::fit(&data, &[false, false], &RandomForestParams::default());
        assert_eq!(result.err(), Some(TrainingError::SingleClass));
    }
}
