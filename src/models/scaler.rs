//! Z-score feature scaling

use crate::error::TrainingError;
use serde::{Deserialize, Serialize};

/// Per-column `(x - mean) / std` scaler, fitted once on the training matrix and
/// reused unchanged for every vector scored afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    /// Fit column means and population standard deviations.
    ///
    /// Constant columns get a unit scale so they map to 0.
    pub fn fit(data: &[Vec<f64>]) -> Result<Self, TrainingError> {
        let n_features = match data.first() {
            Some(row) => row.len(),
            None => return Err(TrainingError::EmptyBatch),
        };
        if data.iter().any(|row| row.len() != n_features) {
            return Err(TrainingError::InsufficientData(
                "feature rows have different widths".to_string(),
            ));
        }

        let n = data.len() as f64;
        let mut mean = vec![0.0; n_features];
        for row in data {
            for (m, &x) in mean.iter_mut().zip(row) {
                *m += x / n;
            }
        }

        let mut std = vec![0.0; n_features];
        for row in data {
            for ((s, &x), &m) in std.iter_mut().zip(row).zip(&mean) {
                *s += (x - m).powi(2) / n;
            }
        }
        for s in &mut std {
            *s = s.sqrt();
            if *s < 1e-12 || !s.is_finite() {
                *s = 1.0;
            }
        }

        if mean.iter().any(|m| !m.is_finite()) {
            return Err(TrainingError::Diverged(
                "non-finite feature mean".to_string(),
            ));
        }

        Ok(Self { mean, std })
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(&x, (&m, &s))| (x - m) / s)
            .collect()
    }

    pub fn transform_all(&self, data: &[Vec<f64>]) -> Vec<Vec<f64>> {
        data.iter().map(|row| self.transform(row)).collect()
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}
