//! One-hidden-layer neural network classifier scorer

use super::random_forest::balanced_weights;
use crate::error::TrainingError;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Network training parameters
#[derive(Debug, Clone)]
pub struct NeuralNetworkParams {
    pub hidden_units: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for NeuralNetworkParams {
    fn default() -> Self {
        Self {
            hidden_units: 16,
            epochs: 30,
            batch_size: 32,
            learning_rate: 0.05,
            seed: 42,
        }
    }
}

/// ReLU hidden layer, sigmoid output, trained with class-weighted
/// binary cross-entropy and mini-batch gradient descent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralNetwork {
    /// `hidden_units x n_inputs`
    w1: Vec<Vec<f64>>,
    b1: Vec<f64>,
    w2: Vec<f64>,
    b2: f64,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Accumulated gradients for one mini-batch
struct Gradients {
    w1: Vec<Vec<f64>>,
    b1: Vec<f64>,
    w2: Vec<f64>,
    b2: f64,
}

impl NeuralNetwork {
    pub fn fit(
        data: &[Vec<f64>],
        labels: &[bool],
        params: &NeuralNetworkParams,
    ) -> Result<Self, TrainingError> {
        if data.is_empty() || data.len() != labels.len() {
            return Err(TrainingError::InsufficientData(format!(
                "{} rows but {} labels",
                data.len(),
                labels.len()
            )));
        }
        let weights = balanced_weights(labels)?;

        let n_inputs = data[0].len();
        let hidden = params.hidden_units.max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        // He-style uniform init for the ReLU layer
        let limit1 = (6.0 / n_inputs.max(1) as f64).sqrt();
        let limit2 = (6.0 / hidden as f64).sqrt();
        let mut net = Self {
            w1: (0..hidden)
                .map(|_| (0..n_inputs).map(|_| rng.gen_range(-limit1..limit1)).collect())
                .collect(),
            b1: vec![0.0; hidden],
            w2: (0..hidden).map(|_| rng.gen_range(-limit2..limit2)).collect(),
            b2: 0.0,
        };

        let batch_size = params.batch_size.max(1);
        let mut order: Vec<usize> = (0..data.len()).collect();

        for epoch in 0..params.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let mut grads = Gradients {
                    w1: vec![vec![0.0; n_inputs]; hidden],
                    b1: vec![0.0; hidden],
                    w2: vec![0.0; hidden],
                    b2: 0.0,
                };
                let mut weight_sum = 0.0;

                for &i in batch {
                    let (hidden_out, p) = net.forward(&data[i]);
                    let y = if labels[i] { 1.0 } else { 0.0 };
                    let w = weights[i];

                    let p_clamped = p.clamp(1e-12, 1.0 - 1e-12);
                    epoch_loss -= w * (y * p_clamped.ln() + (1.0 - y) * (1.0 - p_clamped).ln());
                    weight_sum += w;

                    // d(loss)/d(logit) for sigmoid + cross-entropy
                    let delta_out = w * (p - y);
                    grads.b2 += delta_out;
                    for h in 0..hidden {
                        grads.w2[h] += delta_out * hidden_out[h];
                        if hidden_out[h] > 0.0 {
                            let delta_h = delta_out * net.w2[h];
                            grads.b1[h] += delta_h;
                            for (g, &x) in grads.w1[h].iter_mut().zip(&data[i]) {
                                *g += delta_h * x;
                            }
                        }
                    }
                }

                let step = params.learning_rate / weight_sum.max(1e-12);
                net.b2 -= step * grads.b2;
                for h in 0..hidden {
                    net.w2[h] -= step * grads.w2[h];
                    net.b1[h] -= step * grads.b1[h];
                    for (w, g) in net.w1[h].iter_mut().zip(&grads.w1[h]) {
                        *w -= step * g;
                    }
                }
            }

            if !epoch_loss.is_finite() {
                return Err(TrainingError::Diverged(format!(
                    "loss became non-finite at epoch {epoch}"
                )));
            }
        }

        Ok(net)
    }

    fn forward(&self, sample: &[f64]) -> (Vec<f64>, f64) {
        let hidden: Vec<f64> = self
            .w1
            .iter()
            .zip(&self.b1)
            .map(|(row, b)| {
                let z: f64 = row.iter().zip(sample).map(|(w, x)| w * x).sum::<f64>() + b;
                z.max(0.0)
            })
            .collect();
        let logit: f64 = hidden.iter().zip(&self.w2).map(|(h, w)| h * w).sum::<f64>() + self.b2;
        (hidden, sigmoid(logit))
    }

    /// Fraud probability in [0, 1].
    pub fn predict_proba(&self, sample: &[f64]) -> f64 {
        self.forward(sample).1
    }

    pub fn predict(&self, sample: &[f64]) -> bool {
        self.predict_proba(sample) > 0.5
    }
}
