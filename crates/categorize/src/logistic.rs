//! Multinomial logistic regression over sparse TF-IDF features.

use serde::{Deserialize, Serialize};

use crate::vectorizer::SparseVector;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub iterations: usize,
    pub learning_rate: f64,
    /// Inverse L2 regularisation strength. The intercepts are not regularised.
    pub c: f64,
}

/// Softmax classifier fitted by full-batch gradient descent from zero weights,
/// which makes fitting fully deterministic for a given input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    n_features: usize,
    /// One weight row per class.
    weights: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl LogisticRegression {
    /// Fit on `samples` with class indices `targets` in `0..n_classes`.
    pub fn fit(
        samples: &[SparseVector],
        targets: &[usize],
        n_classes: usize,
        n_features: usize,
        opts: FitOptions,
    ) -> Self {
        let mut model = Self {
            n_features,
            weights: vec![vec![0.0; n_features]; n_classes],
            intercepts: vec![0.0; n_classes],
        };
        if samples.is_empty() || n_classes == 0 {
            return model;
        }

        let n = samples.len() as f64;
        let l2 = 1.0 / (opts.c * n);
        let mut grad_w = vec![vec![0.0; n_features]; n_classes];
        let mut grad_b = vec![0.0; n_classes];

        for _ in 0..opts.iterations {
            for row in &mut grad_w {
                row.iter_mut().for_each(|g| *g = 0.0);
            }
            grad_b.iter_mut().for_each(|g| *g = 0.0);

            for (x, &y) in samples.iter().zip(targets) {
                let probs = model.predict_proba(x);
                for (k, p) in probs.iter().enumerate() {
                    let err = p - if k == y { 1.0 } else { 0.0 };
                    grad_b[k] += err / n;
                    for &(j, v) in x {
                        grad_w[k][j] += err * v / n;
                    }
                }
            }

            for k in 0..n_classes {
                for j in 0..n_features {
                    let g = grad_w[k][j] + l2 * model.weights[k][j];
                    model.weights[k][j] -= opts.learning_rate * g;
                }
                model.intercepts[k] -= opts.learning_rate * grad_b[k];
            }
        }
        model
    }

    /// Class probabilities for one sample; sums to 1.
    pub fn predict_proba(&self, x: &SparseVector) -> Vec<f64> {
        let scores: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| b + x.iter().map(|&(j, v)| row.get(j).copied().unwrap_or(0.0) * v).sum::<f64>())
            .collect();
        softmax(&scores)
    }

    pub fn n_classes(&self) -> usize {
        self.intercepts.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Structural sanity check for a deserialized model.
    pub(crate) fn is_consistent(&self) -> bool {
        self.weights.len() == self.intercepts.len()
            && self
                .weights
                .iter()
                .all(|row| row.len() == self.n_features && row.iter().all(|w| w.is_finite()))
            && self.intercepts.iter().all(|b| b.is_finite())
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
