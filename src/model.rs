//! Binary logistic regression over the single QBER feature.
//!
//! The objective mirrors scikit-learn's default `LogisticRegression`:
//! `C * sum(logloss) + w^2 / 2`, with an unpenalized intercept. With one
//! feature the Hessian is 2x2, so each step is an exact damped Newton step.

use log::{debug, warn};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TrainError {
    #[error("Cannot fit a model on an empty training set")]
    Empty,

    #[error("Got {features} feature values but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    #[error("Feature value at row {0} is not a finite number")]
    NonFiniteFeature(usize),

    #[error("Label at row {row} must be 0 or 1, got {value}")]
    InvalidLabel { row: usize, value: u8 },

    #[error(
        "Training labels contain a single class ({0}); \
         logistic regression needs samples of both classes"
    )]
    SingleClass(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    c: f64,
    max_iter: usize,
    tol: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        LogisticRegression {
            c: 1.0,
            max_iter: 100,
            tol: 1e-4,
        }
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inverse regularization strength; smaller values shrink the coefficient harder.
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn fit(&self, x: &[f64], y: &[u8]) -> Result<FittedLogisticRegression, TrainError> {
        validate(x, y)?;

        let mut weight = 0.0;
        let mut intercept = 0.0;
        let mut loss = self.objective(x, y, weight, intercept);
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iter {
            let (grad_w, grad_b, h_ww, h_wb, h_bb) = self.derivatives(x, y, weight, intercept);
            if grad_w.abs().max(grad_b.abs()) <= self.tol {
                converged = true;
                break;
            }
            iterations += 1;

            let det = h_ww * h_bb - h_wb * h_wb;
            if det <= f64::EPSILON {
                debug!("Hessian is singular at iteration {}", iterations);
                break;
            }
            let step_w = (h_bb * grad_w - h_wb * grad_b) / det;
            let step_b = (h_ww * grad_b - h_wb * grad_w) / det;

            // Halve the Newton step until the objective stops increasing.
            let mut scale = 1.0;
            let mut accepted = false;
            for _ in 0..40 {
                let candidate_w = weight - scale * step_w;
                let candidate_b = intercept - scale * step_b;
                let candidate_loss = self.objective(x, y, candidate_w, candidate_b);
                if candidate_loss <= loss {
                    weight = candidate_w;
                    intercept = candidate_b;
                    loss = candidate_loss;
                    accepted = true;
                    break;
                }
                scale *= 0.5;
            }
            if !accepted {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                "Logistic regression did not converge within {} iterations",
                self.max_iter
            );
        }
        debug!(
            "Fitted w = {:.6}, b = {:.6} after {} iterations (loss {:.6})",
            weight, intercept, iterations, loss
        );

        Ok(FittedLogisticRegression {
            weight,
            intercept,
            iterations,
        })
    }

    fn objective(&self, x: &[f64], y: &[u8], weight: f64, intercept: f64) -> f64 {
        let data_loss: f64 = x
            .iter()
            .zip(y)
            .map(|(&xi, &yi)| {
                let z = weight * xi + intercept;
                softplus(z) - f64::from(yi) * z
            })
            .sum();
        self.c * data_loss + 0.5 * weight * weight
    }

    /// Gradient and Hessian entries of the objective at `(weight, intercept)`.
    fn derivatives(
        &self,
        x: &[f64],
        y: &[u8],
        weight: f64,
        intercept: f64,
    ) -> (f64, f64, f64, f64, f64) {
        let (mut grad_w, mut grad_b) = (0.0, 0.0);
        let (mut h_ww, mut h_wb, mut h_bb) = (0.0, 0.0, 0.0);
        for (&xi, &yi) in x.iter().zip(y) {
            let p = sigmoid(weight * xi + intercept);
            let residual = p - f64::from(yi);
            let curvature = p * (1.0 - p);
            grad_w += residual * xi;
            grad_b += residual;
            h_ww += curvature * xi * xi;
            h_wb += curvature * xi;
            h_bb += curvature;
        }
        (
            self.c * grad_w + weight,
            self.c * grad_b,
            self.c * h_ww + 1.0,
            self.c * h_wb,
            self.c * h_bb,
        )
    }
}

fn validate(x: &[f64], y: &[u8]) -> Result<(), TrainError> {
    if x.len() != y.len() {
        return Err(TrainError::LengthMismatch {
            features: x.len(),
            labels: y.len(),
        });
    }
    if y.is_empty() {
        return Err(TrainError::Empty);
    }
    if let Some(row) = x.iter().position(|v| !v.is_finite()) {
        return Err(TrainError::NonFiniteFeature(row));
    }
    if let Some((row, &value)) = y.iter().enumerate().find(|(_, &v)| v > 1) {
        return Err(TrainError::InvalidLabel { row, value });
    }
    if y.iter().all(|&v| v == y[0]) {
        return Err(TrainError::SingleClass(y[0]));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedLogisticRegression {
    weight: f64,
    intercept: f64,
    iterations: usize,
}

impl FittedLogisticRegression {
    pub fn coefficient(&self) -> f64 {
        self.weight
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Probability of an attack for each QBER value.
    pub fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .map(|&xi| sigmoid(self.weight * xi + self.intercept))
            .collect()
    }

    pub fn predict(&self, x: &[f64]) -> Vec<u8> {
        x.iter()
            .map(|&xi| u8::from(self.weight * xi + self.intercept > 0.0))
            .collect()
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}
