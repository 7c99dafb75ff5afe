// =============================================================================
// Adam Optimizer
// =============================================================================
//
//   m = β1·m + (1-β1)·g
//   v = β2·v + (1-β2)·g²
//   p -= lr · (m / (1-β1^t)) / (sqrt(v / (1-β2^t)) + ε)
//
// Moment buffers live next to the parameter they belong to (`Param`), so a
// layer updates itself given the shared per-batch `AdamStep`.
// =============================================================================

use ndarray::{Array, Dimension, Zip};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-7;

/// Optimizer clock and hyper-parameters.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: BETA1,
            beta2: BETA2,
            epsilon: EPSILON,
            t: 0,
        }
    }

    /// Advance the clock by one batch and return the coefficients to apply.
    pub fn next_step(&mut self) -> AdamStep {
        self.t += 1;
        AdamStep {
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            bias1: 1.0 - self.beta1.powi(self.t),
            bias2: 1.0 - self.beta2.powi(self.t),
        }
    }

    pub fn steps(&self) -> i32 {
        self.t
    }
}

/// Coefficients of one optimizer step.
#[derive(Debug, Clone, Copy)]
pub struct AdamStep {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    bias1: f64,
    bias2: f64,
}

/// A trainable tensor with its first and second moment estimates.
#[derive(Debug, Clone)]
pub struct Param<D: Dimension> {
    pub value: Array<f64, D>,
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Param<D> {
    pub fn new(value: Array<f64, D>) -> Self {
        let m = Array::zeros(value.raw_dim());
        let v = Array::zeros(value.raw_dim());
        Self { value, m, v }
    }

    pub fn zeros_like(&self) -> Array<f64, D> {
        Array::zeros(self.value.raw_dim())
    }

    pub fn update(&mut self, grad: &Array<f64, D>, step: &AdamStep) {
        Zip::from(&mut self.value)
            .and(grad)
            .and(&mut self.m)
            .and(&mut self.v)
            .for_each(|p, &g, m, v| {
                *m = step.beta1 * *m + (1.0 - step.beta1) * g;
                *v = step.beta2 * *v + (1.0 - step.beta2) * g * g;
                let m_hat = *m / step.bias1;
                let v_hat = *v / step.bias2;
                *p -= step.learning_rate * m_hat / (v_hat.sqrt() + step.epsilon);
            });
    }
}
