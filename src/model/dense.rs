// Fully-connected output head: y = h·W + b.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

use super::adam::{AdamStep, Param};

#[derive(Debug, Clone)]
pub struct Dense {
    weights: Param<ndarray::Ix2>,
    bias: Param<ndarray::Ix1>,
}

#[derive(Debug, Clone)]
pub struct DenseGrads {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias.
    pub fn new<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        Self {
            weights: Param::new(Array2::random_using(
                (inputs, outputs),
                Uniform::new(-limit, limit),
                rng,
            )),
            bias: Param::new(Array1::zeros(outputs)),
        }
    }

    /// (batch, inputs) -> (batch, outputs)
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.weights.value) + &self.bias.value
    }

    /// Returns the parameter gradients and the gradient w.r.t. `input`.
    pub fn backward(&self, input: &Array2<f64>, d_out: &Array2<f64>) -> (DenseGrads, Array2<f64>) {
        let grads = DenseGrads {
            weights: input.t().dot(d_out),
            bias: d_out.sum_axis(Axis(0)),
        };
        let d_input = d_out.dot(&self.weights.value.t());
        (grads, d_input)
    }

    pub fn apply(&mut self, grads: &DenseGrads, step: &AdamStep) {
        self.weights.update(&grads.weights, step);
        self.bias.update(&grads.bias, step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn output_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let dense = Dense::new(4, 1, &mut rng);
        let out = dense.forward(&Array2::ones((3, 4)));
        assert_eq!(out.dim(), (3, 1));
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(2);
        let dense = Dense::new(3, 1, &mut rng);
        let x = array![[0.2, -0.4, 0.9], [0.5, 0.1, -0.3]];
        let loss = |d: &Dense, x: &Array2<f64>| d.forward(x).sum();

        let (_, d_x) = dense.backward(&x, &Array2::ones((2, 1)));
        let eps = 1e-6;
        let mut shifted = x.clone();
        shifted[[1, 2]] += eps;
        let numeric = (loss(&dense, &shifted) - loss(&dense, &x)) / eps;
        assert!((numeric - d_x[[1, 2]]).abs() < 1e-5);
    }
}
