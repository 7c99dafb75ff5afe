// =============================================================================
// LSTM Layer (batched)
// =============================================================================
//
// Gates are packed column-wise in the order [i | f | g | o], each `hidden`
// wide:
//
//   z = x·W + h_prev·U + b            (batch, 4·hidden)
//   i, f, o = σ(z_i), σ(z_f), σ(z_o)
//   g       = tanh(z_g)
//   c = f ⊙ c_prev + i ⊙ g
//   h = o ⊙ tanh(c)
//
// Kernel: Glorot uniform. Recurrent: orthogonal rows. Bias: zero except the
// forget gate.
//
// The forward pass keeps a per-step cache that the backward pass walks in
// reverse (backprop through time).
// =============================================================================

use ndarray::{s, Array1, Array2, Array3, ArrayView3, Axis};
use ndarray_rand::rand_distr::{StandardNormal, Uniform};
use ndarray_rand::RandomExt;
use rand::Rng;

use super::adam::{AdamStep, Param};
use super::sigmoid;

#[derive(Debug, Clone)]
pub struct LstmLayer {
    hidden: usize,
    /// (inputs, 4·hidden)
    kernel: Param<ndarray::Ix2>,
    /// (hidden, 4·hidden)
    recurrent: Param<ndarray::Ix2>,
    /// 4·hidden; forget gate starts at 1.
    bias: Param<ndarray::Ix1>,
}

#[derive(Debug, Clone)]
pub struct LstmGrads {
    pub kernel: Array2<f64>,
    pub recurrent: Array2<f64>,
    pub bias: Array1<f64>,
}

#[derive(Debug)]
struct StepCache {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    /// Activated gates, same packing as `z`.
    gates: Array2<f64>,
    tanh_c: Array2<f64>,
}

/// Everything the backward pass needs from one forward pass.
#[derive(Debug)]
pub struct LstmCache {
    steps: Vec<StepCache>,
}

impl LstmLayer {
    pub fn new<R: Rng + ?Sized>(inputs: usize, hidden: usize, rng: &mut R) -> Self {
        let gates = 4 * hidden;
        let kernel_limit = (6.0 / (inputs + gates) as f64).sqrt();

        let mut bias = Array1::<f64>::zeros(gates);
        bias.slice_mut(s![hidden..2 * hidden]).fill(1.0);

        Self {
            hidden,
            kernel: Param::new(Array2::random_using(
                (inputs, gates),
                Uniform::new(-kernel_limit, kernel_limit),
                rng,
            )),
            recurrent: Param::new(orthogonal(hidden, gates, rng)),
            bias: Param::new(bias),
        }
    }

    pub fn inputs(&self) -> usize {
        self.kernel.value.nrows()
    }

    /// (batch, time, inputs) -> (batch, time, hidden), zero initial state.
    pub fn forward(&self, input: ArrayView3<f64>) -> (Array3<f64>, LstmCache) {
        let (batch, steps, _) = input.dim();
        let hu = self.hidden;

        let mut h = Array2::<f64>::zeros((batch, hu));
        let mut c = Array2::<f64>::zeros((batch, hu));
        let mut outputs = Array3::<f64>::zeros((batch, steps, hu));
        let mut cache = Vec::with_capacity(steps);

        for t in 0..steps {
            let x = input.index_axis(Axis(1), t).to_owned();
            let mut gates = x.dot(&self.kernel.value) + h.dot(&self.recurrent.value) + &self.bias.value;
            gates.slice_mut(s![.., 0..2 * hu]).mapv_inplace(sigmoid);
            gates.slice_mut(s![.., 2 * hu..3 * hu]).mapv_inplace(f64::tanh);
            gates.slice_mut(s![.., 3 * hu..]).mapv_inplace(sigmoid);

            let (c_next, tanh_c, h_next) = {
                let i = gates.slice(s![.., 0..hu]);
                let f = gates.slice(s![.., hu..2 * hu]);
                let g = gates.slice(s![.., 2 * hu..3 * hu]);
                let o = gates.slice(s![.., 3 * hu..]);
                let c_next = &f * &c + &i * &g;
                let tanh_c = c_next.mapv(f64::tanh);
                let h_next = &o * &tanh_c;
                (c_next, tanh_c, h_next)
            };

            outputs.index_axis_mut(Axis(1), t).assign(&h_next);
            cache.push(StepCache {
                x,
                h_prev: h,
                c_prev: c,
                gates,
                tanh_c,
            });
            h = h_next;
            c = c_next;
        }

        (outputs, LstmCache { steps: cache })
    }

    /// Backprop through time.
    ///
    /// `d_out` is the loss gradient w.r.t. every output step. Returns the
    /// parameter gradients and the gradient w.r.t. the layer input.
    pub fn backward(&self, cache: &LstmCache, d_out: ArrayView3<f64>) -> (LstmGrads, Array3<f64>) {
        let (batch, steps, _) = d_out.dim();
        let hu = self.hidden;

        let mut grads = LstmGrads {
            kernel: self.kernel.zeros_like(),
            recurrent: self.recurrent.zeros_like(),
            bias: self.bias.zeros_like(),
        };
        let mut d_input = Array3::<f64>::zeros((batch, steps, self.inputs()));
        let mut dh_next = Array2::<f64>::zeros((batch, hu));
        let mut dc_next = Array2::<f64>::zeros((batch, hu));

        for (t, step) in cache.steps.iter().enumerate().rev() {
            let i = step.gates.slice(s![.., 0..hu]);
            let f = step.gates.slice(s![.., hu..2 * hu]);
            let g = step.gates.slice(s![.., 2 * hu..3 * hu]);
            let o = step.gates.slice(s![.., 3 * hu..]);

            let dh = &d_out.index_axis(Axis(1), t) + &dh_next;
            let d_o = &dh * &step.tanh_c;
            let dc = &dh * &o * &step.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;

            let mut dz = Array2::<f64>::zeros((batch, 4 * hu));
            dz.slice_mut(s![.., 0..hu])
                .assign(&(&dc * &g * &i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., hu..2 * hu])
                .assign(&(&dc * &step.c_prev * &f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., 2 * hu..3 * hu])
                .assign(&(&dc * &i * &g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * hu..])
                .assign(&(&d_o * &o.mapv(|v| v * (1.0 - v))));

            grads.kernel += &step.x.t().dot(&dz);
            grads.recurrent += &step.h_prev.t().dot(&dz);
            grads.bias += &dz.sum_axis(Axis(0));

            d_input
                .index_axis_mut(Axis(1), t)
                .assign(&dz.dot(&self.kernel.value.t()));
            dh_next = dz.dot(&self.recurrent.value.t());
            dc_next = &dc * &f;
        }

        (grads, d_input)
    }

    pub fn apply(&mut self, grads: &LstmGrads, step: &AdamStep) {
        self.kernel.update(&grads.kernel, step);
        self.recurrent.update(&grads.recurrent, step);
        self.bias.update(&grads.bias, step);
    }
}

/// Random matrix whose rows (or columns, when taller than wide) are
/// orthonormal. Gram-Schmidt over standard-normal draws.
fn orthogonal<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Array2<f64> {
    let tall = rows > cols;
    let (n, len) = if tall { (cols, rows) } else { (rows, cols) };
    let mut m = Array2::<f64>::random_using((n, len), StandardNormal, rng);

    for i in 0..n {
        for j in 0..i {
            let proj = m.row(i).dot(&m.row(j));
            let prev = m.row(j).to_owned();
            m.row_mut(i).scaled_add(-proj, &prev);
        }
        let norm = m.row(i).dot(&m.row(i)).sqrt();
        if norm > f64::EPSILON {
            m.row_mut(i).mapv_inplace(|v| v / norm);
        }
    }

    if tall {
        m.reversed_axes()
    } else {
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer(inputs: usize, hidden: usize) -> LstmLayer {
        LstmLayer::new(inputs, hidden, &mut StdRng::seed_from_u64(11))
    }

    fn input(batch: usize, steps: usize, inputs: usize) -> Array3<f64> {
        Array3::from_shape_fn((batch, steps, inputs), |(b, t, k)| {
            ((b * 7 + t * 3 + k) as f64 * 0.37).sin() * 0.5
        })
    }

    #[test]
    fn forward_shapes() {
        let lstm = layer(5, 4);
        let (out, _) = lstm.forward(input(3, 6, 5).view());
        assert_eq!(out.dim(), (3, 6, 4));
    }

    #[test]
    fn hidden_state_is_bounded() {
        let lstm = layer(3, 4);
        let big = input(2, 10, 3).mapv(|v| v * 100.0);
        let (out, _) = lstm.forward(big.view());
        assert!(out.iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn forget_bias_starts_at_one() {
        let lstm = layer(3, 4);
        let b = &lstm.bias.value;
        assert!(b.slice(s![4..8]).iter().all(|&v| v == 1.0));
        assert!(b.slice(s![0..4]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn recurrent_rows_are_orthonormal() {
        let lstm = layer(3, 4);
        let u = &lstm.recurrent.value;
        assert_eq!(u.dim(), (4, 16));
        let gram = u.dot(&u.t());
        for ((r, c), v) in gram.indexed_iter() {
            let expected = if r == c { 1.0 } else { 0.0 };
            assert!((v - expected).abs() < 1e-9, "gram[{r},{c}] = {v}");
        }
    }

    #[test]
    fn orthogonal_handles_tall_shapes() {
        let mut rng = StdRng::seed_from_u64(11);
        let m = orthogonal(6, 3, &mut rng);
        let gram = m.t().dot(&m);
        for ((r, c), v) in gram.indexed_iter() {
            let expected = if r == c { 1.0 } else { 0.0 };
            assert!((v - expected).abs() < 1e-9);
        }
    }

    /// Loss = sum of every output. Compares analytic and numeric gradients.
    #[test]
    fn backward_matches_finite_difference() {
        let lstm = layer(3, 2);
        let x = input(2, 4, 3);
        let loss = |l: &LstmLayer, x: &Array3<f64>| l.forward(x.view()).0.sum();

        let (out, cache) = lstm.forward(x.view());
        let (grads, d_x) = lstm.backward(&cache, Array3::<f64>::ones(out.dim()).view());

        let eps = 1e-6;
        let base = loss(&lstm, &x);

        let mut shifted = lstm.clone();
        shifted.kernel.value[[1, 5]] += eps;
        let numeric = (loss(&shifted, &x) - base) / eps;
        assert!((numeric - grads.kernel[[1, 5]]).abs() < 1e-4);

        let mut shifted = lstm.clone();
        shifted.recurrent.value[[0, 2]] += eps;
        let numeric = (loss(&shifted, &x) - base) / eps;
        assert!((numeric - grads.recurrent[[0, 2]]).abs() < 1e-4);

        let mut shifted = lstm.clone();
        shifted.bias.value[7] += eps;
        let numeric = (loss(&shifted, &x) - base) / eps;
        assert!((numeric - grads.bias[7]).abs() < 1e-4);

        let mut nudged = x.clone();
        nudged[[1, 2, 0]] += eps;
        let numeric = (loss(&lstm, &nudged) - base) / eps;
        assert!((numeric - d_x[[1, 2, 0]]).abs() < 1e-4);
    }
}
