// =============================================================================
// Sequence Regressor
// =============================================================================
//
// Stacked LSTM layers with inverted dropout after each one, and a linear
// head on the last time step of the final layer. An optional anchor column
// of the input's last step is added to the head output; it carries no
// parameters, so backprop only sees the head.
// Dropout is only active in
// `forward_train`; `predict` uses the full network.
// =============================================================================

use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

use super::adam::AdamStep;
use super::dense::{Dense, DenseGrads};
use super::lstm::{LstmCache, LstmGrads, LstmLayer};
use super::ModelConfig;

#[derive(Debug, Clone)]
pub struct SequenceRegressor {
    layers: Vec<LstmLayer>,
    head: Dense,
    dropout: f64,
    anchor: Option<usize>,
}

/// State kept between `forward_train` and `backward`.
#[derive(Debug)]
pub struct ForwardCache {
    layers: Vec<LstmCache>,
    masks: Vec<Option<Array3<f64>>>,
    last_hidden: Array2<f64>,
    steps: usize,
}

#[derive(Debug, Clone)]
pub struct Gradients {
    layers: Vec<LstmGrads>,
    head: DenseGrads,
}

impl SequenceRegressor {
    pub fn new<R: Rng + ?Sized>(features: usize, config: &ModelConfig, rng: &mut R) -> Self {
        let hidden = config.hidden_units.max(1);
        let depth = config.recurrent_layers.max(1);

        let layers = (0..depth)
            .map(|k| {
                let inputs = if k == 0 { features } else { hidden };
                LstmLayer::new(inputs, hidden, rng)
            })
            .collect();

        Self {
            layers,
            head: Dense::new(hidden, 1, rng),
            dropout: config.dropout.clamp(0.0, 0.95),
            anchor: None,
        }
    }

    /// Predict `input[.., last, column] + head(h)` instead of `head(h)`.
    pub fn with_anchor(mut self, column: usize) -> Self {
        self.anchor = Some(column);
        self
    }

    /// Training forward pass over (batch, time, features).
    pub fn forward_train<R: Rng + ?Sized>(
        &self,
        input: ArrayView3<f64>,
        rng: &mut R,
    ) -> (Array1<f64>, ForwardCache) {
        let mut seq = input.to_owned();
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut masks = Vec::with_capacity(self.layers.len());

        for layer in &self.layers {
            let (mut out, cache) = layer.forward(seq.view());
            let mask = self.dropout_mask(out.raw_dim(), rng);
            if let Some(m) = &mask {
                out *= m;
            }
            caches.push(cache);
            masks.push(mask);
            seq = out;
        }

        let steps = seq.len_of(Axis(1));
        let last_hidden = seq.index_axis(Axis(1), steps - 1).to_owned();
        let mut y = self.head.forward(&last_hidden).index_axis(Axis(1), 0).to_owned();
        self.add_anchor(&mut y, input);

        let cache = ForwardCache {
            layers: caches,
            masks,
            last_hidden,
            steps,
        };
        (y, cache)
    }

    /// Gradients of the loss given `d_pred`, its derivative per example.
    pub fn backward(&self, cache: &ForwardCache, d_pred: &Array1<f64>) -> Gradients {
        let d_y = d_pred.view().insert_axis(Axis(1)).to_owned();
        let (head, d_last) = self.head.backward(&cache.last_hidden, &d_y);

        let (batch, hidden) = d_last.dim();
        let mut d_seq = Array3::<f64>::zeros((batch, cache.steps, hidden));
        d_seq.index_axis_mut(Axis(1), cache.steps - 1).assign(&d_last);

        let mut layers = Vec::with_capacity(self.layers.len());
        for (k, layer) in self.layers.iter().enumerate().rev() {
            if let Some(mask) = &cache.masks[k] {
                d_seq *= mask;
            }
            let (grads, d_input) = layer.backward(&cache.layers[k], d_seq.view());
            layers.push(grads);
            d_seq = d_input;
        }
        layers.reverse();

        Gradients { layers, head }
    }

    pub fn apply(&mut self, grads: &Gradients, step: &AdamStep) {
        for (layer, g) in self.layers.iter_mut().zip(&grads.layers) {
            layer.apply(g, step);
        }
        self.head.apply(&grads.head, step);
    }

    /// Inference over a batch, no dropout.
    pub fn predict(&self, input: ArrayView3<f64>) -> Array1<f64> {
        let mut seq = input.to_owned();
        for layer in &self.layers {
            seq = layer.forward(seq.view()).0;
        }
        let steps = seq.len_of(Axis(1));
        let last_hidden = seq.index_axis(Axis(1), steps - 1).to_owned();
        let mut y = self.head.forward(&last_hidden).index_axis(Axis(1), 0).to_owned();
        self.add_anchor(&mut y, input);
        y
    }

    /// Inference on a single (time, features) sequence.
    pub fn predict_one(&self, sequence: ArrayView2<f64>) -> f64 {
        self.predict(sequence.insert_axis(Axis(0)))[0]
    }

    fn add_anchor(&self, y: &mut Array1<f64>, input: ArrayView3<f64>) {
        if let Some(column) = self.anchor {
            let last = input.len_of(Axis(1)) - 1;
            *y += &input.slice(s![.., last, column]);
        }
    }

    fn dropout_mask<R: Rng + ?Sized>(&self, dim: ndarray::Ix3, rng: &mut R) -> Option<Array3<f64>> {
        if self.dropout <= 0.0 {
            return None;
        }
        let keep = 1.0 - self.dropout;
        let mask = Array3::random_using(dim, Uniform::new(0.0, 1.0), rng)
            .mapv(|u: f64| if u < keep { 1.0 / keep } else { 0.0 });
        Some(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config(dropout: f64) -> ModelConfig {
        ModelConfig {
            hidden_units: 3,
            recurrent_layers: 2,
            dropout,
            ..ModelConfig::default()
        }
    }

    fn batch() -> Array3<f64> {
        Array3::from_shape_fn((4, 5, 2), |(b, t, k)| ((b + 2 * t + 3 * k) as f64 * 0.21).cos())
    }

    #[test]
    fn predict_returns_one_value_per_example() {
        let mut rng = StdRng::seed_from_u64(3);
        let net = SequenceRegressor::new(2, &small_config(0.2), &mut rng);
        assert_eq!(net.predict(batch().view()).len(), 4);
    }

    #[test]
    fn training_forward_without_dropout_matches_predict() {
        let mut rng = StdRng::seed_from_u64(4);
        let net = SequenceRegressor::new(2, &small_config(0.0), &mut rng);
        let x = batch();
        let (train_out, _) = net.forward_train(x.view(), &mut rng);
        let infer_out = net.predict(x.view());
        for (a, b) in train_out.iter().zip(infer_out.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn predict_one_matches_batched_predict() {
        let mut rng = StdRng::seed_from_u64(5);
        let net = SequenceRegressor::new(2, &small_config(0.2), &mut rng);
        let x = batch();
        let all = net.predict(x.view());
        let single = net.predict_one(x.index_axis(Axis(0), 2));
        assert!((all[2] - single).abs() < 1e-12);
    }

    #[test]
    fn repeated_updates_reduce_loss() {
        use crate::model::adam::Adam;

        let mut rng = StdRng::seed_from_u64(6);
        let mut net = SequenceRegressor::new(2, &small_config(0.0), &mut rng);
        let mut adam = Adam::new(0.01);
        let x = batch();
        let y = Array1::from(vec![0.2, 0.4, 0.6, 0.8]);

        let mse = |net: &SequenceRegressor| {
            (&net.predict(x.view()) - &y).mapv(|d| d * d).sum() / y.len() as f64
        };
        let before = mse(&net);
        for _ in 0..200 {
            let (pred, cache) = net.forward_train(x.view(), &mut rng);
            let d_pred = (&pred - &y) * (2.0 / y.len() as f64);
            let grads = net.backward(&cache, &d_pred);
            net.apply(&grads, &adam.next_step());
        }
        let after = mse(&net);
        assert!(after < before * 0.5, "loss {before} -> {after}");
    }

    #[test]
    fn anchor_adds_last_step_column() {
        let cfg = small_config(0.0);
        let plain = SequenceRegressor::new(2, &cfg, &mut StdRng::seed_from_u64(9));
        let anchored =
            SequenceRegressor::new(2, &cfg, &mut StdRng::seed_from_u64(9)).with_anchor(1);
        let x = batch();
        let diff = &anchored.predict(x.view()) - &plain.predict(x.view());
        for (b, d) in diff.iter().enumerate() {
            assert!((d - x[[b, 4, 1]]).abs() < 1e-12);
        }

        let mut rng = StdRng::seed_from_u64(10);
        let (train_out, _) = anchored.forward_train(x.view(), &mut rng);
        let infer_out = anchored.predict(x.view());
        for (a, b) in train_out.iter().zip(infer_out.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn anchored_network_learns_a_constant_step() {
        use crate::model::adam::Adam;

        let mut rng = StdRng::seed_from_u64(12);
        let mut net = SequenceRegressor::new(2, &small_config(0.0), &mut rng).with_anchor(0);
        let mut adam = Adam::new(0.01);
        let x = batch();
        let y = x.slice(s![.., 4, 0]).mapv(|v| v + 0.1);

        for _ in 0..400 {
            let (pred, cache) = net.forward_train(x.view(), &mut rng);
            let d_pred = (&pred - &y) * (2.0 / y.len() as f64);
            let grads = net.backward(&cache, &d_pred);
            net.apply(&grads, &adam.next_step());
        }
        for (p, t) in net.predict(x.view()).iter().zip(y.iter()) {
            assert!((p - t).abs() < 0.05, "{p} vs {t}");
        }
    }

    #[test]
    fn dropout_mask_is_inverted() {
        let mut rng = StdRng::seed_from_u64(7);
        let net = SequenceRegressor::new(2, &small_config(0.5), &mut rng);
        let mask = net
            .dropout_mask(ndarray::Dim([8, 10, 3]), &mut rng)
            .unwrap();
        assert!(mask.iter().all(|&v| v == 0.0 || v == 2.0));
        assert!(mask.iter().any(|&v| v == 0.0));
        assert!(mask.iter().any(|&v| v == 2.0));
    }
}
