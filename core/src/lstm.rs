//! Stacked LSTM with a linear head, trained to predict the next row of a
//! normalized price table from the preceding window.
//!
//! Gate layout inside every weight matrix (rows, H = hidden size):
//!   [0, H)   input gate
//!   [H, 2H)  forget gate
//!   [2H, 3H) cell candidate
//!   [3H, 4H) output gate
//!
//! Batches are column-major: one column per sample.

use crate::{
    config::LstmSection,
    correlation::{corrcoef, CorrelationMatrix},
    error::{AnalysisError, AnalysisResult},
    frame::PriceFrame,
    rng::StageRng,
};
use nalgebra::DMatrix;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

/// Sliding windows over a row-major table: item i is
/// (rows[i..i+seq_length], rows[i+seq_length]).
#[derive(Debug, Clone)]
pub struct WindowDataset {
    data:       Vec<Vec<f64>>,
    seq_length: usize,
}

impl WindowDataset {
    pub fn new(data: Vec<Vec<f64>>, seq_length: usize) -> AnalysisResult<Self> {
        if seq_length == 0 {
            return Err(AnalysisError::InsufficientData("seq_length must be positive".into()));
        }
        if data.len() <= seq_length {
            return Err(AnalysisError::InsufficientData(format!(
                "{} rows cannot form a window of length {seq_length} plus a target",
                data.len()
            )));
        }
        let width = data[0].len();
        if let Some(bad) = data.iter().find(|r| r.len() != width) {
            return Err(AnalysisError::ShapeMismatch { expected: width, actual: bad.len() });
        }
        if data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AnalysisError::InsufficientData(
                "training data contains missing or non-finite values".into(),
            ));
        }
        Ok(Self { data, seq_length })
    }

    pub fn from_frame(frame: &PriceFrame, seq_length: usize) -> AnalysisResult<Self> {
        Self::new(frame.rows().to_vec(), seq_length)
    }

    pub fn len(&self) -> usize { self.data.len() - self.seq_length }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn width(&self) -> usize { self.data[0].len() }
    pub fn seq_length(&self) -> usize { self.seq_length }

    pub fn item(&self, i: usize) -> (&[Vec<f64>], &[f64]) {
        (&self.data[i..i + self.seq_length], &self.data[i + self.seq_length])
    }

    /// Inputs per time step (width x batch) and targets (width x batch).
    fn batch(&self, indices: &[usize]) -> (Vec<DMatrix<f64>>, DMatrix<f64>) {
        let b = indices.len();
        let w = self.width();
        let steps = (0..self.seq_length)
            .map(|t| DMatrix::from_fn(w, b, |r, c| self.data[indices[c] + t][r]))
            .collect();
        let targets = DMatrix::from_fn(w, b, |r, c| self.data[indices[c] + self.seq_length][r]);
        (steps, targets)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LstmConfig {
    pub input_size:    usize,
    pub hidden_size:   usize,
    pub num_layers:    usize,
    pub output_size:   usize,
    pub seq_length:    usize,
    pub batch_size:    usize,
    pub epochs:        usize,
    pub learning_rate: f64,
}

impl LstmConfig {
    /// Model sized for a table of `width` assets; the head predicts every asset.
    pub fn for_width(section: &LstmSection, width: usize) -> Self {
        Self {
            input_size:    width,
            hidden_size:   section.hidden_size,
            num_layers:    section.num_layers,
            output_size:   width,
            seq_length:    section.seq_length,
            batch_size:    section.batch_size,
            epochs:        section.epochs,
            learning_rate: section.learning_rate,
        }
    }
}

/// A trainable tensor with its Adam moments.
#[derive(Debug, Clone)]
struct Param {
    value: DMatrix<f64>,
    grad:  DMatrix<f64>,
    m:     DMatrix<f64>,
    v:     DMatrix<f64>,
}

impl Param {
    fn uniform(rows: usize, cols: usize, bound: f64, rng: &mut StageRng) -> Self {
        let value = DMatrix::from_fn(rows, cols, |_, _| rng.uniform(-bound, bound));
        Self {
            value,
            grad: DMatrix::zeros(rows, cols),
            m:    DMatrix::zeros(rows, cols),
            v:    DMatrix::zeros(rows, cols),
        }
    }

    fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    fn adam_step(&mut self, lr: f64, step: i32) {
        let bc1 = 1.0 - ADAM_BETA1.powi(step);
        let bc2 = 1.0 - ADAM_BETA2.powi(step);
        for i in 0..self.value.len() {
            let g = self.grad[i];
            self.m[i] = ADAM_BETA1 * self.m[i] + (1.0 - ADAM_BETA1) * g;
            self.v[i] = ADAM_BETA2 * self.v[i] + (1.0 - ADAM_BETA2) * g * g;
            let m_hat = self.m[i] / bc1;
            let v_hat = self.v[i] / bc2;
            self.value[i] -= lr * m_hat / (v_hat.sqrt() + ADAM_EPS);
        }
    }
}

#[derive(Debug, Clone)]
struct LstmLayer {
    w_ih: Param,
    w_hh: Param,
    bias: Param,
}

/// Per-step activations kept for backpropagation.
struct StepCache {
    x:      DMatrix<f64>,
    h_prev: DMatrix<f64>,
    c_prev: DMatrix<f64>,
    i:      DMatrix<f64>,
    f:      DMatrix<f64>,
    g:      DMatrix<f64>,
    o:      DMatrix<f64>,
    tanh_c: DMatrix<f64>,
}

impl LstmLayer {
    fn new(input: usize, hidden: usize, rng: &mut StageRng) -> Self {
        let bound = 1.0 / (hidden as f64).sqrt();
        Self {
            w_ih: Param::uniform(4 * hidden, input, bound, rng),
            w_hh: Param::uniform(4 * hidden, hidden, bound, rng),
            bias: Param::uniform(4 * hidden, 1, bound, rng),
        }
    }

    fn hidden(&self) -> usize { self.w_hh.value.ncols() }

    /// Run the layer over a sequence; returns the hidden state at every step.
    fn forward(&self, inputs: &[DMatrix<f64>], cache: &mut Vec<StepCache>) -> Vec<DMatrix<f64>> {
        let h_size = self.hidden();
        let batch = inputs.first().map_or(0, |x| x.ncols());
        let mut h = DMatrix::zeros(h_size, batch);
        let mut c = DMatrix::zeros(h_size, batch);
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            let mut z = &self.w_ih.value * x + &self.w_hh.value * &h;
            for col in 0..batch {
                for r in 0..4 * h_size {
                    z[(r, col)] += self.bias.value[(r, 0)];
                }
            }
            let i = z.rows(0, h_size).map(sigmoid);
            let f = z.rows(h_size, h_size).map(sigmoid);
            let g = z.rows(2 * h_size, h_size).map(f64::tanh);
            let o = z.rows(3 * h_size, h_size).map(sigmoid);

            let c_new = f.component_mul(&c) + i.component_mul(&g);
            let tanh_c = c_new.map(f64::tanh);
            let h_new = o.component_mul(&tanh_c);

            cache.push(StepCache {
                x: x.clone(),
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                tanh_c,
            });
            outputs.push(h_new.clone());
            h = h_new;
            c = c_new;
        }
        outputs
    }

    /// Accumulate gradients given dL/dh_t from above for every step.
    /// Returns dL/dx_t for every step.
    fn backward(&mut self, cache: &[StepCache], dh_above: &[DMatrix<f64>]) -> Vec<DMatrix<f64>> {
        let h_size = self.hidden();
        let batch = dh_above.first().map_or(0, |d| d.ncols());
        let mut dh_next = DMatrix::zeros(h_size, batch);
        let mut dc_next = DMatrix::zeros(h_size, batch);
        let mut dx = vec![DMatrix::zeros(0, 0); cache.len()];

        for t in (0..cache.len()).rev() {
            let s = &cache[t];
            let dh = &dh_above[t] + &dh_next;

            let d_o = dh.component_mul(&s.tanh_c);
            let dc = dh.component_mul(&s.o).component_mul(&s.tanh_c.map(|v| 1.0 - v * v)) + &dc_next;
            let d_f = dc.component_mul(&s.c_prev);
            let d_i = dc.component_mul(&s.g);
            let d_g = dc.component_mul(&s.i);
            dc_next = dc.component_mul(&s.f);

            let mut dz = DMatrix::zeros(4 * h_size, batch);
            dz.rows_mut(0, h_size).copy_from(&d_i.component_mul(&s.i.map(|v| v * (1.0 - v))));
            dz.rows_mut(h_size, h_size).copy_from(&d_f.component_mul(&s.f.map(|v| v * (1.0 - v))));
            dz.rows_mut(2 * h_size, h_size).copy_from(&d_g.component_mul(&s.g.map(|v| 1.0 - v * v)));
            dz.rows_mut(3 * h_size, h_size).copy_from(&d_o.component_mul(&s.o.map(|v| v * (1.0 - v))));

            self.w_ih.grad += &dz * s.x.transpose();
            self.w_hh.grad += &dz * s.h_prev.transpose();
            self.bias.grad += dz.column_sum();

            dx[t] = self.w_ih.value.transpose() * &dz;
            dh_next = self.w_hh.value.transpose() * &dz;
        }
        dx
    }

    fn params_mut(&mut self) -> [&mut Param; 3] {
        [&mut self.w_ih, &mut self.w_hh, &mut self.bias]
    }
}

/// Stacked LSTM whose final hidden state feeds a linear layer.
#[derive(Debug, Clone)]
pub struct AssetRelationshipModel {
    layers: Vec<LstmLayer>,
    head_w: Param,
    head_b: Param,
    step:   i32,
}

impl AssetRelationshipModel {
    pub fn new(config: &LstmConfig, rng: &mut StageRng) -> AnalysisResult<Self> {
        if config.input_size == 0 || config.hidden_size == 0 || config.num_layers == 0 || config.output_size == 0 {
            return Err(AnalysisError::InsufficientData(
                "LSTM sizes and layer count must be positive".into(),
            ));
        }
        let mut layers = Vec::with_capacity(config.num_layers);
        for l in 0..config.num_layers {
            let input = if l == 0 { config.input_size } else { config.hidden_size };
            layers.push(LstmLayer::new(input, config.hidden_size, rng));
        }
        let bound = 1.0 / (config.hidden_size as f64).sqrt();
        Ok(Self {
            layers,
            head_w: Param::uniform(config.output_size, config.hidden_size, bound, rng),
            head_b: Param::uniform(config.output_size, 1, bound, rng),
            step: 0,
        })
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.w_ih.value.ncols())
    }

    pub fn output_size(&self) -> usize { self.head_w.value.nrows() }

    /// Predictions (output x batch) plus the caches needed by `backward`.
    fn forward(&self, steps: &[DMatrix<f64>]) -> (DMatrix<f64>, Vec<Vec<StepCache>>) {
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut seq = steps.to_vec();
        for layer in &self.layers {
            let mut cache = Vec::with_capacity(seq.len());
            seq = layer.forward(&seq, &mut cache);
            caches.push(cache);
        }
        let last = seq.last().cloned().unwrap_or_else(|| DMatrix::zeros(0, 0));
        let mut y = &self.head_w.value * &last;
        for col in 0..y.ncols() {
            for r in 0..y.nrows() {
                y[(r, col)] += self.head_b.value[(r, 0)];
            }
        }
        (y, caches)
    }

    /// Forward one batch, backpropagate the MSE loss, apply one Adam step.
    fn train_batch(&mut self, steps: &[DMatrix<f64>], targets: &DMatrix<f64>, lr: f64) -> f64 {
        let (y, caches) = self.forward(steps);
        let diff = &y - targets;
        let count = diff.len() as f64;
        let loss = diff.norm_squared() / count;

        self.zero_grad();
        let dy = diff * (2.0 / count);
        let top = caches
            .last()
            .and_then(|c| c.last())
            .map(|s| s.o.component_mul(&s.tanh_c))
            .unwrap_or_else(|| DMatrix::zeros(0, 0));
        self.head_w.grad += &dy * top.transpose();
        self.head_b.grad += dy.column_sum();

        let seq_len = steps.len();
        let batch = targets.ncols();
        let hidden = self.head_w.value.ncols();
        let mut dh_above = vec![DMatrix::zeros(hidden, batch); seq_len];
        if let Some(last) = dh_above.last_mut() {
            *last = self.head_w.value.transpose() * &dy;
        }
        for (layer, cache) in self.layers.iter_mut().zip(&caches).rev() {
            dh_above = layer.backward(cache, &dh_above);
        }

        self.step += 1;
        let step = self.step;
        for p in self.params_mut() {
            p.adam_step(lr, step);
        }
        loss
    }

    fn zero_grad(&mut self) {
        for p in self.params_mut() {
            p.zero_grad();
        }
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut out: Vec<&mut Param> = Vec::new();
        for layer in &mut self.layers {
            out.extend(layer.params_mut());
        }
        out.push(&mut self.head_w);
        out.push(&mut self.head_b);
        out
    }

    /// Prediction for a single window (rows oldest first).
    pub fn predict(&self, window: &[Vec<f64>]) -> Vec<f64> {
        let steps: Vec<DMatrix<f64>> = window
            .iter()
            .map(|row| DMatrix::from_column_slice(row.len(), 1, row))
            .collect();
        let (y, _) = self.forward(&steps);
        y.column(0).iter().copied().collect()
    }
}

/// Train for `config.epochs` epochs; returns the mean batch loss per epoch.
pub fn train(
    model: &mut AssetRelationshipModel,
    dataset: &WindowDataset,
    config: &LstmConfig,
    rng: &mut StageRng,
) -> AnalysisResult<Vec<f64>> {
    if dataset.width() != model.input_size() || dataset.width() != model.output_size() {
        return Err(AnalysisError::ShapeMismatch {
            expected: model.input_size(),
            actual:   dataset.width(),
        });
    }
    if config.batch_size == 0 {
        return Err(AnalysisError::InsufficientData("batch_size must be positive".into()));
    }
    let mut order: Vec<usize> = (0..dataset.len()).collect();
    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        rng.shuffle(&mut order);
        let mut total = 0.0;
        let mut batches = 0usize;
        for chunk in order.chunks(config.batch_size) {
            let (steps, targets) = dataset.batch(chunk);
            total += model.train_batch(&steps, &targets, config.learning_rate);
            batches += 1;
        }
        let mean = total / batches.max(1) as f64;
        log::info!("Epoch {}/{}, Loss: {mean:.4}", epoch + 1, config.epochs);
        history.push(mean);
    }
    Ok(history)
}

/// Model output for every window of the dataset, in dataset order.
pub fn extract_features(model: &AssetRelationshipModel, dataset: &WindowDataset) -> Vec<Vec<f64>> {
    (0..dataset.len())
        .map(|i| model.predict(dataset.item(i).0))
        .collect()
}

/// Correlation between feature columns, labelled with the asset names.
pub fn feature_correlation(features: &[Vec<f64>], labels: &[String]) -> AnalysisResult<CorrelationMatrix> {
    let width = features.first().map_or(0, |r| r.len());
    if width != labels.len() {
        return Err(AnalysisError::ShapeMismatch { expected: labels.len(), actual: width });
    }
    let columns: Vec<Vec<f64>> = (0..width).map(|c| features.iter().map(|r| r[c]).collect()).collect();
    Ok(corrcoef(labels.to_vec(), &columns))
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
