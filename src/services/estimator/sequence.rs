use std::sync::Mutex;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::module::{AutodiffModule, Module};
use burn::nn::gru::{Gru, GruConfig};
use burn::nn::loss::{MseLoss, Reduction};
use burn::nn::{Linear, LinearConfig};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use ndarray::{arr2, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::features::TrainingRow;
use super::scaler::MinMaxScaler;
use super::{Reading, Regressor};
use crate::error::{EstimatorError, Result};

type InferBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferBackend>;

const INPUTS: usize = 3;

/// Backend seeding and weight init share one global RNG.
static INIT_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceParams {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_hidden")]
    pub hidden_units: usize,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_window() -> usize {
    10
}

fn default_hidden() -> usize {
    50
}

fn default_epochs() -> usize {
    10
}

fn default_batch_size() -> usize {
    32
}

fn default_learning_rate() -> f64 {
    0.001
}

fn default_seed() -> u64 {
    42
}

impl Default for SequenceParams {
    fn default() -> Self {
        Self {
            window: default_window(),
            hidden_units: default_hidden(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            seed: default_seed(),
        }
    }
}

/// One GRU layer read out through a linear head on the last hidden state.
#[derive(Module, Debug)]
pub struct SequenceNetwork<B: Backend> {
    gru: Gru<B>,
    head: Linear<B>,
}

impl<B: Backend> SequenceNetwork<B> {
    pub fn new(hidden: usize, device: &B::Device) -> Self {
        Self {
            gru: GruConfig::new(INPUTS, hidden, true).init(device),
            head: LinearConfig::new(hidden, 1).init(device),
        }
    }

    /// `input` is (batch, steps, inputs); returns (batch, 1).
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, steps, _] = input.dims();
        let states = self.gru.forward(input, None);
        let [_, _, hidden] = states.dims();
        let last = states
            .slice([0..batch, steps - 1..steps, 0..hidden])
            .squeeze::<2>(1);
        self.head.forward(last)
    }
}

/// GRU engine plus the normalizers and window length it was trained with.
/// Stored as JSON with the network weights encoded by burn's binary recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredSequenceModel", into = "StoredSequenceModel")]
pub struct SequenceModel {
    window: usize,
    hidden_units: usize,
    input_scaler: MinMaxScaler,
    output_scaler: MinMaxScaler,
    weights: Vec<u8>,
    epoch_losses: Vec<f64>,
    network: SequenceNetwork<InferBackend>,
}

#[derive(Serialize, Deserialize)]
struct StoredSequenceModel {
    window: usize,
    hidden_units: usize,
    input_scaler: MinMaxScaler,
    output_scaler: MinMaxScaler,
    weights: Vec<u8>,
    #[serde(default)]
    epoch_losses: Vec<f64>,
}

impl From<SequenceModel> for StoredSequenceModel {
    fn from(model: SequenceModel) -> Self {
        Self {
            window: model.window,
            hidden_units: model.hidden_units,
            input_scaler: model.input_scaler,
            output_scaler: model.output_scaler,
            weights: model.weights,
            epoch_losses: model.epoch_losses,
        }
    }
}

impl TryFrom<StoredSequenceModel> for SequenceModel {
    type Error = EstimatorError;

    fn try_from(stored: StoredSequenceModel) -> Result<Self> {
        let network = decode_network(stored.hidden_units, &stored.weights)?;
        Ok(Self {
            window: stored.window,
            hidden_units: stored.hidden_units,
            input_scaler: stored.input_scaler,
            output_scaler: stored.output_scaler,
            weights: stored.weights,
            epoch_losses: stored.epoch_losses,
            network,
        })
    }
}

fn recorder() -> BinBytesRecorder<FullPrecisionSettings> {
    BinBytesRecorder::default()
}

fn encode_network(network: &SequenceNetwork<InferBackend>) -> Result<Vec<u8>> {
    Recorder::<InferBackend>::record(&recorder(), network.clone().into_record(), ())
        .map_err(|err| EstimatorError::Model(format!("encoding sequence weights: {err}")))
}

fn decode_network(hidden: usize, weights: &[u8]) -> Result<SequenceNetwork<InferBackend>> {
    let device = NdArrayDevice::default();
    let record = Recorder::<InferBackend>::load(&recorder(), weights.to_vec(), &device)
        .map_err(|err| EstimatorError::Model(format!("decoding sequence weights: {err}")))?;
    let network = {
        let _guard = INIT_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        SequenceNetwork::new(hidden, &device)
    };
    Ok(network.load_record(record))
}

fn window_tensor<B: Backend>(
    x: &Array2<f64>,
    starts: &[usize],
    window: usize,
    device: &B::Device,
) -> Tensor<B, 3> {
    let mut values = Vec::with_capacity(starts.len() * window * INPUTS);
    for &start in starts {
        for row in x.rows().into_iter().skip(start).take(window) {
            values.extend(row.iter().map(|v| *v as f32));
        }
    }
    Tensor::from_data(TensorData::new(values, [starts.len(), window, INPUTS]), device)
}

impl SequenceModel {
    /// Returns `Ok(None)` when there are not more rows than the window length,
    /// since no (window, next-SoC) pair can be formed.
    pub fn fit(rows: &[TrainingRow], params: &SequenceParams) -> Result<Option<Self>> {
        let window = params.window.max(1);
        if rows.len() <= window {
            tracing::info!(
                rows = rows.len(),
                window,
                "not enough rows to form a training window; skipping sequence model"
            );
            return Ok(None);
        }

        let features = Array2::from_shape_fn((rows.len(), INPUTS), |(i, j)| rows[i].features()[j]);
        let target = Array2::from_shape_fn((rows.len(), 1), |(i, _)| rows[i].soc);
        let input_scaler = MinMaxScaler::fit(features.view());
        let output_scaler = MinMaxScaler::fit(target.view());
        let x = input_scaler.transform(features.view());
        let y = output_scaler.transform(target.view());

        let hidden_units = params.hidden_units.max(1);
        let device = NdArrayDevice::default();
        let mut network = {
            let _guard = INIT_LOCK
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            TrainBackend::seed(params.seed);
            SequenceNetwork::<TrainBackend>::new(hidden_units, &device)
        };
        let mut optimizer = AdamConfig::new().with_epsilon(1e-7).init();
        let loss_fn = MseLoss::new();

        let sample_count = rows.len() - window;
        let mut order: Vec<usize> = (0..sample_count).collect();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let batch_size = params.batch_size.max(1);
        let mut epoch_losses = Vec::with_capacity(params.epochs);
        for epoch in 0..params.epochs {
            order.shuffle(&mut rng);
            let mut weighted = 0.0;
            for chunk in order.chunks(batch_size) {
                let inputs = window_tensor::<TrainBackend>(&x, chunk, window, &device);
                let targets: Vec<f32> = chunk.iter().map(|&s| y[[s + window, 0]] as f32).collect();
                let targets = Tensor::<TrainBackend, 2>::from_data(
                    TensorData::new(targets, [chunk.len(), 1]),
                    &device,
                );

                let loss = loss_fn.forward(network.forward(inputs), targets, Reduction::Mean);
                weighted += loss.clone().into_scalar().elem::<f64>() * chunk.len() as f64;
                let grads = GradientsParams::from_grads(loss.backward(), &network);
                network = optimizer.step(params.learning_rate, network, grads);
            }
            let loss = weighted / sample_count as f64;
            tracing::debug!(epoch, loss, "sequence model epoch");
            epoch_losses.push(loss);
        }

        tracing::debug!(
            windows = sample_count,
            window,
            final_loss = epoch_losses.last().copied().unwrap_or_default(),
            "fitted sequence model"
        );

        let network = network.valid();
        let weights = encode_network(&network)?;
        Ok(Some(Self {
            window,
            hidden_units,
            input_scaler,
            output_scaler,
            weights,
            epoch_losses,
            network,
        }))
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Mean training loss per epoch, in scaled units.
    pub fn epoch_losses(&self) -> &[f64] {
        &self.epoch_losses
    }
}

impl Regressor for SequenceModel {
    /// Repeats the single reading across the whole window: callers only ever
    /// hold an instantaneous sample, so the input is a synthetic steady state.
    fn predict(&self, reading: &Reading) -> f64 {
        let single = arr2(&[reading.as_array()]);
        let scaled = self.input_scaler.transform(single.view());
        let row = scaled.row(0);
        let steady = Array2::from_shape_fn((self.window, INPUTS), |(_, j)| row[j]);

        let device = NdArrayDevice::default();
        let input = window_tensor::<InferBackend>(&steady, &[0], self.window, &device);
        let raw = self.network.forward(input).into_scalar().elem::<f64>();
        let out = arr2(&[[raw]]);
        self.output_scaler.inverse_transform(out.view())[[0, 0]]
    }
}
