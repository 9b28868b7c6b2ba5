//! Waypoint correction network
//!
//! A small fully connected network maps a task description to per-waypoint
//! offsets. The offsets, scaled by `model_scale`, are added to the task
//! waypoints and the result is what the controller actually tracks.

use burn::backend::{Autodiff, NdArray};
use burn::module::Param;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::tanh;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::common::{constant, Position2, Scalar, TrackingError, TrackingResult};
use crate::path_planning::WaypointSequence;

/// Backend the trainer differentiates on
pub type TrainingBackend = Autodiff<NdArray<f64>>;

/// Multilayer perceptron with tanh hidden layers and a linear output
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Linear<B>>,
}

/// Weights of one dense layer, `weight` row-major with shape `[d_input, d_output]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerWeights {
    pub d_input: usize,
    pub d_output: usize,
    pub weight: Vec<f64>,
    pub bias: Vec<f64>,
}

/// Number of parameters of a fully connected network
pub fn parameter_count(topology: &[usize]) -> usize {
    topology.windows(2).map(|w| w[0] * w[1] + w[1]).sum()
}

fn check_topology(topology: &[usize]) -> TrackingResult<()> {
    if topology.len() < 2 || topology.iter().any(|&w| w == 0) {
        return Err(TrackingError::InvalidInput(format!(
            "network topology needs at least two non-empty layers, got {:?}",
            topology
        )));
    }
    Ok(())
}

pub(crate) fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> TrackingResult<Vec<f64>> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| TrackingError::NumericalFailure(format!("cannot read tensor: {:?}", e)))
}

impl<B: Backend> Mlp<B> {
    /// Xavier-uniform layers on `device`. Seed the backend first for a
    /// reproducible draw.
    pub fn new(device: &B::Device, topology: &[usize]) -> TrackingResult<Self> {
        check_topology(topology)?;
        let layers = topology
            .iter()
            .tuple_windows()
            .map(|(&d_input, &d_output)| {
                LinearConfig::new(d_input, d_output)
                    .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                    .init(device)
            })
            .collect();
        Ok(Mlp { layers })
    }

    /// Restore a network from saved layer weights
    pub fn from_layers(device: &B::Device, layers: &[LayerWeights]) -> TrackingResult<Self> {
        if layers.is_empty() {
            return Err(TrackingError::InvalidInput("network has no layers".to_string()));
        }
        for (prev, next) in layers.iter().tuple_windows() {
            if prev.d_output != next.d_input {
                return Err(TrackingError::InvalidInput(format!(
                    "layer maps to {} but the next one expects {}",
                    prev.d_output, next.d_input
                )));
            }
        }

        let mut linears = Vec::with_capacity(layers.len());
        for layer in layers {
            if layer.weight.len() != layer.d_input * layer.d_output || layer.bias.len() != layer.d_output {
                return Err(TrackingError::InvalidInput(format!(
                    "{} x {} layer needs {} weights and {} biases, got {} and {}",
                    layer.d_input,
                    layer.d_output,
                    layer.d_input * layer.d_output,
                    layer.d_output,
                    layer.weight.len(),
                    layer.bias.len()
                )));
            }
            let weight = Tensor::<B, 2>::from_data(
                TensorData::new(layer.weight.clone(), [layer.d_input, layer.d_output]),
                device,
            );
            let bias = Tensor::<B, 1>::from_data(TensorData::new(layer.bias.clone(), [layer.d_output]), device);
            linears.push(Linear { weight: Param::from_tensor(weight), bias: Some(Param::from_tensor(bias)) });
        }

        let model = Mlp { layers: linears };
        check_topology(&model.topology())?;
        Ok(model)
    }

    /// Snapshot of every layer, for checkpoints
    pub fn to_layers(&self) -> TrackingResult<Vec<LayerWeights>> {
        self.layers
            .iter()
            .map(|linear| -> TrackingResult<LayerWeights> {
                let [d_input, d_output] = linear.weight.val().dims();
                let bias = match &linear.bias {
                    Some(bias) => tensor_values(bias.val())?,
                    None => vec![0.0; d_output],
                };
                Ok(LayerWeights { d_input, d_output, weight: tensor_values(linear.weight.val())?, bias })
            })
            .collect()
    }

    pub fn layers(&self) -> &[Linear<B>] {
        &self.layers
    }

    /// Layer widths, input first
    pub fn topology(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.layers.len() + 1);
        for (i, linear) in self.layers.iter().enumerate() {
            let [d_input, d_output] = linear.weight.val().dims();
            if i == 0 {
                widths.push(d_input);
            }
            widths.push(d_output);
        }
        widths
    }

    pub fn input_len(&self) -> usize {
        self.topology().first().copied().unwrap_or(0)
    }

    pub fn output_len(&self) -> usize {
        self.topology().last().copied().unwrap_or(0)
    }

    /// Batched forward pass, `[batch, input_len]` to `[batch, output_len]`
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len().saturating_sub(1);
        self.layers.iter().enumerate().fold(input, |x, (i, linear)| {
            let z = linear.forward(x);
            if i == last {
                z
            } else {
                tanh(z)
            }
        })
    }

    /// Forward pass on one task description, as a `[1, input_len]` batch
    pub fn forward_one(&self, input: &[f64]) -> TrackingResult<Tensor<B, 2>> {
        if input.len() != self.input_len() {
            return Err(TrackingError::InvalidInput(format!(
                "expected input of length {}, got {}",
                self.input_len(),
                input.len()
            )));
        }
        let device = self.layers[0].weight.device();
        let batch = Tensor::<B, 2>::from_data(TensorData::new(input.to_vec(), [1, input.len()]), &device);
        Ok(self.forward(batch))
    }

    /// Offsets for one task description
    pub fn predict(&self, input: &[f64]) -> TrackingResult<Vec<f64>> {
        tensor_values(self.forward_one(input)?)
    }
}

/// Shift the task waypoints by `model_scale · deltas`.
///
/// `deltas` holds the x offsets of waypoints `1..` followed by their y
/// offsets. Waypoint 0 is replaced by `initial_position`.
pub fn apply_correction<T: Scalar>(
    task: &WaypointSequence<f64>,
    deltas: &[T],
    model_scale: f64,
    initial_position: Position2<f64>,
) -> TrackingResult<WaypointSequence<T>> {
    let n = task.len() - 1;
    if deltas.len() != 2 * n {
        return Err(TrackingError::InvalidInput(format!(
            "{} waypoints need {} offsets, got {}",
            n,
            2 * n,
            deltas.len()
        )));
    }

    let shifted = |base: &[f64], first: f64, offsets: &[T]| -> Vec<T> {
        std::iter::once(constant(first))
            .chain(base[1..].iter().zip(offsets).map(|(&b, &d)| d * model_scale + b))
            .collect()
    };

    let x = shifted(task.x(), initial_position.x, &deltas[..n]);
    let y = shifted(task.y(), initial_position.y, &deltas[n..]);
    WaypointSequence::new(task.times().to_vec(), x, y)
}
