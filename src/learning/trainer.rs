//! Training loop for the correction network
//!
//! Each iteration samples `trajs` tasks. For every task the tracking loss
//! is differentiated with respect to the network output δ by one
//! dual-number rollout per output component. That gradient `g` enters the
//! network's autodiff graph as the surrogate `Σ δ·g`, whose backward pass
//! yields ∂L/∂θ. The surrogates of all tasks are summed and drive one Adam
//! step.

use std::fs;
use std::path::Path;

use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use log::{debug, info, warn};
use num_dual::Dual64;
use serde::{Deserialize, Serialize};

use crate::common::{Config, Position2, TrackingError, TrackingResult};
use crate::control::{ClosedLoop, LoopOutcome};
use crate::learning::{apply_correction, parameter_count, tensor_values, LayerWeights, Mlp};
use crate::path_planning::{task_description, BoundaryCondition, CubicSpline, TaskGenerator, WaypointSequence};

/// Outcome of one training iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    pub iteration: usize,
    /// Summed loss over the sampled tasks, `None` when the step was skipped
    pub loss: Option<f64>,
    pub skipped: bool,
}

/// Saved training state.
///
/// Holds the network and the iteration history. Optimiser moments are not
/// saved, so a resumed run restarts Adam from zero moments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub config: Config,
    /// Layer widths of the saved network, which may differ from `config`
    pub topology: Vec<usize>,
    pub layers: Vec<LayerWeights>,
    pub history: Vec<IterationReport>,
}

impl Checkpoint {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> TrackingResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> TrackingResult<Self> {
        let json = fs::read_to_string(path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&json)?;
        checkpoint.config.validate()?;
        Ok(checkpoint)
    }

    /// Rebuild the network stored in the checkpoint
    pub fn model<B: Backend>(&self, device: &B::Device) -> TrackingResult<Mlp<B>> {
        let model = Mlp::from_layers(device, &self.layers)?;
        if model.topology() != self.topology {
            return Err(TrackingError::InvalidInput(format!(
                "checkpoint topology {:?} does not match its layers {:?}",
                self.topology,
                model.topology()
            )));
        }
        Ok(model)
    }
}

/// Side-by-side result of the corrected and the naive follower on one task
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub task: WaypointSequence<f64>,
    /// Waypoints after correction
    pub corrected_waypoints: Vec<Position2<f64>>,
    /// Corrected reference at every controller evaluation
    pub model_reference: Vec<Position2<f64>>,
    pub corrected_path: Vec<Position2<f64>>,
    pub naive_path: Vec<Position2<f64>>,
    pub corrected_loss: f64,
    pub naive_loss: f64,
}

fn seeded(values: &[f64], index: usize) -> Vec<Dual64> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| if i == index { Dual64::new(v, 1.0) } else { Dual64::from(v) })
        .collect()
}

/// Adam with burn's defaults
pub fn adam<B: AutodiffBackend>() -> impl Optimizer<Mlp<B>, B> {
    AdamConfig::new().init()
}

pub struct Trainer<B: AutodiffBackend, L, O> {
    config: Config,
    model: Mlp<B>,
    closed_loop: L,
    optimizer: O,
    generator: TaskGenerator,
    history: Vec<IterationReport>,
}

impl<B, L, O> Trainer<B, L, O>
where
    B: AutodiffBackend,
    L: ClosedLoop,
    O: Optimizer<Mlp<B>, B>,
{
    pub fn new(config: Config, model: Mlp<B>, closed_loop: L, optimizer: O) -> TrackingResult<Self> {
        config.validate()?;
        let io = 2 * config.waypoint_count();
        if model.input_len() != io || model.output_len() != io {
            return Err(TrackingError::Config(format!(
                "model maps {} -> {}, tasks need {} -> {}",
                model.input_len(),
                model.output_len(),
                io,
                io
            )));
        }
        let generator = TaskGenerator::new(config.task_config(), config.seed)?;
        Ok(Trainer { config, model, closed_loop, optimizer, generator, history: Vec::new() })
    }

    /// Continue the iteration count of an earlier run
    pub fn with_history(mut self, history: Vec<IterationReport>) -> Self {
        self.history = history;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model(&self) -> &Mlp<B> {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Mlp<B> {
        &mut self.model
    }

    pub fn history(&self) -> &[IterationReport] {
        &self.history
    }

    /// Where the vehicle starts after a reset
    pub fn start_position(&mut self) -> Position2<f64> {
        self.closed_loop.start_position()
    }

    /// Draw a task from the generator, starting at the vehicle
    pub fn sample_task(&mut self) -> TrackingResult<WaypointSequence<f64>> {
        let start = self.start_position();
        self.generator.generate(start)
    }

    fn reference_spline(task: &WaypointSequence<f64>, start: Position2<f64>) -> TrackingResult<CubicSpline<Dual64>> {
        CubicSpline::build(&task.lift(), BoundaryCondition::default(), Some(start.lift()))
    }

    fn corrected_run(&mut self, task: &WaypointSequence<f64>, deltas: &[Dual64]) -> TrackingResult<LoopOutcome> {
        let start = self.start_position();
        let reference = Self::reference_spline(task, start)?;
        let waypoints = apply_correction(task, deltas, self.config.model_scale, start)?;
        let tracked = CubicSpline::build(&waypoints, BoundaryCondition::default(), None)?;
        self.closed_loop.run(&tracked, &reference, &self.config.rollout_config())
    }

    /// Tracking loss on `task` with the given network output
    pub fn delta_loss(&mut self, task: &WaypointSequence<f64>, deltas: &[f64]) -> TrackingResult<f64> {
        let lifted: Vec<Dual64> = deltas.iter().map(|&d| Dual64::from(d)).collect();
        self.corrected_run(task, &lifted).map(|outcome| outcome.cost.re)
    }

    /// Tracking loss of the current model on `task`
    pub fn task_loss(&mut self, task: &WaypointSequence<f64>) -> TrackingResult<f64> {
        let deltas = self.model.predict(&task_description(task))?;
        self.delta_loss(task, &deltas)
    }

    /// Loss on `task` and its gradient with respect to the network output
    pub fn output_gradient(&mut self, task: &WaypointSequence<f64>, deltas: &[f64]) -> TrackingResult<(f64, Vec<f64>)> {
        let mut loss = 0.0;
        let mut gradient = Vec::with_capacity(deltas.len());
        for k in 0..deltas.len() {
            let cost = self.corrected_run(task, &seeded(deltas, k))?.cost;
            if !cost.eps.is_finite() {
                return Err(TrackingError::NumericalFailure(format!(
                    "non-finite loss derivative for output {}",
                    k
                )));
            }
            loss = cost.re;
            gradient.push(cost.eps);
        }
        debug!("task loss {:.4}, |dL/dδ| {:.4}", loss, gradient.iter().map(|g| g * g).sum::<f64>().sqrt());
        Ok((loss, gradient))
    }

    /// Loss on `task` and the surrogate `Σ δ·g` whose parameter gradient is ∂L/∂θ
    fn task_objective(&mut self, task: &WaypointSequence<f64>) -> TrackingResult<(f64, Tensor<B, 1>)> {
        let output = self.model.forward_one(&task_description(task))?;
        let deltas = tensor_values(output.clone())?;
        let (loss, gradient) = self.output_gradient(task, &deltas)?;
        let g = Tensor::<B, 2>::from_data(TensorData::new(gradient, [1, deltas.len()]), &output.device());
        Ok((loss, (output * g).sum()))
    }

    fn skip(&mut self, iteration: usize, error: &TrackingError) -> IterationReport {
        warn!("iteration {}: skipping update, {}", iteration, error);
        let report = IterationReport { iteration, loss: None, skipped: true };
        self.history.push(report.clone());
        report
    }

    /// Sample tasks, accumulate the gradient and take one optimiser step
    pub fn step(&mut self) -> TrackingResult<IterationReport> {
        let iteration = self.history.len();
        let mut total_loss = 0.0;
        let mut surrogate: Option<Tensor<B, 1>> = None;

        for _ in 0..self.config.trajs {
            let task = self.sample_task()?;
            match self.task_objective(&task) {
                Ok((loss, objective)) => {
                    total_loss += loss;
                    surrogate = Some(match surrogate {
                        Some(acc) => acc + objective,
                        None => objective,
                    });
                }
                Err(e) if e.is_numerical() => return Ok(self.skip(iteration, &e)),
                Err(e) => return Err(e),
            }
        }

        if let Some(surrogate) = surrogate {
            let grads = GradientsParams::from_grads(surrogate.backward(), &self.model);
            self.model = self.optimizer.step(self.config.lr, self.model.clone(), grads);
        }

        info!("iteration {}: loss {:.4}", iteration, total_loss);
        let report = IterationReport { iteration, loss: Some(total_loss), skipped: false };
        self.history.push(report.clone());
        Ok(report)
    }

    /// Run all configured iterations, writing a checkpoint after each one
    pub fn train(&mut self, checkpoint: Option<&Path>) -> TrackingResult<&[IterationReport]> {
        for _ in 0..self.config.iterations {
            self.step()?;
            if let Some(path) = checkpoint {
                self.checkpoint()?.save(path)?;
            }
        }
        Ok(&self.history)
    }

    pub fn checkpoint(&self) -> TrackingResult<Checkpoint> {
        Ok(Checkpoint {
            config: self.config.clone(),
            topology: self.model.topology(),
            layers: self.model.to_layers()?,
            history: self.history.clone(),
        })
    }

    /// Follow `task` with and without the correction
    pub fn evaluate(&mut self, task: &WaypointSequence<f64>) -> TrackingResult<Evaluation> {
        let start = self.start_position();
        let deltas = self.model.predict(&task_description(task))?;
        let lifted: Vec<Dual64> = deltas.iter().map(|&d| Dual64::from(d)).collect();
        let waypoints = apply_correction(task, &lifted, self.config.model_scale, start)?;

        let reference = Self::reference_spline(task, start)?;
        let tracked = CubicSpline::build(&waypoints, BoundaryCondition::default(), None)?;
        let rollout_config = self.config.rollout_config();

        let corrected = self.closed_loop.run(&tracked, &reference, &rollout_config)?;
        let naive = self.closed_loop.run(&reference, &reference, &rollout_config)?;

        info!("evaluation: corrected loss {:.4}, naive loss {:.4}", corrected.cost.re, naive.cost.re);

        Ok(Evaluation {
            task: task.clone(),
            corrected_waypoints: (0..waypoints.len()).map(|i| waypoints.point(i).re()).collect(),
            model_reference: corrected.desired,
            corrected_path: corrected.path,
            naive_path: naive.path,
            corrected_loss: corrected.cost.re,
            naive_loss: naive.cost.re,
        })
    }
}

/// Freshly initialised network for a configuration, drawn from the
/// backend generator seeded with `config.seed`
pub fn initial_model<B: Backend>(config: &Config, device: &B::Device) -> TrackingResult<Mlp<B>> {
    let topology = config.topology();
    B::seed(config.seed);
    let model = Mlp::new(device, &topology)?;
    debug!("network {:?} with {} parameters", topology, parameter_count(&topology));
    Ok(model)
}
