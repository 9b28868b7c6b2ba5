//! Persisted run configuration
//!
//! Loaded once from a TOML file at the start of a run and used read-only
//! afterwards. Every tunable of the pipeline lives here instead of in
//! captured globals.

use std::fs::read_to_string;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::error::{TrackingError, TrackingResult};
use crate::control::RolloutConfig;
use crate::models::DynamicsCoefficients;
use crate::path_planning::{TaskConfig, TaskRanges};
use crate::path_tracking::TrackingGains;

/// Vehicle variant selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// 4-state Dubins car
    Car,
    /// 5-state legged-robot abstraction
    Robot,
}

fn default_stride() -> usize {
    1
}

fn default_model_scale() -> f64 {
    20.0
}

fn default_hidden_layers() -> Vec<usize> {
    vec![20, 20]
}

/// Run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Vehicle variant
    pub environment: Environment,

    /// Trajectory horizon [s]
    pub horizon: usize,

    /// Simulation timestep [s]
    pub dt: f64,

    /// Waypoints per second of horizon
    pub points_per_sec: usize,

    /// Simulation ticks between controller recomputations
    #[serde(default = "default_stride")]
    pub controller_stride: usize,

    /// Weight of the control effort in the tracking cost
    #[serde(default)]
    pub input_weight: f64,

    /// Multiplier applied to the correction network output
    #[serde(default = "default_model_scale")]
    pub model_scale: f64,

    /// Trajectories sampled per training iteration
    pub trajs: usize,

    /// Training iterations
    pub iterations: usize,

    /// Optimiser learning rate
    pub lr: f64,

    /// Seed for task sampling and weight initialisation
    #[serde(default)]
    pub seed: u64,

    /// Hidden layer widths of the correction network
    #[serde(default = "default_hidden_layers")]
    pub hidden_layers: Vec<usize>,

    pub car_gains: TrackingGains,
    pub robot_gains: TrackingGains,
    pub car_dynamics: DynamicsCoefficients,
    pub robot_dynamics: DynamicsCoefficients,

    /// Nominal car model for residual training. When set, the car runs on
    /// `car_dynamics` and gradients flow through this model instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_nominal: Option<DynamicsCoefficients>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_nominal: Option<DynamicsCoefficients>,

    /// Speed, heading and noise ranges of the task generator
    pub task: TaskRanges,
}

fn gains_are_finite(gains: &TrackingGains) -> bool {
    [gains.k_x, gains.k_y, gains.k_v, gains.k_phi, gains.k_w].iter().all(|v| v.is_finite())
}

fn coefficients_are_finite(c: &DynamicsCoefficients) -> bool {
    [c.friction_v, c.friction_turn, c.input_scale, c.initial_speed, c.initial_heading]
        .iter()
        .all(|v| v.is_finite())
}

impl Config {
    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> TrackingResult<Self> {
        let config_str = read_to_string(path)?;
        Self::from_toml_str(&config_str)
    }

    /// Parse and validate a configuration from a TOML string
    pub fn from_toml_str(config_str: &str) -> TrackingResult<Self> {
        let config: Config = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> TrackingResult<()> {
        if self.horizon == 0 {
            return Err(TrackingError::Config("horizon must be at least 1 s".to_string()));
        }
        if !(self.dt > 0.0 && self.dt.is_finite()) || self.dt > self.horizon as f64 {
            return Err(TrackingError::Config(format!(
                "dt must be in (0, horizon], got {}",
                self.dt
            )));
        }
        if self.points_per_sec == 0 {
            return Err(TrackingError::Config("points_per_sec must be at least 1".to_string()));
        }
        if self.controller_stride == 0 {
            return Err(TrackingError::Config("controller_stride must be at least 1".to_string()));
        }
        if !(self.input_weight >= 0.0) || !self.input_weight.is_finite() {
            return Err(TrackingError::Config(format!(
                "input_weight must be finite and non-negative, got {}",
                self.input_weight
            )));
        }
        if !self.model_scale.is_finite() {
            return Err(TrackingError::Config(format!("model_scale must be finite, got {}", self.model_scale)));
        }
        if !gains_are_finite(&self.car_gains) || !gains_are_finite(&self.robot_gains) {
            return Err(TrackingError::Config("controller gains must be finite".to_string()));
        }
        let coefficients = [
            Some(&self.car_dynamics),
            Some(&self.robot_dynamics),
            self.car_nominal.as_ref(),
            self.robot_nominal.as_ref(),
        ];
        if !coefficients.iter().flatten().all(|c| coefficients_are_finite(c)) {
            return Err(TrackingError::Config("dynamics coefficients must be finite".to_string()));
        }
        if !(self.lr > 0.0 && self.lr.is_finite()) {
            return Err(TrackingError::Config("lr must be positive".to_string()));
        }
        if self.hidden_layers.iter().any(|&w| w == 0) {
            return Err(TrackingError::Config("hidden layer widths must be non-zero".to_string()));
        }
        self.task.validate()?;
        Ok(())
    }

    /// Number of waypoints after the start point
    pub fn waypoint_count(&self) -> usize {
        self.horizon * self.points_per_sec
    }

    pub fn rollout_config(&self) -> RolloutConfig {
        RolloutConfig {
            horizon: self.horizon as f64,
            dt: self.dt,
            controller_stride: self.controller_stride,
            input_weight: self.input_weight,
        }
    }

    pub fn task_config(&self) -> TaskConfig {
        TaskConfig {
            horizon: self.horizon,
            points_per_sec: self.points_per_sec,
            ranges: self.task.clone(),
        }
    }

    /// Controller gains for the selected environment
    pub fn gains(&self) -> TrackingGains {
        match self.environment {
            Environment::Car => self.car_gains,
            Environment::Robot => self.robot_gains,
        }
    }

    /// Dynamics coefficients for the selected environment
    pub fn dynamics(&self) -> DynamicsCoefficients {
        match self.environment {
            Environment::Car => self.car_dynamics,
            Environment::Robot => self.robot_dynamics,
        }
    }

    /// Nominal model for the selected environment, `Some` in residual mode
    pub fn nominal_dynamics(&self) -> Option<DynamicsCoefficients> {
        match self.environment {
            Environment::Car => self.car_nominal,
            Environment::Robot => self.robot_nominal,
        }
    }

    /// Correction network topology `[2N, hidden.., 2N]`
    pub fn topology(&self) -> Vec<usize> {
        let io = 2 * self.waypoint_count();
        let mut layers = vec![io];
        layers.extend(self.hidden_layers.iter().copied());
        layers.push(io);
        layers
    }
}
