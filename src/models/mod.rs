//! Kinematic vehicle models
//!
//! Reference implementations of the dynamics collaborator: explicit Euler
//! integration of a Dubins car and of a legged-robot abstraction with an
//! internally stabilised heading rate.

use serde::{Deserialize, Serialize};

use crate::common::{Position2, TrackingError, TrackingResult};

pub mod dubins_car;
pub mod legged_robot;

pub use dubins_car::*;
pub use legged_robot::*;

/// Model coefficients shared by both vehicles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicsCoefficients {
    /// Linear speed damping [1/s]
    pub friction_v: f64,
    /// Heading (car) or heading-rate (robot) damping [1/s]
    pub friction_turn: f64,
    /// Gain from commanded to applied input
    pub input_scale: f64,
    /// Speed after reset [m/s]
    #[serde(default)]
    pub initial_speed: f64,
    /// Heading after reset [rad]
    #[serde(default)]
    pub initial_heading: f64,
}

impl Default for DynamicsCoefficients {
    fn default() -> Self {
        Self {
            friction_v: 0.1,
            friction_turn: 0.05,
            input_scale: 0.95,
            initial_speed: 0.0,
            initial_heading: 0.0,
        }
    }
}

/// Fixed-step episode clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeClock {
    pub dt: f64,
    pub num_steps: usize,
    pub curr_step: usize,
}

impl EpisodeClock {
    pub fn new(horizon: f64, dt: f64) -> TrackingResult<Self> {
        if !(dt > 0.0 && dt.is_finite()) || !(horizon > 0.0 && horizon.is_finite()) {
            return Err(TrackingError::InvalidInput(format!(
                "horizon and dt must be positive, got {} and {}",
                horizon, dt
            )));
        }
        let num_steps = (horizon / dt).round() as usize;
        if num_steps == 0 {
            return Err(TrackingError::InvalidInput(format!(
                "horizon {} is shorter than one step of {}",
                horizon, dt
            )));
        }
        Ok(Self { dt, num_steps, curr_step: 0 })
    }

    pub fn time(&self) -> f64 {
        self.curr_step as f64 * self.dt
    }

    pub fn done(&self) -> bool {
        self.curr_step >= self.num_steps
    }

    pub fn reset(&mut self) {
        self.curr_step = 0;
    }

    /// Advance one step; stepping a finished episode is an error.
    pub fn tick(&mut self) -> TrackingResult<()> {
        if self.done() {
            return Err(TrackingError::InvalidInput(
                "episode finished, reset before stepping".to_string(),
            ));
        }
        self.curr_step += 1;
        Ok(())
    }
}

/// Where a model starts after reset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartPose {
    pub position: Position2<f64>,
    pub speed: f64,
    pub heading: f64,
}

impl From<&DynamicsCoefficients> for StartPose {
    fn from(c: &DynamicsCoefficients) -> Self {
        Self {
            position: Position2::new(0.0, 0.0),
            speed: c.initial_speed,
            heading: c.initial_heading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_step_count() {
        // step count is rounded, not floored
        let clock = EpisodeClock::new(5.0, 0.01).unwrap();
        assert_eq!(clock.num_steps, 500);
    }

    #[test]
    fn test_clock_rejects_bad_step() {
        assert!(EpisodeClock::new(1.0, 0.0).is_err());
        assert!(EpisodeClock::new(0.001, 1.0).is_err());
    }

    #[test]
    fn test_clock_finishes() {
        let mut clock = EpisodeClock::new(0.3, 0.1).unwrap();
        for _ in 0..3 {
            clock.tick().unwrap();
        }
        assert!(clock.done());
        assert!(clock.tick().is_err());
        clock.reset();
        assert_eq!(clock.time(), 0.0);
    }
}
