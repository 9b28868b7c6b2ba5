//! Common traits defining the seams between the controller, the vehicle
//! models and the rollout driver

use crate::common::error::{TrackingError, TrackingResult};
use crate::common::types::*;
use crate::path_planning::CubicSpline;

/// Kinematic state exposed by a vehicle model. The controller and the
/// spline solver only ever read it.
pub trait VehicleState<T: Scalar>: Copy + std::fmt::Debug {
    /// World-frame position
    fn position(&self) -> Position2<T>;

    /// True if every component has a finite real part
    fn is_finite(&self) -> bool;

    /// Flat component vector, in field order
    fn components(&self) -> Vec<T>;

    /// Inverse of [`VehicleState::components`]
    fn from_components(values: &[T]) -> TrackingResult<Self>;
}

fn expect_len<T>(values: &[T], len: usize, what: &str) -> TrackingResult<()> {
    if values.len() != len {
        return Err(TrackingError::InvalidInput(format!(
            "{} has {} components, got {}",
            what,
            len,
            values.len()
        )));
    }
    Ok(())
}

impl<T: Scalar> VehicleState<T> for CarState<T> {
    fn position(&self) -> Position2<T> {
        Position2::new(self.x, self.y)
    }

    fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| is_finite(*v))
    }

    fn components(&self) -> Vec<T> {
        self.to_array().to_vec()
    }

    fn from_components(values: &[T]) -> TrackingResult<Self> {
        expect_len(values, 4, "car state")?;
        Ok(CarState::new(values[0], values[1], values[2], values[3]))
    }
}

impl<T: Scalar> VehicleState<T> for RobotState<T> {
    fn position(&self) -> Position2<T> {
        Position2::new(self.x, self.y)
    }

    fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| is_finite(*v))
    }

    fn components(&self) -> Vec<T> {
        self.to_array().to_vec()
    }

    fn from_components(values: &[T]) -> TrackingResult<Self> {
        expect_len(values, 5, "robot state")?;
        Ok(RobotState::new(values[0], values[1], values[2], values[3], values[4]))
    }
}

/// Control command produced by a tracking controller
pub trait ControlAction<T: Scalar>: Copy + std::fmt::Debug {
    /// Sum of squares of the correction terms, used as the control-effort
    /// part of the tracking cost
    fn effort(&self) -> T;

    fn is_finite(&self) -> bool;

    fn components(&self) -> Vec<T>;

    fn from_components(values: &[T]) -> TrackingResult<Self>;
}

impl<T: Scalar> ControlAction<T> for CarAction<T> {
    fn effort(&self) -> T {
        self.acceleration * self.acceleration + self.turn_rate * self.turn_rate
    }

    fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| is_finite(*v))
    }

    fn components(&self) -> Vec<T> {
        self.to_array().to_vec()
    }

    fn from_components(values: &[T]) -> TrackingResult<Self> {
        expect_len(values, 2, "car action")?;
        Ok(CarAction::new(values[0], values[1]))
    }
}

impl<T: Scalar> ControlAction<T> for RobotAction<T> {
    /// Only the correction terms `[a, θ]` count. The speed and yaw-rate
    /// setpoints (`to_array()[0..2]`) are deliberately left out of the effort.
    fn effort(&self) -> T {
        self.acceleration * self.acceleration + self.yaw_acceleration * self.yaw_acceleration
    }

    fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| is_finite(*v))
    }

    fn components(&self) -> Vec<T> {
        self.to_array().to_vec()
    }

    fn from_components(values: &[T]) -> TrackingResult<Self> {
        expect_len(values, 4, "robot action")?;
        Ok(RobotAction::new(values[0], values[1], values[2], values[3]))
    }
}

/// Auxiliary information returned by a dynamics step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo {
    /// Elapsed simulation time after the step [s]
    pub elapsed: f64,
}

impl StepInfo {
    /// Key under which the elapsed time is published
    pub const ELAPSED_KEY: &'static str = "curr_time";

    /// Map-style lookup of an info entry
    pub fn get(&self, key: &str) -> Option<f64> {
        match key {
            Self::ELAPSED_KEY => Some(self.elapsed),
            _ => None,
        }
    }
}

/// Result of one dynamics step
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome<T, S> {
    pub state: S,
    pub reward: T,
    pub done: bool,
    pub info: StepInfo,
}

/// Vehicle dynamics collaborator
pub trait Dynamics<T: Scalar> {
    /// State type
    type State: VehicleState<T>;
    /// Control type
    type Action: ControlAction<T>;

    /// Restart the episode and return the initial state
    fn reset(&mut self) -> Self::State;

    /// Apply an action for one timestep
    fn step(&mut self, action: &Self::Action) -> TrackingResult<StepOutcome<T, Self::State>>;
}

/// Dynamics with a pure one-step transition, usable as the nominal part of
/// a residual model
pub trait NominalDynamics<T: Scalar>: Dynamics<T> {
    /// Next state from `state` under `action`, without touching the episode
    fn propagate(&self, state: &Self::State, action: &Self::Action) -> Self::State;
}

/// Output of a tracking controller for one query
#[derive(Debug, Clone, Copy)]
pub struct TrackingCommand<T, A> {
    pub action: A,
    /// Reference position at the query time
    pub desired: Position2<T>,
    /// Vehicle position the action was computed from
    pub actual: Position2<T>,
}

/// Trajectory tracking controller: a pure function of
/// (time, reference spline, state)
pub trait TrackingController<T: Scalar> {
    /// State type
    type State: VehicleState<T>;
    /// Output control type
    type Action: ControlAction<T>;

    /// Compute the control action for the current time and state
    fn next_action(
        &self,
        time: f64,
        spline: &CubicSpline<T>,
        state: &Self::State,
    ) -> TrackingResult<TrackingCommand<T, Self::Action>>;
}
