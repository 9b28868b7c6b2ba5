//! Kinematic abstraction of a legged robot
//!
//! The platform stabilises its own attitude, so it is modelled as a unicycle
//! with a heading-rate state. State `[x, y, v, φ, w]`; of the cascade
//! command only the two correction terms drive the model:
//!
//!   ẋ = v cos φ,  ẏ = v sin φ,  v̇ = −f_v v + s a,  φ̇ = w,  ẇ = −f_w w + s θ

use crate::common::{
    constant, Dynamics, NominalDynamics, Position2, RobotAction, RobotState, Scalar, StepInfo,
    StepOutcome, TrackingResult,
};
use crate::models::{DynamicsCoefficients, EpisodeClock, StartPose};

/// Legged-robot environment
#[derive(Debug, Clone)]
pub struct LeggedRobot<T> {
    coefficients: DynamicsCoefficients,
    start: StartPose,
    clock: EpisodeClock,
    state: RobotState<T>,
}

impl<T: Scalar> LeggedRobot<T> {
    pub fn new(coefficients: DynamicsCoefficients, horizon: f64, dt: f64) -> TrackingResult<Self> {
        let start = StartPose::from(&coefficients);
        let mut robot = LeggedRobot {
            coefficients,
            start,
            clock: EpisodeClock::new(horizon, dt)?,
            state: RobotState::new(T::zero(), T::zero(), T::zero(), T::zero(), T::zero()),
        };
        robot.reset();
        Ok(robot)
    }

    pub fn with_start(mut self, position: Position2<f64>) -> Self {
        self.start.position = position;
        self.reset();
        self
    }

    pub fn state(&self) -> &RobotState<T> {
        &self.state
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }
}

impl<T: Scalar> Dynamics<T> for LeggedRobot<T> {
    type State = RobotState<T>;
    type Action = RobotAction<T>;

    fn reset(&mut self) -> RobotState<T> {
        self.clock.reset();
        self.state = RobotState::new(
            constant(self.start.position.x),
            constant(self.start.position.y),
            constant(self.start.speed),
            constant(self.start.heading),
            T::zero(),
        );
        self.state
    }

    fn step(&mut self, action: &RobotAction<T>) -> TrackingResult<StepOutcome<T, RobotState<T>>> {
        self.clock.tick()?;
        self.state = self.propagate(&self.state, action);
        Ok(StepOutcome {
            state: self.state,
            reward: T::zero(),
            done: self.clock.done(),
            info: StepInfo { elapsed: self.clock.time() },
        })
    }
}

impl<T: Scalar> NominalDynamics<T> for LeggedRobot<T> {
    fn propagate(&self, state: &RobotState<T>, action: &RobotAction<T>) -> RobotState<T> {
        let c = &self.coefficients;
        let dt = self.clock.dt;
        RobotState {
            x: state.x + state.v * state.phi.cos() * dt,
            y: state.y + state.v * state.phi.sin() * dt,
            v: state.v + (action.acceleration * c.input_scale - state.v * c.friction_v) * dt,
            phi: state.phi + state.w * dt,
            w: state.w + (action.yaw_acceleration * c.input_scale - state.w * c.friction_turn) * dt,
        }
    }
}
