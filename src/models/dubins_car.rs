//! Dubins car with speed and heading damping
//!
//! State `[x, y, v, φ]`, input `[a, θ]`:
//!
//!   ẋ = v cos φ,  ẏ = v sin φ,  v̇ = −f_v v + s a,  φ̇ = −f_φ φ + s θ

use crate::common::{
    constant, CarAction, CarState, Dynamics, NominalDynamics, Position2, Scalar, StepInfo,
    StepOutcome, TrackingResult,
};
use crate::models::{DynamicsCoefficients, EpisodeClock, StartPose};

/// Dubins car environment
#[derive(Debug, Clone)]
pub struct DubinsCar<T> {
    coefficients: DynamicsCoefficients,
    start: StartPose,
    clock: EpisodeClock,
    state: CarState<T>,
}

impl<T: Scalar> DubinsCar<T> {
    pub fn new(coefficients: DynamicsCoefficients, horizon: f64, dt: f64) -> TrackingResult<Self> {
        let start = StartPose::from(&coefficients);
        let mut car = DubinsCar {
            coefficients,
            start,
            clock: EpisodeClock::new(horizon, dt)?,
            state: CarState::new(T::zero(), T::zero(), T::zero(), T::zero()),
        };
        car.reset();
        Ok(car)
    }

    /// Start somewhere other than the origin
    pub fn with_start(mut self, position: Position2<f64>) -> Self {
        self.start.position = position;
        self.reset();
        self
    }

    pub fn state(&self) -> &CarState<T> {
        &self.state
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }
}

impl<T: Scalar> Dynamics<T> for DubinsCar<T> {
    type State = CarState<T>;
    type Action = CarAction<T>;

    fn reset(&mut self) -> CarState<T> {
        self.clock.reset();
        self.state = CarState::new(
            constant(self.start.position.x),
            constant(self.start.position.y),
            constant(self.start.speed),
            constant(self.start.heading),
        );
        self.state
    }

    fn step(&mut self, action: &CarAction<T>) -> TrackingResult<StepOutcome<T, CarState<T>>> {
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

impl<T: Scalar> NominalDynamics<T> for DubinsCar<T> {
    /// Euler step of the car kinematics
    fn propagate(&self, state: &CarState<T>, action: &CarAction<T>) -> CarState<T> {
        let c = &self.coefficients;
        let dt = self.clock.dt;
        CarState {
            x: state.x + state.v * state.phi.cos() * dt,
            y: state.y + state.v * state.phi.sin() * dt,
            v: state.v + (action.acceleration * c.input_scale - state.v * c.friction_v) * dt,
            phi: state.phi + (action.turn_rate * c.input_scale - state.phi * c.friction_turn) * dt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frictionless() -> DynamicsCoefficients {
        DynamicsCoefficients {
            friction_v: 0.0,
            friction_turn: 0.0,
            input_scale: 1.0,
            initial_speed: 1.0,
            initial_heading: 0.0,
        }
    }

    #[test]
    fn test_car_moves_forward_without_input() {
        let mut car: DubinsCar<f64> = DubinsCar::new(frictionless(), 1.0, 0.1).unwrap();
        let mut outcome = car.step(&CarAction::new(0.0, 0.0)).unwrap();
        for _ in 0..9 {
            outcome = car.step(&CarAction::new(0.0, 0.0)).unwrap();
        }
        assert!(outcome.done);
        assert!((outcome.state.x - 1.0).abs() < 1e-9);
        assert!(outcome.state.y.abs() < 1e-12);
        assert!((outcome.info.elapsed - 1.0).abs() < 1e-12);
        assert_eq!(outcome.reward, 0.0);
    }

    #[test]
    fn test_car_damping_and_input_scale() {
        let mut car: DubinsCar<f64> = DubinsCar::new(DynamicsCoefficients::default(), 1.0, 0.5).unwrap();
        let outcome = car.step(&CarAction::new(2.0, 1.0)).unwrap();
        // v = 0 + (0.95 * 2) * 0.5, phi = 0 + (0.95 * 1) * 0.5
        assert!((outcome.state.v - 0.95).abs() < 1e-12);
        assert!((outcome.state.phi - 0.475).abs() < 1e-12);
        assert!(!outcome.done);
    }

    #[test]
    fn test_car_reset_restores_start() {
        let mut car: DubinsCar<f64> = DubinsCar::new(frictionless(), 0.2, 0.1)
            .unwrap()
            .with_start(Position2::new(2.0, -1.0));
        car.step(&CarAction::new(1.0, 1.0)).unwrap();
        car.step(&CarAction::new(1.0, 1.0)).unwrap();
        assert!(car.step(&CarAction::new(1.0, 1.0)).is_err());

        let state = car.reset();
        assert_eq!(state, CarState::new(2.0, -1.0, 1.0, 0.0));
        assert_eq!(car.time(), 0.0);
    }
}
