//! Closed-loop rollout driver
//!
//! Runs controller → dynamics cycles over a fixed horizon. The controller
//! is re-evaluated every `controller_stride` ticks and its action held in
//! between (zero-order hold). After every step the tracking cost
//! `‖p − p_ref(t)‖² + w · effort(u)` is accumulated against the reference
//! spline, which may differ from the spline the controller tracks.
//!
//! Everything is generic over [`Scalar`], so one rollout on dual numbers
//! yields the cost together with its derivative. Any non-finite value
//! aborts the rollout.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::common::{
    ControlAction, Dynamics, Position2, Scalar, TrackingController, TrackingError,
    TrackingResult, VehicleState,
};
use crate::path_planning::{CubicSpline, Derivative};

/// Rollout timing and cost settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Horizon [s]
    pub horizon: f64,
    /// Simulation timestep [s]
    pub dt: f64,
    /// Ticks between controller evaluations
    pub controller_stride: usize,
    /// Weight of the control effort in the cost
    pub input_weight: f64,
}

impl RolloutConfig {
    /// Number of simulation ticks in the horizon
    pub fn tick_count(&self) -> TrackingResult<usize> {
        if !(self.dt > 0.0) || !(self.horizon > 0.0) || self.controller_stride == 0 {
            return Err(TrackingError::InvalidInput(format!(
                "invalid rollout config: horizon {}, dt {}, stride {}",
                self.horizon, self.dt, self.controller_stride
            )));
        }
        Ok((self.horizon / self.dt).round() as usize)
    }
}

/// One simulation tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition<T, S, A> {
    pub state: S,
    pub action: A,
    pub reward: T,
    pub next_state: S,
    pub done: bool,
    /// Episode time after the step [s]
    pub elapsed: f64,
}

/// Result of a complete rollout
#[derive(Debug, Clone)]
pub struct Rollout<T, S, A> {
    /// Accumulated tracking cost
    pub cost: T,
    pub trace: Vec<Transition<T, S, A>>,
    pub initial_state: S,
    pub final_state: S,
    /// Reference position at every controller evaluation
    pub desired: Vec<Position2<T>>,
}

impl<T: Scalar, S: VehicleState<T>, A> Rollout<T, S, A> {
    /// Vehicle path including the initial state, real parts only
    pub fn positions(&self) -> Vec<Position2<f64>> {
        std::iter::once(&self.initial_state)
            .chain(self.trace.iter().map(|tr| &tr.next_state))
            .map(|s| s.position().re())
            .collect()
    }
}

/// Squared position error against the reference at `time`, plus weighted
/// control effort
pub fn tracking_cost<T, S, A>(
    state: &S,
    action: &A,
    reference: &CubicSpline<T>,
    time: f64,
    input_weight: f64,
) -> TrackingResult<T>
where
    T: Scalar,
    S: VehicleState<T>,
    A: ControlAction<T>,
{
    let target = reference.evaluate(time, Derivative::Position)?;
    Ok(state.position().distance_squared(&target) + action.effort() * input_weight)
}

/// Reset `dynamics` and drive it along `tracked` for the configured horizon.
pub fn run_rollout<T, D, C>(
    dynamics: &mut D,
    controller: &C,
    tracked: &CubicSpline<T>,
    reference: &CubicSpline<T>,
    config: &RolloutConfig,
) -> TrackingResult<Rollout<T, D::State, D::Action>>
where
    T: Scalar,
    D: Dynamics<T>,
    C: TrackingController<T, State = D::State, Action = D::Action>,
{
    let ticks = config.tick_count()?;
    let mut state = dynamics.reset();
    let initial_state = state;

    let mut cost = T::zero();
    let mut trace = Vec::with_capacity(ticks);
    let mut desired = Vec::with_capacity(ticks / config.controller_stride + 1);
    let mut held: Option<D::Action> = None;

    for tick in 0..ticks {
        let time = tick as f64 * config.dt;

        let action = match held {
            Some(action) if tick % config.controller_stride != 0 => action,
            _ => {
                let command = controller.next_action(time, tracked, &state)?;
                if !command.action.is_finite() {
                    return Err(TrackingError::NumericalFailure(format!(
                        "non-finite action at tick {} (t = {:.3})",
                        tick, time
                    )));
                }
                desired.push(command.desired);
                held = Some(command.action);
                command.action
            }
        };

        let outcome = dynamics.step(&action)?;
        if !outcome.state.is_finite() {
            return Err(TrackingError::NumericalFailure(format!(
                "non-finite state at tick {} (t = {:.3})",
                tick, time
            )));
        }

        cost += tracking_cost(&outcome.state, &action, reference, outcome.info.elapsed, config.input_weight)?;
        if !cost.re().is_finite() {
            return Err(TrackingError::NumericalFailure(format!(
                "non-finite cost at tick {} (t = {:.3})",
                tick, time
            )));
        }

        trace.push(Transition {
            state,
            action,
            reward: outcome.reward,
            next_state: outcome.state,
            done: outcome.done,
            elapsed: outcome.info.elapsed,
        });
        state = outcome.state;

        if outcome.done {
            break;
        }
    }

    debug!("rollout finished after {} ticks, cost {:.4}", trace.len(), cost.re());

    Ok(Rollout { cost, trace, initial_state, final_state: state, desired })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CarAction, CarState, StepInfo, StepOutcome};
    use crate::models::{DubinsCar, DynamicsCoefficients, LeggedRobot};
    use crate::path_planning::{BoundaryCondition, WaypointSequence};
    use crate::path_tracking::{DubinsTrackingController, LeggedTrackingController, TrackingGains};
    use num_dual::{Dual64, DualNum};

    fn config(horizon: f64) -> RolloutConfig {
        RolloutConfig { horizon, dt: 0.01, controller_stride: 1, input_weight: 0.0 }
    }

    fn straight_line<T: Scalar>(x1: T) -> CubicSpline<T> {
        let lit = |v: f64| crate::common::constant::<T>(v);
        let waypoints = WaypointSequence::new(
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            vec![lit(0.0), x1, lit(1.0), lit(1.5), lit(2.0)],
            vec![T::zero(); 5],
        )
        .unwrap();
        CubicSpline::build(&waypoints, BoundaryCondition::default(), None).unwrap()
    }

    fn car<T: Scalar>() -> DubinsCar<T> {
        DubinsCar::new(DynamicsCoefficients::default(), 4.0, 0.01).unwrap()
    }

    #[test]
    fn test_rollout_is_deterministic() {
        let spline = straight_line(0.5);
        let controller = DubinsTrackingController::with_gains(3.0, 3.0, 3.0, 3.0);
        let a = run_rollout(&mut car::<f64>(), &controller, &spline, &spline, &config(4.0)).unwrap();
        let b = run_rollout(&mut car::<f64>(), &controller, &spline, &spline, &config(4.0)).unwrap();
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.cost.to_bits(), b.cost.to_bits());
        assert_eq!(a.trace.len(), 400);
        assert!(a.trace.last().unwrap().done);
    }

    #[test]
    fn test_feedback_beats_open_loop() {
        let spline = straight_line(0.5);
        let tracking = DubinsTrackingController::with_gains(3.0, 3.0, 3.0, 3.0);
        let idle = DubinsTrackingController::new(TrackingGains::zero());

        let tracked = run_rollout(&mut car::<f64>(), &tracking, &spline, &spline, &config(4.0)).unwrap();
        let open = run_rollout(&mut car::<f64>(), &idle, &spline, &spline, &config(4.0)).unwrap();
        assert!(tracked.cost < open.cost, "{} vs {}", tracked.cost, open.cost);

        let end = tracked.final_state.position();
        assert!((end.x - 2.0).abs() < 0.5, "ended at {:?}", end);
        assert_eq!(tracked.positions().len(), 401);
    }

    #[test]
    fn test_controller_stride_holds_action() {
        let spline = straight_line(0.5);
        let controller = DubinsTrackingController::with_gains(3.0, 3.0, 3.0, 3.0);
        let mut cfg = config(1.0);
        cfg.controller_stride = 5;
        let rollout = run_rollout(&mut car::<f64>(), &controller, &spline, &spline, &cfg).unwrap();

        assert_eq!(rollout.desired.len(), 20);
        for chunk in rollout.trace.chunks(5) {
            assert!(chunk.iter().all(|tr| tr.action == chunk[0].action));
        }
        assert_ne!(rollout.trace[0].action, rollout.trace[5].action);
    }

    #[test]
    fn test_input_weight_adds_effort() {
        let spline = straight_line(0.5);
        let controller = DubinsTrackingController::with_gains(3.0, 3.0, 3.0, 3.0);
        let mut weighted = config(1.0);
        weighted.input_weight = 1.0;
        let plain = run_rollout(&mut car::<f64>(), &controller, &spline, &spline, &config(1.0)).unwrap();
        let heavy = run_rollout(&mut car::<f64>(), &controller, &spline, &spline, &weighted).unwrap();
        assert!(heavy.cost > plain.cost);
    }

    #[test]
    fn test_cost_gradient_matches_finite_difference() {
        let controller = DubinsTrackingController::with_gains(3.0, 3.0, 3.0, 3.0);
        let reference: CubicSpline<Dual64> = straight_line(Dual64::from(0.5));
        let tracked = straight_line(Dual64::new(0.5, 1.0));
        let rollout = run_rollout(&mut car::<Dual64>(), &controller, &tracked, &reference, &config(4.0)).unwrap();
        let gradient = rollout.cost.eps;
        assert!(gradient.is_finite() && gradient != 0.0);

        let plain_reference = straight_line(0.5);
        let h = 1e-5;
        let up = run_rollout(&mut car::<f64>(), &controller, &straight_line(0.5 + h), &plain_reference, &config(4.0))
            .unwrap()
            .cost;
        let down = run_rollout(&mut car::<f64>(), &controller, &straight_line(0.5 - h), &plain_reference, &config(4.0))
            .unwrap()
            .cost;
        let fd = (up - down) / (2.0 * h);
        assert!((fd - gradient).abs() <= 1e-3 * gradient.abs().max(1.0), "fd {} vs ad {}", fd, gradient);

        let plain = run_rollout(&mut car::<f64>(), &controller, &plain_reference, &plain_reference, &config(4.0))
            .unwrap();
        assert!((rollout.cost.re() - plain.cost).abs() < 1e-9);
    }

    #[test]
    fn test_robot_rollout_runs() {
        let spline = straight_line(0.5);
        let controller = LeggedTrackingController::new(TrackingGains::new(5.0, 5.0, 35.0, 5.0, 30.0));
        let mut robot: LeggedRobot<f64> = LeggedRobot::new(
            DynamicsCoefficients { friction_v: 0.0, friction_turn: 0.0, input_scale: 1.0, initial_speed: 0.0, initial_heading: 0.0 },
            4.0,
            0.01,
        )
        .unwrap();
        let rollout = run_rollout(&mut robot, &controller, &spline, &spline, &config(4.0)).unwrap();
        assert!(rollout.cost.is_finite());
        assert!((rollout.final_state.x - 2.0).abs() < 0.5, "ended at {:?}", rollout.final_state);
    }

    /// Produces a NaN state after a few steps
    struct Exploding {
        steps: usize,
    }

    impl Dynamics<f64> for Exploding {
        type State = CarState<f64>;
        type Action = CarAction<f64>;

        fn reset(&mut self) -> CarState<f64> {
            self.steps = 0;
            CarState::new(0.0, 0.0, 0.0, 0.0)
        }

        fn step(&mut self, _action: &CarAction<f64>) -> TrackingResult<StepOutcome<f64, CarState<f64>>> {
            self.steps += 1;
            let x = if self.steps >= 3 { f64::NAN } else { 0.0 };
            Ok(StepOutcome {
                state: CarState::new(x, 0.0, 0.0, 0.0),
                reward: 0.0,
                done: false,
                info: StepInfo { elapsed: self.steps as f64 * 0.01 },
            })
        }
    }

    #[test]
    fn test_nan_state_aborts_rollout() {
        let spline = straight_line(0.5);
        let controller = DubinsTrackingController::with_gains(3.0, 3.0, 3.0, 3.0);
        let result = run_rollout(&mut Exploding { steps: 0 }, &controller, &spline, &spline, &config(1.0));
        match result {
            Err(TrackingError::NumericalFailure(msg)) => assert!(msg.contains("tick 2")),
            other => panic!("expected numerical failure, got {:?}", other.map(|r| r.cost)),
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let spline = straight_line(0.5);
        let controller = DubinsTrackingController::with_gains(3.0, 3.0, 3.0, 3.0);
        let mut cfg = config(1.0);
        cfg.controller_stride = 0;
        assert!(run_rollout(&mut car::<f64>(), &controller, &spline, &spline, &cfg).is_err());
    }
}
