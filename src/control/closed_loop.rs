//! Differentiable closed loops
//!
//! A [`ClosedLoop`] turns a tracked and a reference spline on dual numbers
//! into a tracking cost whose tangent follows the seeded waypoint. The
//! direct loop rolls the dual spline through differentiable dynamics. The
//! residual loop first runs arbitrary `f64` dynamics on the real part, then
//! replays the recording through a nominal model to obtain the tangent.

use log::debug;
use num_dual::Dual64;

use crate::common::{
    Dynamics, NominalDynamics, Position2, TrackingController, TrackingResult, VehicleState,
};
use crate::control::{run_rollout, ResidualDynamics, RolloutConfig};
use crate::path_planning::CubicSpline;

/// Cost of one closed-loop run and its real-valued traces
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub cost: Dual64,
    /// Vehicle positions including the start
    pub path: Vec<Position2<f64>>,
    /// Reference position at every controller evaluation
    pub desired: Vec<Position2<f64>>,
}

pub trait ClosedLoop {
    /// Where the vehicle starts after a reset
    fn start_position(&mut self) -> Position2<f64>;

    /// Track `tracked`, scoring against `reference`
    fn run(
        &mut self,
        tracked: &CubicSpline<Dual64>,
        reference: &CubicSpline<Dual64>,
        config: &RolloutConfig,
    ) -> TrackingResult<LoopOutcome>;
}

/// Controller driving differentiable dynamics
#[derive(Debug, Clone)]
pub struct DirectLoop<D, C> {
    pub dynamics: D,
    pub controller: C,
}

impl<D, C> DirectLoop<D, C> {
    pub fn new(dynamics: D, controller: C) -> Self {
        DirectLoop { dynamics, controller }
    }
}

impl<D, C> ClosedLoop for DirectLoop<D, C>
where
    D: Dynamics<Dual64>,
    C: TrackingController<Dual64, State = D::State, Action = D::Action>,
{
    fn start_position(&mut self) -> Position2<f64> {
        self.dynamics.reset().position().re()
    }

    fn run(
        &mut self,
        tracked: &CubicSpline<Dual64>,
        reference: &CubicSpline<Dual64>,
        config: &RolloutConfig,
    ) -> TrackingResult<LoopOutcome> {
        let rollout = run_rollout(&mut self.dynamics, &self.controller, tracked, reference, config)?;
        Ok(LoopOutcome {
            cost: rollout.cost,
            path: rollout.positions(),
            desired: rollout.desired.iter().map(|p| p.re()).collect(),
        })
    }
}

/// Controller driving `f64` dynamics, differentiated through a nominal model
#[derive(Debug, Clone)]
pub struct ResidualLoop<R, N, C> {
    pub real: R,
    pub nominal: N,
    pub controller: C,
}

impl<R, N, C> ResidualLoop<R, N, C> {
    pub fn new(real: R, nominal: N, controller: C) -> Self {
        ResidualLoop { real, nominal, controller }
    }
}

impl<R, N, C> ClosedLoop for ResidualLoop<R, N, C>
where
    R: Dynamics<f64>,
    N: NominalDynamics<Dual64>,
    C: TrackingController<f64, State = R::State, Action = R::Action>
        + TrackingController<Dual64, State = N::State, Action = N::Action>,
{
    fn start_position(&mut self) -> Position2<f64> {
        self.real.reset().position()
    }

    fn run(
        &mut self,
        tracked: &CubicSpline<Dual64>,
        reference: &CubicSpline<Dual64>,
        config: &RolloutConfig,
    ) -> TrackingResult<LoopOutcome> {
        let recorded = run_rollout(&mut self.real, &self.controller, &tracked.re(), &reference.re(), config)?;
        let mut replay = ResidualDynamics::new(&self.nominal, &recorded)?;
        let rollout = run_rollout(&mut replay, &self.controller, tracked, reference, config)?;
        debug!(
            "residual replay of {} steps, recorded cost {:.4}, replayed {:.4}",
            recorded.trace.len(),
            recorded.cost,
            rollout.cost.re
        );
        Ok(LoopOutcome {
            cost: rollout.cost,
            path: recorded.positions(),
            desired: rollout.desired.iter().map(|p| p.re()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DubinsCar, DynamicsCoefficients, LeggedRobot};
    use crate::path_tracking::{DubinsTrackingController, LeggedTrackingController, TrackingGains};

    fn config() -> RolloutConfig {
        RolloutConfig { horizon: 2.0, dt: 0.02, controller_stride: 1, input_weight: 0.1 }
    }

    fn splines() -> (CubicSpline<Dual64>, CubicSpline<Dual64>) {
        let times = [0.0, 1.0, 2.0];
        let y = [Dual64::from(0.0), Dual64::from(0.5), Dual64::from(1.0)];
        let tracked = CubicSpline::from_slices(
            &times,
            &[Dual64::from(0.0), Dual64::new(1.0, 1.0), Dual64::from(1.5)],
            &y,
        )
        .unwrap();
        let reference =
            CubicSpline::from_slices(&times, &[Dual64::from(0.0), Dual64::from(1.0), Dual64::from(1.5)], &y)
                .unwrap();
        (tracked, reference)
    }

    fn car<T: crate::common::Scalar>(coefficients: DynamicsCoefficients) -> DubinsCar<T> {
        DubinsCar::new(coefficients, 2.0, 0.02).unwrap()
    }

    fn robot<T: crate::common::Scalar>(coefficients: DynamicsCoefficients) -> LeggedRobot<T> {
        LeggedRobot::new(coefficients, 2.0, 0.02).unwrap()
    }

    #[test]
    fn test_residual_gradient_equals_direct_on_nominal_model() {
        let controller = DubinsTrackingController::with_gains(3.0, 3.0, 3.0, 3.0);
        let (tracked, reference) = splines();
        let coefficients = DynamicsCoefficients::default();

        let mut direct = DirectLoop::new(car::<Dual64>(coefficients), controller);
        let mut residual = ResidualLoop::new(car::<f64>(coefficients), car::<Dual64>(coefficients), controller);

        let a = direct.run(&tracked, &reference, &config()).unwrap();
        let b = residual.run(&tracked, &reference, &config()).unwrap();
        assert!(a.cost.eps != 0.0);
        assert!((a.cost.re - b.cost.re).abs() < 1e-9);
        assert!((a.cost.eps - b.cost.eps).abs() < 1e-9 * a.cost.eps.abs().max(1.0), "{} vs {}", a.cost.eps, b.cost.eps);
        assert_eq!(a.path.len(), b.path.len());
        assert_eq!(a.desired.len(), b.desired.len());
        assert_eq!(direct.start_position(), residual.start_position());
    }

    #[test]
    fn test_residual_cost_follows_real_dynamics() {
        let controller = DubinsTrackingController::with_gains(3.0, 3.0, 3.0, 3.0);
        let (tracked, reference) = splines();
        let real_coefficients =
            DynamicsCoefficients { friction_v: 0.6, friction_turn: 0.3, input_scale: 0.7, ..Default::default() };

        let mut residual = ResidualLoop::new(
            car::<f64>(real_coefficients),
            car::<Dual64>(DynamicsCoefficients::default()),
            controller,
        );
        let outcome = residual.run(&tracked, &reference, &config()).unwrap();

        let recorded =
            run_rollout(&mut car::<f64>(real_coefficients), &controller, &tracked.re(), &reference.re(), &config())
                .unwrap();
        assert!((outcome.cost.re - recorded.cost).abs() < 1e-9, "{} vs {}", outcome.cost.re, recorded.cost);
        assert_eq!(outcome.path, recorded.positions());
        assert!(outcome.cost.eps.is_finite());

        let nominal = DirectLoop::new(car::<Dual64>(DynamicsCoefficients::default()), controller)
            .run(&tracked, &reference, &config())
            .unwrap();
        assert!((nominal.cost.re - outcome.cost.re).abs() > 1e-6);
    }

    #[test]
    fn test_residual_loop_on_robot() {
        let controller = LeggedTrackingController::new(TrackingGains::new(5.0, 5.0, 35.0, 5.0, 30.0));
        let (tracked, reference) = splines();
        let coefficients = DynamicsCoefficients::default();

        let mut direct = DirectLoop::new(robot::<Dual64>(coefficients), controller);
        let mut residual =
            ResidualLoop::new(robot::<f64>(coefficients), robot::<Dual64>(coefficients), controller);
        let a = direct.run(&tracked, &reference, &config()).unwrap();
        let b = residual.run(&tracked, &reference, &config()).unwrap();
        assert!((a.cost.eps - b.cost.eps).abs() < 1e-9 * a.cost.eps.abs().max(1.0));
    }
}
