//! Lyapunov-style trajectory tracking controllers
//!
//! The reference velocity from the spline is corrected by proportional
//! position feedback, turned into a desired speed and heading, and the
//! speed/heading errors are fed back through the gains:
//!
//!   x̃_d = ẋ_d + k_x (x_d − x),   ỹ_d = ẏ_d + k_y (y_d − y)
//!   v_des = sqrt(x̃_d² + ỹ_d² + ε)
//!   φ_des = atan(ỹ_d / x̃_d), remapped to [0, 2π), then shifted by 2π
//!           to the branch nearest the current heading
//!
//! The car variant commands `[k_v (v_des − v), k_φ (φ_des − φ)]`. The robot
//! variant runs a two-loop cascade on the heading rate:
//! `w̃ = k_φ (φ_des − φ)`, `θ = k_w (w̃ − w)`, and commands
//! `[v_des, w̃, k_v (v_des − v), θ]`.
//!
//! Every branch is decided on the real part and evaluated on the dual
//! values, so derivatives flow through whichever branch is taken.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use serde::{Deserialize, Serialize};

use crate::common::{
    constant, CarAction, CarState, Position2, RobotAction, RobotState, Scalar, TrackingCommand,
    TrackingController, TrackingResult, VehicleState, Velocity2,
};
use crate::path_planning::{CubicSpline, Derivative};

/// Keeps the gradient of the square root finite at zero speed
const SPEED_EPSILON: f64 = 1e-8;

/// Controller gains
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingGains {
    /// Position gain, x
    pub k_x: f64,
    /// Position gain, y
    pub k_y: f64,
    /// Speed gain
    pub k_v: f64,
    /// Heading gain
    pub k_phi: f64,
    /// Heading-rate gain (robot variant only)
    #[serde(default)]
    pub k_w: f64,
}

impl TrackingGains {
    pub fn new(k_x: f64, k_y: f64, k_v: f64, k_phi: f64, k_w: f64) -> Self {
        Self { k_x, k_y, k_v, k_phi, k_w }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0)
    }
}

impl Default for TrackingGains {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0, 1.0, 1.0)
    }
}

/// Feedforward velocity plus proportional position correction
pub fn corrected_velocity<T: Scalar>(
    gains: &TrackingGains,
    desired: Position2<T>,
    desired_velocity: Velocity2<T>,
    actual: Position2<T>,
) -> Velocity2<T> {
    Velocity2::new(
        desired_velocity.x + (desired.x - actual.x) * gains.k_x,
        desired_velocity.y + (desired.y - actual.y) * gains.k_y,
    )
}

pub fn desired_speed<T: Scalar>(velocity: Velocity2<T>) -> T {
    (velocity.x * velocity.x + velocity.y * velocity.y + SPEED_EPSILON).sqrt()
}

/// Heading of `velocity` measured from +x, in [0, 2π).
///
/// `x̃ == 0` is an exact float comparison; the vertical cases are only
/// taken when the corrected x velocity is exactly zero.
pub fn desired_heading<T: Scalar>(velocity: Velocity2<T>) -> T {
    let (vx, vy) = (velocity.x, velocity.y);

    let mut phi = if vx.re() == 0.0 {
        if vy.re() > 0.0 {
            constant(FRAC_PI_2)
        } else if vy.re() < 0.0 {
            constant(-FRAC_PI_2)
        } else {
            T::zero()
        }
    } else {
        (vy / vx).atan()
    };

    if vx.re() < 0.0 {
        phi += PI;
    } else if vy.re() < 0.0 {
        phi += TAU;
    }
    phi
}

/// Shift `phi_des` by whole turns so that `|phi_des − phi_act| ≤ π`.
///
/// An error of exactly ±π is left alone.
pub fn shortest_heading<T: Scalar>(phi_des: T, phi_act: T) -> T {
    let error = phi_des.re() - phi_act.re();
    if !error.is_finite() {
        return phi_des;
    }
    let turns = if error > PI {
        ((error - PI) / TAU).ceil()
    } else if error < -PI {
        -((-PI - error) / TAU).ceil()
    } else {
        0.0
    };
    phi_des - turns * TAU
}

/// Desired position, speed and heading for one controller query
struct Guidance<T> {
    desired: Position2<T>,
    actual: Position2<T>,
    speed: T,
    heading: T,
}

fn guidance<T: Scalar, S: VehicleState<T>>(
    gains: &TrackingGains,
    time: f64,
    spline: &CubicSpline<T>,
    state: &S,
    heading: T,
) -> TrackingResult<Guidance<T>> {
    let desired = spline.evaluate(time, Derivative::Position)?;
    let desired_velocity = spline.evaluate(time, Derivative::Velocity)?;
    let actual = state.position();

    let corrected = corrected_velocity(gains, desired, desired_velocity, actual);
    Ok(Guidance {
        desired,
        actual,
        speed: desired_speed(corrected),
        heading: shortest_heading(desired_heading(corrected), heading),
    })
}

/// Tracking controller for the 4-state Dubins car
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DubinsTrackingController {
    gains: TrackingGains,
}

impl DubinsTrackingController {
    pub fn new(gains: TrackingGains) -> Self {
        DubinsTrackingController { gains }
    }

    pub fn with_gains(k_x: f64, k_y: f64, k_v: f64, k_phi: f64) -> Self {
        Self::new(TrackingGains::new(k_x, k_y, k_v, k_phi, 0.0))
    }

    pub fn gains(&self) -> &TrackingGains {
        &self.gains
    }
}

impl<T: Scalar> TrackingController<T> for DubinsTrackingController {
    type State = CarState<T>;
    type Action = CarAction<T>;

    fn next_action(
        &self,
        time: f64,
        spline: &CubicSpline<T>,
        state: &CarState<T>,
    ) -> TrackingResult<TrackingCommand<T, CarAction<T>>> {
        let g = guidance(&self.gains, time, spline, state, state.phi)?;

        let acceleration = (g.speed - state.v) * self.gains.k_v;
        let turn_rate = (g.heading - state.phi) * self.gains.k_phi;

        Ok(TrackingCommand {
            action: CarAction::new(acceleration, turn_rate),
            desired: g.desired,
            actual: g.actual,
        })
    }
}

/// Cascade tracking controller for the 5-state legged-robot abstraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeggedTrackingController {
    gains: TrackingGains,
}

impl LeggedTrackingController {
    pub fn new(gains: TrackingGains) -> Self {
        LeggedTrackingController { gains }
    }

    pub fn gains(&self) -> &TrackingGains {
        &self.gains
    }
}

impl<T: Scalar> TrackingController<T> for LeggedTrackingController {
    type State = RobotState<T>;
    type Action = RobotAction<T>;

    fn next_action(
        &self,
        time: f64,
        spline: &CubicSpline<T>,
        state: &RobotState<T>,
    ) -> TrackingResult<TrackingCommand<T, RobotAction<T>>> {
        let g = guidance(&self.gains, time, spline, state, state.phi)?;

        let acceleration = (g.speed - state.v) * self.gains.k_v;
        // outer loop: heading error to yaw-rate setpoint
        let yaw_rate = (g.heading - state.phi) * self.gains.k_phi;
        // inner loop: yaw-rate error
        let yaw_acceleration = (yaw_rate - state.w) * self.gains.k_w;

        Ok(TrackingCommand {
            action: RobotAction::new(g.speed, yaw_rate, acceleration, yaw_acceleration),
            desired: g.desired,
            actual: g.actual,
        })
    }
}
