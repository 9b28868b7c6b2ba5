//! Common types used throughout spline_tracking
//!
//! Every numeric type on the gradient path is generic over [`Scalar`], so the
//! same code runs on plain `f64` and on forward-mode dual numbers.

use std::fmt;

use num_dual::DualNum;

/// Differentiable scalar: `f64` for plain evaluation, `num_dual::Dual64`
/// (or any other dual number over `f64`) when a tangent must be carried.
pub trait Scalar: DualNum<f64> + Copy + fmt::Debug {}

impl<T: DualNum<f64> + Copy + fmt::Debug> Scalar for T {}

/// Lift a constant into any scalar type.
#[inline]
pub fn constant<T: Scalar>(value: f64) -> T {
    <T as From<f64>>::from(value)
}

/// True if the real part is finite. Tangents are checked separately by
/// the callers that produce them.
#[inline]
pub fn is_finite<T: Scalar>(value: T) -> bool {
    value.re().is_finite()
}

/// 2D position (or velocity) in the world frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position2<T> {
    pub x: T,
    pub y: T,
}

/// Boundary velocities share the position layout.
pub type Velocity2<T> = Position2<T>;

impl<T: Scalar> Position2<T> {
    pub fn new(x: T, y: T) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: T::zero(), y: T::zero() }
    }

    pub fn distance_squared(&self, other: &Position2<T>) -> T {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Drop the tangent, keeping the real part.
    pub fn re(&self) -> Position2<f64> {
        Position2::new(self.x.re(), self.y.re())
    }

    pub fn is_finite(&self) -> bool {
        is_finite(self.x) && is_finite(self.y)
    }
}

impl Position2<f64> {
    /// Lift a plain position into any scalar type.
    pub fn lift<T: Scalar>(&self) -> Position2<T> {
        Position2::new(constant(self.x), constant(self.y))
    }
}

impl From<(f64, f64)> for Position2<f64> {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

/// Dubins car state: position, speed and heading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarState<T> {
    pub x: T,
    pub y: T,
    pub v: T,
    pub phi: T,
}

impl<T: Scalar> CarState<T> {
    pub fn new(x: T, y: T, v: T, phi: T) -> Self {
        Self { x, y, v, phi }
    }

    pub fn to_array(&self) -> [T; 4] {
        [self.x, self.y, self.v, self.phi]
    }
}

/// Legged-robot abstraction state: the car state plus heading rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotState<T> {
    pub x: T,
    pub y: T,
    pub v: T,
    pub phi: T,
    pub w: T,
}

impl<T: Scalar> RobotState<T> {
    pub fn new(x: T, y: T, v: T, phi: T, w: T) -> Self {
        Self { x, y, v, phi, w }
    }

    pub fn to_array(&self) -> [T; 5] {
        [self.x, self.y, self.v, self.phi, self.w]
    }
}

/// Car command: longitudinal acceleration and turn rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarAction<T> {
    pub acceleration: T,
    pub turn_rate: T,
}

impl<T: Scalar> CarAction<T> {
    pub fn new(acceleration: T, turn_rate: T) -> Self {
        Self { acceleration, turn_rate }
    }

    pub fn to_array(&self) -> [T; 2] {
        [self.acceleration, self.turn_rate]
    }
}

/// Robot command from the two-loop cascade: speed and yaw-rate setpoints
/// followed by their correction terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotAction<T> {
    pub speed: T,
    pub yaw_rate: T,
    pub acceleration: T,
    pub yaw_acceleration: T,
}

impl<T: Scalar> RobotAction<T> {
    pub fn new(speed: T, yaw_rate: T, acceleration: T, yaw_acceleration: T) -> Self {
        Self { speed, yaw_rate, acceleration, yaw_acceleration }
    }

    pub fn to_array(&self) -> [T; 4] {
        [self.speed, self.yaw_rate, self.acceleration, self.yaw_acceleration]
    }
}
