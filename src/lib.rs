//! spline_tracking - learned waypoint correction for trajectory tracking
//!
//! A cubic-spline reference is built through (corrected) waypoints and
//! followed by a Lyapunov tracking controller on a Dubins car or a
//! legged-robot abstraction. Everything on the path from waypoints to
//! tracking cost is generic over dual numbers, so the cost can be
//! differentiated with respect to the waypoints and used to train a
//! correction network.

// Core modules
pub mod common;
pub mod utils;

// Algorithm modules
pub mod path_planning;
pub mod path_tracking;
pub mod models;
pub mod control;
pub mod learning;

// Re-export common types for convenience
pub use common::{CarAction, CarState, Position2, RobotAction, RobotState, Scalar};
pub use common::{Dynamics, NominalDynamics, TrackingController, VehicleState};
pub use common::{Config, Environment, TrackingError, TrackingResult};
pub use control::{run_rollout, RolloutConfig};
pub use path_planning::{CubicSpline, WaypointSequence};
