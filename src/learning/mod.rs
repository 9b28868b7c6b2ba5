//! Learned waypoint correction
//!
//! The correction network and the training loop that differentiates
//! closed-loop tracking cost through the spline solver.

pub mod correction;
pub mod trainer;

pub use correction::*;
pub use trainer::*;
