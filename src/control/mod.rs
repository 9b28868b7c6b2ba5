//! Control module
//!
//! Closed-loop simulation of a tracking controller against a vehicle model,
//! either directly on differentiable dynamics or as a residual replay of
//! a recorded rollout.

pub mod rollout;
pub mod residual;
pub mod closed_loop;

pub use rollout::*;
pub use residual::*;
pub use closed_loop::*;
