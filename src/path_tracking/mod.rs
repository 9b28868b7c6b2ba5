// Path Tracking algorithms module

pub mod lyapunov_tracking;

pub use lyapunov_tracking::*;
