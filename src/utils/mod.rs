//! Utility modules for spline_tracking

pub mod logger;
pub mod visualization;

pub use logger::{logger_init, verbosity_level};
pub use visualization::{colors, plot_evaluation, PathStyle, PointStyle, Visualizer};
