//! Error types for spline_tracking

use thiserror::Error;

/// Main error type for the tracking pipeline
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Malformed waypoint sequence or argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Evaluation time outside the spline's knot span
    #[error("Time {time} is outside the spline span [{start}, {end}]")]
    OutOfRange { time: f64, start: f64, end: f64 },

    /// Singular system, NaN/Inf in state, action or gradient
    #[error("Numerical failure: {0}")]
    NumericalFailure(String),

    /// Configuration rejected by validation
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Cannot (de)serialise checkpoint: {0}")]
    Json(#[from] serde_json::Error),

    /// gnuplot could not render a figure
    #[error("Plotting failed: {0}")]
    Plot(String),
}

impl TrackingError {
    /// True for failures that abort a rollout but should only skip a
    /// training step.
    pub fn is_numerical(&self) -> bool {
        matches!(self, TrackingError::NumericalFailure(_))
    }
}

/// Result type alias for tracking operations
pub type TrackingResult<T> = Result<T, TrackingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackingError::InvalidInput("need at least 2 waypoints".to_string());
        assert_eq!(format!("{}", err), "Invalid input: need at least 2 waypoints");

        let err = TrackingError::OutOfRange { time: -1.0, start: 0.0, end: 2.0 };
        assert_eq!(format!("{}", err), "Time -1 is outside the spline span [0, 2]");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TrackingError = io_err.into();
        assert!(matches!(err, TrackingError::Io(_)));
        assert!(!err.is_numerical());
    }

    #[test]
    fn test_numerical_classification() {
        let err = TrackingError::NumericalFailure("NaN in state".to_string());
        assert!(err.is_numerical());
    }
}
