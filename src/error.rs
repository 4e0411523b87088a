use thiserror::Error;

use crate::filters::FilterPhase;

/// Trajectory estimator error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error("{what} has {actual} components, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Innovation covariance is singular")]
    SingularInnovation,

    #[error("{operation}() called while filter is {phase:?}")]
    OutOfSequence {
        operation: &'static str,
        phase: FilterPhase,
    },

    #[error("Filter faulted by an earlier error, reinitialize before reuse")]
    Faulted,

    #[error("Measurement component {index} is not finite")]
    NonFiniteMeasurement { index: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot read trajectory: {0}")]
    TrajectoryFormat(String),

    #[error("Trajectory is empty")]
    EmptyTrajectory,
}

/// Result type for estimator operations
pub type Result<T> = std::result::Result<T, EstimatorError>;
