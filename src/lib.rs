pub mod config;
pub mod error;
pub mod filters;
pub mod noise;
pub mod trajectory;
pub mod types;

pub use config::{FilterConfig, NoiseConfig};
pub use error::{EstimatorError, Result};
pub use filters::{FilterPhase, LinearKf};
pub use noise::GaussianNoiseModel;
pub use trajectory::{run_trajectory, TrajectoryRun};
