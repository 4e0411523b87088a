//! State estimation filters
//!
//! The linear Kalman filter is the only estimator; the acceleration
//! heuristic and model matrices are exposed for callers that want to
//! inspect or reuse them.

pub mod linear_kf;

pub use linear_kf::{
    control_matrix, estimate_acceleration, transition_matrix, FilterPhase, KfSnapshot, LinearKf,
};
