//! Linear algebra type system for the trajectory filter
//!
//! Provides compile-time dimension checking and clean type aliases
//! for the Kalman filter and the measurement noise model.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 6; // [x, vx, y, vy, z, vz]
pub const AXIS_COUNT: usize = 3;

// ===== Measurement Dimensions =====
pub const MEASURE_DIM: usize = 6; // full state is observed

// ===== Trajectory rows =====
pub const TRUTH_ROW_LEN: usize = STATE_DIM + 1; // [t, x, vx, y, vy, z, vz]

// ===== State Types =====
pub type StateVec = SVector<f64, STATE_DIM>;
pub type StateMat = SMatrix<f64, STATE_DIM, STATE_DIM>;

// One value per axis (acceleration control input, position/velocity triples)
pub type AxisVec = SVector<f64, AXIS_COUNT>;
pub type ControlMat = SMatrix<f64, STATE_DIM, AXIS_COUNT>; // 6×3

// ===== Measurement Types =====
pub type MeasurementVec = SVector<f64, MEASURE_DIM>;
pub type MeasurementNoiseMat = SMatrix<f64, MEASURE_DIM, MEASURE_DIM>;
pub type ObservationMat = SMatrix<f64, MEASURE_DIM, STATE_DIM>; // 6×6
pub type KalmanGain = SMatrix<f64, STATE_DIM, MEASURE_DIM>; // 6×6

/// Index of the position component of `axis` in the interleaved state layout.
pub const fn position_index(axis: usize) -> usize {
    2 * axis
}

/// Index of the velocity component of `axis` in the interleaved state layout.
pub const fn velocity_index(axis: usize) -> usize {
    2 * axis + 1
}

/// Extract `(vx, vy, vz)` from a state vector.
pub fn velocity_of(state: &StateVec) -> AxisVec {
    AxisVec::from_fn(|axis, _| state[velocity_index(axis)])
}

/// Extract `(x, y, z)` from a state vector.
pub fn position_of(state: &StateVec) -> AxisVec {
    AxisVec::from_fn(|axis, _| state[position_index(axis)])
}

/// Build a diagonal 6×6 matrix from its diagonal entries.
pub fn diagonal(entries: &[f64; STATE_DIM]) -> StateMat {
    StateMat::from_diagonal(&StateVec::from_column_slice(entries))
}
