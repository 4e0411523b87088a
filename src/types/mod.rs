pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

use crate::error::{EstimatorError, Result};

/// One ground-truth sample: time plus `[x, vx, y, vy, z, vz]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruthRow {
    pub t: f64,
    pub state: [f64; STATE_DIM],
}

impl TruthRow {
    /// Parse a `[t, x, vx, y, vy, z, vz]` row.
    pub fn from_slice(row: &[f64]) -> Result<Self> {
        if row.len() != TRUTH_ROW_LEN {
            return Err(EstimatorError::DimensionMismatch {
                what: "trajectory row",
                expected: TRUTH_ROW_LEN,
                actual: row.len(),
            });
        }
        let mut state = [0.0; STATE_DIM];
        state.copy_from_slice(&row[1..]);
        Ok(Self { t: row[0], state })
    }

    pub fn state_vec(&self) -> StateVec {
        StateVec::from_column_slice(&self.state)
    }
}

/// Filter output for one trajectory row, kept next to its truth and measurement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EstimateRow {
    pub t: f64,
    pub truth: [f64; STATE_DIM],
    pub measurement: [f64; STATE_DIM],
    pub estimate: [f64; STATE_DIM],
}

/// Copy a 6-element slice into a state vector, rejecting any other length.
pub fn state_from_slice(what: &'static str, components: &[f64]) -> Result<StateVec> {
    if components.len() != STATE_DIM {
        return Err(EstimatorError::DimensionMismatch {
            what,
            expected: STATE_DIM,
            actual: components.len(),
        });
    }
    Ok(StateVec::from_column_slice(components))
}

pub fn to_array(v: &StateVec) -> [f64; STATE_DIM] {
    let mut out = [0.0; STATE_DIM];
    out.copy_from_slice(v.as_slice());
    out
}
