use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EstimatorError, Result};
use crate::types::{diagonal, StateMat, STATE_DIM};

// ─── Filter configuration ────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Time step between trajectory rows [s]
    pub dt: f64,

    // ── Noise variances, layout [x, vx, y, vy, z, vz] ──
    pub process_noise: [f64; STATE_DIM],
    pub measurement_noise: [f64; STATE_DIM],
    pub initial_covariance: [f64; STATE_DIM],

    // ── Numerics ──
    pub symmetrize_covariance: bool,
    pub asymmetry_tolerance: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            dt: 0.1,
            process_noise: [1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            measurement_noise: [3.0, 0.005, 3.0, 0.005, 3.0, 0.005],
            initial_covariance: [20.0, 10.0, 20.0, 10.0, 20.0, 10.0],
            symmetrize_covariance: true,
            asymmetry_tolerance: 1e-9,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(EstimatorError::InvalidConfig(format!(
                "dt must be positive and finite, got {}",
                self.dt
            )));
        }
        check_variances("process_noise", &self.process_noise)?;
        check_variances("measurement_noise", &self.measurement_noise)?;
        check_variances("initial_covariance", &self.initial_covariance)?;
        if !self.asymmetry_tolerance.is_finite() || self.asymmetry_tolerance < 0.0 {
            return Err(EstimatorError::InvalidConfig(format!(
                "asymmetry_tolerance must be non-negative, got {}",
                self.asymmetry_tolerance
            )));
        }
        Ok(())
    }

    /// Load from a JSON file; fields not present keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            EstimatorError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EstimatorError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn process_noise_matrix(&self) -> StateMat {
        diagonal(&self.process_noise)
    }

    pub fn measurement_noise_matrix(&self) -> StateMat {
        diagonal(&self.measurement_noise)
    }

    pub fn initial_covariance_matrix(&self) -> StateMat {
        diagonal(&self.initial_covariance)
    }
}

fn check_variances(name: &str, values: &[f64; STATE_DIM]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite() || *v < 0.0) {
        Some(idx) => Err(EstimatorError::InvalidConfig(format!(
            "{name}[{idx}] must be a non-negative variance, got {}",
            values[idx]
        ))),
        None => Ok(()),
    }
}

// ─── Synthetic measurement noise ─────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Position standard deviation [m]
    pub position_std: f64,
    /// Velocity standard deviation [m/s]
    pub velocity_std: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            position_std: 3.0,
            velocity_std: 0.05,
        }
    }
}

impl NoiseConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, std) in [
            ("position_std", self.position_std),
            ("velocity_std", self.velocity_std),
        ] {
            if !std.is_finite() || std < 0.0 {
                return Err(EstimatorError::InvalidConfig(format!(
                    "{name} must be a non-negative standard deviation, got {std}"
                )));
            }
        }
        Ok(())
    }
}
