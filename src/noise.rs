//! Synthetic sensor model
//!
//! Turns a ground-truth state into a noisy measurement by adding independent
//! zero-mean Gaussian noise per component. Position and velocity components
//! use separate standard deviations.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::config::NoiseConfig;
use crate::error::{EstimatorError, Result};
use crate::types::{state_from_slice, MeasurementVec, StateVec, STATE_DIM};

#[derive(Clone, Debug)]
pub struct GaussianNoiseModel {
    position: Normal<f64>,
    velocity: Normal<f64>,
}

impl GaussianNoiseModel {
    pub fn new(config: &NoiseConfig) -> Result<Self> {
        config.validate()?;
        let position = Normal::new(0.0, config.position_std)
            .map_err(|e| EstimatorError::InvalidConfig(format!("position_std: {e}")))?;
        let velocity = Normal::new(0.0, config.velocity_std)
            .map_err(|e| EstimatorError::InvalidConfig(format!("velocity_std: {e}")))?;
        Ok(Self { position, velocity })
    }

    /// Draw one measurement centered on `truth`.
    pub fn sample<R: Rng + ?Sized>(&self, truth: &StateVec, rng: &mut R) -> MeasurementVec {
        MeasurementVec::from_fn(|i, _| {
            // Even slots are positions, odd slots velocities
            let distribution = if i % 2 == 0 {
                &self.position
            } else {
                &self.velocity
            };
            truth[i] + distribution.sample(rng)
        })
    }

    pub fn sample_slice<R: Rng + ?Sized>(
        &self,
        truth: &[f64],
        rng: &mut R,
    ) -> Result<MeasurementVec> {
        let truth = state_from_slice("true state", truth)?;
        Ok(self.sample(&truth, rng))
    }

    pub fn std_devs(&self) -> [f64; STATE_DIM] {
        let (p, v) = (self.position.std_dev(), self.velocity.std_dev());
        [p, v, p, v, p, v]
    }
}
