//! Linear Kalman filter over a 3-axis constant-velocity model
//!
//! State Vector (6D), interleaved per axis:
//! [0, 1]: x, vx
//! [2, 3]: y, vy
//! [4, 5]: z, vz
//!
//! The control input is an acceleration estimate obtained by finite
//! differencing the velocity of the last two cycles. The full state is
//! observed directly (H = I).

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::error::{EstimatorError, Result};
use crate::types::{
    position_index, state_from_slice, velocity_index, velocity_of, AxisVec, ControlMat,
    KalmanGain, MeasurementNoiseMat, MeasurementVec, ObservationMat, StateMat, StateVec,
    AXIS_COUNT,
};

/// Where the filter is in its predict/update cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterPhase {
    AwaitingPredict,
    AwaitingUpdate,
    /// A fatal error occurred; only `reinitialize` is accepted.
    Faulted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KfSnapshot {
    /// Estimated position (x, y, z) [m]
    pub position: (f64, f64, f64),

    /// Estimated velocity (vx, vy, vz) [m/s]
    pub velocity: (f64, f64, f64),

    /// 1-sigma uncertainty from the covariance diagonal
    pub position_std: (f64, f64, f64),
    pub velocity_std: (f64, f64, f64),

    pub covariance_trace: f64,

    /// Update counters
    pub predict_count: u64,
    pub update_count: u64,
}

/// Constant-velocity transition: position += velocity * dt.
pub fn transition_matrix(dt: f64) -> StateMat {
    let mut f = StateMat::identity();
    for axis in 0..AXIS_COUNT {
        f[(position_index(axis), velocity_index(axis))] = dt;
    }
    f
}

/// Maps a per-axis acceleration into the state: 0.5 * dt² on position, dt on velocity.
pub fn control_matrix(dt: f64) -> ControlMat {
    let mut b = ControlMat::zeros();
    for axis in 0..AXIS_COUNT {
        b[(position_index(axis), axis)] = 0.5 * dt * dt;
        b[(velocity_index(axis), axis)] = dt;
    }
    b
}

/// Finite-difference acceleration between two consecutive velocity estimates.
pub fn estimate_acceleration(
    previous_velocity: &AxisVec,
    current_velocity: &AxisVec,
    dt: f64,
) -> AxisVec {
    (current_velocity - previous_velocity) / dt
}

pub struct LinearKf {
    /// Time step [seconds]
    dt: f64,

    /// State slots [6D]
    previous_state: StateVec,
    state: StateVec,
    predicted_state: StateVec,

    /// Covariance slots [6x6]
    covariance: StateMat,
    predicted_covariance: StateMat,
    initial_covariance: StateMat,

    /// Model matrices
    transition: StateMat,
    control: ControlMat,
    observation: ObservationMat,
    process_noise: StateMat,
    measurement_noise: MeasurementNoiseMat,

    /// Last cycle diagnostics
    kalman_gain: KalmanGain,
    innovation: MeasurementVec,

    symmetrize: bool,
    asymmetry_tolerance: f64,

    phase: FilterPhase,
    predict_count: u64,
    update_count: u64,
}

impl LinearKf {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        config.validate()?;
        let dt = config.dt;
        let initial_covariance = config.initial_covariance_matrix();

        Ok(Self {
            dt,
            previous_state: StateVec::zeros(),
            state: StateVec::zeros(),
            predicted_state: StateVec::zeros(),
            covariance: initial_covariance,
            predicted_covariance: StateMat::zeros(),
            initial_covariance,
            transition: transition_matrix(dt),
            control: control_matrix(dt),
            observation: ObservationMat::identity(),
            process_noise: config.process_noise_matrix(),
            measurement_noise: config.measurement_noise_matrix(),
            kalman_gain: KalmanGain::zeros(),
            innovation: MeasurementVec::zeros(),
            symmetrize: config.symmetrize_covariance,
            asymmetry_tolerance: config.asymmetry_tolerance,
            phase: FilterPhase::AwaitingPredict,
            predict_count: 0,
            update_count: 0,
        })
    }

    /// Set the t0 state from `[x, vx, y, vy, z, vz]`.
    ///
    /// Both the current and previous slots receive the value, so the first
    /// `predict()` sees zero acceleration. Only accepted before the first
    /// `predict()`; a used filter must go through `reinitialize`.
    pub fn set_initial_state(&mut self, components: &[f64]) -> Result<()> {
        self.expect_phase("set_initial_state", FilterPhase::AwaitingPredict)?;
        if self.predict_count > 0 {
            return Err(EstimatorError::OutOfSequence {
                operation: "set_initial_state",
                phase: self.phase,
            });
        }
        let initial = state_from_slice("initial state", components)?;
        self.state = initial;
        self.previous_state = initial;
        Ok(())
    }

    /// Start a fresh run: initial covariance, new t0 state, cleared diagnostics.
    /// This is the only way out of `FilterPhase::Faulted`.
    pub fn reinitialize(&mut self, components: &[f64]) -> Result<()> {
        let initial = state_from_slice("initial state", components)?;
        self.state = initial;
        self.previous_state = initial;
        self.predicted_state = StateVec::zeros();
        self.covariance = self.initial_covariance;
        self.predicted_covariance = StateMat::zeros();
        self.kalman_gain = KalmanGain::zeros();
        self.innovation = MeasurementVec::zeros();
        self.predict_count = 0;
        self.update_count = 0;
        self.phase = FilterPhase::AwaitingPredict;
        Ok(())
    }

    /// Propagate state and covariance one time step.
    ///
    /// Returns the acceleration estimate that drove the control term.
    pub fn predict(&mut self) -> Result<AxisVec> {
        self.expect_phase("predict", FilterPhase::AwaitingPredict)?;

        let acceleration = estimate_acceleration(
            &velocity_of(&self.previous_state),
            &velocity_of(&self.state),
            self.dt,
        );
        // previous lags current by exactly one cycle
        self.previous_state = self.state;

        self.predicted_state = self.transition * self.state + self.control * acceleration;
        self.predicted_covariance =
            self.transition * self.covariance * self.transition.transpose() + self.process_noise;

        self.predict_count += 1;
        self.phase = FilterPhase::AwaitingUpdate;

        debug!(
            "predict #{}: accel=({:.3}, {:.3}, {:.3}) trace(P-)={:.3}",
            self.predict_count,
            acceleration[0],
            acceleration[1],
            acceleration[2],
            self.predicted_covariance.trace()
        );
        Ok(acceleration)
    }

    /// Fuse a `[x, vx, y, vy, z, vz]` measurement into the predicted state.
    ///
    /// Any failure (malformed measurement, singular innovation covariance)
    /// faults the filter until `reinitialize`.
    pub fn update(&mut self, measurement: &[f64]) -> Result<()> {
        self.expect_phase("update", FilterPhase::AwaitingUpdate)?;
        let z = match state_from_slice("measurement", measurement) {
            Ok(z) => z,
            Err(e) => return Err(self.fault(e)),
        };
        if let Some(index) = z.iter().position(|v| !v.is_finite()) {
            return Err(self.fault(EstimatorError::NonFiniteMeasurement { index }));
        }

        let h = self.observation;
        let h_t = h.transpose();

        // S = H*P*H^T + R
        let s = h * self.predicted_covariance * h_t + self.measurement_noise;
        let s_inv = match s.try_inverse() {
            Some(inv) => inv,
            None => return Err(self.fault(EstimatorError::SingularInnovation)),
        };

        // K = P*H^T*S^-1
        let k = self.predicted_covariance * h_t * s_inv;
        let y = z - h * self.predicted_state;
        self.state = self.predicted_state + k * y;

        // Joseph form covariance
        let i_kh = StateMat::identity() - k * h;
        let mut p = i_kh * self.predicted_covariance * i_kh.transpose()
            + k * self.measurement_noise * k.transpose();

        let asymmetry = (p - p.transpose()).amax();
        if asymmetry > self.asymmetry_tolerance {
            warn!(
                "covariance asymmetry {:.3e} exceeds tolerance {:.3e} at update #{}",
                asymmetry,
                self.asymmetry_tolerance,
                self.update_count + 1
            );
        }
        if self.symmetrize {
            p = (p + p.transpose()) * 0.5;
        }

        self.covariance = p;
        self.kalman_gain = k;
        self.innovation = y;
        self.update_count += 1;
        self.phase = FilterPhase::AwaitingPredict;

        debug!(
            "update #{}: |innovation|={:.3} trace(P)={:.3}",
            self.update_count,
            y.norm(),
            self.covariance.trace()
        );
        Ok(())
    }

    fn fault(&mut self, err: EstimatorError) -> EstimatorError {
        warn!(
            "update #{} failed, filter faulted: {}",
            self.update_count + 1,
            err
        );
        self.phase = FilterPhase::Faulted;
        err
    }

    fn expect_phase(&self, operation: &'static str, expected: FilterPhase) -> Result<()> {
        match self.phase {
            phase if phase == expected => Ok(()),
            FilterPhase::Faulted => Err(EstimatorError::Faulted),
            phase => Err(EstimatorError::OutOfSequence { operation, phase }),
        }
    }

    pub fn state(&self) -> &StateVec {
        &self.state
    }

    pub fn covariance(&self) -> &StateMat {
        &self.covariance
    }

    pub fn predicted_state(&self) -> &StateVec {
        &self.predicted_state
    }

    pub fn predicted_covariance(&self) -> &StateMat {
        &self.predicted_covariance
    }

    /// Gain from the most recent update.
    pub fn kalman_gain(&self) -> &KalmanGain {
        &self.kalman_gain
    }

    /// Innovation from the most recent update.
    pub fn innovation(&self) -> &MeasurementVec {
        &self.innovation
    }

    pub fn phase(&self) -> FilterPhase {
        self.phase
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn snapshot(&self) -> KfSnapshot {
        let s = &self.state;
        let p = &self.covariance;
        let std = |i: usize| p[(i, i)].max(0.0).sqrt();

        KfSnapshot {
            position: (s[0], s[2], s[4]),
            velocity: (s[1], s[3], s[5]),
            position_std: (std(0), std(2), std(4)),
            velocity_std: (std(1), std(3), std(5)),
            covariance_trace: p.trace(),
            predict_count: self.predict_count,
            update_count: self.update_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoiseConfig;
    use crate::noise::GaussianNoiseModel;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn default_filter() -> LinearKf {
        LinearKf::new(&FilterConfig::default()).unwrap()
    }

    #[test]
    fn test_initial_state_identity() {
        let mut kf = default_filter();
        let init = [10.0, 2.0, 5.0, 1.0, 0.0, 0.0];
        kf.set_initial_state(&init).unwrap();

        assert_eq!(kf.state().as_slice(), &init);
        assert_eq!(kf.phase(), FilterPhase::AwaitingPredict);
    }

    #[test]
    fn test_first_predict_has_zero_acceleration() {
        let mut kf = default_filter();
        kf.set_initial_state(&[10.0, 2.0, 5.0, 1.0, 0.0, 0.0]).unwrap();

        let accel = kf.predict().unwrap();
        assert_eq!(accel, AxisVec::zeros());
    }

    #[test]
    fn test_deterministic_predict() {
        let mut kf = default_filter();
        kf.set_initial_state(&[10.0, 2.0, 5.0, 1.0, 0.0, 0.0]).unwrap();
        kf.predict().unwrap();

        let expected = StateVec::from_column_slice(&[10.2, 2.0, 5.1, 1.0, 0.0, 0.0]);
        assert_relative_eq!(*kf.predicted_state(), expected, epsilon = 1e-12);

        // P0 = diag(20, 10), F = [[1, dt], [0, 1]], Q = I per axis
        let p = kf.predicted_covariance();
        for axis in 0..AXIS_COUNT {
            let (i, j) = (position_index(axis), velocity_index(axis));
            assert_relative_eq!(p[(i, i)], 21.1, epsilon = 1e-12);
            assert_relative_eq!(p[(i, j)], 1.0, epsilon = 1e-12);
            assert_relative_eq!(p[(j, i)], 1.0, epsilon = 1e-12);
            assert_relative_eq!(p[(j, j)], 11.0, epsilon = 1e-12);
        }
        // No coupling between axes
        assert_eq!(p[(0, 2)], 0.0);
        assert_eq!(p[(1, 5)], 0.0);
    }

    #[test]
    fn test_transition_and_control_matrices() {
        let f = transition_matrix(0.1);
        let x = StateVec::from_column_slice(&[1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
        assert_relative_eq!(
            f * x,
            StateVec::from_column_slice(&[2.0, 10.0, 4.0, 20.0, 6.0, 30.0]),
            epsilon = 1e-12
        );

        let b = control_matrix(0.1);
        let u = b * AxisVec::new(1.0, 0.0, -2.0);
        assert_relative_eq!(
            u,
            StateVec::from_column_slice(&[0.005, 0.1, 0.0, 0.0, -0.01, -0.2]),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_estimate_acceleration() {
        let prev = AxisVec::new(1.0, 2.0, 3.0);
        let curr = AxisVec::new(1.5, 2.0, 2.0);
        let accel = estimate_acceleration(&prev, &curr, 0.1);
        assert_relative_eq!(accel, AxisVec::new(5.0, 0.0, -10.0), epsilon = 1e-12);
    }

    #[test]
    fn test_acceleration_uses_previous_cycle() {
        let mut kf = default_filter();
        kf.set_initial_state(&[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]).unwrap();
        let v0 = velocity_of(kf.state());

        kf.predict().unwrap();
        kf.update(&[0.1, 1.5, 0.1, 0.5, 0.1, 1.0]).unwrap();
        let v1 = velocity_of(kf.state());

        let accel = kf.predict().unwrap();
        assert_relative_eq!(accel, (v1 - v0) / 0.1, epsilon = 1e-9);
        assert!(accel[0] > 0.0);
        assert!(accel[1] < 0.0);
    }

    #[test]
    fn test_update_dimension_check() {
        let mut kf = default_filter();
        kf.predict().unwrap();

        let err = kf.update(&[1.0; 5]).unwrap_err();
        assert_eq!(
            err,
            EstimatorError::DimensionMismatch {
                what: "measurement",
                expected: 6,
                actual: 5,
            }
        );
        assert_eq!(kf.phase(), FilterPhase::Faulted);
        assert_eq!(kf.predict().unwrap_err(), EstimatorError::Faulted);
        assert_eq!(kf.update(&[0.0; 6]).unwrap_err(), EstimatorError::Faulted);

        kf.reinitialize(&[0.0; 6]).unwrap();
        assert!(kf.predict().is_ok());
    }

    #[test]
    fn test_initial_state_dimension_check() {
        let mut kf = default_filter();
        let err = kf.set_initial_state(&[1.0; 7]).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::DimensionMismatch { expected: 6, actual: 7, .. }
        ));
    }

    #[test]
    fn test_update_before_predict_rejected() {
        let mut kf = default_filter();
        let err = kf.update(&[0.0; 6]).unwrap_err();
        assert_eq!(
            err,
            EstimatorError::OutOfSequence {
                operation: "update",
                phase: FilterPhase::AwaitingPredict,
            }
        );
    }

    #[test]
    fn test_double_predict_rejected() {
        let mut kf = default_filter();
        kf.predict().unwrap();
        let err = kf.predict().unwrap_err();
        assert_eq!(
            err,
            EstimatorError::OutOfSequence {
                operation: "predict",
                phase: FilterPhase::AwaitingUpdate,
            }
        );
    }

    #[test]
    fn test_set_initial_state_mid_cycle_rejected() {
        let mut kf = default_filter();
        kf.predict().unwrap();
        assert!(matches!(
            kf.set_initial_state(&[0.0; 6]),
            Err(EstimatorError::OutOfSequence { .. })
        ));
    }

    #[test]
    fn test_non_finite_measurement_rejected() {
        let mut kf = default_filter();
        kf.predict().unwrap();
        let err = kf
            .update(&[0.0, 0.0, f64::NAN, 0.0, 0.0, 0.0])
            .unwrap_err();
        assert_eq!(err, EstimatorError::NonFiniteMeasurement { index: 2 });
        assert_eq!(kf.phase(), FilterPhase::Faulted);
        assert_eq!(kf.predict().unwrap_err(), EstimatorError::Faulted);
    }

    #[test]
    fn test_set_initial_state_after_cycle_rejected() {
        let mut kf = default_filter();
        kf.set_initial_state(&[0.0; 6]).unwrap();
        kf.predict().unwrap();
        kf.update(&[1.0; 6]).unwrap();
        assert_eq!(kf.phase(), FilterPhase::AwaitingPredict);
        let converged = *kf.state();

        let err = kf.set_initial_state(&[100.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(
            err,
            EstimatorError::OutOfSequence {
                operation: "set_initial_state",
                phase: FilterPhase::AwaitingPredict,
            }
        );
        assert_eq!(*kf.state(), converged);

        kf.reinitialize(&[100.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(kf.state()[0], 100.0);
        assert_relative_eq!(kf.snapshot().covariance_trace, 90.0);
    }

    #[test]
    fn test_zero_noise_converges_to_measurement() {
        let config = FilterConfig {
            measurement_noise: [1e-12; 6],
            ..FilterConfig::default()
        };
        let mut kf = LinearKf::new(&config).unwrap();
        kf.set_initial_state(&[0.0; 6]).unwrap();
        kf.predict().unwrap();

        let z = [5.0, 1.0, -3.0, 0.5, 2.0, -1.0];
        kf.update(&z).unwrap();

        assert_relative_eq!(
            *kf.state(),
            StateVec::from_column_slice(&z),
            epsilon = 1e-6
        );
        assert_relative_eq!(*kf.kalman_gain(), KalmanGain::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_huge_noise_ignores_measurement() {
        let config = FilterConfig {
            measurement_noise: [1e12; 6],
            ..FilterConfig::default()
        };
        let mut kf = LinearKf::new(&config).unwrap();
        kf.set_initial_state(&[10.0, 2.0, 5.0, 1.0, 0.0, 0.0]).unwrap();
        kf.predict().unwrap();
        let predicted = *kf.predicted_state();

        kf.update(&[100.0, -50.0, 100.0, -50.0, 100.0, -50.0]).unwrap();

        assert_relative_eq!(*kf.state(), predicted, epsilon = 1e-6);
        assert!(kf.kalman_gain().amax() < 1e-9);
    }

    fn assert_covariance_healthy(p: &StateMat, tol: f64) {
        assert!((p - p.transpose()).amax() < tol, "covariance not symmetric");
        for i in 0..6 {
            assert!(p[(i, i)] >= 0.0, "negative variance at {}", i);
        }
        let eigen = p.symmetric_eigen();
        assert!(eigen.eigenvalues.min() > -1e-9, "covariance not PSD");
    }

    fn run_cycles(config: FilterConfig, cycles: usize, tol: f64) {
        let mut kf = LinearKf::new(&config).unwrap();
        let noise = GaussianNoiseModel::new(&NoiseConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let mut truth = StateVec::from_column_slice(&[0.0, 30.0, 0.0, 5.0, 0.0, 60.0]);
        kf.set_initial_state(truth.as_slice()).unwrap();
        let f = transition_matrix(config.dt);

        for _ in 0..cycles {
            truth = f * truth;
            truth[5] -= 9.81 * config.dt;
            kf.predict().unwrap();
            let z = noise.sample(&truth, &mut rng);
            kf.update(z.as_slice()).unwrap();
            assert_covariance_healthy(kf.covariance(), tol);
        }
    }

    #[test]
    fn test_covariance_stays_symmetric() {
        run_cycles(FilterConfig::default(), 500, 1e-9);
    }

    #[test]
    fn test_joseph_form_symmetric_without_symmetrization() {
        let config = FilterConfig {
            symmetrize_covariance: false,
            ..FilterConfig::default()
        };
        run_cycles(config, 500, 1e-8);
    }

    #[test]
    fn test_singular_innovation_faults_filter() {
        let config = FilterConfig {
            process_noise: [0.0; 6],
            measurement_noise: [0.0; 6],
            initial_covariance: [0.0; 6],
            ..FilterConfig::default()
        };
        let mut kf = LinearKf::new(&config).unwrap();
        kf.predict().unwrap();

        assert_eq!(
            kf.update(&[1.0; 6]).unwrap_err(),
            EstimatorError::SingularInnovation
        );
        assert_eq!(kf.phase(), FilterPhase::Faulted);
        assert_eq!(kf.predict().unwrap_err(), EstimatorError::Faulted);
        assert_eq!(kf.set_initial_state(&[0.0; 6]).unwrap_err(), EstimatorError::Faulted);

        kf.reinitialize(&[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]).unwrap();
        assert_eq!(kf.phase(), FilterPhase::AwaitingPredict);
        assert!(kf.predict().is_ok());
    }

    #[test]
    fn test_reinitialize_restores_initial_covariance() {
        let mut kf = default_filter();
        kf.predict().unwrap();
        kf.update(&[1.0; 6]).unwrap();
        assert_ne!(*kf.covariance(), FilterConfig::default().initial_covariance_matrix());

        kf.reinitialize(&[0.0; 6]).unwrap();
        assert_eq!(*kf.covariance(), FilterConfig::default().initial_covariance_matrix());
        assert_eq!(kf.snapshot().update_count, 0);
    }

    #[test]
    fn test_snapshot_reports_state_and_counts() {
        let mut kf = default_filter();
        kf.set_initial_state(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        let snap = kf.snapshot();
        assert_eq!(snap.position, (1.0, 3.0, 5.0));
        assert_eq!(snap.velocity, (2.0, 4.0, 6.0));
        assert_relative_eq!(snap.position_std.0, 20.0_f64.sqrt());
        assert_relative_eq!(snap.covariance_trace, 90.0);

        kf.predict().unwrap();
        kf.update(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let snap = kf.snapshot();
        assert_eq!(snap.predict_count, 1);
        assert_eq!(snap.update_count, 1);
        assert!(snap.covariance_trace < 90.0);
    }
}
