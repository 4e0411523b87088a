// trajectory.rs — Offline run over a ground-truth trajectory
//
// Independent of file formats and the CLI: rows in, estimates and error
// statistics out. Row 0 seeds the filter; every later row drives one
// predict → measure → update cycle.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::error::{EstimatorError, Result};
use crate::filters::{KfSnapshot, LinearKf};
use crate::noise::GaussianNoiseModel;
use crate::types::{position_of, to_array, velocity_of, EstimateRow, StateVec, TruthRow};

/// Relative tolerance on row spacing before a timing mismatch is reported.
const DT_MISMATCH_RATIO: f64 = 0.01;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackingStats {
    pub samples: usize,
    pub position_rmse_filtered: f64,
    pub position_rmse_measured: f64,
    pub velocity_rmse_filtered: f64,
    pub velocity_rmse_measured: f64,
    pub max_position_error: f64,
    pub timing_mismatches: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrajectoryRun {
    pub rows: Vec<EstimateRow>,
    pub stats: TrackingStats,
    pub final_state: KfSnapshot,
}

/// Run the filter over `truth`, measuring each row through `noise`.
pub fn run_trajectory<R: Rng + ?Sized>(
    truth: &[TruthRow],
    config: &FilterConfig,
    noise: &GaussianNoiseModel,
    rng: &mut R,
) -> Result<TrajectoryRun> {
    let (first, rest) = truth.split_first().ok_or(EstimatorError::EmptyTrajectory)?;

    let mut kf = LinearKf::new(config)?;
    kf.set_initial_state(&first.state)?;

    let mut rows = Vec::with_capacity(rest.len());
    let mut timing_mismatches = 0usize;
    let mut last_t = first.t;

    for row in rest {
        let spacing = row.t - last_t;
        if (spacing - config.dt).abs() > DT_MISMATCH_RATIO * config.dt {
            if timing_mismatches == 0 {
                warn!(
                    "row spacing {:.4}s at t={:.3} differs from filter dt {:.4}s",
                    spacing, row.t, config.dt
                );
            }
            timing_mismatches += 1;
        }
        last_t = row.t;

        kf.predict()?;
        let measurement = noise.sample(&row.state_vec(), rng);
        kf.update(measurement.as_slice())?;

        rows.push(EstimateRow {
            t: row.t,
            truth: row.state,
            measurement: to_array(&measurement),
            estimate: to_array(kf.state()),
        });
    }

    if timing_mismatches > 1 {
        warn!("{} rows total with mismatched spacing", timing_mismatches);
    }

    let stats = tracking_stats(&rows, timing_mismatches);
    info!(
        "filtered {} rows: position RMSE {:.3} m (raw {:.3} m), velocity RMSE {:.4} m/s (raw {:.4} m/s)",
        stats.samples,
        stats.position_rmse_filtered,
        stats.position_rmse_measured,
        stats.velocity_rmse_filtered,
        stats.velocity_rmse_measured
    );

    Ok(TrajectoryRun {
        rows,
        stats,
        final_state: kf.snapshot(),
    })
}

fn rmse(squared_errors: &[f64]) -> f64 {
    if squared_errors.is_empty() {
        return f64::INFINITY;
    }
    (squared_errors.iter().sum::<f64>() / squared_errors.len() as f64).sqrt()
}

/// Euclidean position/velocity RMSE of estimates and raw measurements against truth.
pub fn tracking_stats(rows: &[EstimateRow], timing_mismatches: usize) -> TrackingStats {
    let mut pos_filtered = Vec::with_capacity(rows.len());
    let mut pos_measured = Vec::with_capacity(rows.len());
    let mut vel_filtered = Vec::with_capacity(rows.len());
    let mut vel_measured = Vec::with_capacity(rows.len());

    for row in rows {
        let truth = StateVec::from_column_slice(&row.truth);
        let estimate = StateVec::from_column_slice(&row.estimate);
        let measurement = StateVec::from_column_slice(&row.measurement);

        pos_filtered.push((position_of(&estimate) - position_of(&truth)).norm_squared());
        pos_measured.push((position_of(&measurement) - position_of(&truth)).norm_squared());
        vel_filtered.push((velocity_of(&estimate) - velocity_of(&truth)).norm_squared());
        vel_measured.push((velocity_of(&measurement) - velocity_of(&truth)).norm_squared());
    }

    let max_position_error = pos_filtered
        .iter()
        .copied()
        .fold(0.0_f64, |m, v| m.max(v.sqrt()));

    TrackingStats {
        samples: rows.len(),
        position_rmse_filtered: rmse(&pos_filtered),
        position_rmse_measured: rmse(&pos_measured),
        velocity_rmse_filtered: rmse(&vel_filtered),
        velocity_rmse_measured: rmse(&vel_measured),
        max_position_error,
        timing_mismatches,
    }
}

/// Parse a JSON array of `[t, x, vx, y, vy, z, vz]` rows.
pub fn parse_truth_rows(json: &str) -> Result<Vec<TruthRow>> {
    let raw: Vec<Vec<f64>> = serde_json::from_str(json)
        .map_err(|e| EstimatorError::TrajectoryFormat(format!("JSON: {e}")))?;
    raw.iter().map(|row| TruthRow::from_slice(row)).collect()
}

/// Load a trajectory file, gunzipping `.gz` paths.
pub fn load_truth(path: &Path) -> Result<Vec<TruthRow>> {
    let io_err =
        |e: std::io::Error| EstimatorError::TrajectoryFormat(format!("{}: {e}", path.display()));
    let file = File::open(path).map_err(io_err)?;

    let mut json = String::new();
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        BufReader::new(GzDecoder::new(file))
            .read_to_string(&mut json)
            .map_err(io_err)?;
    } else {
        BufReader::new(file).read_to_string(&mut json).map_err(io_err)?;
    }
    parse_truth_rows(&json)
}
