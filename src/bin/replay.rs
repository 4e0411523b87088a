use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Parser;
use log::{error, info, LevelFilter};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use trajectory_kf_rs::trajectory::load_truth;
use trajectory_kf_rs::{run_trajectory, FilterConfig, GaussianNoiseModel, NoiseConfig};

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Replay a ground-truth trajectory through the Kalman filter with synthetic sensor noise", long_about = None)]
struct Args {
    /// Path to a trajectory file (JSON array of [t, x, vx, y, vy, z, vz] rows, optionally .gz)
    #[arg(long, conflicts_with = "truth_dir")]
    truth: Option<PathBuf>,

    /// Directory of trajectories to batch replay (processes *.json and *.json.gz)
    #[arg(long)]
    truth_dir: Option<PathBuf>,

    /// Filter configuration JSON (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the filter time step [s]
    #[arg(long)]
    dt: Option<f64>,

    /// Position noise std for synthetic measurements [m]
    #[arg(long, default_value = "3.0")]
    position_std: f64,

    /// Velocity noise std for synthetic measurements [m/s]
    #[arg(long, default_value = "0.05")]
    velocity_std: f64,

    /// RNG seed for reproducible measurement noise
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Output file for a single replay (default: timestamped file in --output-dir)
    #[arg(long, conflicts_with = "truth_dir")]
    output: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = "kf_runs")]
    output_dir: PathBuf,

    /// Debug logging
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

fn load_config(args: &Args) -> anyhow::Result<FilterConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => FilterConfig::load(path)?,
        None => FilterConfig::default(),
    };
    if let Some(dt) = args.dt {
        config.dt = dt;
    }
    config.validate()?;
    Ok(config)
}

/// `a.json` -> `a`, `a.json.gz` -> `a_gz`, so compressed and plain inputs never collide.
fn output_stem(truth: &Path) -> String {
    let name = truth
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("trajectory");
    match name.strip_suffix(".gz") {
        Some(inner) => format!("{}_gz", inner.trim_end_matches(".json")),
        None => name.trim_end_matches(".json").to_string(),
    }
}

fn output_path_for(truth: &Path, args: &Args) -> PathBuf {
    if let Some(out) = args.output.as_ref() {
        return out.clone();
    }
    args.output_dir.join(format!(
        "estimates_{}_{}.json",
        output_stem(truth),
        ts_now_clean()
    ))
}

/// Trajectory files in `dir`, sorted by path for a stable replay order.
fn list_truth_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.ends_with(".json") || name.ends_with(".json.gz") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn run_once(
    path: &Path,
    config: &FilterConfig,
    noise: &GaussianNoiseModel,
    args: &Args,
) -> anyhow::Result<serde_json::Value> {
    let truth = load_truth(path)?;
    info!("{}: {} rows", path.display(), truth.len());

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let run = run_trajectory(&truth, config, noise, &mut rng)?;

    let out_path = output_path_for(path, args);
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&out_path, serde_json::to_string_pretty(&run)?)?;
    info!("wrote {} estimates to {}", run.rows.len(), out_path.display());

    Ok(json!({
        "truth": path.display().to_string(),
        "output": out_path.display().to_string(),
        "seed": args.seed,
        "dt": config.dt,
        "stats": run.stats,
        "final_state": run.final_state,
    }))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    let config = load_config(&args)?;
    let noise = GaussianNoiseModel::new(&NoiseConfig {
        position_std: args.position_std,
        velocity_std: args.velocity_std,
    })?;

    let mut results = Vec::new();

    if let Some(dir) = args.truth_dir.as_ref() {
        for path in list_truth_files(dir)? {
            match run_once(&path, &config, &noise, &args) {
                Ok(res) => results.push(res),
                Err(e) => error!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(truth) = args.truth.as_ref() {
        results.push(run_once(truth, &config, &noise, &args)?);
    } else {
        anyhow::bail!("Provide --truth or --truth-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
