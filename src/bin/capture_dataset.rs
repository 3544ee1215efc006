//! # capture_dataset
//!
//! Drives the synthetic simulator and writes a KITTI-style split.
//! Every run is written to `<output>/run_<unix seconds>/training`.

#[macro_use]
extern crate log;

use std::{
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use clap::Parser;
use simkitti::{
    capture::{capture, CaptureConfig},
    constants::{
        DEFAULT_DISTANCE_TO_LEADING_VEHICLE_M, DEFAULT_FIXED_DELTA_SECONDS, DEFAULT_FRAMES,
        DEFAULT_NUMBER_OF_VEHICLES, OUTPUT_FOLDER,
    },
    io::{read_reflectivity_table, read_vehicle_list},
    path::DEFAULT_DATASET_DIR,
    simulator::{
        blueprints::{default_reflectivity_table, default_vehicle_list},
        synthetic::{SyntheticConfig, SyntheticWorld},
    },
};

#[derive(Parser, Debug)]
#[command(about = "Capture camera images, lidar sweeps and labels in KITTI format")]
struct Args {
    /// Number of frames to capture.
    #[arg(short, long, default_value_t = DEFAULT_FRAMES)]
    frames: usize,

    /// Number of background vehicles.
    #[arg(short = 'n', long, default_value_t = DEFAULT_NUMBER_OF_VEHICLES)]
    vehicles: usize,

    /// Simulation step in seconds.
    #[arg(long, default_value_t = DEFAULT_FIXED_DELTA_SECONDS)]
    delta: f32,

    /// Gap autopilot vehicles keep to the vehicle ahead, in meters.
    #[arg(long, default_value_t = DEFAULT_DISTANCE_TO_LEADING_VEHICLE_M)]
    leading_distance: f32,

    /// Seed of the world and the traffic selection.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Dataset root directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Vehicle list JSON (`{"vehicles": [{"api_bp_name", "unreal_actor_name"}]}`).
    #[arg(long)]
    vehicle_list: Option<PathBuf>,

    /// Lidar material table JSON (`{"materials": [{"name", "reflectivity"}]}`).
    #[arg(long)]
    materials: Option<PathBuf>,

    /// Milliseconds to wait after every tick.
    #[arg(long, default_value_t = 0)]
    tick_sleep_ms: u64,
}

/// Script entrypoint.
pub fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let vehicle_list = match &args.vehicle_list {
        Some(path) => read_vehicle_list(path)?,
        None => default_vehicle_list(),
    };
    let reflectivity = match &args.materials {
        Some(path) => read_reflectivity_table(path)?,
        None => default_reflectivity_table(),
    };

    let run = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the unix epoch.")?
        .as_secs();
    let output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| DEFAULT_DATASET_DIR.clone())
        .join(format!("run_{run}"))
        .join(OUTPUT_FOLDER);
    info!("Writing dataset to {}.", output_dir.display());

    let mut world = SyntheticWorld::new(SyntheticConfig {
        seed: args.seed,
        reflectivity,
        vehicle_list: vehicle_list.clone(),
        ..Default::default()
    });
    let mut config = CaptureConfig::new(&output_dir);
    config.frames = args.frames;
    config.number_of_vehicles = args.vehicles;
    config.fixed_delta_seconds = args.delta;
    config.distance_to_leading_vehicle_m = args.leading_distance;
    config.seed = args.seed;
    config.vehicle_list = vehicle_list;
    config.tick_sleep = (args.tick_sleep_ms > 0).then(|| Duration::from_millis(args.tick_sleep_ms));

    let summary = capture(&mut world, config)?;
    println!(
        "Captured {} frames with {} labels in {} ticks into {}.",
        summary.sample_ids.len(),
        summary.num_labels,
        summary.ticks,
        output_dir.display()
    );
    Ok(())
}
