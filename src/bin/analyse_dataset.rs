//! # analyse_dataset
//!
//! Counts the lidar points inside every labeled box of a KITTI split and prints the
//! histogram of the counts.

#[macro_use]
extern crate log;

use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::Parser;
use simkitti::{
    analysis::{AnalyserConfig, DatasetAnalyser},
    constants::{ANALYSER_VERTICAL_OFFSET_M, HISTOGRAM_NUM_EDGES},
    io::{write_feather, write_image_rgba8},
    label::ObjectType,
    path::KittiLayout,
};

/// Size of the histogram plot.
const PLOT_SIZE_PX: (u32, u32) = (760, 400);

/// Width of the text histogram bars.
const TEXT_BAR_WIDTH: usize = 50;

#[derive(Parser, Debug)]
#[command(about = "Histogram of lidar points per labeled box")]
struct Args {
    /// Split directory holding `label_2`, `velodyne` and optionally `calib`.
    dataset_dir: PathBuf,

    /// Number of histogram bin edges.
    #[arg(short, long, default_value_t = HISTOGRAM_NUM_EDGES)]
    bins: usize,

    /// Object type to analyse.
    #[arg(short = 't', long, default_value_t = ObjectType::Car)]
    object_type: ObjectType,

    /// Height added to the box centres in the lidar frame.
    #[arg(long, default_value_t = ANALYSER_VERTICAL_OFFSET_M)]
    vertical_offset: f32,

    /// Only count points inside the colour camera image.
    #[arg(long)]
    camera_fov: bool,

    /// Save the histogram as a PNG bar chart.
    #[arg(long)]
    png: Option<PathBuf>,

    /// Save the per-box counts as a feather table.
    #[arg(long)]
    feather: Option<PathBuf>,
}

/// Script entrypoint.
pub fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let layout = KittiLayout::new(&args.dataset_dir);
    ensure!(
        layout.label_dir().is_dir(),
        "Cannot find labels in {}.",
        layout.label_dir().display()
    );

    let analyser = DatasetAnalyser::new(
        layout,
        AnalyserConfig {
            object_type: args.object_type,
            vertical_offset_m: args.vertical_offset,
            num_bin_edges: args.bins,
            camera_fov_only: args.camera_fov,
        },
    );
    let report = analyser.run()?;

    println!(
        "Analysed {} boxes in {} samples.",
        report.records.len(),
        report.num_samples
    );
    if report.histogram.is_empty() {
        warn!("No {} labels found.", args.object_type);
        return Ok(());
    }
    print!("{}", report.histogram.render_text(TEXT_BAR_WIDTH));

    if let Some(path) = &args.png {
        let (width, height) = PLOT_SIZE_PX;
        write_image_rgba8(path, &report.histogram.render_image(width, height))?;
        info!("Saved histogram plot to {}.", path.display());
    }
    if let Some(path) = &args.feather {
        write_feather(path, &mut report.to_frame()?)?;
        info!("Saved box counts to {}.", path.display());
    }
    Ok(())
}
