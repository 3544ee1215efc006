//! # city_map
//!
//! World and map pixel conversions on a city map raster.

#[macro_use]
extern crate log;

use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::{Parser, Subcommand};
use image::Rgba;
use simkitti::{io::write_image_rgba8, map::CityMap};

#[derive(Parser, Debug)]
#[command(about = "Convert between world positions and city map pixels")]
struct Args {
    /// Directory holding `<city>.txt` and `<city>.png`.
    #[arg(short, long)]
    map_dir: PathBuf,

    /// City name.
    #[arg(short, long, default_value = "Town01")]
    city: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pixel containing a world position.
    ToPixel {
        /// World x, y and z.
        #[arg(required = true, num_args = 3, allow_negative_numbers = true)]
        world: Vec<f64>,
    },
    /// World position of a pixel centre.
    ToWorld {
        /// Pixel column and row.
        #[arg(required = true, num_args = 2, allow_negative_numbers = true)]
        pixel: Vec<i64>,
    },
    /// Lane direction at a world position.
    Lane {
        /// World x, y and z.
        #[arg(required = true, num_args = 3, allow_negative_numbers = true)]
        world: Vec<f64>,
    },
    /// Mark world positions on the map and save the view.
    Draw {
        /// Output PNG.
        #[arg(short, long)]
        output: PathBuf,

        /// Positions as `x,y,z`.
        #[arg(required = true, value_parser = parse_position, allow_hyphen_values = true)]
        positions: Vec<[f64; 3]>,

        /// Marker arm length in pixels.
        #[arg(long)]
        size: Option<usize>,

        /// Resize the view to `height,width`.
        #[arg(long, value_parser = parse_size)]
        view: Option<(u32, u32)>,
    },
}

fn parse_position(text: &str) -> Result<[f64; 3]> {
    let values = text
        .split(',')
        .map(|value| value.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;
    ensure!(values.len() == 3, "Expected `x,y,z`, got `{text}`.");
    Ok([values[0], values[1], values[2]])
}

fn parse_size(text: &str) -> Result<(u32, u32)> {
    let (height, width) = text
        .split_once(',')
        .ok_or_else(|| anyhow::anyhow!("Expected `height,width`, got `{text}`."))?;
    Ok((height.trim().parse()?, width.trim().parse()?))
}

fn to_world(values: &[f64]) -> [f64; 3] {
    [values[0], values[1], values[2]]
}

/// Script entrypoint.
pub fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut map = CityMap::load(&args.map_dir, &args.city)?;
    info!(
        "Loaded {} ({}x{} pixels).",
        args.city,
        map.raster.width(),
        map.raster.height()
    );

    match args.command {
        Command::ToPixel { world } => {
            let [column, row] = map.position_on_map(to_world(&world));
            println!("{column} {row}");
        }
        Command::ToWorld { pixel } => {
            let [x, y, z] = map.position_on_world([pixel[0], pixel[1]]);
            println!("{x:.3} {y:.3} {z:.3}");
        }
        Command::Lane { world } => {
            let (x, y) = map.lane_orientation(to_world(&world))?;
            println!("{x:.6} {y:.6}");
        }
        Command::Draw {
            output,
            positions,
            size,
            view,
        } => {
            for position in positions {
                map.draw_position_on_map(position, Rgba([255, 0, 0, 255]), size);
            }
            write_image_rgba8(&output, &map.map_view(view))?;
            info!("Saved map view to {}.", output.display());
        }
    }
    Ok(())
}
