//! # constants
//!
//! Common constants used throughout the library.

use crate::geometry::transform::Location;

/// Top-level folder of a captured split.
pub const OUTPUT_FOLDER: &str = "training";
/// Camera images, `{id:06}.png`.
pub const IMAGES_FOLDER: &str = "image_2";
/// Lidar sweeps, `{id:06}.bin`.
pub const POINTCLOUDS_FOLDER: &str = "velodyne";
/// Object labels, `{id:06}.txt`.
pub const LABELS_FOLDER: &str = "label_2";
/// Calibration files, `{id:06}.txt`.
pub const CALIB_FOLDER: &str = "calib";

/// Number of `f32` values stored per lidar point (x, y, z, intensity).
pub const VELODYNE_POINT_DIMS: usize = 4;

/// Camera mount on the ego vehicle, matching the KITTI rig.
pub const CAMERA_MOUNT: Location = Location::new(0.0, 0.0, 1.65);
/// Lidar mount on the ego vehicle, matching the KITTI rig.
pub const LIDAR_MOUNT: Location = Location::new(-0.27, 0.0, 1.73);

/// KITTI image width.
pub const IMAGE_WIDTH_PX: usize = 1242;
/// KITTI image height.
pub const IMAGE_HEIGHT_PX: usize = 375;
/// Horizontal field of view of the RGB camera.
pub const CAMERA_FOV_DEG: f32 = 90.0;

/// HDL-64E vertical field of view, upper bound.
pub const LIDAR_UPPER_FOV_DEG: f32 = 2.0;
/// HDL-64E vertical field of view, lower bound.
pub const LIDAR_LOWER_FOV_DEG: f32 = -24.8;
/// HDL-64E laser count.
pub const LIDAR_CHANNELS: usize = 64;
/// HDL-64E range in meters.
pub const LIDAR_RANGE_M: f32 = 120.0;
/// HDL-64E points per second.
pub const LIDAR_POINTS_PER_SECOND: usize = 1_300_000;
/// Range noise standard deviation in meters.
pub const LIDAR_NOISE_STDDEV_M: f32 = 0.01;
/// Atmospheric attenuation rate per meter.
pub const LIDAR_ATMOSPHERE_ATTENUATION_RATE: f32 = 0.004;

/// Fixed simulation step in seconds.
pub const DEFAULT_FIXED_DELTA_SECONDS: f32 = 0.05;
/// Number of background vehicles.
pub const DEFAULT_NUMBER_OF_VEHICLES: usize = 30;
/// Number of frames to capture.
pub const DEFAULT_FRAMES: usize = 10;
/// Distance kept by autopilot vehicles to the vehicle ahead, in meters.
pub const DEFAULT_DISTANCE_TO_LEADING_VEHICLE_M: f32 = 2.5;
/// Ego vehicle blueprint.
pub const EGO_VEHICLE_BLUEPRINT: &str = "vehicle.lincoln.mkz_2017";
/// Index of the spawn point reserved for the ego vehicle.
pub const EGO_SPAWN_POINT_INDEX: usize = 0;

/// Objects farther than this from the ego vehicle are not labeled.
pub const MAX_LABEL_DISTANCE_M: f32 = 50.0;
/// Minimum dot product between the ego forward vector and the ego-to-object ray.
pub const FORWARD_DOT_THRESHOLD: f32 = 1.0;
/// Upper bound on simulation ticks spent per captured frame before giving up.
pub const MAX_TICKS_PER_FRAME: usize = 20;

/// Height added to a label's bottom-centre when rebuilding a box in the lidar frame.
pub const ANALYSER_VERTICAL_OFFSET_M: f32 = 0.15;
/// Number of histogram bin edges.
pub const HISTOGRAM_NUM_EDGES: usize = 20;

/// World units per map pixel.
pub const MAP_PIXEL_DENSITY: f64 = 16.43;
/// Height reported for positions recovered from the map raster.
pub const MAP_WORLD_Z: f64 = 22.0;
/// Arm length of the marker drawn by `CityMap::draw_position_on_map`.
pub const MAP_MARKER_SIZE_PX: usize = 20;
