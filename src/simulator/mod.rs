//! # simulator
//!
//! Driving simulator interface used by the capture loop.
//!
//! Coordinates follow the simulator world: x forward, y right, z up, angles in degrees.
//! Sensors stream their measurements through channels obtained with `listen_*`; the
//! simulation only advances on `tick` when running in synchronous mode.

pub mod blueprints;
pub mod lidar;
pub mod synthetic;

use std::{fmt, sync::mpsc::Receiver};

use anyhow::Result;
use image::RgbaImage;
use ndarray::Array2;

use crate::geometry::transform::{BoundingBox, Transform};
use blueprints::{CameraBlueprint, LidarBlueprint, VehicleBlueprint};

/// Actor handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// World stepping settings.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WorldSettings {
    /// The world only advances on `tick` when set.
    pub synchronous_mode: bool,
    /// Fixed step length; variable stepping when `None`.
    pub fixed_delta_seconds: Option<f32>,
}

/// Traffic manager behaviour for autopilot vehicles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrafficManagerSettings {
    /// Step autopilot vehicles only on world ticks.
    pub synchronous_mode: bool,
    /// Gap kept to the vehicle ahead, in meters.
    pub global_distance_to_leading_vehicle_m: f32,
}

/// Request to spawn a vehicle.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnRequest {
    /// Vehicle model.
    pub blueprint: VehicleBlueprint,
    /// Initial pose.
    pub transform: Transform,
    /// Paint colour; the first recommended colour when `None`.
    pub color: Option<[u8; 3]>,
    /// Role, e.g. `autopilot` or `hero`.
    pub role_name: String,
    /// Hand the vehicle to the traffic manager.
    pub autopilot: bool,
}

/// State of an actor at the current frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorSnapshot {
    /// Handle.
    pub id: ActorId,
    /// Blueprint id, e.g. `vehicle.audi.a2` or `sensor.lidar.ray_cast`.
    pub type_id: String,
    /// World pose.
    pub transform: Transform,
    /// Bounding box relative to `transform`.
    pub bounding_box: BoundingBox,
}

impl ActorSnapshot {
    /// Whether the actor is a vehicle.
    pub fn is_vehicle(&self) -> bool {
        self.type_id.starts_with("vehicle.")
    }
}

/// Camera frame.
#[derive(Clone, Debug)]
pub struct ImageMeasurement {
    /// Simulation frame the image was taken at.
    pub frame: u64,
    /// Camera pose at capture time.
    pub transform: Transform,
    /// Pixels.
    pub image: RgbaImage,
}

/// Lidar sweep.
#[derive(Clone, Debug)]
pub struct LidarMeasurement {
    /// Simulation frame the sweep ends at.
    pub frame: u64,
    /// Lidar pose at capture time.
    pub transform: Transform,
    /// (N,4) `x, y, z, intensity` in the sensor frame (x forward, y right, z up).
    pub points: Array2<f32>,
    /// Points per laser.
    pub channel_counts: Vec<usize>,
}

/// Operations the capture loop needs from a simulator.
pub trait Simulator {
    /// Current world settings.
    fn settings(&self) -> WorldSettings;

    /// Replace the world settings.
    fn apply_settings(&mut self, settings: WorldSettings) -> Result<()>;

    /// Configure the traffic manager.
    fn configure_traffic_manager(&mut self, settings: TrafficManagerSettings) -> Result<()>;

    /// Recommended vehicle spawn poses of the map.
    fn spawn_points(&self) -> Vec<Transform>;

    /// Every vehicle model available.
    fn vehicle_blueprints(&self) -> Vec<VehicleBlueprint>;

    /// Spawn a vehicle.
    fn spawn_actor(&mut self, request: SpawnRequest) -> Result<ActorId>;

    /// Spawn several vehicles, reporting each outcome.
    fn spawn_batch(&mut self, requests: Vec<SpawnRequest>) -> Vec<Result<ActorId>> {
        requests
            .into_iter()
            .map(|request| self.spawn_actor(request))
            .collect()
    }

    /// Attach a camera to `parent` at `mount`, relative to the parent.
    fn spawn_camera(
        &mut self,
        blueprint: &CameraBlueprint,
        mount: Transform,
        parent: ActorId,
    ) -> Result<ActorId>;

    /// Attach a lidar to `parent` at `mount`, relative to the parent.
    fn spawn_lidar(
        &mut self,
        blueprint: &LidarBlueprint,
        mount: Transform,
        parent: ActorId,
    ) -> Result<ActorId>;

    /// Start streaming camera frames.
    fn listen_camera(&mut self, camera: ActorId) -> Result<Receiver<ImageMeasurement>>;

    /// Start streaming lidar sweeps.
    fn listen_lidar(&mut self, lidar: ActorId) -> Result<Receiver<LidarMeasurement>>;

    /// Advance one step and return the new frame number.
    fn tick(&mut self) -> Result<u64>;

    /// Snapshot of one actor.
    fn actor(&self, id: ActorId) -> Result<ActorSnapshot>;

    /// Snapshots of every vehicle in the world.
    fn vehicles(&self) -> Vec<ActorSnapshot>;

    /// Remove an actor.
    fn destroy_actor(&mut self, id: ActorId) -> Result<()>;

    /// Remove several actors, reporting each outcome.
    fn destroy_batch(&mut self, ids: &[ActorId]) -> Vec<Result<()>> {
        ids.iter().map(|id| self.destroy_actor(*id)).collect()
    }
}
