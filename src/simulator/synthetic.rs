//! # synthetic
//!
//! In-process simulator: a straight multi-lane road that loops on itself, autopilot
//! traffic, a ray-cast lidar and a flat-shaded camera.
//!
//! Vehicles move along their lane only. The `station` of a vehicle is the distance
//! travelled along its lane, modulo the road length.

use std::{
    collections::BTreeMap,
    sync::mpsc::{self, Receiver, Sender},
};

use anyhow::{bail, ensure, Context, Result};
use image::{Rgba, RgbaImage};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{
    blueprints::{
        default_reflectivity_table, default_vehicle_list, vehicle_library, CameraBlueprint,
        LidarBlueprint, ReflectivityTable, VehicleBlueprint, VehicleList,
    },
    lidar::{Obstacle, RayCastLidar},
    ActorId, ActorSnapshot, ImageMeasurement, LidarMeasurement, Simulator, SpawnRequest,
    TrafficManagerSettings, WorldSettings,
};
use crate::{
    constants::{DEFAULT_DISTANCE_TO_LEADING_VEHICLE_M, DEFAULT_FIXED_DELTA_SECONDS},
    geometry::{
        camera::pinhole_camera::{Intrinsics, PinholeCamera},
        transform::{BoundingBox, Location, Rotation, Transform},
    },
};

const MAX_ACCELERATION: f32 = 3.0;
const MAX_DECELERATION: f32 = 6.0;
const TIME_HEADWAY_S: f32 = 1.0;
const LANE_TOLERANCE_M: f32 = 1.0;
const SKY: [u8; 3] = [135, 175, 220];
const GROUND: [u8; 3] = [90, 90, 95];

/// A lane of the road.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lane {
    /// Lateral position of the lane centre (world y).
    pub offset_m: f32,
    /// Travel direction: along +x when true, along -x otherwise.
    pub forward: bool,
}

impl Lane {
    fn yaw_deg(&self) -> f32 {
        if self.forward {
            0.
        } else {
            180.
        }
    }
}

/// Layout and contents of a synthetic world.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Seed of every random draw in the world.
    pub seed: u64,
    /// Length of the looping road.
    pub road_length_m: f32,
    /// Distance between consecutive spawn points on a lane.
    pub spawn_spacing_m: f32,
    /// Lanes, in spawn point order.
    pub lanes: Vec<Lane>,
    /// Available vehicle models.
    pub blueprints: Vec<VehicleBlueprint>,
    /// Lidar material table.
    pub reflectivity: ReflectivityTable,
    /// Vehicles whose materials the lidar resolves.
    pub vehicle_list: VehicleList,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            road_length_m: 600.,
            spawn_spacing_m: 15.,
            lanes: vec![
                Lane {
                    offset_m: 1.75,
                    forward: true,
                },
                Lane {
                    offset_m: 5.25,
                    forward: true,
                },
                Lane {
                    offset_m: -1.75,
                    forward: false,
                },
                Lane {
                    offset_m: -5.25,
                    forward: false,
                },
            ],
            blueprints: vehicle_library(),
            reflectivity: default_reflectivity_table(),
            vehicle_list: default_vehicle_list(),
        }
    }
}

#[derive(Clone, Debug)]
struct Vehicle {
    blueprint: VehicleBlueprint,
    color: [u8; 3],
    lane: usize,
    station_m: f32,
    speed: f32,
    target_speed: f32,
    autopilot: bool,
}

#[derive(Debug)]
struct CameraSensor {
    parent: ActorId,
    mount: Transform,
    blueprint: CameraBlueprint,
    sender: Option<Sender<ImageMeasurement>>,
}

#[derive(Debug)]
struct LidarSensor {
    parent: ActorId,
    mount: Transform,
    model: RayCastLidar,
    sender: Option<Sender<LidarMeasurement>>,
}

#[derive(Debug)]
enum Actor {
    Vehicle(Vehicle),
    Camera(CameraSensor),
    Lidar(LidarSensor),
}

/// In-process `Simulator`.
#[derive(Debug)]
pub struct SyntheticWorld {
    config: SyntheticConfig,
    settings: WorldSettings,
    traffic_manager: TrafficManagerSettings,
    actors: BTreeMap<ActorId, Actor>,
    next_id: u32,
    frame: u64,
    rng: StdRng,
}

impl SyntheticWorld {
    /// Construct a new `SyntheticWorld` in asynchronous mode.
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            settings: WorldSettings::default(),
            traffic_manager: TrafficManagerSettings {
                synchronous_mode: false,
                global_distance_to_leading_vehicle_m: DEFAULT_DISTANCE_TO_LEADING_VEHICLE_M,
            },
            actors: BTreeMap::new(),
            next_id: 1,
            frame: 0,
        }
    }

    /// Current frame number.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of live actors, sensors included.
    pub fn num_actors(&self) -> usize {
        self.actors.len()
    }

    /// Traffic manager settings in use.
    pub fn traffic_manager(&self) -> TrafficManagerSettings {
        self.traffic_manager
    }

    fn lane_pose(&self, lane: usize, station_m: f32) -> Transform {
        let lane = self.config.lanes[lane];
        let length = self.config.road_length_m;
        let x = if lane.forward {
            station_m.rem_euclid(length)
        } else {
            (length - station_m).rem_euclid(length)
        };
        Transform::new(
            Location::new(x, lane.offset_m, 0.),
            Rotation::from_yaw(lane.yaw_deg()),
        )
    }

    /// Lane and station of a pose lying on a lane centre with the lane heading.
    fn locate_on_road(&self, transform: &Transform) -> Option<(usize, f32)> {
        let forward = transform.forward_vector().x >= 0.;
        let length = self.config.road_length_m;
        self.config
            .lanes
            .iter()
            .position(|lane| {
                lane.forward == forward
                    && (lane.offset_m - transform.location.y).abs() < LANE_TOLERANCE_M
            })
            .map(|lane| {
                let x = transform.location.x;
                let station = if forward { x } else { length - x };
                (lane, station.rem_euclid(length))
            })
    }

    /// Gap along the lane from `from` to `to`, in `[0, road_length)`.
    fn lane_gap(&self, from: f32, to: f32) -> f32 {
        (to - from).rem_euclid(self.config.road_length_m)
    }

    fn vehicle_entries(&self) -> impl Iterator<Item = (ActorId, &Vehicle)> {
        self.actors.iter().filter_map(|(id, actor)| match actor {
            Actor::Vehicle(vehicle) => Some((*id, vehicle)),
            _ => None,
        })
    }

    fn vehicle_snapshot(&self, id: ActorId, vehicle: &Vehicle) -> ActorSnapshot {
        let extent = vehicle.blueprint.extent;
        ActorSnapshot {
            id,
            type_id: vehicle.blueprint.id.clone(),
            transform: self.lane_pose(vehicle.lane, vehicle.station_m),
            bounding_box: BoundingBox::new(Location::new(0., 0., extent.z), extent),
        }
    }

    fn parent_transform(&self, parent: ActorId) -> Option<Transform> {
        match self.actors.get(&parent) {
            Some(Actor::Vehicle(vehicle)) => {
                Some(self.lane_pose(vehicle.lane, vehicle.station_m))
            }
            _ => None,
        }
    }

    fn ensure_vehicle(&self, id: ActorId) -> Result<()> {
        match self.actors.get(&id) {
            Some(Actor::Vehicle(_)) => Ok(()),
            Some(_) => bail!("Actor {id} is not a vehicle."),
            None => bail!("Actor {id} not found."),
        }
    }

    fn insert(&mut self, actor: Actor) -> ActorId {
        let id = ActorId(self.next_id);
        self.next_id += 1;
        self.actors.insert(id, actor);
        id
    }

    fn step_traffic(&mut self, delta_seconds: f32) {
        let min_gap = self.traffic_manager.global_distance_to_leading_vehicle_m;
        let vehicles: Vec<(ActorId, usize, f32, f32)> = self
            .vehicle_entries()
            .map(|(id, v)| (id, v.lane, v.station_m, v.blueprint.extent.x))
            .collect();

        let mut speeds = BTreeMap::new();
        for (id, vehicle) in self.vehicle_entries() {
            if !vehicle.autopilot {
                continue;
            }
            let bumper_gap = vehicles
                .iter()
                .filter(|(other, lane, _, _)| *other != id && *lane == vehicle.lane)
                .map(|(_, _, station, half_length)| {
                    self.lane_gap(vehicle.station_m, *station)
                        - half_length
                        - vehicle.blueprint.extent.x
                })
                .fold(f32::INFINITY, f32::min);
            let safe_speed = ((bumper_gap - min_gap) / TIME_HEADWAY_S).max(0.);
            let desired = vehicle.target_speed.min(safe_speed);
            let change = (desired - vehicle.speed).clamp(
                -MAX_DECELERATION * delta_seconds,
                MAX_ACCELERATION * delta_seconds,
            );
            // Never drive into the gap kept to the leader within this step.
            let speed = (vehicle.speed + change)
                .min(((bumper_gap - min_gap) / delta_seconds).max(0.))
                .max(0.);
            speeds.insert(id, speed);
        }

        let length = self.config.road_length_m;
        for (id, speed) in speeds {
            if let Some(Actor::Vehicle(vehicle)) = self.actors.get_mut(&id) {
                vehicle.speed = speed;
                vehicle.station_m = (vehicle.station_m + speed * delta_seconds).rem_euclid(length);
            }
        }
    }

    fn obstacles(&self, skip: ActorId) -> Vec<Obstacle> {
        self.vehicle_entries()
            .filter(|(id, _)| *id != skip)
            .map(|(id, vehicle)| {
                let snapshot = self.vehicle_snapshot(id, vehicle);
                let center = snapshot
                    .transform
                    .transform_point(&snapshot.bounding_box.location);
                let extent = vehicle.blueprint.extent;
                Obstacle {
                    actor_name: format!("{}_C_{}", vehicle.blueprint.unreal_actor_name, id),
                    material: vehicle.blueprint.material.clone(),
                    center: [center.x, center.y, center.z],
                    half_extent: [extent.x, extent.y, extent.z],
                    yaw_rad: snapshot.transform.rotation.yaw.to_radians(),
                }
            })
            .collect()
    }

    fn render_camera(&self, camera: &PinholeCamera, skip: ActorId) -> RgbaImage {
        let width = camera.width_px() as u32;
        let height = camera.height_px() as u32;
        let horizon = camera.intrinsics.cy_px;
        let mut image = RgbaImage::from_fn(width, height, |_, v| {
            let [r, g, b] = if (v as f32 + 0.5) < horizon {
                SKY
            } else {
                GROUND
            };
            Rgba([r, g, b, 255])
        });

        let mut boxes: Vec<(f32, [f32; 4], [u8; 3])> = self
            .vehicle_entries()
            .filter(|(id, _)| *id != skip)
            .filter_map(|(id, vehicle)| {
                let snapshot = self.vehicle_snapshot(id, vehicle);
                let vertices = snapshot
                    .bounding_box
                    .world_vertices(&snapshot.transform);
                let (uvz, _, _) = camera.project_world_to_image(&vertices.view());
                if uvz.column(2).iter().any(|&z| z <= 0.1) {
                    return None;
                }
                let bounds = uvz.outer_iter().fold(
                    [f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY],
                    |b, p| [b[0].min(p[0]), b[1].min(p[1]), b[2].max(p[0]), b[3].max(p[1])],
                );
                let depth = uvz.column(2).mean().unwrap_or(0.);
                Some((depth, bounds, vehicle.color))
            })
            .collect();
        // Far to near, so nearer vehicles are painted over farther ones.
        boxes.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (_, [left, top, right, bottom], color) in boxes {
            let u0 = left.max(0.) as u32;
            let u1 = (right.min(width as f32)).max(0.) as u32;
            let v0 = top.max(0.) as u32;
            let v1 = (bottom.min(height as f32)).max(0.) as u32;
            let shade_row = top + 0.7 * (bottom - top);
            for v in v0..v1 {
                let shade = if (v as f32) < shade_row { 1.0 } else { 0.6 };
                let pixel = Rgba([
                    (color[0] as f32 * shade) as u8,
                    (color[1] as f32 * shade) as u8,
                    (color[2] as f32 * shade) as u8,
                    255,
                ]);
                for u in u0..u1 {
                    image.put_pixel(u, v, pixel);
                }
            }
        }
        image
    }

    fn publish_measurements(&mut self, delta_seconds: f32) {
        let frame = self.frame;

        let mut images = Vec::new();
        for (id, actor) in &self.actors {
            let Actor::Camera(camera) = actor else {
                continue;
            };
            let (Some(sender), Some(parent)) =
                (&camera.sender, self.parent_transform(camera.parent))
            else {
                continue;
            };
            let transform = parent.compose(&camera.mount);
            let intrinsics = Intrinsics::from_fov(
                camera.blueprint.image_size_x,
                camera.blueprint.image_size_y,
                camera.blueprint.fov_deg,
            );
            let pinhole = PinholeCamera::new(&transform, intrinsics);
            let image = self.render_camera(&pinhole, camera.parent);
            images.push((*id, sender.clone(), ImageMeasurement {
                frame,
                transform,
                image,
            }));
        }

        let lidar_inputs: Vec<(ActorId, Transform, Vec<Obstacle>)> = self
            .actors
            .iter()
            .filter_map(|(id, actor)| match actor {
                Actor::Lidar(lidar) if lidar.sender.is_some() => self
                    .parent_transform(lidar.parent)
                    .map(|parent| (*id, parent.compose(&lidar.mount), self.obstacles(lidar.parent))),
                _ => None,
            })
            .collect();

        let mut sweeps = Vec::new();
        for (id, transform, obstacles) in lidar_inputs {
            if let Some(Actor::Lidar(lidar)) = self.actors.get_mut(&id) {
                let (points, channel_counts) =
                    lidar
                        .model
                        .scan(&transform, &obstacles, delta_seconds, &mut self.rng);
                if let Some(sender) = &lidar.sender {
                    sweeps.push((id, sender.clone(), LidarMeasurement {
                        frame,
                        transform,
                        points,
                        channel_counts,
                    }));
                }
            }
        }

        for (id, sender, image) in images {
            if sender.send(image).is_err() {
                debug!("Camera {id} has no listener anymore.");
            }
        }
        for (id, sender, sweep) in sweeps {
            if sender.send(sweep).is_err() {
                debug!("Lidar {id} has no listener anymore.");
            }
        }
    }
}

impl Simulator for SyntheticWorld {
    fn settings(&self) -> WorldSettings {
        self.settings
    }

    fn apply_settings(&mut self, settings: WorldSettings) -> Result<()> {
        if let Some(delta) = settings.fixed_delta_seconds {
            ensure!(delta > 0., "Fixed delta must be positive, got {delta}.");
        }
        self.settings = settings;
        Ok(())
    }

    fn configure_traffic_manager(&mut self, settings: TrafficManagerSettings) -> Result<()> {
        ensure!(
            settings.global_distance_to_leading_vehicle_m >= 0.,
            "Distance to the leading vehicle cannot be negative."
        );
        self.traffic_manager = settings;
        Ok(())
    }

    fn spawn_points(&self) -> Vec<Transform> {
        let per_lane = (self.config.road_length_m / self.config.spawn_spacing_m).floor() as usize;
        (0..self.config.lanes.len())
            .flat_map(|lane| {
                (0..per_lane).map(move |i| (lane, i as f32 * self.config.spawn_spacing_m))
            })
            .map(|(lane, station)| self.lane_pose(lane, station))
            .collect()
    }

    fn vehicle_blueprints(&self) -> Vec<VehicleBlueprint> {
        self.config.blueprints.clone()
    }

    fn spawn_actor(&mut self, request: SpawnRequest) -> Result<ActorId> {
        let (lane, station) = self
            .locate_on_road(&request.transform)
            .with_context(|| format!("Spawn pose {:?} is not on a lane.", request.transform))?;
        let half_length = request.blueprint.extent.x;
        let blocked = self.vehicle_entries().any(|(_, other)| {
            other.lane == lane && {
                let gap = self.lane_gap(station, other.station_m);
                let distance = gap.min(self.config.road_length_m - gap);
                distance < half_length + other.blueprint.extent.x + 0.5
            }
        });
        ensure!(
            !blocked,
            "Spawn failed because of collision at spawn position {:?}.",
            request.transform.location
        );

        let color = request
            .color
            .or_else(|| request.blueprint.recommended_colors.first().copied())
            .unwrap_or([128, 128, 128]);
        let target_speed = self.rng.gen_range(8.0..14.0);
        debug!(
            "Spawning {} ({}) on lane {lane} at station {station:.1}.",
            request.blueprint.id, request.role_name
        );
        Ok(self.insert(Actor::Vehicle(Vehicle {
            blueprint: request.blueprint,
            color,
            lane,
            station_m: station,
            speed: 0.,
            target_speed,
            autopilot: request.autopilot,
        })))
    }

    fn spawn_camera(
        &mut self,
        blueprint: &CameraBlueprint,
        mount: Transform,
        parent: ActorId,
    ) -> Result<ActorId> {
        self.ensure_vehicle(parent)?;
        ensure!(
            blueprint.image_size_x > 0 && blueprint.image_size_y > 0,
            "Camera image size must be positive."
        );
        Ok(self.insert(Actor::Camera(CameraSensor {
            parent,
            mount,
            blueprint: blueprint.clone(),
            sender: None,
        })))
    }

    fn spawn_lidar(
        &mut self,
        blueprint: &LidarBlueprint,
        mount: Transform,
        parent: ActorId,
    ) -> Result<ActorId> {
        self.ensure_vehicle(parent)?;
        let model = RayCastLidar::new(
            blueprint.clone(),
            self.config.reflectivity.clone(),
            self.config.vehicle_list.clone(),
        );
        Ok(self.insert(Actor::Lidar(LidarSensor {
            parent,
            mount,
            model,
            sender: None,
        })))
    }

    fn listen_camera(&mut self, camera: ActorId) -> Result<Receiver<ImageMeasurement>> {
        match self.actors.get_mut(&camera) {
            Some(Actor::Camera(sensor)) => {
                let (sender, receiver) = mpsc::channel();
                sensor.sender = Some(sender);
                Ok(receiver)
            }
            _ => bail!("Actor {camera} is not a camera."),
        }
    }

    fn listen_lidar(&mut self, lidar: ActorId) -> Result<Receiver<LidarMeasurement>> {
        match self.actors.get_mut(&lidar) {
            Some(Actor::Lidar(sensor)) => {
                let (sender, receiver) = mpsc::channel();
                sensor.sender = Some(sender);
                Ok(receiver)
            }
            _ => bail!("Actor {lidar} is not a lidar."),
        }
    }

    fn tick(&mut self) -> Result<u64> {
        let delta_seconds = self
            .settings
            .fixed_delta_seconds
            .unwrap_or(DEFAULT_FIXED_DELTA_SECONDS);
        self.frame += 1;
        self.step_traffic(delta_seconds);
        self.publish_measurements(delta_seconds);
        Ok(self.frame)
    }

    fn actor(&self, id: ActorId) -> Result<ActorSnapshot> {
        let (type_id, parent, mount) = match self.actors.get(&id) {
            Some(Actor::Vehicle(vehicle)) => return Ok(self.vehicle_snapshot(id, vehicle)),
            Some(Actor::Camera(camera)) => ("sensor.camera.rgb", camera.parent, camera.mount),
            Some(Actor::Lidar(lidar)) => ("sensor.lidar.ray_cast", lidar.parent, lidar.mount),
            None => bail!("Actor {id} not found."),
        };
        let transform = self
            .parent_transform(parent)
            .map_or(mount, |parent| parent.compose(&mount));
        Ok(ActorSnapshot {
            id,
            type_id: type_id.to_string(),
            transform,
            bounding_box: BoundingBox::default(),
        })
    }

    fn vehicles(&self) -> Vec<ActorSnapshot> {
        self.vehicle_entries()
            .map(|(id, vehicle)| self.vehicle_snapshot(id, vehicle))
            .collect()
    }

    fn destroy_actor(&mut self, id: ActorId) -> Result<()> {
        self.actors
            .remove(&id)
            .map(|_| ())
            .with_context(|| format!("Actor {id} not found."))
    }
}
