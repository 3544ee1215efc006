//! # capture
//!
//! Capture of a KITTI-style dataset from a `Simulator`.
//!
//! The session spawns an ego vehicle carrying an RGB camera and a lidar, fills the map
//! with autopilot traffic and steps the world synchronously. Every frame for which both
//! sensors reported is written as an image, a velodyne sweep, a label file and a
//! calibration file named after the frame number.

pub mod labeling;
pub mod sync;

use std::{collections::BTreeMap, path::PathBuf, sync::mpsc::Receiver, thread, time::Duration};

use anyhow::{bail, ensure, Context, Result};
use indicatif::ProgressBar;
use ndarray::Array2;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    calib::Calibration,
    constants::{
        CAMERA_MOUNT, DEFAULT_DISTANCE_TO_LEADING_VEHICLE_M, DEFAULT_FIXED_DELTA_SECONDS,
        DEFAULT_FRAMES, DEFAULT_NUMBER_OF_VEHICLES, EGO_SPAWN_POINT_INDEX, EGO_VEHICLE_BLUEPRINT,
        LIDAR_MOUNT, MAX_TICKS_PER_FRAME,
    },
    geometry::{
        camera::pinhole_camera::{Intrinsics, PinholeCamera},
        transform::Transform,
    },
    io::{write_calibration, write_image_rgba8, write_labels, write_velodyne},
    path::KittiLayout,
    simulator::{
        blueprints::{default_vehicle_list, CameraBlueprint, LidarBlueprint, VehicleList},
        ActorId, ActorSnapshot, ImageMeasurement, LidarMeasurement, Simulator, SpawnRequest,
        TrafficManagerSettings, WorldSettings,
    },
};
use labeling::label_frame;
use sync::FrameSynchronizer;

/// Parameters of a capture run.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Split directory the dataset is written to.
    pub output_dir: PathBuf,
    /// Number of samples to write.
    pub frames: usize,
    /// Number of background vehicles requested.
    pub number_of_vehicles: usize,
    /// Simulation step.
    pub fixed_delta_seconds: f32,
    /// Gap autopilot vehicles keep to the vehicle ahead.
    pub distance_to_leading_vehicle_m: f32,
    /// Seed of the traffic selection.
    pub seed: u64,
    /// Models allowed in traffic.
    pub vehicle_list: VehicleList,
    /// Blueprint id of the ego vehicle.
    pub ego_blueprint: String,
    /// Pause after every tick.
    pub tick_sleep: Option<Duration>,
}

impl CaptureConfig {
    /// Default capture into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            frames: DEFAULT_FRAMES,
            number_of_vehicles: DEFAULT_NUMBER_OF_VEHICLES,
            fixed_delta_seconds: DEFAULT_FIXED_DELTA_SECONDS,
            distance_to_leading_vehicle_m: DEFAULT_DISTANCE_TO_LEADING_VEHICLE_M,
            seed: 0,
            vehicle_list: default_vehicle_list(),
            ego_blueprint: EGO_VEHICLE_BLUEPRINT.to_string(),
            tick_sleep: None,
        }
    }
}

/// Outcome of a capture run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Ids of the written samples, in capture order.
    pub sample_ids: Vec<u64>,
    /// Number of labels written over all samples.
    pub num_labels: usize,
    /// Simulation steps taken.
    pub ticks: usize,
    /// Background vehicles actually spawned.
    pub num_vehicles: usize,
}

/// Actors and sensor streams owned by a running capture.
pub struct CaptureSession<'a, S: Simulator> {
    sim: &'a mut S,
    config: CaptureConfig,
    layout: KittiLayout,
    original_settings: WorldSettings,
    intrinsics: Intrinsics,
    calibration: Calibration,
    ego: Option<ActorId>,
    sensors: Vec<ActorId>,
    traffic: Vec<ActorId>,
    images: Option<Receiver<ImageMeasurement>>,
    clouds: Option<Receiver<LidarMeasurement>>,
    synchronizer: FrameSynchronizer,
    snapshots: BTreeMap<u64, Vec<ActorSnapshot>>,
    rng: StdRng,
}

impl<'a, S: Simulator> CaptureSession<'a, S> {
    /// Session on `sim`; nothing is spawned until `setup`.
    pub fn new(sim: &'a mut S, config: CaptureConfig) -> Self {
        let camera = CameraBlueprint::kitti();
        let intrinsics =
            Intrinsics::from_fov(camera.image_size_x, camera.image_size_y, camera.fov_deg);
        let calibration = Calibration::from_rig(&intrinsics, &CAMERA_MOUNT, &LIDAR_MOUNT);
        Self {
            original_settings: sim.settings(),
            sim,
            layout: KittiLayout::new(&config.output_dir),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            intrinsics,
            calibration,
            ego: None,
            sensors: vec![],
            traffic: vec![],
            images: None,
            clouds: None,
            synchronizer: FrameSynchronizer::new(),
            snapshots: BTreeMap::new(),
        }
    }

    /// Output folders, synchronous stepping, ego vehicle with its sensors and traffic.
    pub fn setup(&mut self) -> Result<()> {
        ensure!(
            self.config.fixed_delta_seconds > 0.,
            "Fixed delta must be positive."
        );
        self.layout.create_dirs()?;

        self.sim.apply_settings(WorldSettings {
            synchronous_mode: true,
            fixed_delta_seconds: Some(self.config.fixed_delta_seconds),
        })?;
        self.sim
            .configure_traffic_manager(TrafficManagerSettings {
                synchronous_mode: true,
                global_distance_to_leading_vehicle_m: self.config.distance_to_leading_vehicle_m,
            })?;

        let mut spawn_points = self.sim.spawn_points();
        ensure!(
            spawn_points.len() > EGO_SPAWN_POINT_INDEX,
            "The map has no spawn points."
        );
        let ego_point = spawn_points.remove(EGO_SPAWN_POINT_INDEX);
        self.spawn_ego(ego_point)?;
        self.spawn_traffic(spawn_points);
        Ok(())
    }

    fn spawn_ego(&mut self, transform: Transform) -> Result<()> {
        let blueprint = self
            .sim
            .vehicle_blueprints()
            .into_iter()
            .find(|bp| bp.id == self.config.ego_blueprint)
            .with_context(|| format!("Unknown ego blueprint {}.", self.config.ego_blueprint))?;
        let ego = self.sim.spawn_actor(SpawnRequest {
            blueprint,
            transform,
            color: None,
            role_name: "hero".to_string(),
            autopilot: true,
        })?;
        self.ego = Some(ego);
        info!("Spawned ego vehicle {ego}.");

        let camera = self.sim.spawn_camera(
            &CameraBlueprint::kitti(),
            Transform::from_location(CAMERA_MOUNT),
            ego,
        )?;
        self.sensors.push(camera);
        let lidar = self.sim.spawn_lidar(
            &LidarBlueprint::hdl64e(self.config.fixed_delta_seconds),
            Transform::from_location(LIDAR_MOUNT),
            ego,
        )?;
        self.sensors.push(lidar);

        self.images = Some(self.sim.listen_camera(camera)?);
        self.clouds = Some(self.sim.listen_lidar(lidar)?);
        Ok(())
    }

    fn spawn_traffic(&mut self, mut spawn_points: Vec<Transform>) {
        let blueprints = self
            .config
            .vehicle_list
            .filter_blueprints(&self.sim.vehicle_blueprints());
        if blueprints.is_empty() {
            warn!("No blueprint matches the vehicle list; spawning no traffic.");
            return;
        }
        if spawn_points.len() < self.config.number_of_vehicles {
            warn!(
                "Requested {} vehicles, but could only find {} spawn points.",
                self.config.number_of_vehicles,
                spawn_points.len()
            );
        }
        spawn_points.shuffle(&mut self.rng);

        let mut requests = Vec::new();
        for transform in spawn_points
            .into_iter()
            .take(self.config.number_of_vehicles)
        {
            let Some(blueprint) = blueprints.choose(&mut self.rng) else {
                continue;
            };
            let color = blueprint.recommended_colors.choose(&mut self.rng).copied();
            requests.push(SpawnRequest {
                blueprint: blueprint.clone(),
                transform,
                color,
                role_name: "autopilot".to_string(),
                autopilot: true,
            });
        }

        for result in self.sim.spawn_batch(requests) {
            match result {
                Ok(id) => self.traffic.push(id),
                Err(err) => error!("{err:#}"),
            }
        }
        info!("Spawned {} vehicles.", self.traffic.len());
    }

    fn tick(&mut self) -> Result<u64> {
        let frame = self.sim.tick()?;
        self.snapshots.insert(frame, self.sim.vehicles());
        if let Some(sleep) = self.config.tick_sleep {
            thread::sleep(sleep);
        }
        Ok(frame)
    }

    fn drain_sensors(&mut self) {
        if let Some(images) = &self.images {
            for image in images.try_iter() {
                self.synchronizer.push_image(image);
            }
        }
        if let Some(clouds) = &self.clouds {
            for cloud in clouds.try_iter() {
                self.synchronizer.push_cloud(cloud);
            }
        }
    }

    /// Step the world until `frames` samples are written.
    ///
    /// Gives up after `MAX_TICKS_PER_FRAME` steps per requested frame.
    pub fn run(&mut self) -> Result<CaptureSummary> {
        let Some(ego) = self.ego else {
            bail!("Capture session is not set up.");
        };
        let frames = self.config.frames;
        let max_ticks = frames.max(1) * MAX_TICKS_PER_FRAME;
        let mut summary = CaptureSummary {
            num_vehicles: self.traffic.len(),
            ..Default::default()
        };

        // Warm-up step; the first sweep starts mid-revolution.
        self.tick()?;
        summary.ticks += 1;
        self.drain_sensors();
        self.synchronizer = FrameSynchronizer::new();

        let bar = ProgressBar::new(frames as u64);
        while summary.sample_ids.len() < frames {
            ensure!(
                summary.ticks < max_ticks,
                "Gave up after {} ticks with {} of {frames} frames captured.",
                summary.ticks,
                summary.sample_ids.len()
            );
            self.tick()?;
            summary.ticks += 1;
            self.drain_sensors();

            while summary.sample_ids.len() < frames {
                let Some((image, cloud)) = self.synchronizer.pop_matched() else {
                    break;
                };
                if let Some(num_labels) = self.write_sample(ego, &image, &cloud)? {
                    summary.sample_ids.push(image.frame);
                    summary.num_labels += num_labels;
                    bar.inc(1);
                }
            }
        }
        bar.finish();
        info!(
            "Captured {} frames in {} ticks ({} measurements dropped).",
            summary.sample_ids.len(),
            summary.ticks,
            self.synchronizer.dropped()
        );
        Ok(summary)
    }

    /// Write one sample; `None` if the world state of its frame is unknown.
    fn write_sample(
        &mut self,
        ego: ActorId,
        image: &ImageMeasurement,
        cloud: &LidarMeasurement,
    ) -> Result<Option<usize>> {
        let frame = image.frame;
        let Some(actors) = self.snapshots.remove(&frame) else {
            warn!("No world snapshot for frame {frame}; skipping it.");
            return Ok(None);
        };
        self.snapshots.retain(|f, _| *f > frame);
        let Some(ego_snapshot) = actors.iter().find(|actor| actor.id == ego) else {
            bail!("Ego vehicle {ego} disappeared.");
        };

        let camera = PinholeCamera::new(&image.transform, self.intrinsics.clone());
        let labels = label_frame(&camera, ego_snapshot, &actors);

        write_image_rgba8(&self.layout.image_path(frame), &image.image)?;
        write_velodyne(
            &self.layout.velodyne_path(frame),
            &to_kitti_axes(&cloud.points).view(),
        )?;
        write_labels(&self.layout.label_path(frame), &labels)?;
        write_calibration(&self.layout.calib_path(frame), &self.calibration)?;
        debug!("Frame {frame}: {} labels.", labels.len());
        Ok(Some(labels.len()))
    }

    /// Restore the world settings and destroy every spawned actor.
    ///
    /// Every step is attempted; failures are logged.
    pub fn teardown(&mut self) {
        if let Err(err) = self.sim.apply_settings(self.original_settings) {
            warn!("Cannot restore world settings: {err:#}");
        }
        self.images = None;
        self.clouds = None;

        let mut actors: Vec<ActorId> = self.sensors.drain(..).collect();
        actors.extend(self.ego.take());
        actors.append(&mut self.traffic);
        for (id, result) in actors.iter().zip(self.sim.destroy_batch(&actors)) {
            if let Err(err) = result {
                warn!("Cannot destroy actor {id}: {err:#}");
            }
        }
        info!("Destroyed {} actors.", actors.len());
    }
}

/// Lidar points with y pointing left, as KITTI stores them.
pub fn to_kitti_axes(points: &Array2<f32>) -> Array2<f32> {
    let mut points = points.clone();
    points.column_mut(1).mapv_inplace(|y| -y);
    points
}

/// Run a full capture on `sim`. The world is restored whether or not it succeeds.
pub fn capture<S: Simulator>(sim: &mut S, config: CaptureConfig) -> Result<CaptureSummary> {
    let mut session = CaptureSession::new(sim, config);
    let result = session.setup().and_then(|_| session.run());
    session.teardown();
    result
}
