//! # lidar
//!
//! Ray-cast lidar model.
//!
//! Every laser sweeps its share of the revolution each step. A return's intensity is
//! `cos(incidence) * exp(-attenuation * distance) * reflectivity`, where the reflectivity
//! depends on the hit material for listed vehicles and on `NoMaterial` for everything else.
//! Returns are then perturbed along the ray and may be dropped based on their intensity.

use std::f32::consts::PI;

use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use super::blueprints::{LidarBlueprint, ReflectivityTable, VehicleList};
use crate::{constants::VELODYNE_POINT_DIMS, geometry::transform::Transform};

/// Name reported for ground hits.
pub const GROUND_ACTOR_NAME: &str = "Road";
/// Material of the ground.
pub const GROUND_MATERIAL: &str = "M_Asphalt";

const EPS: f32 = f32::EPSILON;

/// Oriented box a ray can hit.
#[derive(Clone, Debug, PartialEq)]
pub struct Obstacle {
    /// Engine name of the actor owning the box.
    pub actor_name: String,
    /// Surface material.
    pub material: String,
    /// Box centre in the world.
    pub center: [f32; 3],
    /// Half sizes along the box axes.
    pub half_extent: [f32; 3],
    /// Heading around the world z-axis, radians.
    pub yaw_rad: f32,
}

/// Nearest intersection of a ray.
#[derive(Clone, Debug, PartialEq)]
pub struct RayHit<'a> {
    /// Distance along the unit ray.
    pub distance: f32,
    /// Surface normal in the world, facing the ray origin.
    pub normal: [f32; 3],
    /// Engine name of the hit actor.
    pub actor_name: &'a str,
    /// Hit material.
    pub material: &'a str,
}

fn rotate_z(v: [f32; 3], angle: f32) -> [f32; 3] {
    let (s, c) = angle.sin_cos();
    [c * v[0] - s * v[1], s * v[0] + c * v[1], v[2]]
}

impl Obstacle {
    /// Slab intersection in the box frame. Rays starting inside the box miss.
    pub fn intersect(&self, origin: [f32; 3], direction: [f32; 3]) -> Option<(f32, [f32; 3])> {
        let relative = [
            origin[0] - self.center[0],
            origin[1] - self.center[1],
            origin[2] - self.center[2],
        ];
        let o = rotate_z(relative, -self.yaw_rad);
        let d = rotate_z(direction, -self.yaw_rad);

        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;
        let mut normal_local = [0.; 3];
        for axis in 0..3 {
            let h = self.half_extent[axis];
            if d[axis].abs() < EPS {
                if o[axis].abs() > h {
                    return None;
                }
                continue;
            }
            let t1 = (-h - o[axis]) / d[axis];
            let t2 = (h - o[axis]) / d[axis];
            let (t_min, t_max) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
            if t_min > t_near {
                t_near = t_min;
                normal_local = [0.; 3];
                normal_local[axis] = -d[axis].signum();
            }
            t_far = t_far.min(t_max);
            if t_near > t_far {
                return None;
            }
        }
        if t_near <= 0. {
            return None;
        }
        Some((t_near, rotate_z(normal_local, self.yaw_rad)))
    }
}

/// Nearest hit among the obstacles and the ground plane `z = 0`, within `range`.
pub fn cast_ray<'a>(
    origin: [f32; 3],
    direction: [f32; 3],
    range: f32,
    obstacles: &'a [Obstacle],
) -> Option<RayHit<'a>> {
    let mut nearest: Option<RayHit<'a>> = None;
    if direction[2] < -EPS && origin[2] > 0. {
        let t = -origin[2] / direction[2];
        if t < range {
            nearest = Some(RayHit {
                distance: t,
                normal: [0., 0., 1.],
                actor_name: GROUND_ACTOR_NAME,
                material: GROUND_MATERIAL,
            });
        }
    }
    for obstacle in obstacles {
        if let Some((t, normal)) = obstacle.intersect(origin, direction) {
            let best = nearest.as_ref().map_or(range, |hit| hit.distance);
            if t < best {
                nearest = Some(RayHit {
                    distance: t,
                    normal,
                    actor_name: &obstacle.actor_name,
                    material: &obstacle.material,
                });
            }
        }
    }
    nearest
}

/// Ray-cast lidar attached to a vehicle.
#[derive(Clone, Debug)]
pub struct RayCastLidar {
    /// Sensor attributes.
    pub blueprint: LidarBlueprint,
    reflectivity: ReflectivityTable,
    vehicle_list: VehicleList,
    horizontal_angle_deg: f32,
    drop_off_alpha: f32,
    drop_off_beta: f32,
    drop_off_gen_active: bool,
}

impl RayCastLidar {
    /// Construct a new `RayCastLidar`.
    pub fn new(
        blueprint: LidarBlueprint,
        reflectivity: ReflectivityTable,
        vehicle_list: VehicleList,
    ) -> Self {
        // A zero limit means every return is above it, so the slope is never used.
        let drop_off_alpha = if blueprint.dropoff_intensity_limit > EPS {
            blueprint.dropoff_zero_intensity / blueprint.dropoff_intensity_limit
        } else {
            0.
        };
        Self {
            drop_off_beta: 1. - blueprint.dropoff_zero_intensity,
            drop_off_gen_active: blueprint.dropoff_general_rate > EPS,
            drop_off_alpha,
            blueprint,
            reflectivity,
            vehicle_list,
            horizontal_angle_deg: 0.,
        }
    }

    /// Elevation of each laser in degrees, top to bottom.
    pub fn laser_angles_deg(&self) -> Vec<f32> {
        let channels = self.blueprint.channels;
        if channels <= 1 {
            return vec![self.blueprint.upper_fov_deg; channels];
        }
        let step = (self.blueprint.upper_fov_deg - self.blueprint.lower_fov_deg)
            / (channels - 1) as f32;
        (0..channels)
            .map(|i| self.blueprint.upper_fov_deg - i as f32 * step)
            .collect()
    }

    /// Points each laser emits during a step.
    pub fn points_per_channel(&self, delta_seconds: f32) -> usize {
        if self.blueprint.channels == 0 {
            return 0;
        }
        (self.blueprint.points_per_second as f32 * delta_seconds / self.blueprint.channels as f32)
            as usize
    }

    /// Intensity of a return for a ray travelling along the unit `direction`.
    pub fn compute_intensity(&self, hit: &RayHit<'_>, direction: [f32; 3]) -> f32 {
        let cos_angle = -(direction[0] * hit.normal[0]
            + direction[1] * hit.normal[1]
            + direction[2] * hit.normal[2]);
        let attenuation = (-self.blueprint.atmosphere_attenuation_rate * hit.distance).exp();
        let reflectivity = if self.vehicle_list.contains_actor(hit.actor_name) {
            self.reflectivity
                .lookup(hit.material)
                .unwrap_or_else(|| self.reflectivity.no_material())
        } else {
            self.reflectivity.no_material()
        };
        cos_angle * attenuation * reflectivity
    }

    /// Whether a return of the given intensity survives the intensity drop-off.
    fn keep_return(&self, intensity: f32, rng: &mut StdRng) -> bool {
        intensity > self.blueprint.dropoff_intensity_limit
            || rng.gen::<f32>() < self.drop_off_alpha * intensity + self.drop_off_beta
    }

    /// Simulate one step of the sensor mounted at `sensor_transform`.
    ///
    /// Returns (N,4) points `x, y, z, intensity` in the sensor frame (x forward, y right,
    /// z up) and the number of points per laser.
    pub fn scan(
        &mut self,
        sensor_transform: &Transform,
        obstacles: &[Obstacle],
        delta_seconds: f32,
        rng: &mut StdRng,
    ) -> (Array2<f32>, Vec<usize>) {
        let points_per_channel = self.points_per_channel(delta_seconds);
        let span_deg =
            (360. * self.blueprint.rotation_frequency_hz * delta_seconds).clamp(0., 360.);
        let start_deg = self.horizontal_angle_deg;
        self.horizontal_angle_deg = (start_deg + span_deg).rem_euclid(360.);

        let rotation = sensor_transform.rotation.matrix();
        let origin = [
            sensor_transform.location.x,
            sensor_transform.location.y,
            sensor_transform.location.z,
        ];
        let noise = Normal::new(0., self.blueprint.noise_stddev_m.max(0.)).ok();
        let seeds: Vec<u64> = (0..self.blueprint.channels).map(|_| rng.gen()).collect();

        let channels: Vec<Vec<[f32; VELODYNE_POINT_DIMS]>> = self
            .laser_angles_deg()
            .into_par_iter()
            .zip(seeds)
            .map(|(elevation_deg, seed)| {
                let mut rng = StdRng::seed_from_u64(seed);
                let (sv, cv) = elevation_deg.to_radians().sin_cos();
                let mut detections = Vec::with_capacity(points_per_channel);
                for j in 0..points_per_channel {
                    if self.drop_off_gen_active
                        && rng.gen::<f32>() < self.blueprint.dropoff_general_rate
                    {
                        continue;
                    }
                    let azimuth = (start_deg + span_deg * j as f32 / points_per_channel as f32)
                        * PI
                        / 180.;
                    let (sh, ch) = azimuth.sin_cos();
                    let local = [cv * ch, cv * sh, sv];
                    let world = [
                        rotation[[0, 0]] * local[0]
                            + rotation[[0, 1]] * local[1]
                            + rotation[[0, 2]] * local[2],
                        rotation[[1, 0]] * local[0]
                            + rotation[[1, 1]] * local[1]
                            + rotation[[1, 2]] * local[2],
                        rotation[[2, 0]] * local[0]
                            + rotation[[2, 1]] * local[1]
                            + rotation[[2, 2]] * local[2],
                    ];
                    let Some(hit) = cast_ray(origin, world, self.blueprint.range_m, obstacles)
                    else {
                        continue;
                    };
                    let intensity = self.compute_intensity(&hit, world);
                    let mut range = hit.distance;
                    if self.blueprint.noise_stddev_m > EPS {
                        if let Some(noise) = &noise {
                            range += noise.sample(&mut rng);
                        }
                    }
                    if !self.keep_return(intensity, &mut rng) {
                        continue;
                    }
                    detections.push([local[0] * range, local[1] * range, local[2] * range, intensity]);
                }
                detections
            })
            .collect();

        let counts: Vec<usize> = channels.iter().map(Vec::len).collect();
        let num_points = counts.iter().sum();
        let flat: Vec<f32> = channels.into_iter().flatten().flatten().collect();
        let points = Array2::from_shape_vec((num_points, VELODYNE_POINT_DIMS), flat).unwrap();
        (points, counts)
    }
}
