//! # blueprints
//!
//! Actor and sensor blueprints, the traffic vehicle list and the lidar material table.

use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        CAMERA_FOV_DEG, IMAGE_HEIGHT_PX, IMAGE_WIDTH_PX, LIDAR_ATMOSPHERE_ATTENUATION_RATE,
        LIDAR_CHANNELS, LIDAR_LOWER_FOV_DEG, LIDAR_NOISE_STDDEV_M, LIDAR_POINTS_PER_SECOND,
        LIDAR_RANGE_M, LIDAR_UPPER_FOV_DEG,
    },
    geometry::transform::Location,
};

/// Material name used when a hit has no listed material.
pub const NO_MATERIAL: &str = "NoMaterial";
/// Reflectivity used when the table does not list `NoMaterial` either.
pub const DEFAULT_REFLECTIVITY: f32 = 0.3;

/// A vehicle model that can be spawned.
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleBlueprint {
    /// Blueprint id, e.g. `vehicle.audi.a2`.
    pub id: String,
    /// Name of the actor class inside the engine.
    pub unreal_actor_name: String,
    /// Half sizes of the body.
    pub extent: Location,
    /// Body material.
    pub material: String,
    /// Paint colours offered for this model.
    pub recommended_colors: Vec<[u8; 3]>,
}

/// RGB camera attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraBlueprint {
    /// Image width in pixels.
    pub image_size_x: usize,
    /// Image height in pixels.
    pub image_size_y: usize,
    /// Horizontal field of view in degrees.
    pub fov_deg: f32,
}

impl CameraBlueprint {
    /// KITTI colour camera resolution.
    pub fn kitti() -> Self {
        Self {
            image_size_x: IMAGE_WIDTH_PX,
            image_size_y: IMAGE_HEIGHT_PX,
            fov_deg: CAMERA_FOV_DEG,
        }
    }
}

/// Ray-cast lidar attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct LidarBlueprint {
    /// Number of lasers.
    pub channels: usize,
    /// Maximum range in meters.
    pub range_m: f32,
    /// Elevation of the top laser in degrees.
    pub upper_fov_deg: f32,
    /// Elevation of the bottom laser in degrees.
    pub lower_fov_deg: f32,
    /// Revolutions per second.
    pub rotation_frequency_hz: f32,
    /// Points emitted per second over all lasers.
    pub points_per_second: usize,
    /// Standard deviation of the range noise in meters.
    pub noise_stddev_m: f32,
    /// Fraction of rays dropped before casting.
    pub dropoff_general_rate: f32,
    /// Intensity above which a return is always kept.
    pub dropoff_intensity_limit: f32,
    /// Drop probability of a zero intensity return.
    pub dropoff_zero_intensity: f32,
    /// Atmospheric attenuation per meter.
    pub atmosphere_attenuation_rate: f32,
}

impl LidarBlueprint {
    /// Velodyne HDL-64E completing one revolution per simulation step.
    pub fn hdl64e(fixed_delta_seconds: f32) -> Self {
        Self {
            channels: LIDAR_CHANNELS,
            range_m: LIDAR_RANGE_M,
            upper_fov_deg: LIDAR_UPPER_FOV_DEG,
            lower_fov_deg: LIDAR_LOWER_FOV_DEG,
            rotation_frequency_hz: 1.0 / fixed_delta_seconds,
            points_per_second: LIDAR_POINTS_PER_SECOND,
            noise_stddev_m: LIDAR_NOISE_STDDEV_M,
            dropoff_general_rate: 0.0,
            dropoff_intensity_limit: 0.0,
            dropoff_zero_intensity: 0.0,
            atmosphere_attenuation_rate: LIDAR_ATMOSPHERE_ATTENUATION_RATE,
        }
    }
}

/// Entry of the traffic vehicle list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleListEntry {
    /// Suffix of the blueprint id.
    pub api_bp_name: String,
    /// Engine actor name; hits on these actors use per-material reflectivity.
    pub unreal_actor_name: String,
}

/// Vehicles allowed in traffic, `{"vehicles": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleList {
    /// Listed vehicles.
    pub vehicles: Vec<VehicleListEntry>,
}

impl VehicleList {
    /// Blueprints whose id ends with a listed name, sorted by id.
    pub fn filter_blueprints(&self, blueprints: &[VehicleBlueprint]) -> Vec<VehicleBlueprint> {
        let mut selected: Vec<_> = blueprints
            .iter()
            .filter(|bp| {
                self.vehicles
                    .iter()
                    .any(|entry| bp.id.ends_with(&entry.api_bp_name))
            })
            .cloned()
            .collect();
        selected.sort_by(|a, b| a.id.cmp(&b.id));
        selected
    }

    /// Whether an engine actor name contains one of the listed actor names.
    pub fn contains_actor(&self, actor_name: &str) -> bool {
        self.vehicles
            .iter()
            .any(|entry| actor_name.contains(&entry.unreal_actor_name))
    }
}

/// Reflectivity of one material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialReflectivity {
    /// Material name, matched as a substring of the hit material.
    pub name: String,
    /// Reflectivity in `[0, 1]`.
    pub reflectivity: f32,
}

/// Lidar material table, `{"materials": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReflectivityTable {
    /// Materials in lookup order.
    pub materials: Vec<MaterialReflectivity>,
}

impl ReflectivityTable {
    /// Reflectivity of the first entry whose name is contained in `material`.
    pub fn lookup(&self, material: &str) -> Option<f32> {
        self.materials
            .iter()
            .find(|entry| material.contains(&entry.name))
            .map(|entry| entry.reflectivity)
    }

    /// Reflectivity of surfaces without a listed material.
    pub fn no_material(&self) -> f32 {
        self.materials
            .iter()
            .find(|entry| entry.name == NO_MATERIAL)
            .map_or(DEFAULT_REFLECTIVITY, |entry| entry.reflectivity)
    }
}

fn vehicle(
    id: &str,
    unreal_actor_name: &str,
    extent: (f32, f32, f32),
    recommended_colors: &[[u8; 3]],
) -> VehicleBlueprint {
    VehicleBlueprint {
        id: id.to_string(),
        unreal_actor_name: unreal_actor_name.to_string(),
        extent: Location::new(extent.0, extent.1, extent.2),
        material: "M_CarPaint".to_string(),
        recommended_colors: recommended_colors.to_vec(),
    }
}

/// Built-in vehicle blueprints of the synthetic world.
pub fn vehicle_library() -> Vec<VehicleBlueprint> {
    let paints = [
        [200, 30, 30],
        [30, 60, 170],
        [230, 230, 230],
        [25, 25, 25],
        [120, 120, 125],
    ];
    vec![
        vehicle("vehicle.audi.a2", "BP_AudiA2", (1.85, 0.90, 0.77), &paints),
        vehicle("vehicle.audi.tt", "BP_AudiTT", (2.09, 0.99, 0.69), &paints),
        vehicle("vehicle.bmw.grandtourer", "BP_BmwGranTourer", (2.31, 1.12, 0.83), &paints),
        vehicle("vehicle.citroen.c3", "BP_CitroenC3", (1.99, 0.93, 0.81), &paints),
        vehicle("vehicle.lincoln.mkz_2017", "BP_LincolnMKZ2017", (2.45, 1.06, 0.76), &paints),
        vehicle("vehicle.mercedes.coupe", "BP_MercedesCCC", (2.51, 1.08, 0.83), &paints),
        vehicle("vehicle.nissan.micra", "BP_NissanMicra", (1.83, 0.94, 0.77), &paints),
        vehicle("vehicle.tesla.model3", "BP_TeslaM3", (2.40, 1.08, 0.75), &paints),
        vehicle("vehicle.toyota.prius", "BP_ToyotaPrius", (2.26, 1.00, 0.77), &paints),
        vehicle("vehicle.volkswagen.t2", "BP_VolkswagenT2", (2.24, 1.03, 1.02), &paints[..2]),
        vehicle(
            "vehicle.carlamotors.carlacola",
            "BP_CarlaCola",
            (2.60, 1.31, 1.25),
            &[[220, 40, 40]],
        ),
    ]
}

/// Vehicle list covering every built-in passenger car.
pub fn default_vehicle_list() -> VehicleList {
    VehicleList {
        vehicles: vehicle_library()
            .into_iter()
            .filter(|bp| bp.id != "vehicle.carlamotors.carlacola")
            .map(|bp| VehicleListEntry {
                api_bp_name: bp.id.trim_start_matches("vehicle.").to_string(),
                unreal_actor_name: bp.unreal_actor_name,
            })
            .collect(),
    }
}

/// Material table of the built-in world.
pub fn default_reflectivity_table() -> ReflectivityTable {
    let entry = |name: &str, reflectivity: f32| MaterialReflectivity {
        name: name.to_string(),
        reflectivity,
    };
    ReflectivityTable {
        materials: vec![
            entry(NO_MATERIAL, DEFAULT_REFLECTIVITY),
            entry("CarPaint", 0.7),
            entry("Glass", 0.1),
            entry("Asphalt", 0.15),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::{
        default_reflectivity_table, default_vehicle_list, vehicle_library, LidarBlueprint,
        ReflectivityTable, DEFAULT_REFLECTIVITY,
    };

    #[test]
    fn test_hdl64e() {
        let lidar = LidarBlueprint::hdl64e(0.05);
        assert_eq!(lidar.channels, 64);
        assert_eq!(lidar.rotation_frequency_hz, 20.);
        assert_eq!(lidar.lower_fov_deg, -24.8);
    }

    #[test]
    fn test_filter_blueprints() {
        let list = default_vehicle_list();
        let selected = list.filter_blueprints(&vehicle_library());
        assert_eq!(selected.len(), vehicle_library().len() - 1);
        assert!(selected.windows(2).all(|w| w[0].id < w[1].id));
        assert!(selected
            .iter()
            .all(|bp| bp.id != "vehicle.carlamotors.carlacola"));
        assert!(list.contains_actor("BP_TeslaM3_C_12"));
        assert!(!list.contains_actor("BP_CarlaCola_C_3"));
    }

    #[test]
    fn test_reflectivity_lookup() {
        let table = default_reflectivity_table();
        assert_eq!(table.lookup("M_CarPaint_Red"), Some(0.7));
        assert_eq!(table.lookup("M_Brick"), None);
        assert_eq!(table.no_material(), DEFAULT_REFLECTIVITY);
        assert_eq!(ReflectivityTable::default().no_material(), DEFAULT_REFLECTIVITY);
    }
}
