//! # transform
//!
//! Simulator world poses: locations, Euler rotations, transforms and actor bounding boxes.
//!
//! The simulator world frame is left-handed with x forward, y right and z up. Rotations are
//! Euler angles in degrees.

use ndarray::{array, Array1, Array2};

use super::{
    se3::SE3,
    so3::{euler_deg_to_mat3, mat3_to_euler_deg},
};

/// Location in the world frame, in meters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Location {
    /// Forward coordinate.
    pub x: f32,
    /// Right coordinate.
    pub y: f32,
    /// Up coordinate.
    pub z: f32,
}

impl Location {
    /// Construct a new `Location`.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Location) -> f32 {
        (*self - *other).length()
    }

    /// Vector length.
    pub fn length(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Dot product.
    pub fn dot(&self, other: &Location) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Convert to an `ndarray` vector.
    pub fn to_array(&self) -> Array1<f32> {
        array![self.x, self.y, self.z]
    }
}

impl std::ops::Sub for Location {
    type Output = Location;

    fn sub(self, rhs: Location) -> Location {
        Location::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Add for Location {
    type Output = Location;

    fn add(self, rhs: Location) -> Location {
        Location::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl From<&Array1<f32>> for Location {
    fn from(v: &Array1<f32>) -> Self {
        Location::new(v[0], v[1], v[2])
    }
}

/// Euler rotation in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation {
    /// Rotation about the right axis.
    pub pitch: f32,
    /// Rotation about the up axis.
    pub yaw: f32,
    /// Rotation about the forward axis.
    pub roll: f32,
}

impl Rotation {
    /// Construct a new `Rotation`.
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Rotation with only a yaw component.
    pub const fn from_yaw(yaw: f32) -> Self {
        Self::new(0., yaw, 0.)
    }

    /// (3,3) rotation matrix.
    pub fn matrix(&self) -> Array2<f32> {
        euler_deg_to_mat3(self.pitch, self.yaw, self.roll)
    }

    /// Unit vector pointing forward.
    pub fn forward_vector(&self) -> Location {
        let (sp, cp) = self.pitch.to_radians().sin_cos();
        let (sy, cy) = self.yaw.to_radians().sin_cos();
        Location::new(cp * cy, cp * sy, sp)
    }
}

/// Pose of an actor or sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transform {
    /// Translation.
    pub location: Location,
    /// Orientation.
    pub rotation: Rotation,
}

impl Transform {
    /// Construct a new `Transform`.
    pub const fn new(location: Location, rotation: Rotation) -> Self {
        Self { location, rotation }
    }

    /// Transform with only a translation.
    pub const fn from_location(location: Location) -> Self {
        Self::new(location, Rotation::new(0., 0., 0.))
    }

    /// Local-to-world rigid transformation.
    pub fn to_se3(&self) -> SE3 {
        SE3 {
            rotation: self.rotation.matrix(),
            translation: self.location.to_array(),
        }
    }

    /// Build a transform from a rigid transformation.
    pub fn from_se3(se3: &SE3) -> Self {
        let (pitch, yaw, roll) = mat3_to_euler_deg(&se3.rotation.view());
        Self {
            location: Location::from(&se3.translation),
            rotation: Rotation::new(pitch, yaw, roll),
        }
    }

    /// (4,4) local-to-world matrix.
    pub fn matrix(&self) -> Array2<f32> {
        self.to_se3().transform_matrix()
    }

    /// (4,4) world-to-local matrix.
    pub fn inverse_matrix(&self) -> Array2<f32> {
        self.to_se3().inverse().transform_matrix()
    }

    /// Unit vector pointing forward.
    pub fn forward_vector(&self) -> Location {
        self.rotation.forward_vector()
    }

    /// Map a point given in this transform's local frame into the world frame.
    pub fn transform_point(&self, point: &Location) -> Location {
        Location::from(&self.to_se3().transform_point(&point.to_array().view()))
    }

    /// Pose of a child mounted at `relative` on this transform.
    pub fn compose(&self, relative: &Transform) -> Transform {
        Transform::from_se3(&self.to_se3().compose(&relative.to_se3()))
    }
}

/// Actor bounding box, expressed relative to the actor transform.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    /// Box centre in the actor frame.
    pub location: Location,
    /// Half sizes along the box axes (half length, half width, half height).
    pub extent: Location,
    /// Box orientation relative to the actor.
    pub rotation: Rotation,
}

impl BoundingBox {
    /// Axis-aligned box centred at `location` with half sizes `extent`.
    pub const fn new(location: Location, extent: Location) -> Self {
        Self {
            location,
            extent,
            rotation: Rotation::new(0., 0., 0.),
        }
    }

    /// Corners of the box in the actor frame, as an (8,3) array.
    pub fn local_vertices(&self) -> Array2<f32> {
        let Location { x, y, z } = self.extent;
        let corners = array![
            [-x, -y, -z],
            [-x, -y, z],
            [-x, y, -z],
            [-x, y, z],
            [x, -y, -z],
            [x, -y, z],
            [x, y, -z],
            [x, y, z],
        ];
        let box_se3 = Transform::new(self.location, self.rotation).to_se3();
        box_se3.transform_from(&corners.view())
    }

    /// Corners of the box in the world frame given the owning actor's transform.
    pub fn world_vertices(&self, actor_transform: &Transform) -> Array2<f32> {
        actor_transform
            .to_se3()
            .transform_from(&self.local_vertices().view())
    }

    /// Full length, width and height of the box.
    pub fn dimensions(&self) -> (f32, f32, f32) {
        (
            2. * self.extent.x,
            2. * self.extent.y,
            2. * self.extent.z,
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_relative_eq, AbsDiffEq};

    use super::{BoundingBox, Location, Rotation, Transform};

    #[test]
    fn test_forward_vector() {
        let transform = Transform::new(Location::default(), Rotation::from_yaw(90.));
        let forward = transform.forward_vector();
        assert_relative_eq!(forward.x, 0., epsilon = 1e-6);
        assert_relative_eq!(forward.y, 1., epsilon = 1e-6);
    }

    #[test]
    fn test_compose_mount() {
        let vehicle = Transform::new(Location::new(10., 5., 0.), Rotation::from_yaw(90.));
        let mount = Transform::from_location(Location::new(-0.27, 0., 1.73));
        let lidar = vehicle.compose(&mount);
        assert_relative_eq!(lidar.location.x, 10., epsilon = 1e-5);
        assert_relative_eq!(lidar.location.y, 4.73, epsilon = 1e-5);
        assert_relative_eq!(lidar.location.z, 1.73, epsilon = 1e-5);
        assert_relative_eq!(lidar.rotation.yaw, 90., epsilon = 1e-4);
    }

    #[test]
    fn test_inverse_matrix() {
        let transform = Transform::new(Location::new(1., 2., 3.), Rotation::new(5., 30., -2.));
        let identity = transform.matrix().dot(&transform.inverse_matrix());
        assert!(identity.abs_diff_eq(&ndarray::Array2::<f32>::eye(4), 1e-5));
    }

    #[test]
    fn test_world_vertices() {
        let bbox = BoundingBox::new(Location::new(0., 0., 0.75), Location::new(2., 1., 0.75));
        let actor = Transform::new(Location::new(20., 0., 0.), Rotation::from_yaw(0.));
        let vertices = bbox.world_vertices(&actor);
        assert_eq!(vertices.shape(), &[8, 3]);
        let min_z = vertices.column(2).fold(f32::INFINITY, |a, &b| a.min(b));
        let max_x = vertices.column(0).fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        assert_relative_eq!(min_z, 0., epsilon = 1e-6);
        assert_relative_eq!(max_x, 22., epsilon = 1e-5);
        assert_eq!(bbox.dimensions(), (4., 2., 1.5));
    }
}
