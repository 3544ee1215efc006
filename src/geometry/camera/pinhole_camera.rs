use std::ops::DivAssign;

use ndarray::{array, par_azip, s, Array, Array2, ArrayView, Ix1, Ix2};

use crate::geometry::{se3::SE3, transform::Transform};

/// Pinhole camera intrinsics.
#[derive(Clone, Debug, PartialEq)]
pub struct Intrinsics {
    /// Horizontal focal length in pixels.
    pub fx_px: f32,
    /// Vertical focal length in pixels.
    pub fy_px: f32,
    /// Horizontal focal center in pixels.
    pub cx_px: f32,
    /// Vertical focal center in pixels.
    pub cy_px: f32,
    /// Width of image in pixels.
    pub width_px: usize,
    /// Height of image in pixels.
    pub height_px: usize,
}

impl Intrinsics {
    /// Construct a new `Intrinsics` instance.
    pub fn new(
        fx_px: f32,
        fy_px: f32,
        cx_px: f32,
        cy_px: f32,
        width_px: usize,
        height_px: usize,
    ) -> Self {
        Self {
            fx_px,
            fy_px,
            cx_px,
            cy_px,
            width_px,
            height_px,
        }
    }

    /// Intrinsics of a camera with square pixels and the principal point at the image centre.
    ///
    /// `fov_deg` is the horizontal field of view.
    pub fn from_fov(width_px: usize, height_px: usize, fov_deg: f32) -> Self {
        let focal = width_px as f32 / (2.0 * (fov_deg * std::f32::consts::PI / 360.0).tan());
        Self::new(
            focal,
            focal,
            width_px as f32 / 2.0,
            height_px as f32 / 2.0,
            width_px,
            height_px,
        )
    }

    /// Camera intrinsic matrix.
    pub fn k(&self) -> Array<f32, Ix2> {
        let mut k = Array::<f32, Ix2>::eye(3);
        k[[0, 0]] = self.fx_px;
        k[[1, 1]] = self.fy_px;
        k[[0, 2]] = self.cx_px;
        k[[1, 2]] = self.cy_px;
        k
    }
}

/// Pinhole camera with zero skew, posed in the simulator world.
///
/// Camera-frame coordinates follow the optical convention: x right, y down, z forward.
#[derive(Clone, Debug)]
pub struct PinholeCamera {
    /// Pose of the camera in the world frame (inverse of the extrinsics).
    pub world_se3_cam: SE3,
    /// `Intrinsics` object containing intrinsic parameters and image dimensions.
    pub intrinsics: Intrinsics,
}

/// Maps simulator axes (x forward, y right, z up) onto optical axes (x right, y down, z forward).
fn simulator_to_optical() -> Array2<f32> {
    array![[0., 1., 0.], [0., 0., -1.], [1., 0., 0.]]
}

impl PinholeCamera {
    /// Camera at `transform` in the world.
    pub fn new(transform: &Transform, intrinsics: Intrinsics) -> Self {
        Self {
            world_se3_cam: transform.to_se3(),
            intrinsics,
        }
    }

    /// Return the width of the image in pixels.
    pub fn width_px(&self) -> usize {
        self.intrinsics.width_px
    }

    /// Return the height of the image in pixels.
    pub fn height_px(&self) -> usize {
        self.intrinsics.height_px
    }

    /// Return the camera extrinsics: the (4,4) world-to-camera matrix in simulator axes.
    pub fn extrinsics(&self) -> Array<f32, Ix2> {
        self.world_se3_cam.inverse().transform_matrix()
    }

    /// Transform (N,3) world points into the optical camera frame.
    pub fn world_to_camera(&self, points_world: &ArrayView<f32, Ix2>) -> Array<f32, Ix2> {
        let points_cam_sim = self.world_se3_cam.inverse().transform_from(points_world);
        points_cam_sim.dot(&simulator_to_optical().t())
    }

    /// Transform a single world point into the optical camera frame.
    pub fn world_point_to_camera(&self, point_world: &ArrayView<f32, Ix1>) -> [f32; 3] {
        let point = point_world.to_owned().into_shape((1, 3)).unwrap();
        let cam = self.world_to_camera(&point.view());
        [cam[[0, 0]], cam[[0, 1]], cam[[0, 2]]]
    }

    /// Cull 3D points to camera view frustum.
    ///
    /// Ref: https://en.wikipedia.org/wiki/Hidden-surface_determination#Viewing-frustum_culling
    ///
    /// Given a set of coordinates in the image plane and corresponding points
    /// in the camera coordinate reference frame, determine those points
    /// that have a valid projection into the image. 3D points with valid
    /// projections have x coordinates in the open range (0,width_px), y-coordinates
    /// in the open range (0,height_px), and a positive z-coordinate (lying in
    /// front of the camera frustum).
    pub fn cull_to_view_frustum(
        &self,
        uv: &ArrayView<f32, Ix2>,
        points_camera: &ArrayView<f32, Ix2>,
    ) -> Array<bool, Ix1> {
        let num_points = uv.shape()[0];
        let width = self.width_px() as f32;
        let height = self.height_px() as f32;
        let mut is_within_frustum = Array::<bool, Ix1>::from_elem(num_points, false);
        par_azip!((is_within_frustum_i in &mut is_within_frustum, uv_row in uv.outer_iter(), point_cam in points_camera.outer_iter()) {
            let is_within_frustum_x = (uv_row[0] > 0.) && (uv_row[0] < width);
            let is_within_frustum_y = (uv_row[1] > 0.) && (uv_row[1] < height);
            let is_within_frustum_z = point_cam[2] > 0.;
            *is_within_frustum_i = is_within_frustum_x & is_within_frustum_y & is_within_frustum_z;
        });
        is_within_frustum
    }

    /// Project points already in the optical camera frame onto the image plane.
    ///
    /// Returns (N,3) `uvz`: pixel coordinates and depth.
    pub fn project_camera_to_image(&self, points_camera: &ArrayView<f32, Ix2>) -> Array<f32, Ix2> {
        let mut uvz = points_camera.dot(&self.intrinsics.k().t());
        let z = uvz.slice(s![.., 2..3]).to_owned();
        uvz.slice_mut(s![.., ..2]).div_assign(&z);
        uvz
    }

    /// Project a collection of 3D points (provided in the world frame) to the image plane.
    ///
    /// Returns `(uvz, points_camera, is_valid)`.
    pub fn project_world_to_image(
        &self,
        points_world: &ArrayView<f32, Ix2>,
    ) -> (Array<f32, Ix2>, Array<f32, Ix2>, Array<bool, Ix1>) {
        let points_camera = self.world_to_camera(points_world);
        let uvz = self.project_camera_to_image(&points_camera.view());
        let is_valid_points = self.cull_to_view_frustum(&uvz.view(), &points_camera.view());
        (uvz, points_camera, is_valid_points)
    }

    /// Whether a world point projects strictly inside the image, in front of the camera.
    pub fn contains_world_point(&self, point_world: &ArrayView<f32, Ix1>) -> bool {
        let point = point_world.to_owned().into_shape((1, 3)).unwrap();
        let (_, _, is_valid) = self.project_world_to_image(&point.view());
        is_valid[0]
    }
}

/// Clamp a `[left, top, right, bottom]` box into `[0, width] x [0, height]`.
pub fn clamp_bbox_to_image(bbox: [f32; 4], width_px: usize, height_px: usize) -> [f32; 4] {
    let width = width_px as f32;
    let height = height_px as f32;
    let clamp = |value: f32, max: f32| {
        if value.is_nan() {
            0.
        } else {
            value.clamp(0., max)
        }
    };
    [
        clamp(bbox[0], width),
        clamp(bbox[1], height),
        clamp(bbox[2], width),
        clamp(bbox[3], height),
    ]
}

#[cfg(test)]
mod tests {
    use approx::{assert_relative_eq, AbsDiffEq};
    use ndarray::array;

    use super::{clamp_bbox_to_image, Intrinsics, PinholeCamera};
    use crate::geometry::transform::{Location, Rotation, Transform};

    fn kitti_camera(transform: Transform) -> PinholeCamera {
        PinholeCamera::new(&transform, Intrinsics::from_fov(1242, 375, 90.))
    }

    #[test]
    fn test_from_fov() {
        let intrinsics = Intrinsics::from_fov(1242, 375, 90.);
        assert_relative_eq!(intrinsics.fx_px, 621., epsilon = 1e-3);
        assert_relative_eq!(intrinsics.cx_px, 621.);
        assert_relative_eq!(intrinsics.cy_px, 187.5);
    }

    #[test]
    fn test_world_to_camera_axes() {
        let camera = kitti_camera(Transform::from_location(Location::new(0., 0., 1.65)));
        // 10 m ahead, 2 m right, 1 m below the camera.
        let point = array![[10., 2., 0.65]];
        let cam = camera.world_to_camera(&point.view());
        assert!(cam.abs_diff_eq(&array![[2., 1., 10.]], 1e-5));
    }

    #[test]
    fn test_project_world_to_image() {
        let camera = kitti_camera(Transform::new(
            Location::new(5., 5., 1.65),
            Rotation::from_yaw(90.),
        ));
        // Straight ahead along +y projects onto the principal point.
        let points = array![[5., 25., 1.65], [5., -25., 1.65], [5., 6., 50.]];
        let (uvz, _, is_valid) = camera.project_world_to_image(&points.view());
        assert_relative_eq!(uvz[[0, 0]], 621., epsilon = 1e-2);
        assert_relative_eq!(uvz[[0, 1]], 187.5, epsilon = 1e-2);
        assert_relative_eq!(uvz[[0, 2]], 20., epsilon = 1e-4);
        assert_eq!(is_valid.to_vec(), vec![true, false, false]);
    }

    #[test]
    fn test_clamp_bbox_within_bounds() {
        let boxes = [
            [-50., -20., 1500., 800.],
            [10., 20., 30., 40.],
            [2000., 400., -1., -5.],
            [f32::NAN, f32::INFINITY, f32::NEG_INFINITY, 3.],
        ];
        for bbox in boxes {
            let clamped = clamp_bbox_to_image(bbox, 1242, 375);
            for (i, value) in clamped.iter().enumerate() {
                let max = if i % 2 == 0 { 1242. } else { 375. };
                assert!((0. ..=max).contains(value), "{bbox:?} -> {clamped:?}");
            }
        }
        assert_eq!(
            clamp_bbox_to_image([-50., -20., 1500., 800.], 1242, 375),
            [0., 0., 1242., 375.]
        );
        assert_eq!(
            clamp_bbox_to_image([10., 20., 30., 40.], 1242, 375),
            [10., 20., 30., 40.]
        );
    }
}
