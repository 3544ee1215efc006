//! # calib
//!
//! KITTI calibration: camera projections, rectification and the lidar to camera extrinsics.
//!
//! Points in the rectified camera frame relate to lidar points through
//! `x_rect = R0_rect * Tr_velo_to_cam * x_velo`.

use std::{collections::HashMap, fmt, str::FromStr};

use anyhow::{bail, ensure, Context, Error, Result};
use ndarray::{array, s, Array1, Array2, ArrayView1, ArrayView2};

use crate::geometry::{
    camera::pinhole_camera::Intrinsics,
    se3::SE3,
    transform::Location,
    utils::{cart_to_hom, invert_mat3},
};

/// Calibration of a KITTI sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    /// (3,4) projection matrices of cameras 0 to 3.
    pub p: [Array2<f32>; 4],
    /// (3,3) rectifying rotation.
    pub r0_rect: Array2<f32>,
    /// (3,4) lidar to reference camera transform.
    pub tr_velo_to_cam: Array2<f32>,
    /// (3,4) IMU to lidar transform.
    pub tr_imu_to_velo: Array2<f32>,
}

const KEYS: [&str; 7] = [
    "P0",
    "P1",
    "P2",
    "P3",
    "R0_rect",
    "Tr_velo_to_cam",
    "Tr_imu_to_velo",
];

/// Lidar axes (x forward, y left, z up) to optical camera axes (x right, y down, z forward).
fn velo_to_optical() -> Array2<f32> {
    array![[0., -1., 0.], [0., 0., -1.], [1., 0., 0.]]
}

fn hstack_translation(rotation: &Array2<f32>, translation: &Array1<f32>) -> Array2<f32> {
    let mut matrix = Array2::<f32>::zeros((3, 4));
    matrix.slice_mut(s![.., ..3]).assign(rotation);
    matrix.slice_mut(s![.., 3]).assign(translation);
    matrix
}

impl Calibration {
    /// Calibration of the KITTI recording rig.
    ///
    /// Used for samples that ship without a calibration file. Only the colour camera
    /// projection is known, so every camera shares it.
    pub fn kitti_reference() -> Self {
        let p2 = array![
            [719.787081, 0., 608.463003, 44.9538775],
            [0., 719.787081, 174.545111, 0.1066855],
            [0., 0., 1., 3.0106472e-03]
        ];
        Self {
            p: [p2.clone(), p2.clone(), p2.clone(), p2],
            r0_rect: array![
                [0.99992475, 0.00975976, -0.00734152],
                [-0.0097913, 0.99994262, -0.00430371],
                [0.00729911, 0.0043753, 0.99996319]
            ],
            tr_velo_to_cam: array![
                [7.49916597e-03, -9.99971248e-01, -8.65110297e-04, -6.71807577e-03],
                [1.18652889e-02, 9.54520517e-04, -9.99910318e-01, -7.33152811e-02],
                [9.99882833e-01, 7.49141178e-03, 1.18719929e-02, -2.78557062e-01]
            ],
            tr_imu_to_velo: array![
                [9.999976e-01, 7.553071e-04, -2.035826e-03, -8.086759e-01],
                [-7.854027e-04, 9.998898e-01, -1.482298e-02, 3.195559e-01],
                [2.024406e-03, 1.482454e-02, 9.998881e-01, -7.997231e-01]
            ],
        }
    }

    /// Calibration of a rig with an unrectified pinhole camera and a lidar mounted
    /// on the same vehicle, both axis-aligned with it.
    ///
    /// Mounts are in vehicle coordinates (x forward, y right, z up). Lidar points are
    /// expressed with y pointing left, as KITTI stores them.
    pub fn from_rig(intrinsics: &Intrinsics, camera_mount: &Location, lidar_mount: &Location) -> Self {
        let p = hstack_translation(&intrinsics.k(), &Array1::zeros(3));
        let offset = *lidar_mount - *camera_mount;
        let translation = array![offset.y, -offset.z, offset.x];
        Self {
            p: [p.clone(), p.clone(), p.clone(), p],
            r0_rect: Array2::eye(3),
            tr_velo_to_cam: hstack_translation(&velo_to_optical(), &translation),
            tr_imu_to_velo: hstack_translation(&Array2::eye(3), &Array1::zeros(3)),
        }
    }

    /// Lidar points (N,>=3) to the rectified camera frame.
    pub fn velo_to_cam(&self, points_velo: &ArrayView2<f32>) -> Array2<f32> {
        cart_to_hom(points_velo.slice(s![.., ..3]).to_owned())
            .dot(&self.tr_velo_to_cam.t())
            .dot(&self.r0_rect.t())
    }

    /// Rectified camera to lidar.
    ///
    /// Both matrices are inverted in general form since measured calibrations are
    /// not exactly orthonormal.
    pub fn cam_to_velo(&self, point_rect: &ArrayView1<f32>) -> Result<Array1<f32>> {
        let r0_inv = invert_mat3(&self.r0_rect.view())?;
        let point_ref = r0_inv.dot(point_rect);
        let cam_se3_velo = SE3::from_matrix(&self.tr_velo_to_cam.view())?.general_inverse()?;
        Ok(cam_se3_velo.transform_point(&point_ref.view()))
    }

    /// Project rectified camera points with camera 2. Rows are `[u, v, depth]`.
    pub fn project_rect_to_image(&self, points_rect: &ArrayView2<f32>) -> Array2<f32> {
        let mut uvz = cart_to_hom(points_rect.to_owned()).dot(&self.p[2].t());
        for mut row in uvz.outer_iter_mut() {
            let depth = row[2];
            row[0] /= depth;
            row[1] /= depth;
        }
        uvz
    }

    /// Lidar points that project inside a `width` by `height` image of camera 2.
    pub fn image_mask(
        &self,
        points_velo: &ArrayView2<f32>,
        width: u32,
        height: u32,
    ) -> Vec<bool> {
        let uvz = self.project_rect_to_image(&self.velo_to_cam(points_velo).view());
        uvz.outer_iter()
            .map(|row| {
                row[2] > 0.
                    && (0.0..width as f32).contains(&row[0])
                    && (0.0..height as f32).contains(&row[1])
            })
            .collect()
    }
}

fn format_matrix(f: &mut fmt::Formatter<'_>, key: &str, matrix: &Array2<f32>) -> fmt::Result {
    write!(f, "{key}:")?;
    for value in matrix.iter() {
        write!(f, " {value:.12e}")?;
    }
    writeln!(f)
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.p.iter().enumerate() {
            format_matrix(f, KEYS[i], p)?;
        }
        format_matrix(f, KEYS[4], &self.r0_rect)?;
        format_matrix(f, KEYS[5], &self.tr_velo_to_cam)?;
        format_matrix(f, KEYS[6], &self.tr_imu_to_velo)
    }
}

impl FromStr for Calibration {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut entries = HashMap::new();
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let (key, values) = line
                .split_once(':')
                .with_context(|| format!("Calibration line without a key: `{line}`."))?;
            let values = values
                .split_whitespace()
                .map(|v| {
                    v.parse::<f32>()
                        .with_context(|| format!("Invalid calibration value `{v}` for {key}."))
                })
                .collect::<Result<Vec<_>>>()?;
            entries.insert(key.trim().to_string(), values);
        }

        let mut matrix = |key: &str, shape: (usize, usize)| -> Result<Array2<f32>> {
            let Some(values) = entries.remove(key) else {
                bail!("Calibration is missing {key}.");
            };
            ensure!(
                values.len() == shape.0 * shape.1,
                "{key} has {} values, expected {}.",
                values.len(),
                shape.0 * shape.1
            );
            Ok(Array2::from_shape_vec(shape, values)?)
        };

        let p = [
            matrix(KEYS[0], (3, 4))?,
            matrix(KEYS[1], (3, 4))?,
            matrix(KEYS[2], (3, 4))?,
            matrix(KEYS[3], (3, 4))?,
        ];
        let r0_rect = matrix(KEYS[4], (3, 3))?;
        let tr_velo_to_cam = matrix(KEYS[5], (3, 4))?;
        let tr_imu_to_velo = match matrix(KEYS[6], (3, 4)) {
            Ok(tr) => tr,
            Err(_) => hstack_translation(&Array2::eye(3), &Array1::zeros(3)),
        };
        Ok(Self {
            p,
            r0_rect,
            tr_velo_to_cam,
            tr_imu_to_velo,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use approx::{assert_relative_eq, AbsDiffEq};
    use ndarray::{array, Axis};

    use super::Calibration;
    use crate::{
        constants::{CAMERA_MOUNT, LIDAR_MOUNT},
        geometry::camera::pinhole_camera::Intrinsics,
    };

    fn rig() -> Calibration {
        Calibration::from_rig(
            &Intrinsics::from_fov(1242, 375, 90.),
            &CAMERA_MOUNT,
            &LIDAR_MOUNT,
        )
    }

    #[test]
    fn test_rig_extrinsics() {
        let calib = rig();
        let expected = array![
            [0., -1., 0., 0.],
            [0., 0., -1., -0.08],
            [1., 0., 0., -0.27]
        ];
        assert!(calib.tr_velo_to_cam.abs_diff_eq(&expected, 1e-6));
        assert_relative_eq!(calib.p[2][[0, 0]], 621., epsilon = 1e-3);
    }

    #[test]
    fn test_rig_cam_to_velo() {
        let calib = rig();
        let velo = calib.cam_to_velo(&array![1.0, 1.5, 10.0].view()).unwrap();
        assert!(velo.abs_diff_eq(&array![10.27, -1.0, -1.58], 1e-5));
    }

    #[test]
    fn test_reference_round_trip() {
        let calib = Calibration::kitti_reference();
        let point = array![3.0, -1.2, 25.0];
        let velo = calib.cam_to_velo(&point.view()).unwrap();
        let back = calib.velo_to_cam(&velo.clone().insert_axis(Axis(0)).view());
        assert!(back.row(0).abs_diff_eq(&point, 1e-4));
        // The reference lidar sits roughly 0.27 m behind the camera.
        assert_relative_eq!(velo[0], 25.27, epsilon = 0.5);
    }

    #[test]
    fn test_text_format() {
        let calib = rig();
        let text = calib.to_string();
        assert_eq!(text.lines().count(), 7);
        assert!(text.starts_with("P0: "));
        let parsed = Calibration::from_str(&text).unwrap();
        assert!(parsed.tr_velo_to_cam.abs_diff_eq(&calib.tr_velo_to_cam, 1e-6));
        assert!(parsed.p[2].abs_diff_eq(&calib.p[2], 1e-3));
    }

    #[test]
    fn test_missing_entries() {
        let text = rig().to_string();
        let without_r0: String = text
            .lines()
            .filter(|line| !line.starts_with("R0_rect"))
            .map(|line| format!("{line}\n"))
            .collect();
        assert!(Calibration::from_str(&without_r0).is_err());

        let without_imu: String = text
            .lines()
            .filter(|line| !line.starts_with("Tr_imu_to_velo"))
            .map(|line| format!("{line}\n"))
            .collect();
        assert!(Calibration::from_str(&without_imu).is_ok());
    }

    #[test]
    fn test_project_rect_to_image() {
        let calib = rig();
        let uvz = calib.project_rect_to_image(&array![[0., 0., 10.], [-5., 0., 10.]].view());
        assert!(uvz.abs_diff_eq(&array![[621., 187.5, 10.], [310.5, 187.5, 10.]], 1e-3));
    }

    #[test]
    fn test_image_mask() {
        let calib = rig();
        // Ahead, ahead but far to the left, behind, and above the image.
        let points_velo = array![
            [20., 0., 0., 0.5],
            [20., 25., 0., 0.5],
            [-20., 0., 0., 0.5],
            [5., 0., 10., 0.5]
        ];
        let mask = calib.image_mask(&points_velo.view(), 1242, 375);
        assert_eq!(mask, vec![true, false, false, false]);
    }
}
