//! # SO(3)
//!
//! Special Orthogonal Group 3 (SO(3)).
//!
//! Two rotation conventions meet here: scalar-first quaternions used for cuboids, and the
//! simulator's Euler angles (pitch, yaw, roll in degrees, left-handed, z up).

use ndarray::{Array, Array2, ArrayView, Ix1, Ix2};

/// Convert a quaternion in scalar-first format to a 3x3 rotation matrix.
pub fn _quat_to_mat3(quat_wxyz: &ArrayView<f32, Ix1>) -> Array<f32, Ix2> {
    let w = quat_wxyz[0];
    let x = quat_wxyz[1];
    let y = quat_wxyz[2];
    let z = quat_wxyz[3];

    let e_00 = 1. - 2. * y.powi(2) - 2. * z.powi(2);
    let e_01: f32 = 2. * x * y - 2. * z * w;
    let e_02: f32 = 2. * x * z + 2. * y * w;

    let e_10 = 2. * x * y + 2. * z * w;
    let e_11 = 1. - 2. * x.powi(2) - 2. * z.powi(2);
    let e_12 = 2. * y * z - 2. * x * w;

    let e_20 = 2. * x * z - 2. * y * w;
    let e_21 = 2. * y * z + 2. * x * w;
    let e_22 = 1. - 2. * x.powi(2) - 2. * y.powi(2);

    mat3_from_rows([[e_00, e_01, e_02], [e_10, e_11, e_12], [e_20, e_21, e_22]])
}

/// Convert rotation about the z-axis to a scalar-first quaternion.
pub fn _yaw_to_quat(yaw_rad: f32) -> Array<f32, Ix1> {
    let qw = f32::cos(0.5 * yaw_rad);
    let qz = f32::sin(0.5 * yaw_rad);
    Array::<f32, Ix1>::from_vec(vec![qw, 0.0, 0.0, qz])
}

/// Rotation matrix about the z-axis.
pub fn rotation_z(angle_rad: f32) -> Array2<f32> {
    let (s, c) = angle_rad.sin_cos();
    mat3_from_rows([[c, -s, 0.], [s, c, 0.], [0., 0., 1.]])
}

/// Rotation matrix of the simulator's Euler angles, all in degrees.
///
/// Matches the rotation block of the simulator's actor transform matrix: yaw about +z,
/// pitch about +y, roll about +x.
pub fn euler_deg_to_mat3(pitch_deg: f32, yaw_deg: f32, roll_deg: f32) -> Array2<f32> {
    let (sp, cp) = pitch_deg.to_radians().sin_cos();
    let (sy, cy) = yaw_deg.to_radians().sin_cos();
    let (sr, cr) = roll_deg.to_radians().sin_cos();
    mat3_from_rows([
        [cp * cy, cy * sp * sr - sy * cr, -cy * sp * cr - sy * sr],
        [cp * sy, sy * sp * sr + cy * cr, -sy * sp * cr + cy * sr],
        [sp, -cp * sr, cp * cr],
    ])
}

/// Recover the simulator's `(pitch, yaw, roll)` in degrees from a rotation matrix.
pub fn mat3_to_euler_deg(mat3: &ArrayView<f32, Ix2>) -> (f32, f32, f32) {
    let pitch = mat3[[2, 0]].clamp(-1., 1.).asin();
    let yaw = mat3[[1, 0]].atan2(mat3[[0, 0]]);
    let roll = (-mat3[[2, 1]]).atan2(mat3[[2, 2]]);
    (pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
}

fn mat3_from_rows(rows: [[f32; 3]; 3]) -> Array2<f32> {
    Array2::from_shape_fn((3, 3), |(i, j)| rows[i][j])
}

#[cfg(test)]
mod tests {
    use approx::{assert_relative_eq, AbsDiffEq};
    use ndarray::array;

    use super::{_quat_to_mat3, _yaw_to_quat, euler_deg_to_mat3, mat3_to_euler_deg, rotation_z};

    #[test]
    fn test_yaw_quat_matches_rotation_z() {
        for yaw in [-3.0_f32, -1.2, 0.0, 0.7, 2.9] {
            let quat_wxyz = _yaw_to_quat(yaw);
            let mat3 = _quat_to_mat3(&quat_wxyz.view());
            assert!(mat3.abs_diff_eq(&rotation_z(yaw), 1e-6));
        }
    }

    #[test]
    fn test_quat_to_mat3_half_turn() {
        let quat_wxyz = array![0., 0., 0., 1.];
        let mat3 = _quat_to_mat3(&quat_wxyz.view());
        assert!(mat3.abs_diff_eq(&array![[-1., 0., 0.], [0., -1., 0.], [0., 0., 1.]], 1e-6));
    }

    #[test]
    fn test_euler_yaw_only_is_rotation_z() {
        let mat3 = euler_deg_to_mat3(0., 90., 0.);
        assert!(mat3.abs_diff_eq(&rotation_z(90_f32.to_radians()), 1e-6));
    }

    #[test]
    fn test_euler_round_trip() {
        let (pitch, yaw, roll) = (10., -135., 5.);
        let mat3 = euler_deg_to_mat3(pitch, yaw, roll);
        let (p, y, r) = mat3_to_euler_deg(&mat3.view());
        assert_relative_eq!(p, pitch, epsilon = 1e-3);
        assert_relative_eq!(y, yaw, epsilon = 1e-3);
        assert_relative_eq!(r, roll, epsilon = 1e-3);
    }
}
