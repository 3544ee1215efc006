//! # utils
//!
//! Geometric utilities.

use std::f32::consts::PI;

use anyhow::{ensure, Result};
use ndarray::{s, Array, Array2, ArrayView2, Ix2};

/// Convert Cartesian coordinates into Homogeneous coordinates.
/// This function converts a set of points in R^N to its homogeneous representation in R^(N+1).
pub fn cart_to_hom(cart: Array<f32, Ix2>) -> Array<f32, Ix2> {
    let num_points = cart.shape()[0];
    let num_dims = cart.shape()[1];
    let mut hom = Array::<f32, Ix2>::ones([num_points, num_dims + 1]);
    hom.slice_mut(s![.., ..num_dims]).assign(&cart);
    hom
}

/// Wrap an angle in radians into the half-open interval `(-π, π]`.
pub fn normalize_angle(angle_rad: f32) -> f32 {
    let two_pi = 2. * PI;
    let mut wrapped = angle_rad.rem_euclid(two_pi);
    if wrapped > PI {
        wrapped -= two_pi;
    }
    // `rem_euclid` maps -π onto π already, but rounding can land exactly on -π.
    if wrapped <= -PI {
        wrapped += two_pi;
    }
    wrapped
}

/// Wrap an angle in degrees into the half-open interval `(-180, 180]`.
pub fn normalize_angle_deg(angle_deg: f32) -> f32 {
    let mut wrapped = angle_deg.rem_euclid(360.);
    if wrapped > 180. {
        wrapped -= 360.;
    }
    wrapped
}

/// Invert a general (3,3) matrix through its adjugate.
pub fn invert_mat3(mat: &ArrayView2<f32>) -> Result<Array2<f32>> {
    ensure!(mat.shape() == [3, 3], "Expected a (3,3) matrix, got {:?}.", mat.shape());
    let m = |i: usize, j: usize| mat[[i, j]] as f64;

    let c00 = m(1, 1) * m(2, 2) - m(1, 2) * m(2, 1);
    let c01 = m(1, 2) * m(2, 0) - m(1, 0) * m(2, 2);
    let c02 = m(1, 0) * m(2, 1) - m(1, 1) * m(2, 0);
    let det = m(0, 0) * c00 + m(0, 1) * c01 + m(0, 2) * c02;
    ensure!(det.abs() > f64::EPSILON, "Matrix is singular.");

    let adjugate = [
        [
            c00,
            m(0, 2) * m(2, 1) - m(0, 1) * m(2, 2),
            m(0, 1) * m(1, 2) - m(0, 2) * m(1, 1),
        ],
        [
            c01,
            m(0, 0) * m(2, 2) - m(0, 2) * m(2, 0),
            m(0, 2) * m(1, 0) - m(0, 0) * m(1, 2),
        ],
        [
            c02,
            m(0, 1) * m(2, 0) - m(0, 0) * m(2, 1),
            m(0, 0) * m(1, 1) - m(0, 1) * m(1, 0),
        ],
    ];
    Ok(Array2::from_shape_fn((3, 3), |(i, j)| {
        (adjugate[i][j] / det) as f32
    }))
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use approx::{assert_relative_eq, AbsDiffEq};
    use ndarray::{array, Array2};

    use super::{cart_to_hom, invert_mat3, normalize_angle, normalize_angle_deg};

    #[test]
    fn test_normalize_angle_range() {
        let mut angle = -20.0_f32;
        while angle < 20.0 {
            let wrapped = normalize_angle(angle);
            assert!(wrapped > -PI && wrapped <= PI, "{angle} -> {wrapped}");
            assert_relative_eq!(wrapped.sin(), angle.sin(), epsilon = 1e-4);
            assert_relative_eq!(wrapped.cos(), angle.cos(), epsilon = 1e-4);
            angle += 0.01;
        }
    }

    #[test]
    fn test_normalize_angle_boundaries() {
        assert_relative_eq!(normalize_angle(PI), PI);
        assert_relative_eq!(normalize_angle(-PI), PI);
        assert_relative_eq!(normalize_angle(2. * PI), 0.);
        assert_relative_eq!(normalize_angle(-PI / 2.), -PI / 2., epsilon = 1e-6);
        assert_relative_eq!(normalize_angle(0.), 0.);
    }

    #[test]
    fn test_normalize_angle_deg() {
        assert_relative_eq!(normalize_angle_deg(270.), -90.);
        assert_relative_eq!(normalize_angle_deg(-180.), 180.);
        assert_relative_eq!(normalize_angle_deg(540.), 180.);
        assert_relative_eq!(normalize_angle_deg(-190.), 170.);
    }

    #[test]
    fn test_cart_to_hom() {
        let hom = cart_to_hom(array![[1., 2., 3.], [4., 5., 6.]]);
        assert_eq!(hom, array![[1., 2., 3., 1.], [4., 5., 6., 1.]]);
    }

    #[test]
    fn test_invert_mat3() {
        let mat = array![[2., 0., 1.], [1., 3., 0.], [0., 1., 4.]];
        let inv = invert_mat3(&mat.view()).unwrap();
        let identity = mat.dot(&inv);
        assert!(identity.abs_diff_eq(&Array2::<f32>::eye(3), 1e-5));
    }

    #[test]
    fn test_invert_singular_mat3() {
        let mat = array![[1., 2., 3.], [2., 4., 6.], [0., 1., 4.]];
        assert!(invert_mat3(&mat.view()).is_err());
    }
}
