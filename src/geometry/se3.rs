//! # SE(3)
//!
//! Special Euclidean Group 3.

use anyhow::{ensure, Result};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use super::utils::invert_mat3;

/// Special Euclidean Group 3.
/// Rigid transformation parameterized by a rotation and translation in $R^3$.
#[derive(Clone, Debug, PartialEq)]
pub struct SE3 {
    /// (3,3) Orthonormal rotation matrix.
    pub rotation: Array2<f32>,
    /// (3,) Translation vector.
    pub translation: Array1<f32>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: Array2::eye(3),
            translation: Array1::zeros(3),
        }
    }

    /// Build an SE(3) from the upper (3,4) block of a homogeneous matrix.
    pub fn from_matrix(matrix: &ArrayView2<f32>) -> Result<Self> {
        let (rows, cols) = matrix.dim();
        ensure!(
            rows >= 3 && cols == 4,
            "Expected a (3,4) or (4,4) matrix, got ({rows},{cols})."
        );
        Ok(Self {
            rotation: matrix.slice(s![..3, ..3]).to_owned(),
            translation: matrix.slice(s![..3, 3]).to_owned(),
        })
    }

    /// Get the (4,4) homogeneous transformation matrix associated with the rigid transformation.
    pub fn transform_matrix(&self) -> Array2<f32> {
        let mut transform_matrix = Array2::eye(4);
        transform_matrix
            .slice_mut(s![..3, ..3])
            .assign(&self.rotation);
        transform_matrix
            .slice_mut(s![..3, 3])
            .assign(&self.translation);
        transform_matrix
    }

    /// Transform the point cloud from its reference from to the SE(3) destination.
    pub fn transform_from(&self, point_cloud: &ArrayView2<f32>) -> Array2<f32> {
        point_cloud.dot(&self.rotation.t()) + &self.translation
    }

    /// Transform a single point.
    pub fn transform_point(&self, point: &ArrayView1<f32>) -> Array1<f32> {
        self.rotation.dot(point) + &self.translation
    }

    /// Invert the SE(3) transformation.
    pub fn inverse(&self) -> SE3 {
        let rotation = self.rotation.t().as_standard_layout().to_owned();
        let translation = rotation.dot(&(-&self.translation));
        Self {
            rotation,
            translation,
        }
    }

    /// Invert the transformation without assuming the rotation block is orthonormal.
    ///
    /// Calibration matrices estimated from data are only approximately rigid.
    pub fn general_inverse(&self) -> Result<SE3> {
        let rotation = invert_mat3(&self.rotation.view())?;
        let translation = rotation.dot(&(-&self.translation));
        Ok(Self {
            rotation,
            translation,
        })
    }

    /// Compose (right multiply) an SE(3) with another SE(3).
    pub fn compose(&self, right_se3: &SE3) -> SE3 {
        let chained_transform_matrix = self.transform_matrix().dot(&right_se3.transform_matrix());
        SE3 {
            rotation: chained_transform_matrix
                .slice(s![..3, ..3])
                .as_standard_layout()
                .to_owned(),
            translation: chained_transform_matrix
                .slice(s![..3, 3])
                .as_standard_layout()
                .to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::AbsDiffEq;
    use ndarray::{array, Array2};

    use super::SE3;
    use crate::geometry::so3::rotation_z;

    #[test]
    fn test_inverse_compose_is_identity() {
        let city_se3_ego = SE3 {
            rotation: rotation_z(0.8),
            translation: array![10., -4., 1.5],
        };
        let identity = city_se3_ego.compose(&city_se3_ego.inverse());
        assert!(identity
            .transform_matrix()
            .abs_diff_eq(&Array2::<f32>::eye(4), 1e-5));
    }

    #[test]
    fn test_transform_from_matches_transform_point() {
        let se3 = SE3 {
            rotation: rotation_z(std::f32::consts::FRAC_PI_2),
            translation: array![1., 2., 3.],
        };
        let points = array![[1., 0., 0.], [0., 2., 0.]];
        let transformed = se3.transform_from(&points.view());
        assert!(transformed.abs_diff_eq(&array![[1., 3., 3.], [-1., 2., 3.]], 1e-6));
        let point = se3.transform_point(&points.row(1));
        assert!(point.abs_diff_eq(&transformed.row(1), 1e-6));
    }

    #[test]
    fn test_general_inverse_of_non_rigid_block() {
        let se3 = SE3 {
            rotation: array![[1.01, 0.02, 0.], [0., 0.99, 0.01], [0.01, 0., 1.]],
            translation: array![0.5, -0.2, 0.1],
        };
        let inverse = se3.general_inverse().unwrap();
        let identity = se3.compose(&inverse);
        assert!(identity
            .transform_matrix()
            .abs_diff_eq(&Array2::<f32>::eye(4), 1e-5));
    }

    #[test]
    fn test_from_matrix_rejects_bad_shape() {
        let matrix = Array2::<f32>::zeros((3, 3));
        assert!(SE3::from_matrix(&matrix.view()).is_err());
    }
}
