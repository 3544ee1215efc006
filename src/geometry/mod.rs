//! # geometry
//!
//! Geometric operations for data processing.

/// Camera models.
pub mod camera;
/// Geometric algorithms for polytopes.
pub mod polytope;
/// Special Euclidean Group 3.
pub mod se3;
/// Special Orthogonal Group 3.
pub mod so3;
/// Simulator poses and actor bounding boxes.
pub mod transform;
/// Geometric utility functions.
pub mod utils;
