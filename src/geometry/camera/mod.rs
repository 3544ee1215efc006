//! # camera
//!
//! Camera models.

/// Pinhole camera model.
pub mod pinhole_camera;
