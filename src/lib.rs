//! # simkitti
//!
//! KITTI-style dataset capture from a driving simulator, city map coordinate
//! conversions and lidar statistics of the captured labels.

#![warn(missing_docs)]

#[macro_use]
extern crate log;

pub mod analysis;
pub mod calib;
pub mod capture;
pub mod constants;
pub mod geometry;
pub mod io;
pub mod label;
pub mod map;
pub mod ops;
pub mod path;
pub mod simulator;
