//! # path
//!
//! File path traversal utilities and the KITTI dataset layout.

use anyhow::{Context, Result};
use glob::glob;
use itertools::Itertools;
use once_cell::sync::Lazy;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use crate::constants::{CALIB_FOLDER, IMAGES_FOLDER, LABELS_FOLDER, POINTCLOUDS_FOLDER};

/// Root directory of captured datasets.
pub static DEFAULT_DATASET_DIR: Lazy<PathBuf> = Lazy::new(|| {
    dirs::home_dir()
        .unwrap_or_default()
        .join("data/datasets/simkitti")
});

/// Extract the file stem from a path.
pub fn extract_file_stem(dir: &Path) -> Result<String> {
    let file_stem = dir
        .file_stem()
        .context("Cannot parse file stem.")?
        .to_str()
        .context("Cannot convert file stem to string.")?
        .to_string();
    Ok(file_stem)
}

/// Folder structure of a KITTI-style split.
///
/// ```text
/// <root>/image_2/{id:06}.png
/// <root>/velodyne/{id:06}.bin
/// <root>/label_2/{id:06}.txt
/// <root>/calib/{id:06}.txt
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KittiLayout {
    /// Split directory (e.g., `.../training`).
    pub root: PathBuf,
}

impl KittiLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Camera image directory.
    pub fn image_dir(&self) -> PathBuf {
        self.root.join(IMAGES_FOLDER)
    }

    /// Lidar sweep directory.
    pub fn velodyne_dir(&self) -> PathBuf {
        self.root.join(POINTCLOUDS_FOLDER)
    }

    /// Label directory.
    pub fn label_dir(&self) -> PathBuf {
        self.root.join(LABELS_FOLDER)
    }

    /// Calibration directory.
    pub fn calib_dir(&self) -> PathBuf {
        self.root.join(CALIB_FOLDER)
    }

    /// Create every folder of the layout. Fails if the split already holds a folder.
    pub fn create_dirs(&self) -> Result<()> {
        for dir in [
            self.image_dir(),
            self.velodyne_dir(),
            self.calib_dir(),
            self.label_dir(),
        ] {
            fs::create_dir_all(dir.parent().unwrap_or(&self.root))?;
            fs::create_dir(&dir)
                .with_context(|| format!("Cannot create output folder {}.", dir.display()))?;
        }
        Ok(())
    }

    /// `image_2/{id:06}.png`.
    pub fn image_path(&self, id: u64) -> PathBuf {
        self.image_dir().join(format!("{id:06}.png"))
    }

    /// `velodyne/{id:06}.bin`.
    pub fn velodyne_path(&self, id: u64) -> PathBuf {
        self.velodyne_dir().join(format!("{id:06}.bin"))
    }

    /// `label_2/{id:06}.txt`.
    pub fn label_path(&self, id: u64) -> PathBuf {
        self.label_dir().join(format!("{id:06}.txt"))
    }

    /// `calib/{id:06}.txt`.
    pub fn calib_path(&self, id: u64) -> PathBuf {
        self.calib_dir().join(format!("{id:06}.txt"))
    }

    /// Sorted sample ids, taken from the label file stems.
    pub fn sample_ids(&self) -> Result<Vec<u64>> {
        let pattern = self.label_dir().join("*.txt");
        let pattern = pattern
            .to_str()
            .context("Label directory is not valid unicode.")?;
        let files = glob(pattern)
            .context("Failed to read glob pattern.")?
            .filter_map(|path| match path {
                Ok(x) => Some(x),
                _ => None,
            })
            .collect_vec();

        let mut ids = files
            .iter()
            .map(|path| {
                let stem = extract_file_stem(path)?;
                stem.parse::<u64>()
                    .with_context(|| format!("Label file {} is not a sample id.", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        ids.sort_unstable();
        Ok(ids)
    }
}
