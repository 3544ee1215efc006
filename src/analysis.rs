//! # analysis
//!
//! Lidar point statistics of the labeled objects of a KITTI split.

use std::f32::consts::FRAC_PI_2;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use ndarray::{s, Array1, Array2, Axis};
use polars::{
    df,
    prelude::{DataFrame, NamedFrom},
};
use rayon::prelude::*;

use crate::{
    calib::Calibration,
    constants::{
        ANALYSER_VERTICAL_OFFSET_M, HISTOGRAM_NUM_EDGES, IMAGE_HEIGHT_PX, IMAGE_WIDTH_PX,
    },
    geometry::{
        polytope::{count_interior_points, cuboids_to_polygons},
        so3::_yaw_to_quat,
    },
    io::{read_calibration, read_labels, read_velodyne},
    label::{KittiLabel, ObjectType},
    ops::Histogram,
    path::KittiLayout,
};

/// Analyser parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyserConfig {
    /// Labels of other types are ignored.
    pub object_type: ObjectType,
    /// Height added to the box centre in the lidar frame.
    pub vertical_offset_m: f32,
    /// Histogram bin edges.
    pub num_bin_edges: usize,
    /// Only count points that project inside the colour camera image.
    pub camera_fov_only: bool,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            object_type: ObjectType::Car,
            vertical_offset_m: ANALYSER_VERTICAL_OFFSET_M,
            num_bin_edges: HISTOGRAM_NUM_EDGES,
            camera_fov_only: false,
        }
    }
}

/// Label box in the lidar frame.
#[derive(Clone, Debug, PartialEq)]
pub struct OrientedBox {
    /// Box centre.
    pub center: [f32; 3],
    /// Length, width and height along the box axes.
    pub extent_lwh: [f32; 3],
    /// Heading around the lidar z-axis.
    pub yaw_rad: f32,
}

impl OrientedBox {
    /// Box of a label whose location is the bottom centre in the rectified camera frame.
    pub fn from_label(
        label: &KittiLabel,
        calib: &Calibration,
        vertical_offset_m: f32,
    ) -> Result<Self> {
        let location = Array1::from_vec(label.location.to_vec());
        let velo = calib.cam_to_velo(&location.view())?;
        Ok(Self {
            center: [
                velo[0],
                velo[1],
                velo[2] + label.height() / 2. + vertical_offset_m,
            ],
            extent_lwh: [label.length(), label.width(), label.height()],
            yaw_rad: -(label.rotation_y + FRAC_PI_2),
        })
    }

    /// `tx, ty, tz, length, width, height, qw, qx, qy, qz`.
    pub fn to_cuboid(&self) -> Array1<f32> {
        let quat_wxyz = _yaw_to_quat(self.yaw_rad);
        let mut cuboid = Array1::zeros(10);
        cuboid.slice_mut(s![0..3]).assign(&Array1::from_vec(self.center.to_vec()));
        cuboid
            .slice_mut(s![3..6])
            .assign(&Array1::from_vec(self.extent_lwh.to_vec()));
        cuboid.slice_mut(s![6..10]).assign(&quat_wxyz);
        cuboid
    }

    /// Horizontal distance from the sensor.
    pub fn range_m(&self) -> f32 {
        self.center[0].hypot(self.center[1])
    }
}

/// Point count of one analysed box.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxRecord {
    /// Sample the box belongs to.
    pub sample_id: u64,
    /// Line of the box in the label file.
    pub label_index: usize,
    /// Lidar points inside the box.
    pub num_points: usize,
    /// Horizontal distance from the sensor.
    pub range_m: f32,
}

/// Result of a dataset analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisReport {
    /// Number of samples visited.
    pub num_samples: usize,
    /// One record per analysed box, ordered by sample.
    pub records: Vec<BoxRecord>,
    /// Histogram of the point counts.
    pub histogram: Histogram,
}

impl AnalysisReport {
    /// Point counts of every box.
    pub fn counts(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.num_points).collect()
    }

    /// Records as a `sample_id, label_index, num_points, range_m` table.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let frame = df!(
            "sample_id" => self.records.iter().map(|r| r.sample_id).collect::<Vec<_>>(),
            "label_index" => self.records.iter().map(|r| r.label_index as u32).collect::<Vec<_>>(),
            "num_points" => self.records.iter().map(|r| r.num_points as u64).collect::<Vec<_>>(),
            "range_m" => self.records.iter().map(|r| r.range_m).collect::<Vec<_>>(),
        )?;
        Ok(frame)
    }
}

/// Counts lidar points inside labeled boxes over a split.
#[derive(Clone, Debug)]
pub struct DatasetAnalyser {
    layout: KittiLayout,
    config: AnalyserConfig,
    fallback_calibration: Calibration,
}

impl DatasetAnalyser {
    /// Analyser of the split at `layout`.
    ///
    /// Samples without a calibration file use the KITTI reference calibration.
    pub fn new(layout: KittiLayout, config: AnalyserConfig) -> Self {
        Self {
            layout,
            config,
            fallback_calibration: Calibration::kitti_reference(),
        }
    }

    fn calibration(&self, sample_id: u64) -> Result<Calibration> {
        let path = self.layout.calib_path(sample_id);
        if path.exists() {
            read_calibration(&path)
        } else {
            debug!("No calibration for sample {sample_id}; using the reference one.");
            Ok(self.fallback_calibration.clone())
        }
    }

    fn image_size(&self, sample_id: u64) -> (u32, u32) {
        image::image_dimensions(self.layout.image_path(sample_id)).unwrap_or_else(|_| {
            debug!("No image for sample {sample_id}; assuming the default size.");
            (IMAGE_WIDTH_PX as u32, IMAGE_HEIGHT_PX as u32)
        })
    }

    /// Boxes of one sample with their point counts.
    pub fn analyse_sample(&self, sample_id: u64) -> Result<Vec<BoxRecord>> {
        let labels = read_labels(&self.layout.label_path(sample_id))?;
        let selected: Vec<(usize, &KittiLabel)> = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| label.object_type == self.config.object_type)
            .collect();
        if selected.is_empty() {
            return Ok(vec![]);
        }

        let calib = self.calibration(sample_id)?;
        let mut points = read_velodyne(&self.layout.velodyne_path(sample_id))?;
        if self.config.camera_fov_only {
            let (width, height) = self.image_size(sample_id);
            let inside = calib.image_mask(&points.view(), width, height);
            let keep: Vec<usize> = inside
                .iter()
                .enumerate()
                .filter_map(|(i, &inside)| inside.then_some(i))
                .collect();
            points = points.select(Axis(0), &keep);
        }
        let boxes = selected
            .iter()
            .map(|(_, label)| OrientedBox::from_label(label, &calib, self.config.vertical_offset_m))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Invalid calibration for sample {sample_id}."))?;

        let mut cuboids = Array2::zeros((boxes.len(), 10));
        for (mut row, oriented_box) in cuboids.outer_iter_mut().zip(&boxes) {
            row.assign(&oriented_box.to_cuboid());
        }
        let polygons = cuboids_to_polygons(&cuboids.view());
        let counts = count_interior_points(&points.slice(s![.., ..3]), &polygons.view());

        Ok(selected
            .iter()
            .zip(boxes.iter().zip(counts))
            .map(|((label_index, _), (oriented_box, num_points))| BoxRecord {
                sample_id,
                label_index: *label_index,
                num_points,
                range_m: oriented_box.range_m(),
            })
            .collect())
    }

    /// Analyse every sample of the split in parallel.
    pub fn run(&self) -> Result<AnalysisReport> {
        let sample_ids = self.layout.sample_ids()?;
        info!(
            "Analysing {} samples in {}.",
            sample_ids.len(),
            self.layout.label_dir().display()
        );

        let bar = ProgressBar::new(sample_ids.len() as u64);
        let per_sample = sample_ids
            .par_iter()
            .map(|sample_id| {
                let records = self.analyse_sample(*sample_id);
                bar.inc(1);
                records
            })
            .collect::<Result<Vec<_>>>()?;
        bar.finish();

        let records: Vec<BoxRecord> = per_sample.into_iter().flatten().collect();
        let counts: Vec<usize> = records.iter().map(|r| r.num_points).collect();
        info!("Analysed {} boxes.", records.len());
        Ok(AnalysisReport {
            num_samples: sample_ids.len(),
            histogram: Histogram::from_counts(&counts, self.config.num_bin_edges)?,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use tempfile::TempDir;

    use super::{AnalyserConfig, DatasetAnalyser, OrientedBox};
    use crate::{
        calib::Calibration,
        geometry::{camera::pinhole_camera::Intrinsics, transform::Location},
        io::{write_calibration, write_labels, write_velodyne},
        label::{KittiLabel, ObjectType},
        path::KittiLayout,
    };

    fn rig() -> Calibration {
        Calibration::from_rig(
            &Intrinsics::from_fov(1242, 375, 90.),
            &Location::new(0., 0., 1.65),
            &Location::new(-0.27, 0., 1.73),
        )
    }

    fn car() -> KittiLabel {
        let mut label = KittiLabel::new(ObjectType::Car);
        label.dimensions = [1.5, 2.0, 4.0];
        label.location = [1., 1.5, 10.];
        label.rotation_y = FRAC_PI_2;
        label
    }

    #[test]
    fn test_oriented_box_from_label() {
        let oriented_box = OrientedBox::from_label(&car(), &rig(), 0.15).unwrap();
        assert_relative_eq!(oriented_box.center[0], 10.27, epsilon = 1e-4);
        assert_relative_eq!(oriented_box.center[1], -1.0, epsilon = 1e-4);
        assert_relative_eq!(oriented_box.center[2], -0.68, epsilon = 1e-4);
        assert_eq!(oriented_box.extent_lwh, [4.0, 2.0, 1.5]);
        assert_relative_eq!(oriented_box.yaw_rad, -PI);

        let cuboid = oriented_box.to_cuboid();
        assert_eq!(cuboid.len(), 10);
        assert_eq!(cuboid[3], 4.0);
        assert_relative_eq!(cuboid[6].abs(), 0., epsilon = 1e-6);
        assert_relative_eq!(cuboid[9].abs(), 1., epsilon = 1e-6);
    }

    fn write_sample(layout: &KittiLayout, id: u64, labels: &[KittiLabel], with_calib: bool) {
        let points: Array2<f32> = array![
            [10.27, -1.0, -0.68, 0.5],
            [11.5, -0.5, -0.3, 0.5],
            [15.0, -1.0, -0.68, 0.5],
            [10.27, -1.0, 0.2, 0.5],
            [5.27, -12.0, -0.68, 0.5],
        ];
        write_velodyne(&layout.velodyne_path(id), &points.view()).unwrap();
        write_labels(&layout.label_path(id), labels).unwrap();
        if with_calib {
            write_calibration(&layout.calib_path(id), &rig()).unwrap();
        }
    }

    #[test]
    fn test_analyse_dataset() {
        let dir = TempDir::new().unwrap();
        let layout = KittiLayout::new(dir.path().join("training"));
        layout.create_dirs().unwrap();
        let mut pedestrian = KittiLabel::new(ObjectType::Pedestrian);
        pedestrian.dimensions = [1.8, 0.6, 0.6];
        write_sample(&layout, 4, &[pedestrian, car()], true);
        write_sample(&layout, 9, &[], true);

        let analyser = DatasetAnalyser::new(layout, AnalyserConfig::default());
        let records = analyser.analyse_sample(4).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label_index, 1);
        assert_eq!(records[0].num_points, 2);

        let report = analyser.run().unwrap();
        assert_eq!(report.num_samples, 2);
        assert_eq!(report.counts(), vec![2]);
        assert_eq!(report.histogram.counts, array![1usize]);

        let frame = report.to_frame().unwrap();
        assert_eq!(frame.shape(), (1, 4));
    }

    #[test]
    fn test_missing_calibration_uses_reference() {
        let dir = TempDir::new().unwrap();
        let layout = KittiLayout::new(dir.path().join("training"));
        layout.create_dirs().unwrap();
        write_sample(&layout, 1, &[car()], false);

        let analyser = DatasetAnalyser::new(layout, AnalyserConfig::default());
        let records = analyser.analyse_sample(1).unwrap();
        assert_eq!(records.len(), 1);
        let expected = OrientedBox::from_label(&car(), &Calibration::kitti_reference(), 0.15)
            .unwrap()
            .range_m();
        assert_relative_eq!(records[0].range_m, expected);
    }

    #[test]
    fn test_camera_fov_only() {
        let dir = TempDir::new().unwrap();
        let layout = KittiLayout::new(dir.path().join("training"));
        layout.create_dirs().unwrap();
        // Right of the camera and outside its image.
        let mut beside = car();
        beside.location = [12., 1.5, 5.];
        write_sample(&layout, 2, &[car(), beside], true);

        let all_points = DatasetAnalyser::new(layout.clone(), AnalyserConfig::default());
        let counts: Vec<usize> = all_points
            .analyse_sample(2)
            .unwrap()
            .iter()
            .map(|r| r.num_points)
            .collect();
        assert_eq!(counts, vec![2, 1]);

        let config = AnalyserConfig {
            camera_fov_only: true,
            ..Default::default()
        };
        let in_view = DatasetAnalyser::new(layout, config);
        let counts: Vec<usize> = in_view
            .analyse_sample(2)
            .unwrap()
            .iter()
            .map(|r| r.num_points)
            .collect();
        assert_eq!(counts, vec![2, 0]);
    }
}
