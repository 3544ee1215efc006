//! # sync
//!
//! Pairing of camera and lidar measurements by frame number.

use std::{cmp::Ordering, collections::VecDeque};

use crate::simulator::{ImageMeasurement, LidarMeasurement};

/// Buffers both sensor streams and releases only pairs taken at the same frame.
///
/// Streams arrive in increasing frame order. When the fronts of the two queues
/// disagree, the older measurement can never be matched anymore and is dropped.
#[derive(Debug, Default)]
pub struct FrameSynchronizer {
    images: VecDeque<ImageMeasurement>,
    clouds: VecDeque<LidarMeasurement>,
    dropped: usize,
}

impl FrameSynchronizer {
    /// Empty synchronizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a camera frame.
    pub fn push_image(&mut self, image: ImageMeasurement) {
        self.images.push_back(image);
    }

    /// Queue a lidar sweep.
    pub fn push_cloud(&mut self, cloud: LidarMeasurement) {
        self.clouds.push_back(cloud);
    }

    /// Oldest pair with equal frame numbers, if both streams have reached it.
    pub fn pop_matched(&mut self) -> Option<(ImageMeasurement, LidarMeasurement)> {
        loop {
            let image_frame = self.images.front()?.frame;
            let cloud_frame = self.clouds.front()?.frame;
            match image_frame.cmp(&cloud_frame) {
                Ordering::Equal => {
                    let image = self.images.pop_front()?;
                    let cloud = self.clouds.pop_front()?;
                    return Some((image, cloud));
                }
                Ordering::Less => {
                    debug!("Dropping image of frame {image_frame} without a sweep.");
                    self.images.pop_front();
                    self.dropped += 1;
                }
                Ordering::Greater => {
                    debug!("Dropping sweep of frame {cloud_frame} without an image.");
                    self.clouds.pop_front();
                    self.dropped += 1;
                }
            }
        }
    }

    /// Measurements discarded so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Measurements waiting for their counterpart, `(images, clouds)`.
    pub fn pending(&self) -> (usize, usize) {
        (self.images.len(), self.clouds.len())
    }
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;
    use ndarray::Array2;

    use super::FrameSynchronizer;
    use crate::{
        geometry::transform::Transform,
        simulator::{ImageMeasurement, LidarMeasurement},
    };

    fn image(frame: u64) -> ImageMeasurement {
        ImageMeasurement {
            frame,
            transform: Transform::default(),
            image: RgbaImage::new(2, 2),
        }
    }

    fn cloud(frame: u64) -> LidarMeasurement {
        LidarMeasurement {
            frame,
            transform: Transform::default(),
            points: Array2::zeros((0, 4)),
            channel_counts: vec![],
        }
    }

    #[test]
    fn test_matched_frames() {
        let mut sync = FrameSynchronizer::new();
        sync.push_image(image(3));
        assert!(sync.pop_matched().is_none());
        sync.push_cloud(cloud(3));
        let (image, cloud) = sync.pop_matched().unwrap();
        assert_eq!((image.frame, cloud.frame), (3, 3));
        assert_eq!(sync.pending(), (0, 0));
        assert_eq!(sync.dropped(), 0);
    }

    #[test]
    fn test_lagging_lidar_is_never_paired_with_a_newer_image() {
        let mut sync = FrameSynchronizer::new();
        for frame in 10..13 {
            sync.push_image(image(frame));
        }
        // Sweeps of frames 8 and 9 have no image; 11 does.
        for frame in [8, 9, 11] {
            sync.push_cloud(cloud(frame));
        }
        let (image, cloud) = sync.pop_matched().unwrap();
        assert_eq!((image.frame, cloud.frame), (11, 11));
        assert_eq!(sync.dropped(), 3);
        assert!(sync.pop_matched().is_none());
        assert_eq!(sync.pending(), (1, 0));
    }
}
