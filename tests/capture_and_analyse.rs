//! Capture a short run on the synthetic world and analyse it.

use simkitti::{
    analysis::{AnalyserConfig, DatasetAnalyser},
    capture::{capture, CaptureConfig},
    io::{read_calibration, read_image_rgba8, read_labels, read_velodyne},
    label::ObjectType,
    path::KittiLayout,
    simulator::{
        synthetic::{SyntheticConfig, SyntheticWorld},
        Simulator,
    },
};
use tempfile::TempDir;

#[test]
fn capture_then_analyse() {
    let dir = TempDir::new().unwrap();
    let split = dir.path().join("run_0").join("training");

    let mut world = SyntheticWorld::new(SyntheticConfig {
        seed: 3,
        ..Default::default()
    });
    let mut config = CaptureConfig::new(&split);
    config.frames = 4;
    config.number_of_vehicles = 80;
    config.seed = 3;
    let summary = capture(&mut world, config).unwrap();

    assert_eq!(summary.sample_ids.len(), 4);
    assert!(summary.sample_ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(world.num_actors(), 0);
    assert!(!world.settings().synchronous_mode);

    let layout = KittiLayout::new(&split);
    assert_eq!(layout.sample_ids().unwrap(), summary.sample_ids);
    let mut num_labels = 0;
    for id in &summary.sample_ids {
        let image = read_image_rgba8(&layout.image_path(*id)).unwrap();
        assert_eq!(image.dimensions(), (1242, 375));

        let points = read_velodyne(&layout.velodyne_path(*id)).unwrap();
        assert!(points.nrows() > 10_000);

        let calib = read_calibration(&layout.calib_path(*id)).unwrap();
        assert_eq!(calib.r0_rect, ndarray::Array2::<f32>::eye(3));

        let labels = read_labels(&layout.label_path(*id)).unwrap();
        for label in &labels {
            assert_eq!(label.object_type, ObjectType::Car);
            assert!(label.location[2] > 0. && label.location[2] < 50.);
            assert!(label.bbox[0] >= 0. && label.bbox[2] <= 1242.);
            assert!(label.bbox[1] >= 0. && label.bbox[3] <= 375.);
        }
        num_labels += labels.len();
    }
    assert_eq!(num_labels, summary.num_labels);
    // Half the spawn points are taken, some of them within 50 m ahead of the ego vehicle.
    assert!(num_labels > 0);

    let report = DatasetAnalyser::new(layout, AnalyserConfig::default())
        .run()
        .unwrap();
    assert_eq!(report.num_samples, 4);
    assert_eq!(report.records.len(), num_labels);
    assert_eq!(report.histogram.total(), num_labels);
    // Labeled cars are hit by the lidar.
    assert!(report.counts().iter().any(|&count| count > 0));
}
