//! # io
//!
//! Reading and writing operations.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{ensure, Context, Result};
use image::{ImageFormat, RgbaImage};
use ndarray::{Array2, ArrayView2};
use polars::prelude::{DataFrame, IpcWriter, SerWriter};
use serde::de::DeserializeOwned;

use crate::{
    calib::Calibration,
    constants::VELODYNE_POINT_DIMS,
    label::{parse_labels, KittiLabel},
    simulator::blueprints::{ReflectivityTable, VehicleList},
};

const BYTES_PER_POINT: usize = VELODYNE_POINT_DIMS * std::mem::size_of::<f32>();

/// Read a KITTI velodyne sweep: little-endian `f32` rows of `x, y, z, intensity`.
pub fn read_velodyne(path: &Path) -> Result<Array2<f32>> {
    let bytes =
        fs::read(path).with_context(|| format!("Cannot read sweep {}.", path.display()))?;
    ensure!(
        bytes.len() % BYTES_PER_POINT == 0,
        "Sweep {} holds {} bytes, not a whole number of points.",
        path.display(),
        bytes.len()
    );
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    let num_points = values.len() / VELODYNE_POINT_DIMS;
    Ok(Array2::from_shape_vec(
        (num_points, VELODYNE_POINT_DIMS),
        values,
    )?)
}

/// Write an (N,4) sweep in KITTI velodyne format.
pub fn write_velodyne(path: &Path, points: &ArrayView2<f32>) -> Result<()> {
    ensure!(
        points.ncols() == VELODYNE_POINT_DIMS,
        "Expected {VELODYNE_POINT_DIMS} columns per point, got {}.",
        points.ncols()
    );
    let file =
        File::create(path).with_context(|| format!("Cannot create {}.", path.display()))?;
    let mut writer = BufWriter::new(file);
    for value in points.iter() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a KITTI label file.
pub fn read_labels(path: &Path) -> Result<Vec<KittiLabel>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read labels {}.", path.display()))?;
    parse_labels(&text).with_context(|| format!("Invalid label file {}.", path.display()))
}

/// Write one label per line. An empty slice produces an empty file.
pub fn write_labels(path: &Path, labels: &[KittiLabel]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Cannot create {}.", path.display()))?;
    let mut writer = BufWriter::new(file);
    for label in labels {
        writeln!(writer, "{label}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a KITTI calibration file.
pub fn read_calibration(path: &Path) -> Result<Calibration> {
    fs::read_to_string(path)
        .with_context(|| format!("Cannot read calibration {}.", path.display()))?
        .parse()
        .with_context(|| format!("Invalid calibration file {}.", path.display()))
}

/// Write a KITTI calibration file.
pub fn write_calibration(path: &Path, calib: &Calibration) -> Result<()> {
    fs::write(path, calib.to_string())
        .with_context(|| format!("Cannot write calibration {}.", path.display()))
}

/// Save an RGBA image as PNG.
pub fn write_image_rgba8(path: &Path, image: &RgbaImage) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Cannot write image {}.", path.display()))
}

/// Load an image and convert it to RGBA.
pub fn read_image_rgba8(path: &Path) -> Result<RgbaImage> {
    Ok(image::open(path)
        .with_context(|| format!("Cannot read image {}.", path.display()))?
        .to_rgba8())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Cannot open {}.", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Malformed JSON in {}.", path.display()))
}

/// Read the list of vehicles used for traffic and per-material lidar returns.
pub fn read_vehicle_list(path: &Path) -> Result<VehicleList> {
    read_json(path)
}

/// Read the material reflectivity table of the lidar model.
pub fn read_reflectivity_table(path: &Path) -> Result<ReflectivityTable> {
    read_json(path)
}

/// Write a dataframe as a feather (Arrow IPC) file.
pub fn write_feather(path: &Path, frame: &mut DataFrame) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Cannot create {}.", path.display()))?;
    IpcWriter::new(&mut file)
        .finish(frame)
        .with_context(|| format!("Cannot write feather {}.", path.display()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{Rgba, RgbaImage};
    use ndarray::array;
    use polars::prelude::{df, NamedFrom};

    use super::*;
    use crate::label::ObjectType;

    #[test]
    fn test_velodyne_io() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("000001.bin");
        let points = array![[1.5, -2., 0.25, 0.9], [10., 0., -1.73, 0.1]];
        write_velodyne(&path, &points.view()).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 32);
        assert_eq!(read_velodyne(&path).unwrap(), points);
    }

    #[test]
    fn test_velodyne_rejects_partial_points() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.bin");
        fs::write(&path, [0_u8; 20]).unwrap();
        assert!(read_velodyne(&path).is_err());

        let three_columns = array![[1., 2., 3.]];
        assert!(write_velodyne(&path, &three_columns.view()).is_err());
    }

    #[test]
    fn test_empty_label_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("000000.txt");
        write_labels(&path, &[]).unwrap();
        assert!(read_labels(&path).unwrap().is_empty());

        let mut label = KittiLabel::new(ObjectType::Car);
        label.dimensions = [1.5, 1.8, 4.2];
        write_labels(&path, &[label.clone(), label]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));
        assert_eq!(read_labels(&path).unwrap()[1].length(), 4.2);
    }

    #[test]
    fn test_image_io() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("000003.png");
        let mut image = RgbaImage::new(4, 2);
        image.put_pixel(3, 1, Rgba([10, 20, 30, 255]));
        write_image_rgba8(&path, &image).unwrap();
        let loaded = read_image_rgba8(&path).unwrap();
        assert_eq!(loaded.dimensions(), (4, 2));
        assert_eq!(loaded.get_pixel(3, 1), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_json_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        let vehicles = tmp.path().join("vehicles.json");
        fs::write(
            &vehicles,
            r#"{"vehicles":[{"api_bp_name":"audi.a2","unreal_actor_name":"BP_AudiA2"}]}"#,
        )
        .unwrap();
        let list = read_vehicle_list(&vehicles).unwrap();
        assert_eq!(list.vehicles[0].api_bp_name, "audi.a2");

        let materials = tmp.path().join("materials.json");
        fs::write(
            &materials,
            r#"{"materials":[{"name":"NoMaterial","reflectivity":0.2},{"name":"Paint","reflectivity":0.9}]}"#,
        )
        .unwrap();
        let table = read_reflectivity_table(&materials).unwrap();
        assert_eq!(table.materials.len(), 2);

        fs::write(&materials, "{").unwrap();
        assert!(read_reflectivity_table(&materials).is_err());
    }

    #[test]
    fn test_feather_io() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("counts.feather");
        let mut frame = df!(
            "sample_id" => &[0_u64, 0, 5],
            "num_points" => &[12_u64, 0, 431],
        )
        .unwrap();
        write_feather(&path, &mut frame).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > 0);
        // Writing again replaces the file.
        write_feather(&path, &mut frame).unwrap();
        assert!(path.is_file());
    }
}
