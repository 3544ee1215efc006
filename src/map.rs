//! # map
//!
//! City map raster with world to pixel conversions.
//!
//! A city ships as a pair of files: `<city>.png`, the raster, and `<city>.txt`, a
//! descriptor of five comma-separated lines:
//!
//! ```text
//! world offset      x,y,z
//! world angles      pitch,roll,yaw (only the last is used)
//! scale             ignored
//! map offset        x,y[,z]
//! resolution        width,height
//! ```

use std::{fs, path::Path, str::FromStr};

use anyhow::{bail, ensure, Context, Error, Result};
use image::{imageops, imageops::FilterType, Rgba, RgbaImage};
use ndarray::{array, Array1, Array2};

use crate::{
    constants::{MAP_MARKER_SIZE_PX, MAP_PIXEL_DENSITY, MAP_WORLD_Z},
    io::read_image_rgba8,
};

/// Parsed map descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct MapDescriptor {
    /// Offset of the world from the map's zero coordinate.
    pub world_offset: [f64; 3],
    /// World angles in degrees. Only the third entry, a rotation about z, is applied.
    pub angles: [f64; 3],
    /// Offset of the raster origin.
    pub map_offset: [f64; 3],
    /// Graph resolution.
    pub resolution: [i64; 2],
}

fn parse_floats(line: &str, what: &str, min: usize, max: usize) -> Result<Vec<f64>> {
    let values = line
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid {what} value `{v}`."))
        })
        .collect::<Result<Vec<_>>>()?;
    ensure!(
        (min..=max).contains(&values.len()),
        "Expected {min} to {max} values for {what}, found {}.",
        values.len()
    );
    Ok(values)
}

impl FromStr for MapDescriptor {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().take(5).collect();
        if lines.len() < 5 {
            bail!("Map descriptor has {} lines, expected 5.", lines.len());
        }

        let world_offset = parse_floats(lines[0], "world offset", 3, 3)?;
        let angles = parse_floats(lines[1], "world angles", 3, 3)?;
        let map_offset = parse_floats(lines[3], "map offset", 2, 3)?;
        let resolution = lines[4]
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<i64>()
                    .with_context(|| format!("Invalid resolution value `{v}`."))
            })
            .collect::<Result<Vec<_>>>()?;
        ensure!(
            resolution.len() == 2,
            "Expected 2 resolution values, found {}.",
            resolution.len()
        );

        Ok(Self {
            world_offset: [world_offset[0], world_offset[1], world_offset[2]],
            angles: [angles[0], angles[1], angles[2]],
            map_offset: [
                map_offset[0],
                map_offset[1],
                map_offset.get(2).copied().unwrap_or(0.),
            ],
            resolution: [resolution[0], resolution[1]],
        })
    }
}

impl MapDescriptor {
    /// Parse descriptor text.
    pub fn parse(text: &str) -> Result<Self> {
        text.parse()
    }

    /// (3,3) rotation about z by the third world angle.
    pub fn world_rotation(&self) -> Array2<f64> {
        let (s, c) = self.angles[2].to_radians().sin_cos();
        array![[c, -s, 0.], [s, c, 0.], [0., 0., 1.]]
    }
}

/// City map raster. Conversions never modify it; only drawing does.
#[derive(Clone, Debug)]
pub struct CityMap {
    /// Descriptor of the raster placement.
    pub descriptor: MapDescriptor,
    /// World units per pixel.
    pub pixel_density: f64,
    /// Raster; the blue channel encodes lane orientation.
    pub raster: RgbaImage,
    world_rotation: Array2<f64>,
}

impl CityMap {
    /// Construct a new `CityMap`.
    pub fn new(descriptor: MapDescriptor, raster: RgbaImage) -> Self {
        let world_rotation = descriptor.world_rotation();
        Self {
            descriptor,
            pixel_density: MAP_PIXEL_DENSITY,
            raster,
            world_rotation,
        }
    }

    /// Load a descriptor and its raster.
    pub fn from_files(descriptor_path: &Path, raster_path: &Path) -> Result<Self> {
        let text = fs::read_to_string(descriptor_path)
            .with_context(|| format!("Cannot read map descriptor {}.", descriptor_path.display()))?;
        let descriptor = MapDescriptor::parse(&text)
            .with_context(|| format!("Invalid map descriptor {}.", descriptor_path.display()))?;
        let raster = read_image_rgba8(raster_path)?;
        Ok(Self::new(descriptor, raster))
    }

    /// Load `<dir>/<city>.txt` and `<dir>/<city>.png`.
    pub fn load(dir: &Path, city: &str) -> Result<Self> {
        Self::from_files(
            &dir.join(format!("{city}.txt")),
            &dir.join(format!("{city}.png")),
        )
    }

    fn relative_location(&self, world: [f64; 3]) -> Array1<f64> {
        let rotated = array![world[0], world[1], world[2]].dot(&self.world_rotation);
        let d = &self.descriptor;
        array![
            rotated[0] + d.world_offset[0] - d.map_offset[0],
            rotated[1] + d.world_offset[1] - d.map_offset[1],
            rotated[2] + d.world_offset[2] - d.map_offset[2]
        ]
    }

    /// Pixel `[column, row]` containing a world position.
    pub fn position_on_map(&self, world: [f64; 3]) -> [i64; 2] {
        let relative = self.relative_location(world);
        [
            (relative[0] / self.pixel_density).floor() as i64,
            (relative[1] / self.pixel_density).floor() as i64,
        ]
    }

    /// World position of the centre of a pixel.
    ///
    /// The raster carries no height, so z is always `MAP_WORLD_Z`.
    pub fn position_on_world(&self, pixel: [i64; 2]) -> [f64; 3] {
        let d = &self.descriptor;
        let relative = array![
            (pixel[0] as f64 + 0.5) * self.pixel_density + d.map_offset[0] - d.world_offset[0],
            (pixel[1] as f64 + 0.5) * self.pixel_density + d.map_offset[1] - d.world_offset[1],
            0.
        ];
        let world = relative.dot(&self.world_rotation.t());
        [world[0], world[1], MAP_WORLD_Z]
    }

    fn raster_pixel(&self, pixel: [i64; 2]) -> Option<(u32, u32)> {
        let (width, height) = self.raster.dimensions();
        let x = u32::try_from(pixel[0]).ok().filter(|&x| x < width)?;
        let y = u32::try_from(pixel[1]).ok().filter(|&y| y < height)?;
        Some((x, y))
    }

    /// Unit direction of the lane at a world position, decoded from the blue channel.
    pub fn lane_orientation(&self, world: [f64; 3]) -> Result<(f64, f64)> {
        let pixel = self.position_on_map(world);
        let (x, y) = self.raster_pixel(pixel).with_context(|| {
            format!("World position {world:?} maps to pixel {pixel:?}, outside the raster.")
        })?;
        let blue = self.raster.get_pixel(x, y)[2];
        let orientation = f64::from(blue) / 255. * 2. * std::f64::consts::PI;
        Ok((-orientation.cos(), -orientation.sin()))
    }

    /// Stamp a star of `size` pixel arms centred on a world position.
    ///
    /// Arm pixels falling outside the raster are skipped.
    pub fn draw_position_on_map(&mut self, world: [f64; 3], color: Rgba<u8>, size: Option<usize>) {
        let [column, row] = self.position_on_map(world);
        let size = size.unwrap_or(MAP_MARKER_SIZE_PX) as i64;
        let directions = [
            (0, 0),
            (1, 0),
            (0, 1),
            (-1, 0),
            (0, -1),
            (1, 1),
            (-1, -1),
            (1, -1),
            (-1, 1),
        ];
        for i in 0..size {
            for (dy, dx) in directions {
                if let Some((x, y)) = self.raster_pixel([column + dx * i, row + dy * i]) {
                    self.raster.put_pixel(x, y, color);
                }
            }
        }
    }

    /// Raster for display, optionally resized to `(height, width)`, mirrored left to right.
    pub fn map_view(&self, size: Option<(u32, u32)>) -> RgbaImage {
        let view = match size {
            Some((height, width)) => {
                imageops::resize(&self.raster, width, height, FilterType::Lanczos3)
            }
            None => self.raster.clone(),
        };
        imageops::flip_horizontal(&view)
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::{CityMap, MapDescriptor};

    const TOWN: &str = "-6000.0,-500.0,0.0\n0.0,0.0,0.0\n1.0\n-2000.0,-3000.0\n800,600\n";

    fn town(descriptor: &str) -> CityMap {
        CityMap::new(
            MapDescriptor::parse(descriptor).unwrap(),
            RgbaImage::from_pixel(100, 80, Rgba([0, 0, 0, 255])),
        )
    }

    #[test]
    fn test_parse_descriptor() {
        let descriptor = MapDescriptor::parse(TOWN).unwrap();
        assert_eq!(descriptor.world_offset, [-6000., -500., 0.]);
        assert_eq!(descriptor.map_offset, [-2000., -3000., 0.]);
        assert_eq!(descriptor.resolution, [800, 600]);

        let three_offsets = TOWN.replace("-2000.0,-3000.0", "-2000.0,-3000.0,5.0");
        assert_eq!(
            MapDescriptor::parse(&three_offsets).unwrap().map_offset,
            [-2000., -3000., 5.]
        );
    }

    #[test]
    fn test_parse_descriptor_errors() {
        assert!(MapDescriptor::parse("0,0,0\n0,0,0\n").is_err());
        assert!(MapDescriptor::parse(&TOWN.replace("800,600", "800")).is_err());
        assert!(MapDescriptor::parse(&TOWN.replace("-500.0", "west")).is_err());
    }

    #[test]
    fn test_position_on_map() {
        let map = town(TOWN);
        // (6000 - 6000 + 2000) / 16.43 and (1000 - 500 + 3000) / 16.43.
        assert_eq!(map.position_on_map([6000., 1000., 0.]), [121, 213]);
    }

    #[test]
    fn test_pixel_world_pixel() {
        for descriptor in [
            TOWN.to_string(),
            TOWN.replace("0.0,0.0,0.0\n1.0", "0.0,0.0,90.0\n1.0"),
            TOWN.replace("0.0,0.0,0.0\n1.0", "0.0,0.0,-33.0\n1.0"),
        ] {
            let map = town(&descriptor);
            for pixel in [[0, 0], [17, 45], [99, 79], [-3, 250]] {
                let world = map.position_on_world(pixel);
                assert_eq!(world[2], 22.);
                assert_eq!(map.position_on_map(world), pixel);
            }
        }
    }

    #[test]
    fn test_lane_orientation() {
        let mut map = town(TOWN);
        let world = map.position_on_world([10, 20]);
        map.raster.put_pixel(10, 20, Rgba([0, 0, 64, 255]));
        let (x, y) = map.lane_orientation(world).unwrap();
        let orientation = 64. / 255. * 2. * std::f64::consts::PI;
        assert!((x + orientation.cos()).abs() < 1e-12);
        assert!((y + orientation.sin()).abs() < 1e-12);

        let outside = map.position_on_world([500, 20]);
        assert!(map.lane_orientation(outside).is_err());
    }

    #[test]
    fn test_draw_position_on_map() {
        let mut map = town(TOWN);
        let red = Rgba([255, 0, 0, 255]);
        map.draw_position_on_map(map.position_on_world([50, 40]), red, Some(3));
        for (x, y) in [(50, 40), (52, 40), (50, 38), (48, 42), (52, 42)] {
            assert_eq!(map.raster.get_pixel(x, y), &red);
        }
        assert_ne!(map.raster.get_pixel(51, 42), &red);

        // Near the corner most arms leave the raster.
        map.draw_position_on_map(map.position_on_world([0, 0]), red, None);
        assert_eq!(map.raster.get_pixel(19, 19), &red);
    }

    #[test]
    fn test_map_view() {
        let mut map = town(TOWN);
        map.raster.put_pixel(0, 5, Rgba([1, 2, 3, 255]));
        let view = map.map_view(None);
        assert_eq!(view.get_pixel(99, 5), &Rgba([1, 2, 3, 255]));
        assert_eq!(map.map_view(Some((40, 50))).dimensions(), (50, 40));
    }
}
