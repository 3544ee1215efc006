//! # label
//!
//! KITTI object labels.
//!
//! One object per line, whitespace separated:
//!
//! ```text
//! type truncated occluded alpha left top right bottom height width length x y z rotation_y [score]
//! ```
//!
//! Dimensions are in meters, the location is the bottom-centre of the object in camera
//! coordinates, angles are radians in `(-π, π]`.

use std::{fmt, str::FromStr};

use anyhow::{bail, Context, Error, Result};
use strum_macros::{Display, EnumIter, EnumString};

/// KITTI object classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum ObjectType {
    /// Passenger car.
    Car,
    /// Van.
    Van,
    /// Truck.
    Truck,
    /// Pedestrian.
    Pedestrian,
    /// Seated person.
    #[strum(serialize = "Person_sitting")]
    PersonSitting,
    /// Cyclist.
    Cyclist,
    /// Tram.
    Tram,
    /// Miscellaneous object.
    Misc,
    /// Region to ignore.
    DontCare,
}

/// Occlusion state of a labeled object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Occlusion {
    /// Fully visible.
    #[default]
    FullyVisible = 0,
    /// Partly occluded.
    PartlyOccluded = 1,
    /// Largely occluded.
    LargelyOccluded = 2,
    /// Unknown.
    Unknown = 3,
}

impl TryFrom<i64> for Occlusion {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Ok(match value {
            0 => Occlusion::FullyVisible,
            1 => Occlusion::PartlyOccluded,
            2 => Occlusion::LargelyOccluded,
            3 | -1 => Occlusion::Unknown,
            _ => bail!("Invalid occlusion state {value}."),
        })
    }
}

/// A single object annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct KittiLabel {
    /// Object class.
    pub object_type: ObjectType,
    /// Fraction of the object leaving the image, in `[0, 1]`.
    pub truncated: f32,
    /// Occlusion state.
    pub occluded: Occlusion,
    /// Observation angle.
    pub alpha: f32,
    /// 2D box `[left, top, right, bottom]` in pixels.
    pub bbox: [f32; 4],
    /// `[height, width, length]` in meters.
    pub dimensions: [f32; 3],
    /// `[x, y, z]` in camera coordinates, meters.
    pub location: [f32; 3],
    /// Rotation around the camera y-axis.
    pub rotation_y: f32,
    /// Detection confidence, only present in result files.
    pub score: Option<f32>,
}

impl KittiLabel {
    /// Label with every geometric field zeroed.
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            truncated: 0.,
            occluded: Occlusion::default(),
            alpha: 0.,
            bbox: [0.; 4],
            dimensions: [0.; 3],
            location: [0.; 3],
            rotation_y: 0.,
            score: None,
        }
    }

    /// Object height in meters.
    pub fn height(&self) -> f32 {
        self.dimensions[0]
    }

    /// Object width in meters.
    pub fn width(&self) -> f32 {
        self.dimensions[1]
    }

    /// Object length in meters.
    pub fn length(&self) -> f32 {
        self.dimensions[2]
    }
}

impl fmt::Display for KittiLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.2} {} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2}",
            self.object_type,
            self.truncated,
            self.occluded as i32,
            self.alpha,
            self.bbox[0],
            self.bbox[1],
            self.bbox[2],
            self.bbox[3],
            self.dimensions[0],
            self.dimensions[1],
            self.dimensions[2],
            self.location[0],
            self.location[1],
            self.location[2],
            self.rotation_y,
        )?;
        if let Some(score) = self.score {
            write!(f, " {score:.4}")?;
        }
        Ok(())
    }
}

impl FromStr for KittiLabel {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 15 && fields.len() != 16 {
            bail!(
                "Expected 15 or 16 label fields, found {}: `{line}`.",
                fields.len()
            );
        }
        let float = |i: usize| -> Result<f32> {
            fields[i]
                .parse::<f32>()
                .with_context(|| format!("Label field {i} is not a number: `{}`.", fields[i]))
        };

        let object_type = ObjectType::from_str(fields[0])
            .with_context(|| format!("Unknown object type `{}`.", fields[0]))?;
        // Some tools write the occlusion flag as a float.
        let occluded = fields[2]
            .parse::<f32>()
            .with_context(|| format!("Occlusion is not a number: `{}`.", fields[2]))?;

        Ok(Self {
            object_type,
            truncated: float(1)?,
            occluded: Occlusion::try_from(occluded as i64)?,
            alpha: float(3)?,
            bbox: [float(4)?, float(5)?, float(6)?, float(7)?],
            dimensions: [float(8)?, float(9)?, float(10)?],
            location: [float(11)?, float(12)?, float(13)?],
            rotation_y: float(14)?,
            score: if fields.len() == 16 {
                Some(float(15)?)
            } else {
                None
            },
        })
    }
}

/// Parse every non-empty line of a label file.
pub fn parse_labels(text: &str) -> Result<Vec<KittiLabel>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            line.parse::<KittiLabel>()
                .with_context(|| format!("Malformed label on line {}.", i + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::{parse_labels, KittiLabel, ObjectType, Occlusion};

    const LINE: &str =
        "Car 0.00 0 -1.58 587.01 173.33 614.12 200.12 1.65 1.67 3.64 -0.65 1.71 46.70 -1.59";

    #[test]
    fn test_parse_line() {
        let label = KittiLabel::from_str(LINE).unwrap();
        assert_eq!(label.object_type, ObjectType::Car);
        assert_eq!(label.occluded, Occlusion::FullyVisible);
        assert_eq!(label.bbox, [587.01, 173.33, 614.12, 200.12]);
        assert_eq!(label.height(), 1.65);
        assert_eq!(label.width(), 1.67);
        assert_eq!(label.length(), 3.64);
        assert_eq!(label.location, [-0.65, 1.71, 46.70]);
        assert_eq!(label.rotation_y, -1.59);
        assert_eq!(label.score, None);
    }

    #[test]
    fn test_display_matches_kitti_line() {
        let label = KittiLabel::from_str(LINE).unwrap();
        assert_eq!(label.to_string(), LINE);
    }

    #[test]
    fn test_score_column() {
        let line = format!("{LINE} 0.8750");
        let label = KittiLabel::from_str(&line).unwrap();
        assert_eq!(label.score, Some(0.875));
        assert_eq!(label.to_string(), line);
    }

    #[test]
    fn test_object_type_spelling() {
        assert_eq!(
            ObjectType::from_str("Person_sitting").unwrap(),
            ObjectType::PersonSitting
        );
        for object_type in ObjectType::iter() {
            let text = object_type.to_string();
            assert_eq!(ObjectType::from_str(&text).unwrap(), object_type);
        }
    }

    #[test]
    fn test_malformed_lines() {
        assert!(KittiLabel::from_str("Car 0.0 0").is_err());
        assert!(KittiLabel::from_str(&LINE.replace("Car", "Spaceship")).is_err());
        assert!(KittiLabel::from_str(&LINE.replace("46.70", "far")).is_err());
        assert!(parse_labels(&format!("{LINE}\nbad line\n")).is_err());
    }

    #[test]
    fn test_parse_labels_skips_blank_lines() {
        let labels = parse_labels(&format!("{LINE}\n\n{LINE}\n")).unwrap();
        assert_eq!(labels.len(), 2);
    }
}
