use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Box without landmarks, mostly useful for scripted detections.
    pub fn new(x: f32, y: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
            landmarks: None,
        }
    }
}

/// Fixed-length face descriptor. Smaller distance = more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Euclidean distance between two descriptors.
    ///
    /// Always walks every dimension. Descriptors of different length compare
    /// over the shared prefix only, so callers must not mix model versions.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A single captured frame plus its descriptor once one has been extracted.
///
/// Ephemeral: produced by a capture event and consumed by the matcher or
/// the enrollment flow.
#[derive(Debug, Clone)]
pub struct FaceSample {
    pub image: RgbImage,
    pub face: Option<BoundingBox>,
    pub descriptor: Option<Descriptor>,
}

impl FaceSample {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            face: None,
            descriptor: None,
        }
    }
}

/// An enrolled student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub department: String,
    /// JPEG-encoded reference photo. At most one per identity.
    #[serde(skip)]
    pub photo: Option<Vec<u8>>,
    #[serde(skip)]
    pub descriptor: Option<Descriptor>,
    pub created_at: DateTime<Utc>,
}

/// A faculty member who may run sessions for the subjects they teach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faculty {
    /// Short code, e.g. "KA".
    pub id: String,
    pub name: String,
    /// Subject abbreviations.
    pub subjects: Vec<String>,
    #[serde(skip)]
    pub photo: Option<Vec<u8>>,
    #[serde(skip)]
    pub descriptor: Option<Descriptor>,
}

impl Faculty {
    /// Identity key of the built-in administrator, who may teach any subject.
    pub const ADMIN_ID: &'static str = "ADMIN";

    pub fn teaches(&self, subject: &str) -> bool {
        self.id == Self::ADMIN_ID || self.subjects.iter().any(|s| s == subject)
    }
}

/// A timetable subject, keyed by abbreviation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub abbr: String,
    pub code: String,
    pub name: String,
}

impl Subject {
    pub fn new(abbr: &str, code: &str, name: &str) -> Self {
        Self {
            abbr: abbr.to_string(),
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical() {
        let a = Descriptor::new(vec![0.3, 0.4, 0.5]);
        assert!(a.distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_distance_known_value() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert!((b.distance(&a) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_faculty_teaches() {
        let fac = Faculty {
            id: "NS".into(),
            name: "Prof. N".into(),
            subjects: vec!["TOC".into()],
            photo: None,
            descriptor: None,
        };
        assert!(fac.teaches("TOC"));
        assert!(!fac.teaches("ML"));

        let admin = Faculty {
            id: Faculty::ADMIN_ID.into(),
            subjects: vec![],
            ..fac
        };
        assert!(admin.teaches("ML"));
    }
}
