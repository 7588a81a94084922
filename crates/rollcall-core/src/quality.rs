//! Quality gate — decides whether a frame's detections are good enough to act on.
//!
//! Pure function of one frame's detector output. Thresholds depend on the
//! flow: enrollment and admin capture are lenient, attendance matching is
//! strict because a false accept marks the wrong student.

use crate::types::BoundingBox;
use thiserror::Error;

/// Why a frame was rejected. The `Display` text is shown to the user.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityIssue {
    #[error("no face")]
    NoFace,
    #[error("multiple faces")]
    MultipleFaces,
    #[error("low confidence")]
    LowConfidence,
    #[error("move closer")]
    TooSmall,
}

/// Thresholds for a single detection to count as usable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityPolicy {
    /// Detector score must be strictly above this.
    pub min_confidence: f32,
    /// Box width in pixels must be strictly above this.
    pub min_face_width: f32,
}

impl QualityPolicy {
    /// Enrollment and admin setup/login.
    pub const LENIENT: Self = Self {
        min_confidence: 0.6,
        min_face_width: 50.0,
    };

    /// Attendance matching.
    pub const STRICT: Self = Self {
        min_confidence: 0.8,
        min_face_width: 150.0,
    };

    /// Evaluate one frame's detections.
    ///
    /// Returns the single usable face, or the first rule it failed:
    /// zero faces, more than one face, then confidence and size.
    pub fn evaluate<'a>(&self, detections: &'a [BoundingBox]) -> Result<&'a BoundingBox, QualityIssue> {
        let face = match detections {
            [] => return Err(QualityIssue::NoFace),
            [face] => face,
            _ => return Err(QualityIssue::MultipleFaces),
        };

        if face.confidence <= self.min_confidence {
            return Err(QualityIssue::LowConfidence);
        }
        if face.width <= self.min_face_width {
            return Err(QualityIssue::TooSmall);
        }
        Ok(face)
    }
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self::STRICT
    }
}
