//! Face engine capability — detection and descriptor extraction.
//!
//! Every component takes the engine as an injected value so tests can swap
//! in a scripted double. Implementations must return an empty vector for a
//! frame with no faces and every face for a crowded frame; neither is an error.

use crate::types::{BoundingBox, Descriptor};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("model not loaded: {0}")]
    ModelUnavailable(String),
    #[error("detection failed: {0}")]
    Detection(String),
    #[error("descriptor extraction failed: {0}")]
    Descriptor(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

#[allow(async_fn_in_trait)]
pub trait FaceEngine {
    /// Detect faces, sorted by confidence (highest first).
    async fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError>;

    /// Extract a descriptor for one detected face.
    async fn descriptor(&self, image: &RgbImage, face: &BoundingBox) -> Result<Descriptor, EngineError>;

    /// Distance in descriptor space. Smaller = more similar.
    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32 {
        a.distance(b)
    }
}

impl<E: FaceEngine> FaceEngine for &E {
    async fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError> {
        (**self).detect(image).await
    }

    async fn descriptor(&self, image: &RgbImage, face: &BoundingBox) -> Result<Descriptor, EngineError> {
        (**self).descriptor(image, face).await
    }

    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32 {
        (**self).distance(a, b)
    }
}
