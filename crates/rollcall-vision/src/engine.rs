//! Face engine running on a dedicated OS thread.
//!
//! ONNX sessions need `&mut self`, so both models live on one thread that
//! serves requests from an mpsc queue. [`EngineHandle`] is the clone-safe
//! async front end and implements [`rollcall_core::FaceEngine`].

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use image::RgbImage;
use rollcall_core::{BoundingBox, Descriptor, EngineError, FaceEngine};
use tokio::sync::{mpsc, oneshot};

enum EngineRequest {
    Detect {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<BoundingBox>, EngineError>>,
    },
    Describe {
        image: RgbImage,
        face: BoundingBox,
        reply: oneshot::Sender<Result<Descriptor, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl FaceEngine for EngineHandle {
    async fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Detect {
                image: image.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    async fn descriptor(&self, image: &RgbImage, face: &BoundingBox) -> Result<Descriptor, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Describe {
                image: image.clone(),
                face: face.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

fn detection_error(e: DetectorError) -> EngineError {
    match e {
        DetectorError::ModelNotFound(path) => EngineError::ModelUnavailable(path),
        other => EngineError::Detection(other.to_string()),
    }
}

fn descriptor_error(e: RecognizerError) -> EngineError {
    match e {
        RecognizerError::ModelNotFound(path) => EngineError::ModelUnavailable(path),
        other => EngineError::Descriptor(other.to_string()),
    }
}

/// Load both models and spawn the engine thread.
///
/// Fails fast if either model is missing or cannot be loaded.
pub fn spawn_engine(scrfd_path: &str, arcface_path: &str) -> Result<EngineHandle, EngineError> {
    let mut detector = FaceDetector::load(scrfd_path).map_err(detection_error)?;
    tracing::info!(path = scrfd_path, "SCRFD detector loaded");

    let mut recognizer = FaceRecognizer::load(arcface_path).map_err(descriptor_error)?;
    tracing::info!(path = arcface_path, "ArcFace recognizer loaded");

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect { image, reply } => {
                        let result = detector.detect(&image).map_err(detection_error);
                        if let Ok(faces) = &result {
                            tracing::trace!(count = faces.len(), "detect");
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::Describe { image, face, reply } => {
                        let result = recognizer.extract(&image, &face).map_err(descriptor_error);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(|e| EngineError::ModelUnavailable(format!("failed to spawn engine thread: {e}")))?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_unavailable() {
        let err = spawn_engine("/nonexistent/det_10g.onnx", "/nonexistent/w600k_r50.onnx")
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::ModelUnavailable(p) if p.contains("det_10g")));
    }

    #[tokio::test]
    async fn test_closed_channel_reports_channel_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = EngineHandle { tx };
        let err = handle.detect(&RgbImage::new(4, 4)).await.unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed));
    }
}
