//! rollcall-vision — ONNX face engine.
//!
//! SCRFD for detection and ArcFace for descriptors, served from a dedicated
//! engine thread behind [`EngineHandle`].

pub mod detector;
pub mod engine;
pub mod recognizer;

pub use detector::FaceDetector;
pub use engine::{spawn_engine, EngineHandle};
pub use recognizer::FaceRecognizer;

/// SCRFD 10G detection model file name.
pub const SCRFD_MODEL: &str = "det_10g.onnx";
/// ArcFace R50 recognition model file name.
pub const ARCFACE_MODEL: &str = "w600k_r50.onnx";
