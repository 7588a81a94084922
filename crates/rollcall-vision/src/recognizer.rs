//! ArcFace descriptor extraction via ONNX Runtime.
//!
//! Crops a square around the detected face, resizes it to 112×112 and runs
//! the w600k_r50 model. Output descriptors are L2-normalised, so Euclidean
//! distances fall in [0, 2].

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use rollcall_core::{BoundingBox, Descriptor};
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 112;
const MEAN: f32 = 127.5;
const STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
const DESCRIPTOR_DIM: usize = 512;
const MODEL_VERSION: &str = "w600k_r50";
/// Extra context around the detector box, as a fraction of its longer side.
const CROP_MARGIN: f32 = 0.15;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face box lies outside the frame")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    pub fn extract(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Descriptor, RecognizerError> {
        let crop = crop_face(image, face).ok_or(RecognizerError::EmptyCrop)?;
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("descriptor output: {e}")))?;

        if raw.len() != DESCRIPTOR_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {DESCRIPTOR_DIM}-dim descriptor, got {}",
                raw.len()
            )));
        }

        Ok(Descriptor {
            values: l2_normalize(raw),
            model_version: Some(MODEL_VERSION.to_string()),
        })
    }
}

/// Square crop centred on the face box, clamped to the frame and resized to
/// the model input. `None` if nothing of the box is inside the frame.
fn crop_face(image: &RgbImage, face: &BoundingBox) -> Option<RgbImage> {
    let side = face.width.max(face.height) * (1.0 + 2.0 * CROP_MARGIN);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - side / 2.0).max(0.0) as u32;
    let y0 = (cy - side / 2.0).max(0.0) as u32;
    let x1 = ((cx + side / 2.0).max(0.0) as u32).min(image.width());
    let y1 = ((cy + side / 2.0).max(0.0) as u32).min(image.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let view = imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
    Some(imageops::resize(&view, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle))
}

fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - MEAN) / STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_is_model_sized() {
        let img = RgbImage::from_pixel(640, 480, image::Rgb([10, 20, 30]));
        let face = BoundingBox::new(100.0, 100.0, 200.0, 160.0, 0.9);
        let crop = crop_face(&img, &face).unwrap();
        assert_eq!(crop.dimensions(), (INPUT_SIZE, INPUT_SIZE));
    }

    #[test]
    fn test_crop_outside_frame() {
        let img = RgbImage::new(100, 100);
        let face = BoundingBox::new(500.0, 500.0, 50.0, 50.0, 0.9);
        assert!(crop_face(&img, &face).is_none());
    }

    #[test]
    fn test_crop_clamps_at_edge() {
        let img = RgbImage::new(100, 100);
        let face = BoundingBox::new(-20.0, -20.0, 60.0, 60.0, 0.9);
        assert!(crop_face(&img, &face).is_some());
    }

    #[test]
    fn test_preprocess_normalisation() {
        let crop = RgbImage::from_pixel(INPUT_SIZE, INPUT_SIZE, image::Rgb([255, 0, 128]));
        let t = preprocess(&crop);
        assert_eq!(t.shape(), &[1, 3, 112, 112]);
        assert!((t[[0, 0, 5, 5]] - 1.0).abs() < 1e-6);
        assert!((t[[0, 1, 5, 5]] + 1.0).abs() < 1e-6);
        assert!((t[[0, 2, 5, 5]] - 0.5 / 127.5).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
