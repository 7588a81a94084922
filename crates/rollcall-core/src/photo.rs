//! Reference photo encoding. Photos are stored as JPEG bytes.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use thiserror::Error;

const JPEG_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("invalid image: {0}")]
    Decode(String),
    #[error("failed to encode photo: {0}")]
    Encode(String),
}

/// Encode a captured frame as JPEG.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, PhotoError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(image)
        .map_err(|e| PhotoError::Encode(e.to_string()))?;
    Ok(out)
}

/// Decode a stored photo (JPEG or PNG) into RGB.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, PhotoError> {
    let format = image::guess_format(bytes).unwrap_or(ImageFormat::Jpeg);
    image::load(Cursor::new(bytes), format)
        .map(|img| img.to_rgb8())
        .map_err(|e| PhotoError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_keeps_dimensions() {
        let img = RgbImage::from_pixel(64, 48, image::Rgb([120, 80, 40]));
        let bytes = encode_jpeg(&img).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let back = decode(&bytes).unwrap();
        assert_eq!(back.dimensions(), (64, 48));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode(b"not an image").is_err());
    }
}
