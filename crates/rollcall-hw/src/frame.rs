//! Frame type and pixel conversion — YUYV/GREY to RGB, dark detection.

use image::{Rgb, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("buffer too short: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u32) -> Self {
        let is_dark = is_dark_frame(&image, DARK_FRACTION);
        Self {
            image,
            timestamp: std::time::Instant::now(),
            sequence,
            is_dark,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Average luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let pixels = (self.width() * self.height()) as usize;
        if pixels == 0 {
            return 0.0;
        }
        self.image.pixels().map(luma).sum::<f32>() / pixels as f32
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("sequence", &self.sequence)
            .field("is_dark", &self.is_dark)
            .finish()
    }
}

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_FRACTION: f32 = 0.95;

fn luma(p: &Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

/// True if more than `threshold_pct` of pixels have luma below 32.
///
/// A covered lens or a stream that stopped delivering data produces these;
/// the capture loops treat them as stalled ticks.
pub fn is_dark_frame(image: &RgbImage, threshold_pct: f32) -> bool {
    let total = (image.width() * image.height()) as usize;
    if total == 0 {
        return true;
    }
    let dark = image.pixels().filter(|p| luma(p) < 32.0).count();
    (dark as f32 / total as f32) > threshold_pct
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            out.push(clamp_u8(y + 1.402 * v));
            out.push(clamp_u8(y - 0.344_136 * u - 0.714_136 * v));
            out.push(clamp_u8(y + 1.772 * u));
        }
    }

    RgbImage::from_raw(width, height, out).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

/// Expand 8-bit grayscale into RGB by replicating the channel.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: grey.len(),
        });
    }
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let g = grey[(y * width + x) as usize];
        Rgb([g, g, g])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // 2x1 image: Y0=50, U=128, Y1=200, V=128
        let yuyv = [50u8, 128, 200, 128];
        let img = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgb([50, 50, 50]));
        assert_eq!(img.get_pixel(1, 0), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_yuyv_red_tint() {
        let yuyv = [100u8, 128, 100, 200];
        let img = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        let p = img.get_pixel(0, 0);
        assert!(p[0] > p[1] && p[0] > p[2], "expected red-dominant pixel, got {p:?}");
    }

    #[test]
    fn test_yuyv_too_short() {
        let result = yuyv_to_rgb(&[0u8; 10], 4, 4);
        assert!(matches!(
            result,
            Err(FrameError::InvalidLength { expected: 32, actual: 10 })
        ));
    }

    #[test]
    fn test_grey_expands_channels() {
        let img = grey_to_rgb(&[10, 20, 30, 40], 2, 2).unwrap();
        assert_eq!(img.get_pixel(1, 1), &Rgb([40, 40, 40]));
    }

    #[test]
    fn test_dark_frame_normal() {
        let img = RgbImage::from_pixel(20, 20, Rgb([128, 128, 128]));
        assert!(!is_dark_frame(&img, DARK_FRACTION));
    }

    #[test]
    fn test_dark_frame_black() {
        let img = RgbImage::from_pixel(20, 20, Rgb([5, 5, 5]));
        assert!(is_dark_frame(&img, DARK_FRACTION));
        assert!(Frame::new(img, 0).is_dark);
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&RgbImage::new(0, 0), DARK_FRACTION));
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame::new(RgbImage::from_pixel(4, 4, Rgb([100, 100, 100])), 1);
        assert!((frame.avg_brightness() - 100.0).abs() < 0.5);
    }
}
