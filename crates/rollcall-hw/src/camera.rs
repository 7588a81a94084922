//! Camera collaborator — acquire/release a video stream, grab frames.
//!
//! [`Camera`] is the seam the kiosk flows depend on. [`V4lCamera`] is the
//! V4L2 implementation via the `v4l` crate.

use crate::frame::{self, Frame};
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("no active camera stream")]
    NotStreaming,
}

impl CameraError {
    /// Device errors end the current flow; only a user retry can recover.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CameraError::PermissionDenied(_) | CameraError::DeviceUnavailable(_)
        )
    }
}

/// An acquired video stream.
pub trait VideoStream {
    /// False once the stream is paused or ended.
    fn is_live(&self) -> bool;

    fn grab(&mut self) -> Result<Frame, CameraError>;
}

/// A video device that hands out one stream at a time.
pub trait Camera {
    type Stream: VideoStream;

    fn acquire(&mut self) -> Result<Self::Stream, CameraError>;

    fn release(&mut self, stream: Self::Stream);
}

/// Negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, converted to RGB.
    Yuyv,
    /// 8-bit grayscale, replicated into RGB.
    Grey,
}

/// V4L2 webcam, opened lazily on [`Camera::acquire`].
pub struct V4lCamera {
    device_path: String,
    width: u32,
    height: u32,
}

impl V4lCamera {
    pub fn new(device_path: &str, width: u32, height: u32) -> Self {
        Self {
            device_path: device_path.to_string(),
            width,
            height,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

fn open_error(device_path: &str, e: io::Error) -> CameraError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(device_path.to_string()),
        _ if e.to_string().contains("busy") => {
            CameraError::DeviceUnavailable(format!("{device_path}: device busy"))
        }
        _ => CameraError::DeviceUnavailable(format!("{device_path}: {e}")),
    }
}

impl Camera for V4lCamera {
    type Stream = V4lStream;

    fn acquire(&mut self) -> Result<V4lStream, CameraError> {
        if !Path::new(&self.device_path).exists() {
            return Err(CameraError::DeviceUnavailable(format!(
                "{}: no such device",
                self.device_path
            )));
        }

        let device = Device::with_path(&self.device_path)
            .map_err(|e| open_error(&self.device_path, e))?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::DeviceUnavailable(format!(
                "{}: not a capture device",
                self.device_path
            )));
        }

        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = self.width;
        fmt.height = self.height;
        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let pixel_format = if negotiated.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if negotiated.fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV or GREY)",
                negotiated.fourcc
            )));
        };

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        tracing::info!(
            device = %self.device_path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            format = ?pixel_format,
            "camera stream acquired"
        );

        Ok(V4lStream {
            _device: device,
            stream: Some(stream),
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        })
    }

    fn release(&mut self, mut stream: V4lStream) {
        // Dropping the mmap stream issues STREAMOFF and unmaps the buffers.
        stream.stream.take();
        tracing::info!(device = %self.device_path, "camera stream released");
    }
}

/// Live V4L2 capture stream.
pub struct V4lStream {
    _device: Device,
    stream: Option<MmapStream<'static>>,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl VideoStream for V4lStream {
    fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    fn grab(&mut self) -> Result<Frame, CameraError> {
        let stream = self.stream.as_mut().ok_or(CameraError::NotStreaming)?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let image = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height),
            PixelFormat::Grey => frame::grey_to_rgb(buf, self.width, self.height),
        }
        .map_err(|e| CameraError::CaptureFailed(format!("pixel conversion failed: {e}")))?;

        Ok(Frame::new(image, meta.sequence))
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
}

/// List V4L2 video capture devices under /dev/video0..15.
pub fn list_devices() -> Vec<DeviceInfo> {
    (0..16)
        .map(|i| format!("/dev/video{i}"))
        .filter(|path| Path::new(path).exists())
        .filter_map(|path| {
            let dev = Device::with_path(&path).ok()?;
            let caps = dev.query_caps().ok()?;
            caps.capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                .then(|| DeviceInfo {
                    path,
                    name: caps.card.clone(),
                    driver: caps.driver.clone(),
                })
        })
        .collect()
}
