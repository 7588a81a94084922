//! Polling capture loop shared by the login and enrollment flows.
//!
//! A [`FaceScanner`] holds the camera for one [`Holder`], samples a frame on
//! every interval tick, gates it with the auto-capture policy and hands back
//! the frame that completed the cycle. The camera is released when the
//! scanner is dropped, whichever way the flow ends.

use image::RgbImage;
use rollcall_core::{AutoCapture, BoundingBox, CapturePolicy, CaptureTick, Evidence, FaceEngine};
use rollcall_hw::{Camera, CameraError, CameraSession, Frame, Holder};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// The frame that completed a capture cycle, plus its accepted face.
#[derive(Debug, Clone)]
pub struct Captured {
    pub image: RgbImage,
    pub face: BoundingBox,
}

/// Grab a frame for `holder`. `Ok(None)` means the stream stalled this tick
/// (paused, transient capture error or a dark frame).
pub(crate) fn grab_live<C: Camera>(
    camera: &mut CameraSession<C>,
    holder: Holder,
) -> Result<Option<Frame>, CameraError> {
    match camera.grab(holder) {
        Ok(frame) if frame.is_dark || !camera.is_live_for(holder) => {
            tracing::trace!(%holder, sequence = frame.sequence, "stalled frame");
            Ok(None)
        }
        Ok(frame) => Ok(Some(frame)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!(%holder, error = %e, "frame grab failed");
            Ok(None)
        }
    }
}

pub(crate) fn poll_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

pub struct FaceScanner<'a, C: Camera, E> {
    camera: &'a mut CameraSession<C>,
    engine: &'a E,
    holder: Holder,
    capture: AutoCapture,
    poll: Duration,
}

impl<'a, C: Camera, E: FaceEngine> FaceScanner<'a, C, E> {
    pub fn new(
        camera: &'a mut CameraSession<C>,
        engine: &'a E,
        holder: Holder,
        policy: CapturePolicy,
        poll: Duration,
    ) -> Self {
        Self {
            camera,
            engine,
            holder,
            capture: AutoCapture::new(policy),
            poll,
        }
    }

    pub fn progress(&self) -> u8 {
        self.capture.progress()
    }

    /// Scan until a capture cycle completes, or return `None` once `cancel`
    /// resolves. Each call starts a fresh arm cycle.
    pub async fn next<F>(&mut self, cancel: &mut F) -> Result<Option<Captured>, CameraError>
    where
        F: Future<Output = ()> + Unpin,
    {
        self.capture.rearm();
        self.camera.acquire(self.holder)?;
        let mut interval = poll_interval(self.poll);

        loop {
            tokio::select! {
                _ = &mut *cancel => {
                    tracing::debug!(holder = %self.holder, "scan cancelled");
                    return Ok(None);
                }
                _ = interval.tick() => {
                    if let Some(captured) = self.tick().await? {
                        return Ok(Some(captured));
                    }
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<Option<Captured>, CameraError> {
        let Some(frame) = grab_live(&mut *self.camera, self.holder)? else {
            self.capture.record(Evidence::Good, false);
            return Ok(None);
        };

        let faces = match self.engine.detect(&frame.image).await {
            Ok(faces) => faces,
            Err(e) => {
                self.capture.record(Evidence::Bad(e.to_string()), true);
                return Ok(None);
            }
        };

        let (tick, face) = self.capture.observe(&faces, true);
        match tick {
            CaptureTick::Fire => Ok(face.cloned().map(|face| Captured {
                image: frame.image,
                face,
            })),
            CaptureTick::Reset(reason) => {
                tracing::debug!(holder = %self.holder, reason = %reason, "capture progress reset");
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

impl<C: Camera, E> Drop for FaceScanner<'_, C, E> {
    fn drop(&mut self) {
        self.camera.release(self.holder);
    }
}
