//! Camera session manager — owns the single active stream.
//!
//! Every flow (attendance, exit verification, logins, enrollment) goes
//! through one [`CameraSession`]. Acquiring for a new holder always releases
//! the previous holder's stream first, so at most one stream is live at any
//! instant.

use crate::camera::{Camera, CameraError, VideoStream};
use crate::frame::Frame;
use std::fmt;

/// Which flow currently owns the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    Attendance,
    ExitVerification,
    FacultyLogin,
    AdminLogin,
    Enrollment,
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Holder::Attendance => "attendance",
            Holder::ExitVerification => "exit-verification",
            Holder::FacultyLogin => "faculty-login",
            Holder::AdminLogin => "admin-login",
            Holder::Enrollment => "enrollment",
        };
        f.write_str(name)
    }
}

pub struct CameraSession<C: Camera> {
    camera: C,
    active: Option<(Holder, C::Stream)>,
}

impl<C: Camera> CameraSession<C> {
    pub fn new(camera: C) -> Self {
        Self {
            camera,
            active: None,
        }
    }

    /// Acquire the stream for `holder`, releasing whoever held it before.
    ///
    /// Re-acquiring for the current holder is a no-op.
    pub fn acquire(&mut self, holder: Holder) -> Result<(), CameraError> {
        if self.holder() == Some(holder) {
            return Ok(());
        }
        if let Some((previous, stream)) = self.active.take() {
            tracing::debug!(%previous, next = %holder, "handing camera over");
            self.camera.release(stream);
        }

        let stream = self.camera.acquire().map_err(|e| {
            tracing::warn!(%holder, error = %e, "camera acquire failed");
            e
        })?;
        tracing::debug!(%holder, "camera acquired");
        self.active = Some((holder, stream));
        Ok(())
    }

    /// Release the stream if `holder` owns it. Returns whether anything was released.
    pub fn release(&mut self, holder: Holder) -> bool {
        match self.active.take() {
            Some((current, stream)) if current == holder => {
                self.camera.release(stream);
                tracing::debug!(%holder, "camera released");
                true
            }
            other => {
                self.active = other;
                false
            }
        }
    }

    /// Release the stream regardless of holder.
    pub fn release_any(&mut self) {
        if let Some((holder, stream)) = self.active.take() {
            self.camera.release(stream);
            tracing::debug!(%holder, "camera released");
        }
    }

    pub fn holder(&self) -> Option<Holder> {
        self.active.as_ref().map(|(h, _)| *h)
    }

    /// True when `holder` owns a stream that is still delivering frames.
    pub fn is_live_for(&self, holder: Holder) -> bool {
        matches!(&self.active, Some((h, stream)) if *h == holder && stream.is_live())
    }

    /// Grab a frame on behalf of `holder`.
    pub fn grab(&mut self, holder: Holder) -> Result<Frame, CameraError> {
        match &mut self.active {
            Some((h, stream)) if *h == holder => stream.grab(),
            _ => Err(CameraError::NotStreaming),
        }
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }
}

impl<C: Camera> Drop for CameraSession<C> {
    fn drop(&mut self) {
        self.release_any();
    }
}
