//! Exit authority verification.
//!
//! Before a session closes, the faculty member who opened it must look at
//! the camera until enough consecutive frames match their reference
//! descriptor. Any other outcome (no face, several faces, someone else)
//! resets progress and reports why.

use crate::config::ExitFallback;
use crate::events::SessionEvents;
use crate::scanner::{grab_live, poll_interval};
use image::RgbImage;
use rollcall_core::{
    AutoCapture, CapturePolicy, CaptureTick, Descriptor, EuclideanMatcher, Evidence, FaceEngine, MatchResult,
    Matcher, QualityIssue, QualityPolicy, ReferenceSet,
};
use rollcall_hw::{Camera, CameraError, CameraSession, Holder};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub const REASON_NO_FACE: &str = "Look at camera";
pub const REASON_MULTIPLE: &str = "Multiple faces detected";
pub const REASON_WRONG_PERSON: &str = "Face not recognized as Faculty";

/// Progress policy when the owner has no reference and the fallback accepts
/// any face: twice as many frames as a verified exit.
const SLOW_ACCEPT: CapturePolicy = CapturePolicy {
    quality: QualityPolicy::LENIENT,
    increment: 5,
};

#[derive(Error, Debug)]
pub enum ExitError {
    #[error("no reference photo for {0}; an administrator must close this session")]
    NoReference(String),
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitPolicy {
    pub threshold: f32,
    pub fallback: ExitFallback,
    pub poll: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Verified,
    Cancelled,
}

pub struct ExitVerifier<'a, E> {
    engine: &'a E,
    owner: String,
    references: ReferenceSet,
    matcher: EuclideanMatcher,
    threshold: f32,
    capture: AutoCapture,
    poll: Duration,
}

impl<'a, E: FaceEngine> ExitVerifier<'a, E> {
    /// Build the single-entry reference set for `owner`.
    ///
    /// Without a reference descriptor the fallback decides: `Deny` refuses
    /// here, `SlowAccept` accepts any single face at a slower rate.
    pub fn new(
        engine: &'a E,
        owner: &str,
        reference: Option<Descriptor>,
        policy: &ExitPolicy,
    ) -> Result<Self, ExitError> {
        let (references, matcher, capture_policy) = match (reference, policy.fallback) {
            (Some(d), _) => (
                ReferenceSet::single(owner, d),
                EuclideanMatcher::new(),
                CapturePolicy::AUTHORITY,
            ),
            (None, ExitFallback::Deny) => {
                tracing::warn!(owner, "exit denied: owner has no reference photo");
                return Err(ExitError::NoReference(owner.to_string()));
            }
            (None, ExitFallback::SlowAccept) => {
                tracing::warn!(owner, "exit fallback: accepting any face without identity check");
                (ReferenceSet::new(), EuclideanMatcher::accept_any_when_empty(), SLOW_ACCEPT)
            }
        };

        Ok(Self {
            engine,
            owner: owner.to_string(),
            references,
            matcher,
            threshold: policy.threshold,
            capture: AutoCapture::new(capture_policy),
            poll: policy.poll,
        })
    }

    pub fn progress(&self) -> u8 {
        self.capture.progress()
    }

    /// Judge one frame against the owner's reference.
    pub async fn judge(&self, image: &RgbImage) -> Evidence {
        let faces = match self.engine.detect(image).await {
            Ok(faces) => faces,
            Err(e) => {
                tracing::debug!(error = %e, "exit: detection failed");
                return Evidence::Bad(REASON_NO_FACE.to_string());
            }
        };
        let face = match self.capture.policy().quality.evaluate(&faces) {
            Ok(face) => face,
            Err(QualityIssue::NoFace) => return Evidence::Bad(REASON_NO_FACE.to_string()),
            Err(QualityIssue::MultipleFaces) => return Evidence::Bad(REASON_MULTIPLE.to_string()),
            Err(other) => return Evidence::Bad(other.to_string()),
        };
        let probe = match self.engine.descriptor(image, face).await {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, "exit: descriptor failed");
                return Evidence::Bad(REASON_NO_FACE.to_string());
            }
        };

        match self.matcher.find(&probe, &self.references, self.threshold) {
            MatchResult::Match { key, .. } if key == self.owner => Evidence::Good,
            MatchResult::Unverified => Evidence::Good,
            other => {
                tracing::debug!(distance = ?other.distance(), "exit: not the session owner");
                Evidence::Bad(REASON_WRONG_PERSON.to_string())
            }
        }
    }

    /// Feed one sampled frame. `None` is a stalled tick.
    pub async fn step(&mut self, image: Option<&RgbImage>) -> CaptureTick {
        match image {
            Some(image) => {
                let evidence = self.judge(image).await;
                self.capture.record(evidence, true)
            }
            None => self.capture.record(Evidence::Good, false),
        }
    }

    /// Acquire the camera, poll until verified or `cancel` resolves, and
    /// release the camera on every exit path.
    pub async fn run<C, F, V>(
        mut self,
        camera: &mut CameraSession<C>,
        cancel: F,
        events: &mut V,
    ) -> Result<ExitOutcome, ExitError>
    where
        C: Camera,
        F: Future<Output = ()>,
        V: SessionEvents,
    {
        camera.acquire(Holder::ExitVerification)?;
        tracing::info!(owner = %self.owner, "exit verification started");
        let result = self.poll_until_done(camera, cancel, events).await;
        camera.release(Holder::ExitVerification);
        tracing::info!(owner = %self.owner, result = ?result, "exit verification finished");
        result
    }

    async fn poll_until_done<C, F, V>(
        &mut self,
        camera: &mut CameraSession<C>,
        cancel: F,
        events: &mut V,
    ) -> Result<ExitOutcome, ExitError>
    where
        C: Camera,
        F: Future<Output = ()>,
        V: SessionEvents,
    {
        let mut interval = poll_interval(self.poll);
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                _ = &mut cancel => return Ok(ExitOutcome::Cancelled),
                _ = interval.tick() => {
                    let frame = grab_live(&mut *camera, Holder::ExitVerification)?;
                    match self.step(frame.as_ref().map(|f| &f.image)).await {
                        CaptureTick::Fire => {
                            events.on_exit_progress(self.capture.progress(), None);
                            return Ok(ExitOutcome::Verified);
                        }
                        CaptureTick::Reset(reason) => events.on_exit_progress(0, Some(&reason)),
                        CaptureTick::Progress(p) => events.on_exit_progress(p, None),
                        CaptureTick::Holding | CaptureTick::Stalled => {}
                    }
                }
            }
        }
    }
}
