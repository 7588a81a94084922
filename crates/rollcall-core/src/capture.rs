//! Auto-capture controller.
//!
//! Accumulates good-frame evidence across polling ticks and fires exactly one
//! capture per arm cycle once progress reaches 100. A single bad frame resets
//! progress, so a lucky frame cannot trigger a capture on its own.
//!
//! One controller drives every flow (attendance, enrollment, admin login,
//! exit verification); only the [`CapturePolicy`] differs.

use crate::quality::{QualityIssue, QualityPolicy};
use crate::types::BoundingBox;

pub const FULL_PROGRESS: u8 = 100;

/// Tunables for one capture flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturePolicy {
    pub quality: QualityPolicy,
    /// Progress added per good tick.
    pub increment: u8,
}

impl CapturePolicy {
    /// Student/faculty enrollment and admin setup/login: 5 good frames.
    pub const ENROLLMENT: Self = Self {
        quality: QualityPolicy::LENIENT,
        increment: 20,
    };

    /// Attendance kiosk: 5 good frames against the strict gate.
    pub const ATTENDANCE: Self = Self {
        quality: QualityPolicy::STRICT,
        increment: 20,
    };

    /// Faculty login: one good frame at the coarse auth cadence.
    pub const ONE_SHOT: Self = Self {
        quality: QualityPolicy::LENIENT,
        increment: FULL_PROGRESS,
    };

    /// Exit verification: 10 consecutive frames matching the session owner.
    pub const AUTHORITY: Self = Self {
        quality: QualityPolicy::LENIENT,
        increment: 10,
    };

    /// Progress actually added per good tick; a zero increment still advances.
    pub fn step(&self) -> u8 {
        self.increment.max(1)
    }

    /// Number of consecutive good ticks needed to fire.
    pub fn ticks_to_fire(&self) -> u32 {
        u32::from(FULL_PROGRESS).div_ceil(u32::from(self.step()))
    }
}

/// What one tick contributed.
#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    Good,
    Bad(String),
}

impl From<Result<&BoundingBox, QualityIssue>> for Evidence {
    fn from(verdict: Result<&BoundingBox, QualityIssue>) -> Self {
        match verdict {
            Ok(_) => Evidence::Good,
            Err(issue) => Evidence::Bad(issue.to_string()),
        }
    }
}

/// Result of feeding one tick into the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureTick {
    /// Progress advanced but has not reached 100.
    Progress(u8),
    /// Progress reset to zero.
    Reset(String),
    /// Progress reached 100 while armed. Emitted once per arm cycle.
    Fire,
    /// Already fired this cycle; waiting for [`AutoCapture::rearm`].
    Holding,
    /// Stream paused or ended; nothing changed.
    Stalled,
}

/// Progress state machine for one capture loop.
#[derive(Debug, Clone)]
pub struct AutoCapture {
    policy: CapturePolicy,
    progress: u8,
    armed: bool,
}

impl AutoCapture {
    pub fn new(policy: CapturePolicy) -> Self {
        Self {
            policy,
            progress: 0,
            armed: true,
        }
    }

    pub fn policy(&self) -> &CapturePolicy {
        &self.policy
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Gate this frame's detections with the policy's quality thresholds and
    /// record the verdict. Returns the accepted face alongside the tick.
    pub fn observe<'a>(
        &mut self,
        detections: &'a [BoundingBox],
        stream_live: bool,
    ) -> (CaptureTick, Option<&'a BoundingBox>) {
        if !stream_live {
            return (CaptureTick::Stalled, None);
        }
        let verdict = self.policy.quality.evaluate(detections);
        let face = verdict.ok();
        (self.record(verdict.into(), true), face)
    }

    /// Record one tick of externally judged evidence.
    pub fn record(&mut self, evidence: Evidence, stream_live: bool) -> CaptureTick {
        if !stream_live {
            return CaptureTick::Stalled;
        }

        match evidence {
            Evidence::Bad(reason) => {
                self.progress = 0;
                CaptureTick::Reset(reason)
            }
            Evidence::Good if !self.armed => CaptureTick::Holding,
            Evidence::Good => {
                self.progress = self
                    .progress
                    .saturating_add(self.policy.step())
                    .min(FULL_PROGRESS);
                if self.progress >= FULL_PROGRESS {
                    self.armed = false;
                    CaptureTick::Fire
                } else {
                    CaptureTick::Progress(self.progress)
                }
            }
        }
    }

    /// Start a new arm cycle (after a retake or when the consuming flow is done).
    pub fn rearm(&mut self) {
        self.progress = 0;
        self.armed = true;
    }

    /// Drop progress without rearming or disarming.
    pub fn reset(&mut self) {
        self.progress = 0;
    }
}
