//! Session lifecycle callbacks for the presentation layer.

use rollcall_core::{FaceSample, SessionStats};

/// A business outcome of the scan loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A known student was identified.
    Identified {
        student_id: String,
        name: String,
        already_marked: bool,
    },
    /// An unknown face was enrolled on the spot and marked present.
    Registered { student_id: String, name: String },
}

/// All methods default to no-ops, so listeners implement only what they show.
pub trait SessionEvents {
    fn on_identified(&mut self, _outcome: &Outcome) {}

    /// An unknown face was captured; the frame is held for registration.
    fn on_registration_required(&mut self, _sample: &FaceSample) {}

    /// Fired exactly once per session, after exit verification succeeds.
    fn on_session_closed(&mut self, _stats: &SessionStats) {}

    /// Exit verification progress, with the reset reason when it dropped to zero.
    fn on_exit_progress(&mut self, _progress: u8, _reason: Option<&str>) {}
}

impl SessionEvents for () {}

/// Listener that only logs.
#[derive(Debug, Default)]
pub struct LogEvents;

impl SessionEvents for LogEvents {
    fn on_identified(&mut self, outcome: &Outcome) {
        tracing::info!(?outcome, "identified");
    }

    fn on_registration_required(&mut self, sample: &FaceSample) {
        tracing::info!(
            width = sample.image.width(),
            height = sample.image.height(),
            "registration required"
        );
    }

    fn on_session_closed(&mut self, stats: &SessionStats) {
        tracing::info!(
            subject = %stats.subject,
            present = stats.present_count,
            absent = stats.absent_count(),
            total = stats.total_students,
            "session closed"
        );
    }

    fn on_exit_progress(&mut self, progress: u8, reason: Option<&str>) {
        tracing::debug!(progress, reason, "exit verification");
    }
}
