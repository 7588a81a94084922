//! Attendance session controller.
//!
//! Drives one kiosk session for one subject:
//!
//! ```text
//! IDLE -> ANALYZING -> SUCCESS | DUPLICATE -> IDLE      (after the display time)
//!                   -> UNKNOWN_USER -> REGISTERING -> SUCCESS | UNKNOWN_USER
//!                   -> IDLE                             (transient failure)
//! ```
//!
//! The auto-capture loop and the manual scan command share [`scan`]. Every
//! operation takes `&mut self`, so a tick's detection call can never overlap
//! another tick or a command; state read after an await is always current.
//!
//! Closing the session hands the camera to the exit verifier, and only a
//! verified exit computes the statistics and fires `on_session_closed`.
//!
//! [`scan`]: AttendanceSession::scan

use crate::config::Config;
use crate::events::{Outcome, SessionEvents};
use crate::exit::{ExitError, ExitOutcome, ExitPolicy, ExitVerifier};
use crate::identify::{Identification, Identify};
use crate::roster::{self, EnrollError, NewStudent};
use crate::scanner::{grab_live, poll_interval};
use crate::store::{mark_present, Store, StoreError};
use chrono::{DateTime, Local, Utc};
use image::RgbImage;
use rollcall_core::{
    AutoCapture, CapturePolicy, CaptureTick, Descriptor, Evidence, FaceEngine, FaceSample, Faculty, SessionStats,
    Subject,
};
use rollcall_hw::{Camera, CameraError, CameraSession, Holder};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

pub const FEEDBACK_READY: &str = "Ready to scan";
pub const FEEDBACK_ANALYZING: &str = "Analyzing...";
pub const FEEDBACK_UNCLEAR: &str = "Face unclear. Please hold still and try again.";
pub const FEEDBACK_UNKNOWN: &str = "Face not recognized. Please register.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KioskState {
    Idle,
    Analyzing,
    Success,
    Duplicate,
    UnknownUser,
    Registering,
}

impl fmt::Display for KioskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KioskState::Idle => "IDLE",
            KioskState::Analyzing => "ANALYZING",
            KioskState::Success => "SUCCESS",
            KioskState::Duplicate => "DUPLICATE",
            KioskState::UnknownUser => "UNKNOWN_USER",
            KioskState::Registering => "REGISTERING",
        })
    }
}

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("cannot {action} while {state}")]
    InvalidState { action: &'static str, state: KioskState },
    #[error("Student ID and Name are required")]
    MissingFields,
    #[error("{faculty} does not teach {subject}")]
    NotTaught { faculty: String, subject: String },
    #[error("unknown subject: {0}")]
    UnknownSubject(String),
    #[error("session already closed")]
    SessionClosed,
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error(transparent)]
    Exit(#[from] ExitError),
}

impl KioskError {
    /// Device errors end the session loop; everything else is reported and
    /// the kiosk keeps scanning.
    pub fn is_fatal(&self) -> bool {
        match self {
            KioskError::Camera(e) | KioskError::Exit(ExitError::Camera(e)) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Operator commands for [`AttendanceSession::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Scan,
    Register {
        id: String,
        name: String,
        department: String,
    },
    CancelRegistration,
    /// Start exit verification.
    EndSession,
    /// Abort a running exit verification.
    CancelExit,
    /// Leave the loop without closing the session.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub live_poll: Duration,
    /// How long SUCCESS/DUPLICATE stay up before returning to IDLE.
    pub display: Duration,
    pub duplicate_face_threshold: f32,
    pub exit: ExitPolicy,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            live_poll: config.live_poll(),
            display: config.display(),
            duplicate_face_threshold: config.duplicate_face_threshold,
            exit: ExitPolicy {
                threshold: config.authority_threshold,
                fallback: config.exit_fallback,
                poll: config.live_poll(),
            },
        }
    }
}

pub struct AttendanceSession<'a, C: Camera, E, S, I, V> {
    camera: &'a mut CameraSession<C>,
    engine: &'a E,
    store: &'a S,
    identifier: I,
    events: V,
    settings: SessionSettings,
    owner: Faculty,
    /// Captured at session start and never re-fetched.
    owner_descriptor: Option<Descriptor>,
    subject: Subject,
    state: KioskState,
    feedback: String,
    shown_at: Option<Instant>,
    capture: AutoCapture,
    temp_image: Option<RgbImage>,
    marked: HashSet<String>,
    started_at: DateTime<Utc>,
    stats: Option<SessionStats>,
}

impl<'a, C, E, S, I, V> AttendanceSession<'a, C, E, S, I, V>
where
    C: Camera,
    E: FaceEngine,
    S: Store,
    I: Identify,
    V: SessionEvents,
{
    /// Open a session for `subject`, run by `owner`.
    ///
    /// The owner must teach the subject. Their reference descriptor is taken
    /// now (from the stored descriptor, else from their photo) for the exit
    /// check later.
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        camera: &'a mut CameraSession<C>,
        engine: &'a E,
        store: &'a S,
        identifier: I,
        events: V,
        owner: Faculty,
        subject: &str,
        settings: SessionSettings,
    ) -> Result<Self, KioskError> {
        let subject = store
            .list_subjects()
            .await?
            .into_iter()
            .find(|s| s.abbr == subject)
            .ok_or_else(|| KioskError::UnknownSubject(subject.to_string()))?;
        if !owner.teaches(&subject.abbr) {
            return Err(KioskError::NotTaught {
                faculty: owner.name.clone(),
                subject: subject.abbr,
            });
        }

        let owner_descriptor = match (&owner.descriptor, &owner.photo) {
            (Some(d), _) => Some(d.clone()),
            (None, Some(jpeg)) => roster::descriptor_from_photo(engine, jpeg)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(owner = %owner.id, error = %e, "owner photo unusable");
                    None
                }),
            (None, None) => None,
        };
        if owner_descriptor.is_none() {
            tracing::warn!(
                owner = %owner.id,
                fallback = ?settings.exit.fallback,
                "session owner has no reference face"
            );
        }

        camera.acquire(Holder::Attendance)?;
        tracing::info!(owner = %owner.id, subject = %subject.abbr, "attendance session started");

        Ok(Self {
            camera,
            engine,
            store,
            identifier,
            events,
            settings,
            owner,
            owner_descriptor,
            subject,
            state: KioskState::Idle,
            feedback: FEEDBACK_READY.to_string(),
            shown_at: None,
            capture: AutoCapture::new(CapturePolicy::ATTENDANCE),
            temp_image: None,
            marked: HashSet::new(),
            started_at: Utc::now(),
            stats: None,
        })
    }

    pub fn state(&self) -> KioskState {
        self.state
    }

    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    pub fn progress(&self) -> u8 {
        self.capture.progress()
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn owner(&self) -> &Faculty {
        &self.owner
    }

    /// Frame held for registration while in UNKNOWN_USER.
    pub fn temp_image(&self) -> Option<&RgbImage> {
        self.temp_image.as_ref()
    }

    /// Students seen this session, including duplicates and new registrations.
    pub fn marked_identities(&self) -> &HashSet<String> {
        &self.marked
    }

    /// Statistics, available once the session has closed.
    pub fn session_stats(&self) -> Option<&SessionStats> {
        self.stats.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.stats.is_some()
    }

    pub fn events(&self) -> &V {
        &self.events
    }

    fn ensure_open(&self) -> Result<(), KioskError> {
        if self.is_closed() {
            return Err(KioskError::SessionClosed);
        }
        Ok(())
    }

    /// Back to IDLE. A held unknown face never outlives UNKNOWN_USER.
    fn to_idle(&mut self, feedback: &str) {
        self.temp_image = None;
        self.state = KioskState::Idle;
        self.feedback = feedback.to_string();
        self.shown_at = None;
        self.capture.rearm();
    }

    fn show(&mut self, state: KioskState, feedback: String, now: Instant) {
        tracing::debug!(%state, feedback = %feedback, "kiosk state");
        self.state = state;
        self.feedback = feedback;
        self.shown_at = Some(now);
    }

    /// Return SUCCESS/DUPLICATE to IDLE once the display time has passed.
    pub fn expire_feedback(&mut self, now: Instant) {
        let expired = self
            .shown_at
            .is_some_and(|at| now.saturating_duration_since(at) >= self.settings.display);
        if expired && matches!(self.state, KioskState::Success | KioskState::Duplicate) {
            self.to_idle(FEEDBACK_READY);
        }
    }

    /// One polling tick: sample a frame, gate it, and scan once the
    /// auto-capture cycle completes. Only fatal camera errors escape.
    pub async fn tick(&mut self, now: Instant) -> Result<(), KioskError> {
        if self.is_closed() {
            return Ok(());
        }
        self.expire_feedback(now);
        if self.state != KioskState::Idle {
            return Ok(());
        }

        let Some(frame) = grab_live(&mut *self.camera, Holder::Attendance)? else {
            self.capture.record(Evidence::Good, false);
            return Ok(());
        };
        let faces = match self.engine.detect(&frame.image).await {
            Ok(faces) => faces,
            Err(e) => {
                self.capture.record(Evidence::Bad(e.to_string()), true);
                return Ok(());
            }
        };

        match self.capture.observe(&faces, true).0 {
            CaptureTick::Fire => self.scan_frame(frame.image, now).await,
            CaptureTick::Reset(reason) => {
                tracing::trace!(reason = %reason, "attendance capture reset");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Manual trigger: identify the current frame. Valid only from IDLE.
    pub async fn scan(&mut self) -> Result<(), KioskError> {
        self.ensure_open()?;
        if self.state != KioskState::Idle {
            return Err(KioskError::InvalidState {
                action: "scan",
                state: self.state,
            });
        }
        match self.camera.grab(Holder::Attendance) {
            Ok(frame) => self.scan_frame(frame.image, Instant::now()).await,
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                tracing::debug!(error = %e, "manual scan: no frame");
                self.to_idle(FEEDBACK_UNCLEAR);
                Ok(())
            }
        }
    }

    async fn scan_frame(&mut self, image: RgbImage, now: Instant) -> Result<(), KioskError> {
        self.state = KioskState::Analyzing;
        self.feedback = FEEDBACK_ANALYZING.to_string();

        match self.identifier.identify(&image, &self.subject.abbr).await {
            Ok(Identification::Matched {
                student,
                already_marked,
                ..
            }) => {
                self.marked.insert(student.id.clone());
                if already_marked {
                    self.show(KioskState::Duplicate, format!("Already Recorded: {}", student.name), now);
                } else {
                    self.show(KioskState::Success, format!("Attendance Recorded: {}", student.name), now);
                }
                self.events.on_identified(&Outcome::Identified {
                    student_id: student.id,
                    name: student.name,
                    already_marked,
                });
            }
            Ok(Identification::Rejected(reason)) if reason.is_transient() => {
                tracing::debug!(%reason, "scan: transient failure");
                self.to_idle(FEEDBACK_UNCLEAR);
            }
            Ok(Identification::Rejected(reason)) => {
                tracing::info!(%reason, "scan: unknown face, registration required");
                self.state = KioskState::UnknownUser;
                self.feedback = FEEDBACK_UNKNOWN.to_string();
                self.shown_at = None;
                let sample = FaceSample::new(image);
                self.events.on_registration_required(&sample);
                self.temp_image = Some(sample.image);
            }
            Err(e) => {
                tracing::warn!(error = %e, "scan: identification failed");
                self.to_idle(FEEDBACK_UNCLEAR);
            }
        }
        Ok(())
    }

    /// Enroll the held unknown face and mark it present.
    ///
    /// Input or id conflicts keep the frame and stay in UNKNOWN_USER so the
    /// operator can correct the form; face conflicts discard the frame.
    pub async fn register(&mut self, id: &str, name: &str, department: &str) -> Result<(), KioskError> {
        self.ensure_open()?;
        if !matches!(self.state, KioskState::UnknownUser | KioskState::Registering) {
            return Err(KioskError::InvalidState {
                action: "register",
                state: self.state,
            });
        }
        if id.trim().is_empty() || name.trim().is_empty() {
            self.feedback = KioskError::MissingFields.to_string();
            return Err(KioskError::MissingFields);
        }
        let Some(image) = self.temp_image.take() else {
            self.to_idle(FEEDBACK_READY);
            return Err(KioskError::InvalidState {
                action: "register",
                state: KioskState::Idle,
            });
        };

        self.state = KioskState::Registering;
        self.feedback = "Registering...".to_string();
        let new = NewStudent {
            id: id.to_string(),
            name: name.to_string(),
            email: String::new(),
            department: department.to_string(),
        };

        let student = match roster::enroll_student(
            self.engine,
            self.store,
            new,
            &image,
            self.settings.duplicate_face_threshold,
        )
        .await
        {
            Ok(student) => student,
            Err(e) if e.requires_new_capture() => {
                tracing::info!(error = %e, "registration rejected, frame discarded");
                self.to_idle(&e.to_string());
                return Err(e.into());
            }
            Err(e) => {
                tracing::info!(error = %e, "registration rejected");
                self.state = KioskState::UnknownUser;
                self.feedback = e.to_string();
                self.temp_image = Some(image);
                return Err(e.into());
            }
        };

        self.marked.insert(student.id.clone());
        if let Err(e) = mark_present(self.store, &student, &self.subject.abbr, Local::now()).await {
            tracing::warn!(student = %student.id, error = %e, "registered but attendance not recorded");
            self.to_idle(&e.to_string());
            return Err(e.into());
        }

        self.show(
            KioskState::Success,
            format!("Welcome, {}. Registered & Marked Present.", student.name),
            Instant::now(),
        );
        self.events.on_identified(&Outcome::Registered {
            student_id: student.id,
            name: student.name,
        });
        Ok(())
    }

    /// Abandon registration and discard the held frame.
    pub fn cancel_registration(&mut self) -> Result<(), KioskError> {
        if self.state != KioskState::UnknownUser {
            return Err(KioskError::InvalidState {
                action: "cancel registration",
                state: self.state,
            });
        }
        self.to_idle(FEEDBACK_READY);
        Ok(())
    }

    /// Pause the scan loop, verify the owner, and close the session.
    ///
    /// The attendance stream is released before the verifier acquires the
    /// camera and reacquired if verification is cancelled or fails.
    /// Statistics are computed and `on_session_closed` fires exactly once.
    pub async fn end_session<F>(&mut self, cancel: F) -> Result<ExitOutcome, KioskError>
    where
        F: Future<Output = ()>,
    {
        self.ensure_open()?;
        let verifier = ExitVerifier::new(
            self.engine,
            &self.owner.id,
            self.owner_descriptor.clone(),
            &self.settings.exit,
        )?;

        self.camera.release(Holder::Attendance);
        self.capture.reset();
        let outcome = verifier.run(&mut *self.camera, cancel, &mut self.events).await;

        match outcome {
            Ok(ExitOutcome::Verified) => match self.close().await {
                Ok(()) => Ok(ExitOutcome::Verified),
                Err(e) => {
                    self.resume();
                    Err(e)
                }
            },
            Ok(ExitOutcome::Cancelled) => {
                self.camera.acquire(Holder::Attendance)?;
                Ok(ExitOutcome::Cancelled)
            }
            Err(e) => {
                self.resume();
                Err(e.into())
            }
        }
    }

    fn resume(&mut self) {
        if let Err(e) = self.camera.acquire(Holder::Attendance) {
            tracing::warn!(error = %e, "could not resume attendance stream");
        }
    }

    async fn close(&mut self) -> Result<(), KioskError> {
        let roster = self.store.list_students().await?;
        let stats = SessionStats::compute(&self.subject.abbr, roster, &self.marked, self.started_at, Utc::now());
        tracing::info!(
            subject = %stats.subject,
            present = stats.present_count,
            total = stats.total_students,
            "session closed"
        );
        self.temp_image = None;
        self.state = KioskState::Idle;
        self.feedback = "Session closed".to_string();
        self.events.on_session_closed(&stats);
        self.stats = Some(stats);
        Ok(())
    }

    fn report(&mut self, result: Result<(), KioskError>) -> Result<(), KioskError> {
        match result {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, state = %self.state, "command rejected");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Run the polling loop and serve operator commands until the session
    /// closes (returns the statistics), the channel ends or `Shutdown`.
    pub async fn run(&mut self, commands: &mut mpsc::Receiver<Command>) -> Result<Option<SessionStats>, KioskError> {
        let mut interval = poll_interval(self.settings.live_poll);

        loop {
            let next = tokio::select! {
                _ = interval.tick() => None,
                cmd = commands.recv() => Some(cmd),
            };

            let command = match next {
                None => {
                    self.tick(Instant::now()).await?;
                    continue;
                }
                Some(None) | Some(Some(Command::Shutdown)) => return Ok(None),
                Some(Some(command)) => command,
            };

            match command {
                Command::Scan => {
                    let result = self.scan().await;
                    self.report(result)?;
                }
                Command::Register { id, name, department } => {
                    let result = self.register(&id, &name, &department).await;
                    self.report(result)?;
                }
                Command::CancelRegistration => {
                    let result = self.cancel_registration();
                    self.report(result)?;
                }
                Command::EndSession => match self.end_session(wait_for_cancel(commands)).await {
                    Ok(ExitOutcome::Verified) => return Ok(self.stats.clone()),
                    Ok(ExitOutcome::Cancelled) => self.to_idle(FEEDBACK_READY),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::warn!(error = %e, "session not closed");
                        self.feedback = e.to_string();
                    }
                },
                Command::CancelExit | Command::Shutdown => {}
            }
        }
    }
}

/// Resolves on `CancelExit`, `Shutdown` or a closed channel; other commands
/// are dropped while exit verification owns the camera.
async fn wait_for_cancel(commands: &mut mpsc::Receiver<Command>) {
    loop {
        match commands.recv().await {
            Some(Command::CancelExit) | Some(Command::Shutdown) | None => return,
            Some(other) => tracing::debug!(command = ?other, "ignored during exit verification"),
        }
    }
}

impl<C: Camera, E, S, I, V> Drop for AttendanceSession<'_, C, E, S, I, V> {
    fn drop(&mut self) {
        self.camera.release(Holder::Attendance);
    }
}
