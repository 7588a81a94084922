//! rollcall-core — Attendance kiosk core.
//!
//! Holds the data model shared by every crate plus the pure pieces of the
//! capture pipeline: the quality gate, the auto-capture controller and the
//! identity matcher. Nothing here touches a camera, a model runtime or a
//! database; those sit behind the [`FaceEngine`] trait and the kiosk crate.

pub mod attendance;
pub mod capture;
pub mod engine;
pub mod matcher;
pub mod photo;
pub mod quality;
pub mod types;

pub use attendance::{AttendanceRecord, AttendanceStatus, SessionStats};
pub use capture::{AutoCapture, CapturePolicy, CaptureTick, Evidence};
pub use engine::{EngineError, FaceEngine};
pub use matcher::{EmptySetPolicy, EuclideanMatcher, MatchResult, Matcher, Reference, ReferenceSet};
pub use photo::PhotoError;
pub use quality::{QualityIssue, QualityPolicy};
pub use types::{BoundingBox, Descriptor, FaceSample, Faculty, Student, Subject};
