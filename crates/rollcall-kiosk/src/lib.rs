//! rollcall-kiosk — Attendance kiosk orchestration.
//!
//! The attendance session state machine, exit verification, faculty/admin
//! login, enrollment and the record store. Camera and face engine come in as
//! collaborators ([`rollcall_hw::Camera`], [`rollcall_core::FaceEngine`]), so
//! everything here runs against fakes in tests.

pub mod auth;
pub mod config;
pub mod events;
pub mod exit;
pub mod identify;
pub mod memory;
pub mod roster;
pub mod scanner;
pub mod session;
pub mod sqlite;
pub mod store;

pub use auth::{admin_login, faculty_login, setup_admin, AuthError, AuthPolicy};
pub use config::{Config, ConfigError, ExitFallback};
pub use events::{LogEvents, Outcome, SessionEvents};
pub use exit::{ExitError, ExitOutcome, ExitPolicy, ExitVerifier};
pub use identify::{AnyIdentifier, DemoIdentifier, GalleryIdentifier, Identification, Identify, RejectReason};
pub use memory::MemoryStore;
pub use roster::{EnrollError, NewFaculty, NewStudent};
pub use scanner::{Captured, FaceScanner};
pub use session::{AttendanceSession, Command, KioskError, KioskState, SessionSettings};
pub use sqlite::SqliteStore;
pub use store::{mark_present, toggle_attendance, AdminCredential, MarkOutcome, Store, StoreError};
