//! Persistence collaborator.
//!
//! [`Store`] is the CRUD seam the kiosk flows depend on. [`SqliteStore`]
//! persists to disk; [`MemoryStore`] backs tests and throwaway demos.
//!
//! [`SqliteStore`]: crate::sqlite::SqliteStore
//! [`MemoryStore`]: crate::memory::MemoryStore

use chrono::{DateTime, Local, Utc};
use rollcall_core::attendance;
use rollcall_core::{AttendanceRecord, AttendanceStatus, Descriptor, Faculty, Student, Subject};
use thiserror::Error;

/// Default cap on attendance listings.
pub const DEFAULT_LIST_LIMIT: usize = 500;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },
    #[error("attendance already recorded for {student_id} in {subject} on {date_str}")]
    DuplicateAttendance {
        student_id: String,
        subject: String,
        date_str: String,
    },
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// The single administrator credential.
#[derive(Debug, Clone)]
pub struct AdminCredential {
    /// SHA-256 hex digest of the password.
    pub password_digest: String,
    /// JPEG reference photo.
    pub photo: Option<Vec<u8>>,
    pub descriptor: Option<Descriptor>,
}

#[allow(async_fn_in_trait)]
pub trait Store {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError>;
    async fn get_student(&self, id: &str) -> Result<Option<Student>, StoreError>;
    /// Fails with `AlreadyExists` if the id is taken.
    async fn insert_student(&self, student: &Student) -> Result<(), StoreError>;
    async fn update_student(&self, student: &Student) -> Result<(), StoreError>;
    /// Also deletes the student's attendance records.
    async fn delete_student(&self, id: &str) -> Result<(), StoreError>;

    async fn list_faculty(&self) -> Result<Vec<Faculty>, StoreError>;
    async fn get_faculty(&self, id: &str) -> Result<Option<Faculty>, StoreError>;
    async fn insert_faculty(&self, faculty: &Faculty) -> Result<(), StoreError>;
    async fn update_faculty(&self, faculty: &Faculty) -> Result<(), StoreError>;
    async fn delete_faculty(&self, id: &str) -> Result<(), StoreError>;

    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError>;
    async fn insert_subject(&self, subject: &Subject) -> Result<(), StoreError>;
    async fn update_subject(&self, subject: &Subject) -> Result<(), StoreError>;
    async fn delete_subject(&self, abbr: &str) -> Result<(), StoreError>;

    /// Newest first, optionally restricted to one `YYYY-MM-DD` day.
    async fn list_attendance(&self, date_str: Option<&str>, limit: usize) -> Result<Vec<AttendanceRecord>, StoreError>;
    async fn get_attendance(&self, id: &str) -> Result<Option<AttendanceRecord>, StoreError>;
    async fn find_attendance(
        &self,
        student_id: &str,
        subject: &str,
        date_str: &str,
    ) -> Result<Option<AttendanceRecord>, StoreError>;
    /// Fails with `DuplicateAttendance` if the dedup key is already present.
    async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError>;
    async fn set_attendance_status(&self, id: &str, status: AttendanceStatus) -> Result<AttendanceRecord, StoreError>;

    async fn get_admin(&self) -> Result<Option<AdminCredential>, StoreError>;
    async fn set_admin(&self, admin: &AdminCredential) -> Result<(), StoreError>;
}

/// Result of [`mark_present`].
#[derive(Debug, Clone, PartialEq)]
pub enum MarkOutcome {
    Recorded(AttendanceRecord),
    /// A record already exists for this student, subject and day.
    AlreadyMarked(AttendanceRecord),
}

impl MarkOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, MarkOutcome::AlreadyMarked(_))
    }

    pub fn record(&self) -> &AttendanceRecord {
        match self {
            MarkOutcome::Recorded(r) | MarkOutcome::AlreadyMarked(r) => r,
        }
    }
}

/// Record a PRESENT mark unless one already exists for the dedup key.
pub async fn mark_present<S: Store>(
    store: &S,
    student: &Student,
    subject: &str,
    now: DateTime<Local>,
) -> Result<MarkOutcome, StoreError> {
    let date_str = attendance::date_str(now);
    if let Some(existing) = store.find_attendance(&student.id, subject, &date_str).await? {
        return Ok(MarkOutcome::AlreadyMarked(existing));
    }

    let record = AttendanceRecord {
        id: uuid::Uuid::new_v4().to_string(),
        student_id: student.id.clone(),
        student_name: student.name.clone(),
        subject: subject.to_string(),
        timestamp: now.with_timezone(&Utc),
        date_str,
        status: AttendanceStatus::Present,
    };

    match store.insert_attendance(&record).await {
        Ok(()) => {
            tracing::info!(student = %record.student_id, subject, date = %record.date_str, "attendance recorded");
            Ok(MarkOutcome::Recorded(record))
        }
        Err(StoreError::DuplicateAttendance { .. }) => {
            // Lost a race with another writer for the same key.
            let existing = store
                .find_attendance(&record.student_id, subject, &record.date_str)
                .await?
                .ok_or_else(|| StoreError::Corrupt("duplicate attendance vanished".into()))?;
            Ok(MarkOutcome::AlreadyMarked(existing))
        }
        Err(e) => Err(e),
    }
}

/// Manual override: PRESENT becomes ABSENT, anything else PRESENT.
pub async fn toggle_attendance<S: Store>(store: &S, id: &str) -> Result<AttendanceRecord, StoreError> {
    let record = store.get_attendance(id).await?.ok_or_else(|| StoreError::NotFound {
        kind: "attendance record",
        id: id.to_string(),
    })?;
    store.set_attendance_status(id, record.status.toggled()).await
}
