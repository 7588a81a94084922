//! SQLite-backed [`Store`] via `tokio-rusqlite`.
//!
//! Every call runs on the connection's background thread. Rows come back as
//! plain tuples and are decoded (JSON descriptors, RFC 3339 timestamps) on
//! the async side.

use crate::store::{AdminCredential, Store, StoreError};
use chrono::{DateTime, SecondsFormat, Utc};
use rollcall_core::{AttendanceRecord, AttendanceStatus, Descriptor, Faculty, Student, Subject};
use rusqlite::OptionalExtension;
use std::path::Path;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    email       TEXT NOT NULL DEFAULT '',
    department  TEXT NOT NULL DEFAULT '',
    photo       BLOB,
    descriptor  TEXT,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS faculty (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    subjects    TEXT NOT NULL DEFAULT '[]',
    photo       BLOB,
    descriptor  TEXT
);
CREATE TABLE IF NOT EXISTS subjects (
    abbr        TEXT PRIMARY KEY,
    code        TEXT NOT NULL,
    name        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    id            TEXT PRIMARY KEY,
    student_id    TEXT NOT NULL,
    student_name  TEXT NOT NULL,
    subject       TEXT NOT NULL,
    timestamp     TEXT NOT NULL,
    date_str      TEXT NOT NULL,
    status        TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS attendance_dedup
    ON attendance (student_id, subject, date_str);
CREATE INDEX IF NOT EXISTS attendance_by_date ON attendance (date_str, timestamp);
CREATE TABLE IF NOT EXISTS admin (
    id               TEXT PRIMARY KEY CHECK (id = 'ADMIN'),
    password_digest  TEXT NOT NULL,
    photo            BLOB,
    descriptor       TEXT
);
";

const STUDENT_COLUMNS: &str = "id, name, email, department, photo, descriptor, created_at";
const FACULTY_COLUMNS: &str = "id, name, subjects, photo, descriptor";
const ATTENDANCE_COLUMNS: &str = "id, student_id, student_name, subject, timestamp, date_str, status";

type StudentRow = (String, String, String, String, Option<Vec<u8>>, Option<String>, String);
type FacultyRow = (String, String, String, Option<Vec<u8>>, Option<String>);
type AttendanceRow = (String, String, String, String, String, String, String);

fn student_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?))
}

fn faculty_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<FacultyRow> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
}

fn attendance_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRow> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?))
}

fn encode_descriptor(d: &Option<Descriptor>) -> Result<Option<String>, StoreError> {
    d.as_ref().map(serde_json::to_string).transpose().map_err(StoreError::from)
}

fn decode_descriptor(raw: Option<String>) -> Result<Option<Descriptor>, StoreError> {
    raw.map(|s| serde_json::from_str(&s)).transpose().map_err(StoreError::from)
}

fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

fn into_student(row: StudentRow) -> Result<Student, StoreError> {
    let (id, name, email, department, photo, descriptor, created_at) = row;
    Ok(Student {
        id,
        name,
        email,
        department,
        photo,
        descriptor: decode_descriptor(descriptor)?,
        created_at: decode_time(&created_at)?,
    })
}

fn into_faculty(row: FacultyRow) -> Result<Faculty, StoreError> {
    let (id, name, subjects, photo, descriptor) = row;
    Ok(Faculty {
        id,
        name,
        subjects: serde_json::from_str(&subjects)?,
        photo,
        descriptor: decode_descriptor(descriptor)?,
    })
}

fn into_record(row: AttendanceRow) -> Result<AttendanceRecord, StoreError> {
    let (id, student_id, student_name, subject, timestamp, date_str, status) = row;
    Ok(AttendanceRecord {
        id,
        student_id,
        student_name,
        subject,
        timestamp: decode_time(&timestamp)?,
        date_str,
        status: status.parse().map_err(StoreError::Corrupt)?,
    })
}

fn is_unique_violation(e: &tokio_rusqlite::Error) -> bool {
    matches!(
        e,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, _))
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn not_found(kind: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).await?;
        tracing::info!(path = %path.display(), "database opened");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().await?).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|c| {
            c.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

impl Store for SqliteStore {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let rows = self
            .conn
            .call(|c| {
                let mut stmt = c.prepare(&format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY id"))?;
                let rows = stmt.query_map([], student_row)?.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(into_student).collect()
    }

    async fn get_student(&self, id: &str) -> Result<Option<Student>, StoreError> {
        let id = id.to_string();
        let row = self
            .conn
            .call(move |c| {
                let row = c
                    .query_row(
                        &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?1"),
                        [&id],
                        student_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(into_student).transpose()
    }

    async fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        let s = student.clone();
        let descriptor = encode_descriptor(&s.descriptor)?;
        let created_at = encode_time(&s.created_at);
        let id = s.id.clone();
        self.conn
            .call(move |c| {
                c.execute(
                    &format!("INSERT INTO students ({STUDENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                    rusqlite::params![s.id, s.name, s.email, s.department, s.photo, descriptor, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::AlreadyExists { kind: "student", id }
                } else {
                    e.into()
                }
            })
    }

    async fn update_student(&self, student: &Student) -> Result<(), StoreError> {
        let s = student.clone();
        let descriptor = encode_descriptor(&s.descriptor)?;
        let id = s.id.clone();
        let changed = self
            .conn
            .call(move |c| {
                Ok(c.execute(
                    "UPDATE students SET name = ?2, email = ?3, department = ?4, photo = ?5, descriptor = ?6
                     WHERE id = ?1",
                    rusqlite::params![s.id, s.name, s.email, s.department, s.photo, descriptor],
                )?)
            })
            .await?;
        if changed == 0 {
            return Err(not_found("student", &id));
        }
        Ok(())
    }

    async fn delete_student(&self, id: &str) -> Result<(), StoreError> {
        let owned = id.to_string();
        let removed = self
            .conn
            .call(move |c| {
                let tx = c.transaction()?;
                let marks = tx.execute("DELETE FROM attendance WHERE student_id = ?1", [&owned])?;
                let removed = tx.execute("DELETE FROM students WHERE id = ?1", [&owned])?;
                tx.commit()?;
                tracing::debug!(student = %owned, marks, "student deleted");
                Ok(removed)
            })
            .await?;
        if removed == 0 {
            return Err(not_found("student", id));
        }
        Ok(())
    }

    async fn list_faculty(&self) -> Result<Vec<Faculty>, StoreError> {
        let rows = self
            .conn
            .call(|c| {
                let mut stmt = c.prepare(&format!("SELECT {FACULTY_COLUMNS} FROM faculty ORDER BY id"))?;
                let rows = stmt.query_map([], faculty_row)?.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(into_faculty).collect()
    }

    async fn get_faculty(&self, id: &str) -> Result<Option<Faculty>, StoreError> {
        let id = id.to_string();
        let row = self
            .conn
            .call(move |c| {
                let row = c
                    .query_row(
                        &format!("SELECT {FACULTY_COLUMNS} FROM faculty WHERE id = ?1"),
                        [&id],
                        faculty_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(into_faculty).transpose()
    }

    async fn insert_faculty(&self, faculty: &Faculty) -> Result<(), StoreError> {
        let f = faculty.clone();
        let subjects = serde_json::to_string(&f.subjects)?;
        let descriptor = encode_descriptor(&f.descriptor)?;
        let id = f.id.clone();
        self.conn
            .call(move |c| {
                c.execute(
                    &format!("INSERT INTO faculty ({FACULTY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                    rusqlite::params![f.id, f.name, subjects, f.photo, descriptor],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::AlreadyExists { kind: "faculty", id }
                } else {
                    e.into()
                }
            })
    }

    async fn update_faculty(&self, faculty: &Faculty) -> Result<(), StoreError> {
        let f = faculty.clone();
        let subjects = serde_json::to_string(&f.subjects)?;
        let descriptor = encode_descriptor(&f.descriptor)?;
        let id = f.id.clone();
        let changed = self
            .conn
            .call(move |c| {
                Ok(c.execute(
                    "UPDATE faculty SET name = ?2, subjects = ?3, photo = ?4, descriptor = ?5 WHERE id = ?1",
                    rusqlite::params![f.id, f.name, subjects, f.photo, descriptor],
                )?)
            })
            .await?;
        if changed == 0 {
            return Err(not_found("faculty", &id));
        }
        Ok(())
    }

    async fn delete_faculty(&self, id: &str) -> Result<(), StoreError> {
        let owned = id.to_string();
        let removed = self
            .conn
            .call(move |c| Ok(c.execute("DELETE FROM faculty WHERE id = ?1", [&owned])?))
            .await?;
        if removed == 0 {
            return Err(not_found("faculty", id));
        }
        Ok(())
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        Ok(self
            .conn
            .call(|c| {
                let mut stmt = c.prepare("SELECT abbr, code, name FROM subjects ORDER BY code")?;
                let rows = stmt
                    .query_map([], |r| {
                        Ok(Subject {
                            abbr: r.get(0)?,
                            code: r.get(1)?,
                            name: r.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?)
    }

    async fn insert_subject(&self, subject: &Subject) -> Result<(), StoreError> {
        let s = subject.clone();
        let abbr = s.abbr.clone();
        self.conn
            .call(move |c| {
                c.execute(
                    "INSERT INTO subjects (abbr, code, name) VALUES (?1, ?2, ?3)",
                    rusqlite::params![s.abbr, s.code, s.name],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::AlreadyExists { kind: "subject", id: abbr }
                } else {
                    e.into()
                }
            })
    }

    async fn update_subject(&self, subject: &Subject) -> Result<(), StoreError> {
        let s = subject.clone();
        let abbr = s.abbr.clone();
        let changed = self
            .conn
            .call(move |c| {
                Ok(c.execute(
                    "UPDATE subjects SET code = ?2, name = ?3 WHERE abbr = ?1",
                    rusqlite::params![s.abbr, s.code, s.name],
                )?)
            })
            .await?;
        if changed == 0 {
            return Err(not_found("subject", &abbr));
        }
        Ok(())
    }

    async fn delete_subject(&self, abbr: &str) -> Result<(), StoreError> {
        let owned = abbr.to_string();
        let removed = self
            .conn
            .call(move |c| Ok(c.execute("DELETE FROM subjects WHERE abbr = ?1", [&owned])?))
            .await?;
        if removed == 0 {
            return Err(not_found("subject", abbr));
        }
        Ok(())
    }

    async fn list_attendance(&self, date_str: Option<&str>, limit: usize) -> Result<Vec<AttendanceRecord>, StoreError> {
        let date = date_str.map(str::to_string);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .conn
            .call(move |c| {
                let mut stmt = c.prepare(&format!(
                    "SELECT {ATTENDANCE_COLUMNS} FROM attendance
                     WHERE (?1 IS NULL OR date_str = ?1)
                     ORDER BY timestamp DESC LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![date, limit], attendance_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(into_record).collect()
    }

    async fn get_attendance(&self, id: &str) -> Result<Option<AttendanceRecord>, StoreError> {
        let id = id.to_string();
        let row = self
            .conn
            .call(move |c| {
                let row = c
                    .query_row(
                        &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?1"),
                        [&id],
                        attendance_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(into_record).transpose()
    }

    async fn find_attendance(
        &self,
        student_id: &str,
        subject: &str,
        date_str: &str,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let key = [student_id.to_string(), subject.to_string(), date_str.to_string()];
        let row = self
            .conn
            .call(move |c| {
                let row = c
                    .query_row(
                        &format!(
                            "SELECT {ATTENDANCE_COLUMNS} FROM attendance
                             WHERE student_id = ?1 AND subject = ?2 AND date_str = ?3"
                        ),
                        key,
                        attendance_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(into_record).transpose()
    }

    async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let r = record.clone();
        let timestamp = encode_time(&r.timestamp);
        self.conn
            .call(move |c| {
                c.execute(
                    &format!("INSERT INTO attendance ({ATTENDANCE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                    rusqlite::params![
                        r.id,
                        r.student_id,
                        r.student_name,
                        r.subject,
                        timestamp,
                        r.date_str,
                        r.status.as_str()
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateAttendance {
                        student_id: record.student_id.clone(),
                        subject: record.subject.clone(),
                        date_str: record.date_str.clone(),
                    }
                } else {
                    e.into()
                }
            })
    }

    async fn set_attendance_status(&self, id: &str, status: AttendanceStatus) -> Result<AttendanceRecord, StoreError> {
        let owned = id.to_string();
        let row = self
            .conn
            .call(move |c| {
                c.execute(
                    "UPDATE attendance SET status = ?2 WHERE id = ?1",
                    rusqlite::params![owned, status.as_str()],
                )?;
                let row = c
                    .query_row(
                        &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?1"),
                        [&owned],
                        attendance_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        let record = into_record(row.ok_or_else(|| not_found("attendance record", id))?)?;
        tracing::info!(id, status = %record.status, "attendance status overridden");
        Ok(record)
    }

    async fn get_admin(&self) -> Result<Option<AdminCredential>, StoreError> {
        let row = self
            .conn
            .call(|c| {
                let row = c
                    .query_row(
                        "SELECT password_digest, photo, descriptor FROM admin WHERE id = 'ADMIN'",
                        [],
                        |r| {
                            Ok((
                                r.get::<_, String>(0)?,
                                r.get::<_, Option<Vec<u8>>>(1)?,
                                r.get::<_, Option<String>>(2)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(|(password_digest, photo, descriptor)| {
            Ok(AdminCredential {
                password_digest,
                photo,
                descriptor: decode_descriptor(descriptor)?,
            })
        })
        .transpose()
    }

    async fn set_admin(&self, admin: &AdminCredential) -> Result<(), StoreError> {
        let digest = admin.password_digest.clone();
        let photo = admin.photo.clone();
        let descriptor = encode_descriptor(&admin.descriptor)?;
        self.conn
            .call(move |c| {
                c.execute(
                    "INSERT INTO admin (id, password_digest, photo, descriptor) VALUES ('ADMIN', ?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                        password_digest = excluded.password_digest,
                        photo = excluded.photo,
                        descriptor = excluded.descriptor",
                    rusqlite::params![digest, photo, descriptor],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{mark_present, toggle_attendance, MarkOutcome};
    use chrono::{Local, TimeZone};

    fn student(id: &str, name: &str) -> Student {
        Student {
            id: id.into(),
            name: name.into(),
            email: String::new(),
            department: "CSE".into(),
            photo: Some(vec![0xff, 0xd8, 0xff]),
            descriptor: Some(Descriptor::new(vec![0.1, 0.2, 0.3])),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_student_roundtrip_and_duplicate_id() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.insert_student(&student("CS-001", "Ada")).await.unwrap();

        let loaded = store.get_student("CS-001").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Ada");
        assert_eq!(loaded.descriptor.unwrap().values, vec![0.1, 0.2, 0.3]);
        assert_eq!(loaded.photo.as_deref(), Some(&[0xff, 0xd8, 0xff][..]));

        let err = store.insert_student(&student("CS-001", "Other")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { kind: "student", .. }));
    }

    #[tokio::test]
    async fn test_attendance_dedup_index() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let ada = student("CS-001", "Ada");
        store.insert_student(&ada).await.unwrap();
        let now = Local.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();

        let first = mark_present(&store, &ada, "TOC", now).await.unwrap();
        assert!(matches!(first, MarkOutcome::Recorded(_)));
        let second = mark_present(&store, &ada, "TOC", now).await.unwrap();
        assert!(second.is_duplicate());
        assert_eq!(second.record().id, first.record().id);

        let dup = AttendanceRecord {
            id: "other".into(),
            ..first.record().clone()
        };
        let err = store.insert_attendance(&dup).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateAttendance { .. }));

        // Different subject on the same day is a separate key.
        assert!(!mark_present(&store, &ada, "ML", now).await.unwrap().is_duplicate());
        assert_eq!(store.list_attendance(Some("2024-03-04"), 500).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_student_removes_attendance() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let ada = student("CS-001", "Ada");
        store.insert_student(&ada).await.unwrap();
        mark_present(&store, &ada, "TOC", Local::now()).await.unwrap();

        store.delete_student("CS-001").await.unwrap();
        assert!(store.list_attendance(None, 500).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_student("CS-001").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_attendance_newest_first_with_limit() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        for (i, id) in ["A", "B", "C"].iter().enumerate() {
            let s = student(id, id);
            let at = Local.with_ymd_and_hms(2024, 3, 4, 9 + i as u32, 0, 0).unwrap();
            mark_present(&store, &s, "TOC", at).await.unwrap();
        }
        let listed = store.list_attendance(None, 2).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B"]);
    }

    #[tokio::test]
    async fn test_toggle_status() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let ada = student("CS-001", "Ada");
        let id = mark_present(&store, &ada, "TOC", Local::now())
            .await
            .unwrap()
            .record()
            .id
            .clone();

        let toggled = toggle_attendance(&store, &id).await.unwrap();
        assert_eq!(toggled.status, AttendanceStatus::Absent);
        let back = toggle_attendance(&store, &id).await.unwrap();
        assert_eq!(back.status, AttendanceStatus::Present);
        let late = store.set_attendance_status(&id, AttendanceStatus::Late).await.unwrap();
        assert_eq!(late.status, AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn test_faculty_and_subjects() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let ka = Faculty {
            id: "KA".into(),
            name: "K. Andrews".into(),
            subjects: vec!["TOC".into(), "ML".into()],
            photo: None,
            descriptor: None,
        };
        store.insert_faculty(&ka).await.unwrap();
        assert_eq!(store.get_faculty("KA").await.unwrap().unwrap().subjects, ka.subjects);

        store.insert_subject(&Subject::new("TOC", "AD-501", "Theory of Computation")).await.unwrap();
        let err = store
            .insert_subject(&Subject::new("TOC", "AD-599", "Again"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { kind: "subject", .. }));
        store.delete_subject("TOC").await.unwrap();
        assert!(store.list_subjects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_upsert() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        assert!(store.get_admin().await.unwrap().is_none());
        for digest in ["aaa", "bbb"] {
            store
                .set_admin(&AdminCredential {
                    password_digest: digest.into(),
                    photo: None,
                    descriptor: Some(Descriptor::new(vec![1.0])),
                })
                .await
                .unwrap();
        }
        let admin = store.get_admin().await.unwrap().unwrap();
        assert_eq!(admin.password_digest, "bbb");
        assert!(admin.descriptor.is_some());
    }
}
