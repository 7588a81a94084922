//! In-memory [`Store`] for tests and local demos.

use crate::store::{AdminCredential, Store, StoreError};
use rollcall_core::{AttendanceRecord, AttendanceStatus, Faculty, Student, Subject};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    students: BTreeMap<String, Student>,
    faculty: BTreeMap<String, Faculty>,
    subjects: BTreeMap<String, Subject>,
    attendance: Vec<AttendanceRecord>,
    admin: Option<AdminCredential>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn insert_unique<T: Clone>(
    map: &mut BTreeMap<String, T>,
    kind: &'static str,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    if map.contains_key(key) {
        return Err(StoreError::AlreadyExists {
            kind,
            id: key.to_string(),
        });
    }
    map.insert(key.to_string(), value.clone());
    Ok(())
}

fn replace_existing<T: Clone>(
    map: &mut BTreeMap<String, T>,
    kind: &'static str,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    match map.get_mut(key) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(StoreError::NotFound {
            kind,
            id: key.to_string(),
        }),
    }
}

fn remove_existing<T>(map: &mut BTreeMap<String, T>, kind: &'static str, key: &str) -> Result<T, StoreError> {
    map.remove(key).ok_or_else(|| StoreError::NotFound {
        kind,
        id: key.to_string(),
    })
}

impl Store for MemoryStore {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        Ok(self.lock().students.values().cloned().collect())
    }

    async fn get_student(&self, id: &str) -> Result<Option<Student>, StoreError> {
        Ok(self.lock().students.get(id).cloned())
    }

    async fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        insert_unique(&mut self.lock().students, "student", &student.id, student)
    }

    async fn update_student(&self, student: &Student) -> Result<(), StoreError> {
        replace_existing(&mut self.lock().students, "student", &student.id, student)
    }

    async fn delete_student(&self, id: &str) -> Result<(), StoreError> {
        let mut tables = self.lock();
        remove_existing(&mut tables.students, "student", id)?;
        tables.attendance.retain(|r| r.student_id != id);
        Ok(())
    }

    async fn list_faculty(&self) -> Result<Vec<Faculty>, StoreError> {
        Ok(self.lock().faculty.values().cloned().collect())
    }

    async fn get_faculty(&self, id: &str) -> Result<Option<Faculty>, StoreError> {
        Ok(self.lock().faculty.get(id).cloned())
    }

    async fn insert_faculty(&self, faculty: &Faculty) -> Result<(), StoreError> {
        insert_unique(&mut self.lock().faculty, "faculty", &faculty.id, faculty)
    }

    async fn update_faculty(&self, faculty: &Faculty) -> Result<(), StoreError> {
        replace_existing(&mut self.lock().faculty, "faculty", &faculty.id, faculty)
    }

    async fn delete_faculty(&self, id: &str) -> Result<(), StoreError> {
        remove_existing(&mut self.lock().faculty, "faculty", id).map(|_| ())
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let mut subjects: Vec<_> = self.lock().subjects.values().cloned().collect();
        subjects.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(subjects)
    }

    async fn insert_subject(&self, subject: &Subject) -> Result<(), StoreError> {
        insert_unique(&mut self.lock().subjects, "subject", &subject.abbr, subject)
    }

    async fn update_subject(&self, subject: &Subject) -> Result<(), StoreError> {
        replace_existing(&mut self.lock().subjects, "subject", &subject.abbr, subject)
    }

    async fn delete_subject(&self, abbr: &str) -> Result<(), StoreError> {
        remove_existing(&mut self.lock().subjects, "subject", abbr).map(|_| ())
    }

    async fn list_attendance(&self, date_str: Option<&str>, limit: usize) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut records: Vec<_> = self
            .lock()
            .attendance
            .iter()
            .filter(|r| date_str.map_or(true, |d| r.date_str == d))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    async fn get_attendance(&self, id: &str) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.lock().attendance.iter().find(|r| r.id == id).cloned())
    }

    async fn find_attendance(
        &self,
        student_id: &str,
        subject: &str,
        date_str: &str,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self
            .lock()
            .attendance
            .iter()
            .find(|r| r.dedup_key() == (student_id, subject, date_str))
            .cloned())
    }

    async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if tables.attendance.iter().any(|r| r.dedup_key() == record.dedup_key()) {
            return Err(StoreError::DuplicateAttendance {
                student_id: record.student_id.clone(),
                subject: record.subject.clone(),
                date_str: record.date_str.clone(),
            });
        }
        tables.attendance.push(record.clone());
        Ok(())
    }

    async fn set_attendance_status(&self, id: &str, status: AttendanceStatus) -> Result<AttendanceRecord, StoreError> {
        let mut tables = self.lock();
        let record = tables
            .attendance
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "attendance record",
                id: id.to_string(),
            })?;
        record.status = status;
        Ok(record.clone())
    }

    async fn get_admin(&self) -> Result<Option<AdminCredential>, StoreError> {
        Ok(self.lock().admin.clone())
    }

    async fn set_admin(&self, admin: &AdminCredential) -> Result<(), StoreError> {
        self.lock().admin = Some(admin.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{mark_present, toggle_attendance};
    use chrono::{Local, TimeZone, Utc};

    fn student(id: &str) -> Student {
        Student {
            id: id.into(),
            name: format!("Student {id}"),
            email: String::new(),
            department: "CSE".into(),
            photo: None,
            descriptor: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_mark_present_is_idempotent_per_day() {
        let store = MemoryStore::new();
        let s = student("CS-001");
        let morning = Local.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let evening = Local.with_ymd_and_hms(2024, 3, 4, 17, 0, 0).unwrap();
        let tomorrow = Local.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();

        assert!(!mark_present(&store, &s, "TOC", morning).await.unwrap().is_duplicate());
        assert!(mark_present(&store, &s, "TOC", evening).await.unwrap().is_duplicate());
        assert!(!mark_present(&store, &s, "TOC", tomorrow).await.unwrap().is_duplicate());
        assert_eq!(store.list_attendance(None, 500).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_student_cascades() {
        let store = MemoryStore::new();
        let s = student("CS-001");
        store.insert_student(&s).await.unwrap();
        mark_present(&store, &s, "TOC", Local::now()).await.unwrap();
        store.delete_student("CS-001").await.unwrap();
        assert!(store.list_attendance(None, 500).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_missing_record() {
        let store = MemoryStore::new();
        let err = toggle_attendance(&store, "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let store = MemoryStore::new();
        let err = store.update_student(&student("X")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "student", .. }));
    }
}
