//! Attendance records and end-of-session statistics.

use crate::types::Student;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Late => "LATE",
            AttendanceStatus::Absent => "ABSENT",
        }
    }

    /// Manual override toggle: PRESENT becomes ABSENT, anything else PRESENT.
    pub fn toggled(self) -> Self {
        match self {
            AttendanceStatus::Present => AttendanceStatus::Absent,
            _ => AttendanceStatus::Present,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PRESENT" => Ok(AttendanceStatus::Present),
            "LATE" => Ok(AttendanceStatus::Late),
            "ABSENT" => Ok(AttendanceStatus::Absent),
            other => Err(format!("unknown attendance status: {other}")),
        }
    }
}

/// One persisted attendance mark.
///
/// At most one record exists per dedup key `(student_id, subject, date_str)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    /// Local calendar date, `YYYY-MM-DD`.
    pub date_str: String,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    pub fn dedup_key(&self) -> (&str, &str, &str) {
        (&self.student_id, &self.subject, &self.date_str)
    }
}

/// Local calendar date string used in dedup keys.
pub fn date_str(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Summary handed off when a kiosk session closes.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub subject: String,
    pub total_students: usize,
    pub present_count: usize,
    pub present_students: Vec<Student>,
    pub absent_students: Vec<Student>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl SessionStats {
    /// Diff the roster fetched at close time against the ids marked during
    /// the session.
    ///
    /// `present = roster ∩ marked` and `absent = roster \ marked`. Ids in
    /// `marked` that are not on the roster are ignored, so the counts always
    /// add up to the roster size.
    pub fn compute(
        subject: &str,
        roster: Vec<Student>,
        marked: &HashSet<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let total_students = roster.len();
        let (present_students, absent_students): (Vec<_>, Vec<_>) =
            roster.into_iter().partition(|s| marked.contains(&s.id));

        Self {
            subject: subject.to_string(),
            total_students,
            present_count: present_students.len(),
            present_students,
            absent_students,
            start_time,
            end_time,
        }
    }

    pub fn absent_count(&self) -> usize {
        self.absent_students.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

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

    #[test]
    fn test_stats_partition_roster() {
        let roster = vec![student("A"), student("B"), student("C")];
        let marked: HashSet<String> = ["A", "C"].iter().map(|s| s.to_string()).collect();
        let now = Utc::now();

        let stats = SessionStats::compute("TOC", roster, &marked, now, now);
        assert_eq!(stats.total_students, 3);
        assert_eq!(stats.present_count, 2);
        assert_eq!(stats.absent_count(), 1);
        assert_eq!(stats.absent_students[0].id, "B");
    }

    #[test]
    fn test_stats_ignore_marks_missing_from_roster() {
        // "GHOST" was marked but deleted before close.
        let roster = vec![student("A"), student("B")];
        let marked: HashSet<String> = ["A", "GHOST"].iter().map(|s| s.to_string()).collect();
        let now = Utc::now();

        let stats = SessionStats::compute("ML", roster, &marked, now, now);
        assert_eq!(stats.present_count + stats.absent_count(), stats.total_students);
        assert_eq!(stats.present_count, 1);
    }

    #[test]
    fn test_stats_include_mid_session_enrollment() {
        let roster = vec![student("A"), student("NEW")];
        let marked: HashSet<String> = ["NEW"].iter().map(|s| s.to_string()).collect();
        let now = Utc::now();

        let stats = SessionStats::compute("ML", roster, &marked, now, now);
        assert_eq!(stats.present_students[0].id, "NEW");
        assert_eq!(stats.present_count + stats.absent_count(), 2);
    }

    #[test]
    fn test_status_toggle_and_parse() {
        assert_eq!(AttendanceStatus::Present.toggled(), AttendanceStatus::Absent);
        assert_eq!(AttendanceStatus::Late.toggled(), AttendanceStatus::Present);
        assert_eq!("late".parse::<AttendanceStatus>(), Ok(AttendanceStatus::Late));
        assert!("maybe".parse::<AttendanceStatus>().is_err());
    }

    #[test]
    fn test_date_str_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 10, 30, 0).unwrap();
        assert_eq!(date_str(at), "2024-03-07");
    }
}
