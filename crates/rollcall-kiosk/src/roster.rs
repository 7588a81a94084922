//! Enrollment and roster maintenance.
//!
//! Student enrollment is the strict path: the photo must contain a face and
//! that face must not already belong to someone else. Faculty enrollment
//! tolerates a missing or faceless photo; such faculty simply cannot log in
//! by face or pass exit verification without the configured fallback.

use crate::store::{Store, StoreError};
use chrono::Utc;
use image::RgbImage;
use rollcall_core::photo::{self, PhotoError};
use rollcall_core::{Descriptor, EngineError, EuclideanMatcher, FaceEngine, Faculty, Matcher, ReferenceSet, Student, Subject};
use thiserror::Error;

/// Default timetable, inserted by [`seed_subjects`].
pub const DEFAULT_SUBJECTS: [(&str, &str, &str); 8] = [
    ("TOC", "AD-501", "Theory of Computation"),
    ("ML", "AD-502", "Machine Learning"),
    ("IWT", "AD-503 (A)", "Internet & Web Tech"),
    ("GT", "AD-504 (B)", "Game Theory"),
    ("IWT LAB", "AD-505", "IWT Lab"),
    ("LINUX", "AD-506", "Linux Lab"),
    ("MP-I", "AD-508", "Minor Project-I"),
    ("APT", "APT", "Aptitude"),
];

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Student ID already exists")]
    DuplicateStudentId(String),
    #[error("Faculty ID already exists")]
    DuplicateFacultyId(String),
    #[error("Faculty ID {0} is reserved for the administrator")]
    ReservedFacultyId(String),
    #[error("Subject already exists")]
    DuplicateSubject(String),
    #[error("No face detected in photo. Please retake.")]
    NoFace,
    #[error("Face already registered as {0}")]
    DuplicateFace(String),
    #[error("photo: {0}")]
    Photo(#[from] PhotoError),
    #[error("face engine: {0}")]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EnrollError {
    /// The captured face itself is the problem, so the frame must be retaken.
    pub fn requires_new_capture(&self) -> bool {
        matches!(self, EnrollError::NoFace | EnrollError::DuplicateFace(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub id: String,
    pub name: String,
    pub email: String,
    pub department: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewFaculty {
    pub id: String,
    pub name: String,
    pub subjects: Vec<String>,
}

fn required(value: &str, field: &'static str) -> Result<String, EnrollError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EnrollError::Missing(field));
    }
    Ok(trimmed.to_string())
}

/// Descriptor of the most confident face in `image`, or `None` if there is none.
pub async fn face_descriptor<E: FaceEngine>(engine: &E, image: &RgbImage) -> Result<Option<Descriptor>, EngineError> {
    let faces = engine.detect(image).await?;
    match faces.first() {
        Some(face) => Ok(Some(engine.descriptor(image, face).await?)),
        None => Ok(None),
    }
}

/// Descriptor from a stored JPEG, used when a record predates descriptor storage.
pub async fn descriptor_from_photo<E: FaceEngine>(engine: &E, jpeg: &[u8]) -> Result<Option<Descriptor>, EnrollError> {
    let image = photo::decode(jpeg)?;
    Ok(face_descriptor(engine, &image).await?)
}

/// Reject `descriptor` if it lies within `threshold` of an enrolled student
/// other than `except`.
async fn ensure_unique_face<S: Store>(
    store: &S,
    descriptor: &Descriptor,
    threshold: f32,
    except: Option<&str>,
) -> Result<(), EnrollError> {
    let students = store.list_students().await?;
    let gallery: ReferenceSet = students
        .iter()
        .filter(|s| Some(s.id.as_str()) != except)
        .filter_map(|s| s.descriptor.clone().map(|d| (s.id.clone(), d)))
        .collect();

    if let Some(key) = EuclideanMatcher::new().find(descriptor, &gallery, threshold).key() {
        let name = students
            .iter()
            .find(|s| s.id == key)
            .map_or_else(|| key.to_string(), |s| s.name.clone());
        tracing::info!(existing = key, "enrollment rejected: face already registered");
        return Err(EnrollError::DuplicateFace(name));
    }
    Ok(())
}

/// Enroll a student from a captured photo.
pub async fn enroll_student<E: FaceEngine, S: Store>(
    engine: &E,
    store: &S,
    new: NewStudent,
    image: &RgbImage,
    duplicate_threshold: f32,
) -> Result<Student, EnrollError> {
    let id = required(&new.id, "Student ID")?;
    let name = required(&new.name, "Name")?;

    if store.get_student(&id).await?.is_some() {
        return Err(EnrollError::DuplicateStudentId(id));
    }

    let descriptor = face_descriptor(engine, image).await?.ok_or(EnrollError::NoFace)?;
    ensure_unique_face(store, &descriptor, duplicate_threshold, None).await?;

    let student = Student {
        id,
        name,
        email: new.email.trim().to_string(),
        department: new.department.trim().to_string(),
        photo: Some(photo::encode_jpeg(image)?),
        descriptor: Some(descriptor),
        created_at: Utc::now(),
    };

    store.insert_student(&student).await.map_err(|e| match e {
        StoreError::AlreadyExists { id, .. } => EnrollError::DuplicateStudentId(id),
        other => other.into(),
    })?;

    tracing::info!(student = %student.id, name = %student.name, "student enrolled");
    Ok(student)
}

/// Replace a student's reference photo and descriptor.
pub async fn replace_student_photo<E: FaceEngine, S: Store>(
    engine: &E,
    store: &S,
    id: &str,
    image: &RgbImage,
    duplicate_threshold: f32,
) -> Result<Student, EnrollError> {
    let mut student = store.get_student(id).await?.ok_or_else(|| StoreError::NotFound {
        kind: "student",
        id: id.to_string(),
    })?;

    let descriptor = face_descriptor(engine, image).await?.ok_or(EnrollError::NoFace)?;
    ensure_unique_face(store, &descriptor, duplicate_threshold, Some(id)).await?;

    student.photo = Some(photo::encode_jpeg(image)?);
    student.descriptor = Some(descriptor);
    store.update_student(&student).await?;
    tracing::info!(student = %student.id, "student photo replaced");
    Ok(student)
}

/// Enroll a faculty member. The photo is optional and may lack a usable face.
pub async fn enroll_faculty<E: FaceEngine, S: Store>(
    engine: &E,
    store: &S,
    new: NewFaculty,
    image: Option<&RgbImage>,
) -> Result<Faculty, EnrollError> {
    let id = required(&new.id, "Faculty ID")?;
    let name = required(&new.name, "Name")?;
    // The admin identity teaches every subject; it is only reachable through
    // the password-checked admin login.
    if id.eq_ignore_ascii_case(Faculty::ADMIN_ID) {
        return Err(EnrollError::ReservedFacultyId(id));
    }

    if store.get_faculty(&id).await?.is_some() {
        return Err(EnrollError::DuplicateFacultyId(id));
    }

    let (photo, descriptor) = match image {
        Some(img) => {
            let descriptor = match face_descriptor(engine, img).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(faculty = %id, error = %e, "faculty photo unusable; enrolling without descriptor");
                    None
                }
            };
            if descriptor.is_none() {
                tracing::warn!(faculty = %id, "no face in faculty photo");
            }
            (Some(photo::encode_jpeg(img)?), descriptor)
        }
        None => (None, None),
    };

    let faculty = Faculty {
        id,
        name,
        subjects: new
            .subjects
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        photo,
        descriptor,
    };

    store.insert_faculty(&faculty).await.map_err(|e| match e {
        StoreError::AlreadyExists { id, .. } => EnrollError::DuplicateFacultyId(id),
        other => other.into(),
    })?;

    tracing::info!(faculty = %faculty.id, subjects = ?faculty.subjects, "faculty enrolled");
    Ok(faculty)
}

pub async fn add_subject<S: Store>(store: &S, subject: Subject) -> Result<(), EnrollError> {
    let subject = Subject {
        abbr: required(&subject.abbr, "Abbreviation")?,
        code: required(&subject.code, "Code")?,
        name: required(&subject.name, "Name")?,
    };
    store.insert_subject(&subject).await.map_err(|e| match e {
        StoreError::AlreadyExists { id, .. } => EnrollError::DuplicateSubject(id),
        other => other.into(),
    })
}

/// Insert any [`DEFAULT_SUBJECTS`] that are missing. Returns how many were added.
pub async fn seed_subjects<S: Store>(store: &S) -> Result<usize, StoreError> {
    let existing = store.list_subjects().await?;
    let mut added = 0;
    for (abbr, code, name) in DEFAULT_SUBJECTS {
        if existing.iter().any(|s| s.abbr == abbr) {
            continue;
        }
        store.insert_subject(&Subject::new(abbr, code, name)).await?;
        added += 1;
    }
    tracing::info!(added, "subjects seeded");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use rollcall_core::BoundingBox;

    /// Red channel is the descriptor; a black pixel at (0, 0) means no face.
    struct ColorEngine;

    impl FaceEngine for ColorEngine {
        async fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError> {
            if image.get_pixel(0, 0)[0] == 0 {
                return Ok(vec![]);
            }
            Ok(vec![BoundingBox::new(0.0, 0.0, 200.0, 200.0, 0.95)])
        }

        async fn descriptor(&self, image: &RgbImage, _face: &BoundingBox) -> Result<Descriptor, EngineError> {
            Ok(Descriptor::new(vec![image.get_pixel(0, 0)[0] as f32 / 255.0]))
        }
    }

    fn photo(red: u8) -> RgbImage {
        RgbImage::from_pixel(8, 8, image::Rgb([red, 100, 100]))
    }

    fn ada() -> NewStudent {
        NewStudent {
            id: "CS-001".into(),
            name: "Ada".into(),
            department: "CSE".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_enroll_student() {
        let store = MemoryStore::new();
        let s = enroll_student(&ColorEngine, &store, ada(), &photo(200), 0.4).await.unwrap();
        assert!(s.photo.is_some());
        assert!(s.descriptor.is_some());
        assert!(store.get_student("CS-001").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_id() {
        let store = MemoryStore::new();
        enroll_student(&ColorEngine, &store, ada(), &photo(200), 0.4).await.unwrap();
        let err = enroll_student(&ColorEngine, &store, ada(), &photo(20), 0.4).await.unwrap_err();
        assert_eq!(err.to_string(), "Student ID already exists");
        assert!(!err.requires_new_capture());
    }

    #[tokio::test]
    async fn test_no_face() {
        let store = MemoryStore::new();
        let err = enroll_student(&ColorEngine, &store, ada(), &photo(0), 0.4).await.unwrap_err();
        assert_eq!(err.to_string(), "No face detected in photo. Please retake.");
        assert!(store.list_students().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_face() {
        let store = MemoryStore::new();
        enroll_student(&ColorEngine, &store, ada(), &photo(200), 0.4).await.unwrap();
        let grace = NewStudent {
            id: "CS-002".into(),
            name: "Grace".into(),
            ..Default::default()
        };
        let err = enroll_student(&ColorEngine, &store, grace, &photo(201), 0.4).await.unwrap_err();
        assert_eq!(err.to_string(), "Face already registered as Ada");
        assert!(err.requires_new_capture());
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let store = MemoryStore::new();
        let blank = NewStudent {
            id: "  ".into(),
            name: "Ada".into(),
            ..Default::default()
        };
        let err = enroll_student(&ColorEngine, &store, blank, &photo(200), 0.4).await.unwrap_err();
        assert!(matches!(err, EnrollError::Missing("Student ID")));
    }

    #[tokio::test]
    async fn test_replace_photo_ignores_own_face() {
        let store = MemoryStore::new();
        enroll_student(&ColorEngine, &store, ada(), &photo(200), 0.4).await.unwrap();
        let s = replace_student_photo(&ColorEngine, &store, "CS-001", &photo(202), 0.4)
            .await
            .unwrap();
        assert!((s.descriptor.unwrap().values[0] - 202.0 / 255.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_faculty_without_face() {
        let store = MemoryStore::new();
        let new = NewFaculty {
            id: "KA".into(),
            name: "K. Andrews".into(),
            subjects: vec!["TOC".into(), " ".into()],
        };
        let f = enroll_faculty(&ColorEngine, &store, new.clone(), Some(&photo(0))).await.unwrap();
        assert!(f.photo.is_some());
        assert!(f.descriptor.is_none());
        assert_eq!(f.subjects, vec!["TOC".to_string()]);

        let err = enroll_faculty(&ColorEngine, &store, new, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Faculty ID already exists");
    }

    #[tokio::test]
    async fn test_faculty_admin_id_reserved() {
        let store = MemoryStore::new();
        for id in ["ADMIN", " admin "] {
            let new = NewFaculty {
                id: id.into(),
                name: "Mallory".into(),
                subjects: vec![],
            };
            let err = enroll_faculty(&ColorEngine, &store, new, Some(&photo(90))).await.unwrap_err();
            assert!(matches!(err, EnrollError::ReservedFacultyId(_)));
        }
        assert!(store.list_faculty().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subjects() {
        let store = MemoryStore::new();
        assert_eq!(seed_subjects(&store).await.unwrap(), 8);
        assert_eq!(seed_subjects(&store).await.unwrap(), 0);
        let err = add_subject(&store, Subject::new("TOC", "X", "Y")).await.unwrap_err();
        assert_eq!(err.to_string(), "Subject already exists");
    }
}
