//! Identification service: who is in this frame, and are they already marked?
//!
//! Both identifiers record attendance idempotently on a match, so the kiosk
//! state machine only has to interpret the returned [`Identification`].

use crate::store::{mark_present, Store, StoreError};
use chrono::Local;
use image::RgbImage;
use rand::seq::SliceRandom;
use rollcall_core::{EuclideanMatcher, FaceEngine, MatchResult, Matcher, ReferenceSet, Student};
use std::fmt;

/// Why no student was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No face in the frame. Transient.
    NoFace,
    /// The engine could not process the frame. Transient.
    BadImage,
    /// Nobody is enrolled yet.
    NoStudents,
    /// A face is present but matches no enrolled student.
    UnknownFace,
}

impl RejectReason {
    /// Transient perception failures; the kiosk just keeps scanning.
    pub fn is_transient(self) -> bool {
        matches!(self, RejectReason::NoFace | RejectReason::BadImage)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectReason::NoFace => "no face detected",
            RejectReason::BadImage => "image could not be processed",
            RejectReason::NoStudents => "no students registered",
            RejectReason::UnknownFace => "face not recognized",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Identification {
    Matched {
        student: Student,
        /// `None` when the identifier did not compare descriptors.
        distance: Option<f32>,
        already_marked: bool,
    },
    Rejected(RejectReason),
}

#[allow(async_fn_in_trait)]
pub trait Identify {
    async fn identify(&self, image: &RgbImage, subject: &str) -> Result<Identification, StoreError>;
}

/// Matches against every enrolled student descriptor.
pub struct GalleryIdentifier<'a, E, S> {
    engine: &'a E,
    store: &'a S,
    threshold: f32,
    matcher: EuclideanMatcher,
}

impl<'a, E: FaceEngine, S: Store> GalleryIdentifier<'a, E, S> {
    pub fn new(engine: &'a E, store: &'a S, threshold: f32) -> Self {
        Self {
            engine,
            store,
            threshold,
            matcher: EuclideanMatcher::new(),
        }
    }
}

impl<E: FaceEngine, S: Store> Identify for GalleryIdentifier<'_, E, S> {
    async fn identify(&self, image: &RgbImage, subject: &str) -> Result<Identification, StoreError> {
        let faces = match self.engine.detect(image).await {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, "identify: detection failed");
                return Ok(Identification::Rejected(RejectReason::BadImage));
            }
        };
        let Some(face) = faces.first() else {
            return Ok(Identification::Rejected(RejectReason::NoFace));
        };
        let probe = match self.engine.descriptor(image, face).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "identify: descriptor extraction failed");
                return Ok(Identification::Rejected(RejectReason::BadImage));
            }
        };

        let students = self.store.list_students().await?;
        let gallery: ReferenceSet = students
            .iter()
            .filter_map(|s| s.descriptor.clone().map(|d| (s.id.clone(), d)))
            .collect();
        if gallery.is_empty() {
            return Ok(Identification::Rejected(RejectReason::NoStudents));
        }

        let (key, distance) = match self.matcher.find(&probe, &gallery, self.threshold) {
            MatchResult::Match { key, distance } => (key, distance),
            other => {
                tracing::debug!(best = ?other.distance(), threshold = self.threshold, "identify: no match");
                return Ok(Identification::Rejected(RejectReason::UnknownFace));
            }
        };
        let Some(student) = students.into_iter().find(|s| s.id == key) else {
            return Ok(Identification::Rejected(RejectReason::UnknownFace));
        };

        let outcome = mark_present(self.store, &student, subject, Local::now()).await?;
        tracing::info!(
            student = %student.id,
            distance,
            already_marked = outcome.is_duplicate(),
            "identify: matched"
        );
        Ok(Identification::Matched {
            student,
            distance: Some(distance),
            already_marked: outcome.is_duplicate(),
        })
    }
}

/// Demonstration identifier: any detected face is attributed to a random
/// enrolled student. Never use where attendance matters.
pub struct DemoIdentifier<'a, E, S> {
    engine: &'a E,
    store: &'a S,
}

impl<'a, E: FaceEngine, S: Store> DemoIdentifier<'a, E, S> {
    pub fn new(engine: &'a E, store: &'a S) -> Self {
        tracing::warn!("demo identifier active: faces are attributed to random students");
        Self { engine, store }
    }
}

impl<E: FaceEngine, S: Store> Identify for DemoIdentifier<'_, E, S> {
    async fn identify(&self, image: &RgbImage, subject: &str) -> Result<Identification, StoreError> {
        match self.engine.detect(image).await {
            Ok(faces) if faces.is_empty() => return Ok(Identification::Rejected(RejectReason::NoFace)),
            Ok(_) => {}
            Err(_) => return Ok(Identification::Rejected(RejectReason::BadImage)),
        }

        let students = self.store.list_students().await?;
        let Some(student) = students.choose(&mut rand::thread_rng()).cloned() else {
            return Ok(Identification::Rejected(RejectReason::NoStudents));
        };

        let outcome = mark_present(self.store, &student, subject, Local::now()).await?;
        Ok(Identification::Matched {
            student,
            distance: None,
            already_marked: outcome.is_duplicate(),
        })
    }
}

/// Either identifier, chosen at startup from configuration.
pub enum AnyIdentifier<'a, E, S> {
    Gallery(GalleryIdentifier<'a, E, S>),
    Demo(DemoIdentifier<'a, E, S>),
}

impl<E: FaceEngine, S: Store> Identify for AnyIdentifier<'_, E, S> {
    async fn identify(&self, image: &RgbImage, subject: &str) -> Result<Identification, StoreError> {
        match self {
            AnyIdentifier::Gallery(g) => g.identify(image, subject).await,
            AnyIdentifier::Demo(d) => d.identify(image, subject).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::Utc;
    use rollcall_core::{BoundingBox, Descriptor, EngineError};

    /// Red channel is the descriptor; red == 0 means no face.
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

    fn frame(red: u8) -> RgbImage {
        RgbImage::from_pixel(8, 8, image::Rgb([red, 90, 90]))
    }

    async fn enrolled(store: &MemoryStore, id: &str, red: u8) {
        store
            .insert_student(&Student {
                id: id.into(),
                name: id.into(),
                email: String::new(),
                department: "CSE".into(),
                photo: None,
                descriptor: Some(Descriptor::new(vec![red as f32 / 255.0])),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_gallery_match_then_duplicate() {
        let store = MemoryStore::new();
        enrolled(&store, "CS-001", 200).await;
        enrolled(&store, "CS-002", 50).await;
        let id = GalleryIdentifier::new(&ColorEngine, &store, 0.5);

        let first = id.identify(&frame(205), "TOC").await.unwrap();
        assert!(matches!(
            &first,
            Identification::Matched { student, already_marked: false, .. } if student.id == "CS-001"
        ));
        let second = id.identify(&frame(205), "TOC").await.unwrap();
        assert!(matches!(second, Identification::Matched { already_marked: true, .. }));
        assert_eq!(store.list_attendance(None, 500).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gallery_rejections() {
        let store = MemoryStore::new();
        let id = GalleryIdentifier::new(&ColorEngine, &store, 0.1);
        assert_eq!(
            id.identify(&frame(0), "TOC").await.unwrap(),
            Identification::Rejected(RejectReason::NoFace)
        );
        assert_eq!(
            id.identify(&frame(100), "TOC").await.unwrap(),
            Identification::Rejected(RejectReason::NoStudents)
        );
        enrolled(&store, "CS-001", 250).await;
        assert_eq!(
            id.identify(&frame(10), "TOC").await.unwrap(),
            Identification::Rejected(RejectReason::UnknownFace)
        );
        assert!(store.list_attendance(None, 500).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_demo_picks_enrolled_student() {
        let store = MemoryStore::new();
        let demo = DemoIdentifier::new(&ColorEngine, &store);
        assert_eq!(
            demo.identify(&frame(100), "ML").await.unwrap(),
            Identification::Rejected(RejectReason::NoStudents)
        );
        enrolled(&store, "CS-009", 1).await;
        let got = demo.identify(&frame(100), "ML").await.unwrap();
        assert!(matches!(got, Identification::Matched { student, distance: None, .. } if student.id == "CS-009"));
    }

    #[test]
    fn test_transient_reasons() {
        assert!(RejectReason::NoFace.is_transient());
        assert!(RejectReason::BadImage.is_transient());
        assert!(!RejectReason::UnknownFace.is_transient());
        assert!(!RejectReason::NoStudents.is_transient());
    }
}
