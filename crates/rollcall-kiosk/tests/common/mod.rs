#![allow(dead_code)]

use chrono::Utc;
use image::{Rgb, RgbImage};
use rollcall_core::{
    AttendanceRecord, AttendanceStatus, BoundingBox, Descriptor, EngineError, FaceEngine, FaceSample, Faculty,
    SessionStats, Student, Subject,
};
use rollcall_hw::{Camera, CameraError, Frame, VideoStream};
use rollcall_kiosk::{
    AdminCredential, ExitFallback, ExitPolicy, MemoryStore, Outcome, SessionEvents, SessionSettings, Store, StoreError,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

pub const POLL: Duration = Duration::from_millis(1);

/// Tight match thresholds for one-dimensional test descriptors.
pub fn settings(fallback: ExitFallback) -> SessionSettings {
    SessionSettings {
        live_poll: POLL,
        display: Duration::from_secs(3),
        duplicate_face_threshold: 0.3,
        exit: ExitPolicy {
            threshold: 0.1,
            fallback,
            poll: POLL,
        },
    }
}

/// What the fake camera currently sees, plus a log of stream handovers.
#[derive(Default)]
pub struct Scene {
    pub frame: Option<RgbImage>,
    pub log: Vec<String>,
    pub live: usize,
    pub max_live: usize,
    next_id: usize,
}

#[derive(Clone, Default)]
pub struct Rig(Rc<RefCell<Scene>>);

impl Rig {
    pub fn new(frame: RgbImage) -> Self {
        let rig = Self::default();
        rig.show(frame);
        rig
    }

    pub fn show(&self, frame: RgbImage) {
        self.0.borrow_mut().frame = Some(frame);
    }

    pub fn log(&self) -> Vec<String> {
        self.0.borrow().log.clone()
    }

    pub fn max_live(&self) -> usize {
        self.0.borrow().max_live
    }

    pub fn live(&self) -> usize {
        self.0.borrow().live
    }

    pub fn camera(&self) -> FakeCamera {
        FakeCamera { rig: self.clone() }
    }
}

pub struct FakeCamera {
    rig: Rig,
}

pub struct FakeStream {
    id: usize,
    sequence: u32,
    rig: Rig,
}

impl VideoStream for FakeStream {
    fn is_live(&self) -> bool {
        true
    }

    fn grab(&mut self) -> Result<Frame, CameraError> {
        self.sequence += 1;
        let scene = self.rig.0.borrow();
        let image = scene.frame.clone().ok_or(CameraError::NotStreaming)?;
        Ok(Frame::new(image, self.sequence))
    }
}

impl Camera for FakeCamera {
    type Stream = FakeStream;

    fn acquire(&mut self) -> Result<FakeStream, CameraError> {
        let mut scene = self.rig.0.borrow_mut();
        scene.next_id += 1;
        scene.live += 1;
        scene.max_live = scene.max_live.max(scene.live);
        let id = scene.next_id;
        scene.log.push(format!("acquire#{id}"));
        Ok(FakeStream {
            id,
            sequence: 0,
            rig: self.rig.clone(),
        })
    }

    fn release(&mut self, stream: FakeStream) {
        let mut scene = self.rig.0.borrow_mut();
        scene.live -= 1;
        scene.log.push(format!("release#{}", stream.id));
    }
}

/// Red channel is the descriptor, blue channel the number of faces.
/// Green 0 makes detection fail, green 1 makes descriptor extraction fail.
pub struct ColorEngine;

impl FaceEngine for ColorEngine {
    async fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError> {
        let px = image.get_pixel(0, 0);
        if px[1] == 0 {
            return Err(EngineError::Detection("sensor glitch".into()));
        }
        Ok(vec![BoundingBox::new(10.0, 10.0, 200.0, 200.0, 0.95); px[2] as usize])
    }

    async fn descriptor(&self, image: &RgbImage, _face: &BoundingBox) -> Result<Descriptor, EngineError> {
        let px = image.get_pixel(0, 0);
        if px[1] == 1 {
            return Err(EngineError::Descriptor("face too blurred".into()));
        }
        Ok(descriptor(px[0]))
    }
}

pub fn descriptor(red: u8) -> Descriptor {
    Descriptor::new(vec![red as f32 / 255.0])
}

/// One face whose descriptor is `red`.
pub fn face(red: u8) -> RgbImage {
    RgbImage::from_pixel(8, 8, Rgb([red, 120, 1]))
}

pub fn no_face() -> RgbImage {
    RgbImage::from_pixel(8, 8, Rgb([200, 120, 0]))
}

pub fn crowd() -> RgbImage {
    RgbImage::from_pixel(8, 8, Rgb([200, 120, 2]))
}

/// A frame the engine cannot run detection on.
pub fn broken() -> RgbImage {
    RgbImage::from_pixel(8, 8, Rgb([200, 0, 1]))
}

/// One detectable face that yields no descriptor.
pub fn smeared() -> RgbImage {
    RgbImage::from_pixel(8, 8, Rgb([200, 1, 1]))
}

pub const OWNER_RED: u8 = 200;
pub const ADA_RED: u8 = 60;

pub fn owner() -> Faculty {
    Faculty {
        id: "KA".into(),
        name: "K. Anand".into(),
        subjects: vec!["TOC".into(), "ML".into()],
        photo: None,
        descriptor: Some(descriptor(OWNER_RED)),
    }
}

pub fn student(id: &str, name: &str, red: u8) -> Student {
    Student {
        id: id.into(),
        name: name.into(),
        email: String::new(),
        department: "CSE".into(),
        photo: None,
        descriptor: Some(descriptor(red)),
        created_at: Utc::now(),
    }
}

/// Records every callback.
#[derive(Default)]
pub struct Recorder {
    pub outcomes: Vec<Outcome>,
    pub registrations: usize,
    pub closed: Vec<SessionStats>,
    pub exit_progress: Vec<(u8, Option<String>)>,
}

impl SessionEvents for Recorder {
    fn on_identified(&mut self, outcome: &Outcome) {
        self.outcomes.push(outcome.clone());
    }

    fn on_registration_required(&mut self, _sample: &FaceSample) {
        self.registrations += 1;
    }

    fn on_session_closed(&mut self, stats: &SessionStats) {
        self.closed.push(stats.clone());
    }

    fn on_exit_progress(&mut self, progress: u8, reason: Option<&str>) {
        self.exit_progress.push((progress, reason.map(str::to_string)));
    }
}

/// [`MemoryStore`] whose student and attendance reads can be made to fail.
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Cell<bool>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: Cell::new(false),
        }
    }

    pub fn fail_reads(&self, failing: bool) {
        self.failing.set(failing);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.get() {
            return Err(StoreError::Io(std::io::Error::other("disk unavailable")));
        }
        Ok(())
    }
}

impl Store for FlakyStore {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        self.check()?;
        self.inner.list_students().await
    }

    async fn get_student(&self, id: &str) -> Result<Option<Student>, StoreError> {
        self.check()?;
        self.inner.get_student(id).await
    }

    async fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        self.inner.insert_student(student).await
    }

    async fn update_student(&self, student: &Student) -> Result<(), StoreError> {
        self.inner.update_student(student).await
    }

    async fn delete_student(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_student(id).await
    }

    async fn list_faculty(&self) -> Result<Vec<Faculty>, StoreError> {
        self.inner.list_faculty().await
    }

    async fn get_faculty(&self, id: &str) -> Result<Option<Faculty>, StoreError> {
        self.inner.get_faculty(id).await
    }

    async fn insert_faculty(&self, faculty: &Faculty) -> Result<(), StoreError> {
        self.inner.insert_faculty(faculty).await
    }

    async fn update_faculty(&self, faculty: &Faculty) -> Result<(), StoreError> {
        self.inner.update_faculty(faculty).await
    }

    async fn delete_faculty(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_faculty(id).await
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        self.inner.list_subjects().await
    }

    async fn insert_subject(&self, subject: &Subject) -> Result<(), StoreError> {
        self.inner.insert_subject(subject).await
    }

    async fn update_subject(&self, subject: &Subject) -> Result<(), StoreError> {
        self.inner.update_subject(subject).await
    }

    async fn delete_subject(&self, abbr: &str) -> Result<(), StoreError> {
        self.inner.delete_subject(abbr).await
    }

    async fn list_attendance(&self, date_str: Option<&str>, limit: usize) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.check()?;
        self.inner.list_attendance(date_str, limit).await
    }

    async fn get_attendance(&self, id: &str) -> Result<Option<AttendanceRecord>, StoreError> {
        self.check()?;
        self.inner.get_attendance(id).await
    }

    async fn find_attendance(
        &self,
        student_id: &str,
        subject: &str,
        date_str: &str,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        self.check()?;
        self.inner.find_attendance(student_id, subject, date_str).await
    }

    async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        self.inner.insert_attendance(record).await
    }

    async fn set_attendance_status(&self, id: &str, status: AttendanceStatus) -> Result<AttendanceRecord, StoreError> {
        self.inner.set_attendance_status(id, status).await
    }

    async fn get_admin(&self) -> Result<Option<AdminCredential>, StoreError> {
        self.inner.get_admin().await
    }

    async fn set_admin(&self, admin: &AdminCredential) -> Result<(), StoreError> {
        self.inner.set_admin(admin).await
    }
}
