use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use image::RgbImage;
use rollcall_core::{attendance, AttendanceStatus, CapturePolicy, FaceEngine, Subject};
use rollcall_hw::{CameraSession, Holder, V4lCamera};
use rollcall_kiosk::roster::{self, NewFaculty, NewStudent};
use rollcall_kiosk::store::DEFAULT_LIST_LIMIT;
use rollcall_kiosk::{
    admin_login, faculty_login, setup_admin, toggle_attendance, AnyIdentifier, AttendanceSession, AuthPolicy, Config,
    DemoIdentifier, FaceScanner, GalleryIdentifier, SessionSettings, SqliteStore, Store,
};
use rollcall_vision::{spawn_engine, EngineHandle, ARCFACE_MODEL, SCRFD_MODEL};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod console;

use console::ConsoleEvents;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face attendance kiosk")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate as faculty (or admin) and run an attendance session
    Kiosk {
        /// Subject abbreviation, e.g. TOC
        #[arg(short, long)]
        subject: String,
        /// Log in as the administrator instead of by faculty face
        #[arg(long, requires = "password")]
        admin: bool,
        #[arg(long)]
        password: Option<String>,
    },
    /// Manage enrolled students
    Students {
        #[command(subcommand)]
        action: StudentAction,
    },
    /// Manage faculty
    Faculty {
        #[command(subcommand)]
        action: FacultyAction,
    },
    /// Manage the subject timetable
    Subjects {
        #[command(subcommand)]
        action: SubjectAction,
    },
    /// Inspect and correct the attendance log
    Attendance {
        #[command(subcommand)]
        action: AttendanceAction,
    },
    /// Administrator account
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// List video capture devices
    Devices,
    /// Run camera and model diagnostics
    Test,
}

#[derive(Args)]
struct PhotoArgs {
    /// Photo file (JPEG or PNG)
    #[arg(long, conflicts_with = "capture")]
    photo: Option<PathBuf>,
    /// Capture the photo from the camera
    #[arg(long)]
    capture: bool,
}

#[derive(Subcommand)]
enum StudentAction {
    List {
        #[arg(long)]
        json: bool,
    },
    /// Enroll a student from a photo
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        department: String,
        #[command(flatten)]
        photo: PhotoArgs,
    },
    /// Replace a student's reference photo
    Photo {
        id: String,
        #[command(flatten)]
        photo: PhotoArgs,
    },
    /// Delete a student and their attendance records
    Remove { id: String },
}

#[derive(Subcommand)]
enum FacultyAction {
    List,
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// Subject abbreviations, comma separated
        #[arg(long, value_delimiter = ',')]
        subjects: Vec<String>,
        #[command(flatten)]
        photo: PhotoArgs,
    },
    Remove { id: String },
}

#[derive(Subcommand)]
enum SubjectAction {
    List,
    Add {
        #[arg(long)]
        abbr: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
    },
    Remove { abbr: String },
    /// Insert the default timetable
    Seed,
}

#[derive(Subcommand)]
enum AttendanceAction {
    /// Newest first
    List {
        /// Only this day (YYYY-MM-DD)
        #[arg(long, conflicts_with = "today")]
        date: Option<String>,
        #[arg(long)]
        today: bool,
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Flip PRESENT to ABSENT, anything else to PRESENT
    Toggle { id: String },
    /// Set a record's status (PRESENT, LATE or ABSENT)
    Set { id: String, status: AttendanceStatus },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Store the admin password and capture the admin face
    Setup {
        #[arg(long)]
        password: String,
    },
    /// Check the admin password and face
    Login {
        #[arg(long)]
        password: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Commands::Devices) {
        return list_devices();
    }

    let config = Config::from_env().context("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");
    if matches!(cli.command, Commands::Test) {
        return diagnostics(&config).await;
    }

    let store = SqliteStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;

    match cli.command {
        Commands::Kiosk {
            subject,
            admin,
            password,
        } => run_kiosk(&config, &store, &subject, admin.then_some(password).flatten()).await,
        Commands::Students { action } => students(&config, &store, action).await,
        Commands::Faculty { action } => faculty(&config, &store, action).await,
        Commands::Subjects { action } => subjects(&store, action).await,
        Commands::Attendance { action } => attendance_log(&store, action).await,
        Commands::Admin { action } => admin(&config, &store, action).await,
        Commands::Devices | Commands::Test => Ok(()),
    }
}

fn load_engine(config: &Config) -> Result<EngineHandle> {
    spawn_engine(&config.model_path(SCRFD_MODEL), &config.model_path(ARCFACE_MODEL))
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))
}

fn open_camera(config: &Config) -> CameraSession<V4lCamera> {
    CameraSession::new(V4lCamera::new(
        &config.camera_device,
        config.camera_width,
        config.camera_height,
    ))
}

/// Resolves on Ctrl-C.
fn interrupted() -> impl Future<Output = ()> {
    async {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn capture_face<E: FaceEngine>(config: &Config, engine: &E) -> Result<RgbImage> {
    let mut camera = open_camera(config);
    let mut scanner = FaceScanner::new(
        &mut camera,
        engine,
        Holder::Enrollment,
        CapturePolicy::ENROLLMENT,
        config.live_poll(),
    );
    println!("Look at the camera (Ctrl-C to cancel)...");
    let cancel = interrupted();
    tokio::pin!(cancel);
    let captured = scanner
        .next(&mut cancel)
        .await?
        .ok_or_else(|| anyhow!("capture cancelled"))?;
    Ok(captured.image)
}

async fn load_photo<E: FaceEngine>(config: &Config, engine: &E, args: &PhotoArgs) -> Result<Option<RgbImage>> {
    if let Some(path) = &args.photo {
        let image = image::open(path).with_context(|| format!("reading {}", path.display()))?;
        return Ok(Some(image.to_rgb8()));
    }
    if args.capture {
        return capture_face(config, engine).await.map(Some);
    }
    Ok(None)
}

async fn run_kiosk(config: &Config, store: &SqliteStore, subject: &str, admin_password: Option<String>) -> Result<()> {
    let engine = load_engine(config)?;
    let mut camera = open_camera(config);

    let owner = match admin_password {
        Some(password) => {
            println!("Administrator login: look at the camera...");
            let policy = AuthPolicy {
                threshold: config.admin_threshold,
                poll: config.live_poll(),
            };
            admin_login(&mut camera, &engine, store, &password, &policy, interrupted()).await?
        }
        None => {
            println!("Faculty login: look at the camera...");
            let policy = AuthPolicy {
                threshold: config.authority_threshold,
                poll: config.auth_poll(),
            };
            faculty_login(&mut camera, &engine, store, &policy, interrupted()).await?
        }
    };
    let Some(owner) = owner else {
        println!("Login cancelled");
        return Ok(());
    };
    println!("Welcome, {}", owner.name);
    tracing::info!(owner = %owner.id, subject, demo = config.demo_mode, "starting kiosk");

    let identifier = if config.demo_mode {
        AnyIdentifier::Demo(DemoIdentifier::new(&engine, store))
    } else {
        AnyIdentifier::Gallery(GalleryIdentifier::new(&engine, store, config.attendance_threshold))
    };
    let mut session = AttendanceSession::start(
        &mut camera,
        &engine,
        store,
        identifier,
        ConsoleEvents::default(),
        owner,
        subject,
        SessionSettings::from_config(config),
    )
    .await?;
    println!(
        "Session started: {} ({})",
        session.subject().name,
        session.subject().code
    );
    println!("{}", console::HELP);

    let (tx, mut rx) = mpsc::channel(16);
    console::spawn_stdin(tx.clone())?;
    console::spawn_interrupt(tx);

    if session.run(&mut rx).await?.is_none() {
        println!("Session left open; attendance recorded so far is saved");
    }
    Ok(())
}

async fn students(config: &Config, store: &SqliteStore, action: StudentAction) -> Result<()> {
    match action {
        StudentAction::List { json } => {
            let students = store.list_students().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&students)?);
                return Ok(());
            }
            for s in &students {
                let face = if s.descriptor.is_some() { "face" } else { "no face" };
                println!("{:<12} {:<28} {:<10} {}", s.id, s.name, s.department, face);
            }
            println!("{} student(s)", students.len());
        }
        StudentAction::Add {
            id,
            name,
            email,
            department,
            photo,
        } => {
            let engine = load_engine(config)?;
            let Some(image) = load_photo(config, &engine, &photo).await? else {
                bail!("a photo is required: pass --photo <file> or --capture");
            };
            let new = NewStudent {
                id,
                name,
                email,
                department,
            };
            let student = roster::enroll_student(&engine, store, new, &image, config.duplicate_face_threshold).await?;
            println!("Enrolled {} ({})", student.name, student.id);
        }
        StudentAction::Photo { id, photo } => {
            let engine = load_engine(config)?;
            let Some(image) = load_photo(config, &engine, &photo).await? else {
                bail!("a photo is required: pass --photo <file> or --capture");
            };
            let student =
                roster::replace_student_photo(&engine, store, &id, &image, config.duplicate_face_threshold).await?;
            println!("Photo replaced for {} ({})", student.name, student.id);
        }
        StudentAction::Remove { id } => {
            store.delete_student(&id).await?;
            println!("Removed student {id}");
        }
    }
    Ok(())
}

async fn faculty(config: &Config, store: &SqliteStore, action: FacultyAction) -> Result<()> {
    match action {
        FacultyAction::List => {
            for f in store.list_faculty().await? {
                let face = if f.descriptor.is_some() { "face" } else { "no face" };
                println!("{:<6} {:<28} {:<24} {}", f.id, f.name, f.subjects.join(","), face);
            }
        }
        FacultyAction::Add {
            id,
            name,
            subjects,
            photo,
        } => {
            let known = store.list_subjects().await?;
            if let Some(unknown) = subjects.iter().find(|s| !known.iter().any(|k| &k.abbr == *s)) {
                bail!("unknown subject: {unknown}");
            }
            let new = NewFaculty { id, name, subjects };
            let faculty = if photo.photo.is_some() || photo.capture {
                let engine = load_engine(config)?;
                let image = load_photo(config, &engine, &photo).await?;
                roster::enroll_faculty(&engine, store, new, image.as_ref()).await?
            } else {
                roster::enroll_faculty(&NoEngine, store, new, None).await?
            };
            report_faculty(&faculty);
        }
        FacultyAction::Remove { id } => {
            store.delete_faculty(&id).await?;
            println!("Removed faculty {id}");
        }
    }
    Ok(())
}

fn report_faculty(faculty: &rollcall_core::Faculty) {
    println!("Enrolled {} ({})", faculty.name, faculty.id);
    if faculty.descriptor.is_none() {
        println!("warning: no usable face on file; this faculty member cannot close sessions by face");
    }
}

/// Engine for faculty enrolled without a photo; never called.
struct NoEngine;

impl FaceEngine for NoEngine {
    async fn detect(&self, _image: &RgbImage) -> Result<Vec<rollcall_core::BoundingBox>, rollcall_core::EngineError> {
        Err(rollcall_core::EngineError::ModelUnavailable("not loaded".into()))
    }

    async fn descriptor(
        &self,
        _image: &RgbImage,
        _face: &rollcall_core::BoundingBox,
    ) -> Result<rollcall_core::Descriptor, rollcall_core::EngineError> {
        Err(rollcall_core::EngineError::ModelUnavailable("not loaded".into()))
    }
}

async fn subjects(store: &SqliteStore, action: SubjectAction) -> Result<()> {
    match action {
        SubjectAction::List => {
            for s in store.list_subjects().await? {
                println!("{:<8} {:<12} {}", s.abbr, s.code, s.name);
            }
        }
        SubjectAction::Add { abbr, code, name } => {
            roster::add_subject(store, Subject { abbr, code, name }).await?;
            println!("Subject added");
        }
        SubjectAction::Remove { abbr } => {
            store.delete_subject(&abbr).await?;
            println!("Removed subject {abbr}");
        }
        SubjectAction::Seed => {
            let added = roster::seed_subjects(store).await?;
            println!("{added} subject(s) added");
        }
    }
    Ok(())
}

async fn attendance_log(store: &SqliteStore, action: AttendanceAction) -> Result<()> {
    match action {
        AttendanceAction::List {
            date,
            today,
            limit,
            json,
        } => {
            let date = if today {
                Some(attendance::date_str(Local::now()))
            } else {
                date
            };
            let records = store.list_attendance(date.as_deref(), limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            for r in &records {
                println!(
                    "{:<36} {} {} {:<12} {:<24} {:<8} {}",
                    r.id,
                    r.date_str,
                    r.timestamp.with_timezone(&Local).format("%H:%M:%S"),
                    r.student_id,
                    r.student_name,
                    r.subject,
                    r.status
                );
            }
            println!("{} record(s)", records.len());
        }
        AttendanceAction::Toggle { id } => {
            let record = toggle_attendance(store, &id).await?;
            println!("{} {} is now {}", record.student_id, record.subject, record.status);
        }
        AttendanceAction::Set { id, status } => {
            let record = store.set_attendance_status(&id, status).await?;
            println!("{} {} is now {}", record.student_id, record.subject, record.status);
        }
    }
    Ok(())
}

async fn admin(config: &Config, store: &SqliteStore, action: AdminAction) -> Result<()> {
    let engine = load_engine(config)?;
    let mut camera = open_camera(config);
    match action {
        AdminAction::Setup { password } => {
            println!("Look at the camera (Ctrl-C to cancel)...");
            if setup_admin(&mut camera, &engine, store, &password, config.live_poll(), interrupted()).await? {
                println!("Administrator account saved");
            } else {
                println!("Setup cancelled");
            }
        }
        AdminAction::Login { password } => {
            let policy = AuthPolicy {
                threshold: config.admin_threshold,
                poll: config.live_poll(),
            };
            println!("Look at the camera (Ctrl-C to cancel)...");
            match admin_login(&mut camera, &engine, store, &password, &policy, interrupted()).await? {
                Some(_) => println!("Administrator verified"),
                None => println!("Login cancelled"),
            }
        }
    }
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = rollcall_hw::camera::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found");
    }
    for d in devices {
        println!("{:<14} {:<32} {}", d.path, d.name, d.driver);
    }
    Ok(())
}

async fn diagnostics(config: &Config) -> Result<()> {
    println!("Camera {}", config.camera_device);
    let mut camera = open_camera(config);
    camera.acquire(Holder::Enrollment)?;
    // The first frames after stream-on are often black.
    let mut frame = camera.grab(Holder::Enrollment)?;
    for _ in 0..10 {
        if !frame.is_dark {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        frame = camera.grab(Holder::Enrollment)?;
    }
    camera.release(Holder::Enrollment);
    println!(
        "  frame {}x{}  brightness {:.1}{}",
        frame.width(),
        frame.height(),
        frame.avg_brightness(),
        if frame.is_dark { "  (dark)" } else { "" }
    );

    println!("Models {}", config.model_dir.display());
    let engine = load_engine(config)?;
    let faces = engine.detect(&frame.image).await?;
    println!("  {} face(s) detected", faces.len());
    for f in &faces {
        println!(
            "    {:.0}x{:.0} at ({:.0}, {:.0})  confidence {:.2}",
            f.width, f.height, f.x, f.y, f.confidence
        );
    }
    if let Some(face) = faces.first() {
        let descriptor = engine.descriptor(&frame.image, face).await?;
        println!("  descriptor: {} dimensions", descriptor.values.len());
    }
    Ok(())
}
