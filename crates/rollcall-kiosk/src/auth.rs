//! Faculty and admin authentication flows.
//!
//! All three flows run the same [`FaceScanner`] loop with different capture
//! policies: faculty login fires on one good frame at the coarse auth
//! cadence, admin setup and login use the enrollment policy. A capture that
//! does not match just starts the next scan cycle.

use crate::roster::face_descriptor;
use crate::scanner::FaceScanner;
use crate::store::{AdminCredential, Store, StoreError};
use rollcall_core::photo::{self, PhotoError};
use rollcall_core::{
    CapturePolicy, Descriptor, EngineError, EuclideanMatcher, FaceEngine, Faculty, MatchResult, Matcher, ReferenceSet,
};
use rollcall_hw::{Camera, CameraError, CameraSession, Holder};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No faculty faces registered")]
    NoFacultyFaces,
    #[error("admin account is not set up")]
    AdminNotConfigured,
    #[error("admin account has no reference face")]
    AdminHasNoFace,
    #[error("password is required")]
    EmptyPassword,
    #[error("incorrect password")]
    WrongPassword,
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("face engine: {0}")]
    Engine(#[from] EngineError),
    #[error("photo: {0}")]
    Photo(#[from] PhotoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthPolicy {
    /// Maximum descriptor distance for a match.
    pub threshold: f32,
    pub poll: Duration,
}

/// SHA-256 of `password`, lowercase hex.
pub fn digest_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Identify a faculty member by face.
///
/// The reference set is built once per call from the faculty currently on
/// file. Returns `None` if `cancel` resolves first.
pub async fn faculty_login<C, E, S, F>(
    camera: &mut CameraSession<C>,
    engine: &E,
    store: &S,
    policy: &AuthPolicy,
    cancel: F,
) -> Result<Option<Faculty>, AuthError>
where
    C: Camera,
    E: FaceEngine,
    S: Store,
    F: Future<Output = ()>,
{
    let faculty = store.list_faculty().await?;
    let references: ReferenceSet = faculty
        .iter()
        .filter_map(|f| f.descriptor.clone().map(|d| (f.id.clone(), d)))
        .collect();
    if references.is_empty() {
        return Err(AuthError::NoFacultyFaces);
    }
    tracing::info!(candidates = references.len(), "faculty login started");

    let matcher = EuclideanMatcher::new();
    let mut scanner = FaceScanner::new(camera, engine, Holder::FacultyLogin, CapturePolicy::ONE_SHOT, policy.poll);
    tokio::pin!(cancel);

    loop {
        let Some(captured) = scanner.next(&mut cancel).await? else {
            return Ok(None);
        };
        let probe = match engine.descriptor(&captured.image, &captured.face).await {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, "faculty login: descriptor failed");
                continue;
            }
        };
        match matcher.find(&probe, &references, policy.threshold) {
            MatchResult::Match { key, distance } => {
                if let Some(found) = faculty.iter().find(|f| f.id == key) {
                    tracing::info!(faculty = %found.id, distance, "faculty authenticated");
                    return Ok(Some(found.clone()));
                }
            }
            other => tracing::debug!(best = ?other.distance(), "faculty login: face not recognized"),
        }
    }
}

/// Capture the admin face and store it with the password digest.
///
/// Returns `false` if `cancel` resolves before a face is captured.
pub async fn setup_admin<C, E, S, F>(
    camera: &mut CameraSession<C>,
    engine: &E,
    store: &S,
    password: &str,
    poll: Duration,
    cancel: F,
) -> Result<bool, AuthError>
where
    C: Camera,
    E: FaceEngine,
    S: Store,
    F: Future<Output = ()>,
{
    if password.is_empty() {
        return Err(AuthError::EmptyPassword);
    }

    let mut scanner = FaceScanner::new(camera, engine, Holder::AdminLogin, CapturePolicy::ENROLLMENT, poll);
    tokio::pin!(cancel);

    loop {
        let Some(captured) = scanner.next(&mut cancel).await? else {
            return Ok(false);
        };
        let descriptor = match engine.descriptor(&captured.image, &captured.face).await {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, "admin setup: descriptor failed, rescanning");
                continue;
            }
        };

        store
            .set_admin(&AdminCredential {
                password_digest: digest_password(password),
                photo: Some(photo::encode_jpeg(&captured.image)?),
                descriptor: Some(descriptor),
            })
            .await?;
        tracing::info!("admin credential stored");
        return Ok(true);
    }
}

async fn admin_reference<E: FaceEngine>(engine: &E, admin: &AdminCredential) -> Result<Descriptor, AuthError> {
    if let Some(d) = &admin.descriptor {
        return Ok(d.clone());
    }
    let jpeg = admin.photo.as_deref().ok_or(AuthError::AdminHasNoFace)?;
    let image = photo::decode(jpeg)?;
    face_descriptor(engine, &image).await?.ok_or(AuthError::AdminHasNoFace)
}

/// Check the admin password, then require a face match.
///
/// On success returns the administrator as a [`Faculty`] that teaches every
/// subject. A face that does not match resets the scan.
pub async fn admin_login<C, E, S, F>(
    camera: &mut CameraSession<C>,
    engine: &E,
    store: &S,
    password: &str,
    policy: &AuthPolicy,
    cancel: F,
) -> Result<Option<Faculty>, AuthError>
where
    C: Camera,
    E: FaceEngine,
    S: Store,
    F: Future<Output = ()>,
{
    let admin = store.get_admin().await?.ok_or(AuthError::AdminNotConfigured)?;
    if digest_password(password) != admin.password_digest {
        tracing::warn!("admin login: wrong password");
        return Err(AuthError::WrongPassword);
    }
    let reference = admin_reference(engine, &admin).await?;
    let references = ReferenceSet::single(Faculty::ADMIN_ID, reference.clone());

    let matcher = EuclideanMatcher::new();
    let mut scanner = FaceScanner::new(camera, engine, Holder::AdminLogin, CapturePolicy::ENROLLMENT, policy.poll);
    tokio::pin!(cancel);

    loop {
        let Some(captured) = scanner.next(&mut cancel).await? else {
            return Ok(None);
        };
        let Ok(probe) = engine.descriptor(&captured.image, &captured.face).await else {
            continue;
        };
        let result = matcher.find(&probe, &references, policy.threshold);
        if result.is_match() {
            tracing::info!(distance = ?result.distance(), "admin authenticated");
            return Ok(Some(Faculty {
                id: Faculty::ADMIN_ID.to_string(),
                name: "Administrator".to_string(),
                subjects: Vec::new(),
                photo: admin.photo,
                descriptor: Some(reference),
            }));
        }
        tracing::debug!(distance = ?result.distance(), "admin login: face mismatch, rescanning");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_sha256_hex() {
        assert_eq!(
            digest_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(digest_password("abc"), digest_password("abd"));
    }
}
