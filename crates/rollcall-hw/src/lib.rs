//! rollcall-hw — Camera access for the attendance kiosk.
//!
//! Provides the camera collaborator trait with a V4L2 backend, the RGB
//! frame type, and the session manager that keeps exactly one stream open.

pub mod camera;
pub mod frame;
pub mod session;

pub use camera::{Camera, CameraError, PixelFormat, V4lCamera, VideoStream};
pub use frame::Frame;
pub use session::{CameraSession, Holder};
