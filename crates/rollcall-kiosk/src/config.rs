use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// What exit verification does when the session owner has no reference photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitFallback {
    /// Refuse to close the session until an administrator intervenes.
    #[default]
    Deny,
    /// Accept any single present face after a slower progress accrual.
    SlowAccept,
}

impl FromStr for ExitFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deny" => Ok(ExitFallback::Deny),
            "slow-accept" | "slow_accept" => Ok(ExitFallback::SlowAccept),
            other => Err(format!("unknown exit fallback: {other}")),
        }
    }
}

/// Kiosk configuration: defaults, then an optional TOML file named by
/// `ROLLCALL_CONFIG`, then `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Distance threshold for student identification.
    pub attendance_threshold: f32,
    /// Distance threshold for exit verification and faculty login.
    pub authority_threshold: f32,
    /// Distance under which a new enrollment counts as an already-registered face.
    pub duplicate_face_threshold: f32,
    /// Distance threshold for admin face login.
    pub admin_threshold: f32,
    /// Detection sampling interval for live gating.
    pub live_poll_ms: u64,
    /// Sampling interval for one-shot authentication matching.
    pub auth_poll_ms: u64,
    /// How long a SUCCESS/DUPLICATE result stays on screen.
    pub display_ms: u64,
    pub exit_fallback: ExitFallback,
    /// Identify by picking a random enrolled student. Local demos only.
    pub demo_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            camera_device: "/dev/video0".to_string(),
            camera_width: 640,
            camera_height: 480,
            model_dir: data_dir.join("models"),
            db_path: data_dir.join("rollcall.db"),
            attendance_threshold: 0.5,
            authority_threshold: 0.6,
            duplicate_face_threshold: 0.4,
            admin_threshold: 0.5,
            live_poll_ms: 100,
            auth_poll_ms: 500,
            display_ms: 3000,
            exit_fallback: ExitFallback::Deny,
            demo_mode: false,
        }
    }
}

impl Config {
    /// Load configuration from the optional TOML file and `ROLLCALL_*`
    /// environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.overlay(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Apply overrides from `lookup`. Unparseable values keep the current setting.
    pub fn overlay(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
            if let Some(value) = lookup(key) {
                match value.parse() {
                    Ok(v) => *slot = v,
                    Err(_) => tracing::warn!(key, value = %value, "ignoring invalid config value"),
                }
            }
        }

        if let Some(v) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        parsed(&lookup, "ROLLCALL_CAMERA_WIDTH", &mut self.camera_width);
        parsed(&lookup, "ROLLCALL_CAMERA_HEIGHT", &mut self.camera_height);
        parsed(&lookup, "ROLLCALL_ATTENDANCE_THRESHOLD", &mut self.attendance_threshold);
        parsed(&lookup, "ROLLCALL_AUTHORITY_THRESHOLD", &mut self.authority_threshold);
        parsed(&lookup, "ROLLCALL_DUPLICATE_FACE_THRESHOLD", &mut self.duplicate_face_threshold);
        parsed(&lookup, "ROLLCALL_ADMIN_THRESHOLD", &mut self.admin_threshold);
        parsed(&lookup, "ROLLCALL_LIVE_POLL_MS", &mut self.live_poll_ms);
        parsed(&lookup, "ROLLCALL_AUTH_POLL_MS", &mut self.auth_poll_ms);
        parsed(&lookup, "ROLLCALL_DISPLAY_MS", &mut self.display_ms);
        parsed(&lookup, "ROLLCALL_EXIT_FALLBACK", &mut self.exit_fallback);
        if let Some(v) = lookup("ROLLCALL_DEMO_MODE") {
            self.demo_mode = v != "0" && !v.eq_ignore_ascii_case("false");
        }
    }

    /// Path to a model file inside `model_dir`.
    pub fn model_path(&self, file: &str) -> String {
        self.model_dir.join(file).to_string_lossy().into_owned()
    }

    pub fn live_poll(&self) -> Duration {
        Duration::from_millis(self.live_poll_ms.max(1))
    }

    pub fn auth_poll(&self) -> Duration {
        Duration::from_millis(self.auth_poll_ms.max(1))
    }

    pub fn display(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }
}

/// `$XDG_DATA_HOME/rollcall`, falling back to `~/.local/share/rollcall`.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}
