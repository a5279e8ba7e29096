//! Service settings
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables such as `COCKPIT__SERVER__ADDR` or `COCKPIT__DMS__HAND_HOLD_TIME`.

use alerting::AlertConfig;
use camera_capture::CameraConfig;
use config::{Config, Environment, File, FileFormat};
use dms::DmsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::StorageConfig;

use crate::ApiError;

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    /// Install the Prometheus recorder and serve `/metrics`
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            metrics: true,
        }
    }
}

/// Processing session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Process every n-th frame
    pub frame_divisor: u32,
    /// Recorded detector output replayed alongside the frames
    pub trace_file: Option<PathBuf>,
    /// Pace replayed frames at the camera frame rate
    pub realtime: bool,
    /// Pause after a failed frame read (seconds)
    pub error_backoff: f64,
    /// Minimum spacing of repeated loop error logs (seconds)
    pub error_log_interval: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_divisor: 1,
            trace_file: None,
            realtime: true,
            error_backoff: 0.1,
            error_log_interval: 5.0,
        }
    }
}

impl SessionConfig {
    pub fn error_backoff(&self) -> Duration {
        Duration::try_from_secs_f64(self.error_backoff).unwrap_or(Duration::from_millis(100))
    }

    pub fn error_log_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.error_log_interval)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs(5))
    }
}

/// Complete service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Emit logs as JSON lines
    pub log_json: bool,
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub session: SessionConfig,
    pub dms: DmsConfig,
    pub alerts: AlertConfig,
    pub storage: StorageConfig,
}

impl AppSettings {
    /// Layer `path` (if it exists) and `COCKPIT__*` environment variables over the defaults
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("COCKPIT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: AppSettings = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text (no environment overrides)
    pub fn from_toml(text: &str) -> Result<Self, ApiError> {
        let settings: AppSettings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ApiError> {
        if self.session.frame_divisor == 0 {
            return Err(ApiError::BadRequest("session.frame_divisor must be at least 1".into()));
        }
        if self.camera.width == 0 {
            return Err(ApiError::BadRequest("camera.width must be positive".into()));
        }
        Ok(())
    }
}
