//! Alerting System
//!
//! Turns detection events into audible cues without blocking the
//! processing thread: alerts are queued on a channel, resolved to sound
//! files by a worker task, and played on the blocking pool.

mod dispatcher;
mod kind;
mod sound;

pub use dispatcher::{AlertDispatcher, AlertSink};
pub use kind::AlertKind;
pub use sound::{LogPlayer, SoundLibrary, SoundPlayer};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Alerting error types
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Sound file not found: {0}")]
    SoundMissing(PathBuf),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Alert worker stopped")]
    WorkerStopped,
}

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Play sounds at all
    pub enabled: bool,
    /// Root of the sound library
    pub sounds_dir: PathBuf,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sounds_dir: PathBuf::from("sounds"),
        }
    }
}
