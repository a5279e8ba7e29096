//! Storage Layer
//!
//! Keeps what the cockpit monitor detected:
//! - bounded in-memory event repository for the HTTP API
//! - append-only JSON-lines detection log
//! - status snapshot file read by the dashboard

mod logger;
mod repository;
mod snapshot;

pub use logger::{log_line, EventLogger};
pub use repository::EventRepository;
pub use snapshot::{StatusSnapshot, SystemStatus};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("Event logger stopped")]
    LoggerStopped,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON-lines file every event is appended to
    pub detection_log: PathBuf,
    /// Status snapshot written for the dashboard
    pub status_file: PathBuf,
    /// Events kept in memory for the API
    pub max_events: usize,
    /// Newest events embedded in the status snapshot
    pub snapshot_events: usize,
    /// Processed frames between periodic snapshot writes
    pub snapshot_every_frames: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            detection_log: PathBuf::from("logs/detection.jsonl"),
            status_file: PathBuf::from("detection_data.json"),
            max_events: 10_000,
            snapshot_events: 50,
            snapshot_every_frames: 10,
        }
    }
}
