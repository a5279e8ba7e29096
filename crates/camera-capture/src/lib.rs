//! Camera Capture Library for the Cockpit Monitor
//!
//! Provides frame sources for the cabin camera pipeline:
//! - `VideoFrame` with grayscale conversion and width normalization
//! - `FrameSource` trait consumed by the processing thread
//! - Directory replay of recorded frames
//! - In-memory source for tests and demos

pub mod frame;
pub mod source;

pub use frame::{VideoFrame, PROCESSING_WIDTH};
pub use source::{DirectorySource, FrameSource, MemorySource};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Capture timeout")]
    Timeout,

    #[error("Camera not initialized")]
    NotInitialized,
}

impl CameraError {
    /// Whether the processing loop may skip the frame and keep going
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CameraError::Format(_) | CameraError::Stream(_) | CameraError::Timeout
        )
    }
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Directory holding recorded frames (replayed in file-name order)
    pub frames_dir: PathBuf,
    /// Width frames are scaled to before analysis
    pub width: u32,
    /// Nominal capture rate, used for frame timestamps
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("frames"),
            width: PROCESSING_WIDTH,
            fps: 15,
        }
    }
}
