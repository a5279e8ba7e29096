//! Head Gesture Detection
//!
//! Tracks a single facial point across frames and classifies the
//! accumulated motion:
//! - Pyramidal Lucas-Kanade point tracking
//! - Windowed trajectory and horizontal direction history
//! - Nod / shake classification with axis dominance and reversal counting
//! - Cooldown and post-detection suppression gating

pub mod classifier;
pub mod config;
pub mod detector;
pub mod flow;
pub mod trajectory;

pub use classifier::{GestureDetection, HeadGesture, MotionClassifier, MotionSummary};
pub use config::GestureConfig;
pub use detector::{FaceRegion, HeadGestureDetector, TrackerPhase};
pub use flow::{PointTracker, PyramidalLk};
pub use trajectory::{TrackedPoint, TrajectoryBuffer};

use thiserror::Error;

/// Head gesture error types
#[derive(Error, Debug)]
pub enum GestureError {
    #[error("Tracking lost")]
    TrackingLost,

    #[error("Frame size mismatch: {0}")]
    FrameMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
