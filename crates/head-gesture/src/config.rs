//! Head gesture configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::GestureError;

/// Allowed range for the live nod sensitivity control (pixels)
pub const NOD_SENSITIVITY_RANGE: std::ops::RangeInclusive<u32> = 20..=50;

/// Head gesture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Vertical displacement needed for a nod (pixels)
    pub nod_threshold: f32,

    /// Horizontal displacement needed for a shake (pixels)
    pub shake_threshold: f32,

    /// Direction reversals needed for a shake
    pub direction_changes: usize,

    /// Factor by which the dominant axis ratio must exceed the other
    pub dominance_ratio: f32,

    /// Trajectory window (frames)
    pub tracking_frames: usize,

    /// Minimum horizontal step that counts as a direction sample (pixels)
    pub min_move: f32,

    /// Direction history length
    pub direction_history: usize,

    /// Minimum trajectory length before classifying
    pub min_samples: usize,

    /// Minimum time between two accepted gestures
    #[serde(with = "secs_f64")]
    pub cooldown: Duration,

    /// Post-detection window during which tracking is skipped
    #[serde(with = "secs_f64")]
    pub suppression: Duration,

    /// Consecutive lost frames tolerated before the track is dropped
    pub max_lost_frames: u32,

    /// Report nods
    pub nod_enabled: bool,

    /// Report shakes
    pub shake_enabled: bool,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            nod_threshold: 35.0,
            shake_threshold: 10.0,
            direction_changes: 2,
            dominance_ratio: 2.0,
            tracking_frames: 15,
            min_move: 2.0,
            direction_history: 20,
            min_samples: 5,
            cooldown: Duration::from_millis(1500),
            suppression: Duration::from_secs(2),
            max_lost_frames: 5,
            nod_enabled: true,
            shake_enabled: true,
        }
    }
}

impl GestureConfig {
    /// Validate a nod sensitivity value coming from a live control
    pub fn check_nod_sensitivity(value: u32) -> Result<f32, GestureError> {
        if NOD_SENSITIVITY_RANGE.contains(&value) {
            Ok(value as f32)
        } else {
            Err(GestureError::Config(format!(
                "nod sensitivity {} outside {}..={}",
                value,
                NOD_SENSITIVITY_RANGE.start(),
                NOD_SENSITIVITY_RANGE.end()
            )))
        }
    }

    /// Smallest |dx|+|dy| that can be any gesture
    pub fn min_motion(&self) -> f32 {
        self.nod_threshold.max(self.shake_threshold) * 0.6
    }

    /// Smallest Euclidean displacement considered at all
    pub fn min_displacement(&self) -> f32 {
        self.nod_threshold * 0.8
    }
}

/// Serde helper storing a `Duration` as seconds
pub mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
