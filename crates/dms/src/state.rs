//! Per-session fatigue counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Frame counters and yawn-run bookkeeping, reset on session start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FatigueState {
    /// Consecutive frames with EAR under threshold
    pub closed_eye_frames: u32,

    /// Sleep already reported for the current closure
    pub eyes_shut: bool,

    /// Consecutive frames with MAR over threshold
    pub open_mouth_frames: u32,

    /// Mouth has been open long enough to count as a yawn
    pub yawning: bool,

    /// Yawns in the current run
    pub yawn_count: u32,

    pub first_yawn: Option<DateTime<Utc>>,

    pub last_yawn: Option<DateTime<Utc>>,

    /// Blinks since the last fatigue verdict
    pub blink_total: u32,
}

impl FatigueState {
    /// Forget the yawn run after a verdict
    pub fn clear_yawn_run(&mut self) {
        self.yawn_count = 0;
        self.first_yawn = None;
        self.last_yawn = None;
        self.blink_total = 0;
    }

    /// Reset state (on driver change)
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
