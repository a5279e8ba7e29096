//! DMS configuration

use head_gesture::config::secs_f64;
use head_gesture::GestureConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Eye, mouth and yawn-rate thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    /// EAR below this counts as a closed-eye frame
    pub eye_ar_threshold: f32,

    /// Consecutive closed frames that count as sleep
    pub eye_ar_consec_frames: u32,

    /// Shortest closure (frames) reported as a blink
    pub blink_min_frames: u32,

    /// MAR above this counts as an open-mouth frame
    pub mouth_ar_threshold: f32,

    /// Consecutive open frames before the mouth counts as yawning
    pub mouth_ar_consec_frames: u32,

    /// Yawns within `fatigue_window` that make a fatigue verdict
    pub yawns_for_fatigue: u32,

    /// Maximum span between first and last yawn of a fatigue run
    #[serde(with = "secs_f64")]
    pub fatigue_window: Duration,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            eye_ar_threshold: 0.24,
            eye_ar_consec_frames: 60,
            blink_min_frames: 5,
            mouth_ar_threshold: 0.5,
            mouth_ar_consec_frames: 15,
            yawns_for_fatigue: 4,
            fatigue_window: Duration::from_secs(180),
        }
    }
}

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Run blink/sleep/yawn analysis
    pub fatigue_enabled: bool,

    /// Run nod/shake tracking
    pub head_gesture_enabled: bool,

    /// Run hand gesture recognition
    pub hand_enabled: bool,

    /// Face analysis on even frames, hands on odd frames
    pub alternating_mode: bool,

    /// Processed frames a lost face box stays visible
    pub face_box_frames: u32,

    /// How long a hand gesture must be held before it is reported
    #[serde(with = "secs_f64")]
    pub hand_hold_time: Duration,

    /// Neither face nor hand for this long raises `no_face`
    #[serde(with = "secs_f64")]
    pub out_of_range_timeout: Duration,

    pub fatigue: FatigueConfig,

    pub gesture: GestureConfig,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            fatigue_enabled: true,
            head_gesture_enabled: true,
            hand_enabled: true,
            alternating_mode: true,
            face_box_frames: 5,
            hand_hold_time: Duration::from_secs(1),
            out_of_range_timeout: Duration::from_secs(3),
            fatigue: FatigueConfig::default(),
            gesture: GestureConfig::default(),
        }
    }
}

impl DmsConfig {
    /// Create strict config (lower thresholds)
    pub fn strict() -> Self {
        Self {
            hand_hold_time: Duration::from_millis(700),
            fatigue: FatigueConfig {
                eye_ar_consec_frames: 45,
                yawns_for_fatigue: 3,
                ..Default::default()
            },
            gesture: GestureConfig {
                nod_threshold: 25.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create lenient config (higher thresholds)
    pub fn lenient() -> Self {
        Self {
            hand_hold_time: Duration::from_millis(1500),
            fatigue: FatigueConfig {
                eye_ar_consec_frames: 90,
                yawns_for_fatigue: 5,
                ..Default::default()
            },
            gesture: GestureConfig {
                nod_threshold: 45.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
