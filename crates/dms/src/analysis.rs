//! DMS analysis results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detector::FaceBox;
use crate::event::{EventKind, GestureEvent};

/// Which detector family ran on a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePass {
    #[default]
    Face,
    Hand,
    Both,
}

/// Result of analysing one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmsAnalysis {
    pub timestamp: DateTime<Utc>,

    pub pass: FramePass,

    /// Face seen on the latest face pass
    pub face_detected: bool,

    /// Hand seen on the latest hand pass
    pub hand_detected: bool,

    /// Last face box, kept for a few frames after the face is lost
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_box: Option<FaceBox>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ear: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mar: Option<f32>,

    /// Hand gesture currently held
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_gesture: Option<String>,

    /// Events completed on this frame
    pub events: Vec<GestureEvent>,
}

impl DmsAnalysis {
    /// Check if any events fired
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.events.iter().any(|e| e.kind == kind)
    }
}
