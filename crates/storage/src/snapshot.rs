//! Dashboard status snapshot

use chrono::{DateTime, Utc};
use dms::{DmsAnalysis, EventKind, FaceBox, GestureEvent};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::StorageError;

/// Fatigue level after a fatigue verdict
const FATIGUE_VERDICT_LEVEL: u8 = 75;
/// Fatigue level added per yawn
const YAWN_LEVEL_STEP: u8 = 10;
const MAX_FATIGUE_LEVEL: u8 = 100;

/// Processing session state shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    #[default]
    Idle,
    Running,
    Stopped,
    Error,
}

/// Latest driver state plus the newest events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub timestamp: DateTime<Utc>,
    pub face_detected: bool,
    pub hand_detected: bool,
    pub face_box: Option<FaceBox>,
    /// 0 to 100
    pub fatigue_level: u8,
    pub ear: Option<f32>,
    pub mar: Option<f32>,
    pub head_gesture: Option<String>,
    pub current_gesture: Option<String>,
    pub system_status: SystemStatus,
    /// Newest first
    pub events: Vec<GestureEvent>,
    #[serde(skip)]
    max_events: usize,
}

impl StatusSnapshot {
    pub fn new(max_events: usize) -> Self {
        Self {
            max_events,
            ..Default::default()
        }
    }

    /// Copy the per-frame state
    pub fn apply_analysis(&mut self, analysis: &DmsAnalysis) {
        self.timestamp = analysis.timestamp;
        self.face_detected = analysis.face_detected;
        self.hand_detected = analysis.hand_detected;
        self.face_box = analysis.face_box;
        if analysis.ear.is_some() {
            self.ear = analysis.ear;
        }
        if analysis.mar.is_some() {
            self.mar = analysis.mar;
        }
        if analysis.current_gesture.is_some() {
            self.current_gesture = analysis.current_gesture.clone();
        }
    }

    /// Fold one event into the dashboard fields
    pub fn apply_event(&mut self, event: &GestureEvent) {
        self.timestamp = event.timestamp;

        match event.kind {
            EventKind::Nod | EventKind::Shake => {
                self.head_gesture = Some(event.kind.as_str().to_string());
            }
            EventKind::HandGesture => {
                if let Some(label) = &event.label {
                    self.current_gesture = Some(label.clone());
                }
            }
            EventKind::Fatigue => self.fatigue_level = FATIGUE_VERDICT_LEVEL,
            EventKind::Yawn => {
                self.fatigue_level = self
                    .fatigue_level
                    .saturating_add(YAWN_LEVEL_STEP)
                    .min(MAX_FATIGUE_LEVEL);
                if let Some(mar) = event.detail("mar") {
                    self.mar = Some(mar as f32);
                }
            }
            EventKind::Blink | EventKind::Sleep => {
                if let Some(ear) = event.detail("ear") {
                    self.ear = Some(ear as f32);
                }
                if event.kind == EventKind::Sleep {
                    self.fatigue_level = MAX_FATIGUE_LEVEL;
                }
            }
            EventKind::NoFace => {}
        }

        self.events.insert(0, event.clone());
        if self.max_events > 0 {
            self.events.truncate(self.max_events);
        }
    }

    pub fn set_status(&mut self, status: SystemStatus) {
        self.system_status = status;
    }

    /// Write as pretty JSON, replacing the previous file atomically
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        debug!("Status snapshot written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
