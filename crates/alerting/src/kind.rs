//! Alert kinds

use dms::{EventKind, GestureEvent};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to notify the driver about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Nod,
    Shake,
    Yawn,
    Fatigue,
    Sleep,
    NoFace,
    HandGesture(String),
}

impl AlertKind {
    /// Alert for a detection event; blinks are silent
    pub fn from_event(event: &GestureEvent) -> Option<Self> {
        let kind = match event.kind {
            EventKind::Nod => AlertKind::Nod,
            EventKind::Shake => AlertKind::Shake,
            EventKind::Yawn => AlertKind::Yawn,
            EventKind::Fatigue => AlertKind::Fatigue,
            EventKind::Sleep => AlertKind::Sleep,
            EventKind::NoFace => AlertKind::NoFace,
            EventKind::HandGesture => AlertKind::HandGesture(event.label.clone()?),
            EventKind::Blink => return None,
        };
        Some(kind)
    }

    /// Sound file stem relative to the library root
    pub fn sound_base(&self) -> String {
        match self {
            AlertKind::Nod => "Nod".to_string(),
            AlertKind::Shake => "Shake".to_string(),
            AlertKind::Yawn | AlertKind::Fatigue => "Tired".to_string(),
            AlertKind::Sleep => "Sleep".to_string(),
            AlertKind::NoFace => "NoFace".to_string(),
            AlertKind::HandGesture(name) => format!("gestures/{}", name),
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::HandGesture(name) => write!(f, "gesture_{}", name),
            AlertKind::Nod => f.write_str("nod"),
            AlertKind::Shake => f.write_str("shake"),
            AlertKind::Yawn => f.write_str("yawn"),
            AlertKind::Fatigue => f.write_str("fatigue"),
            AlertKind::Sleep => f.write_str("sleep"),
            AlertKind::NoFace => f.write_str("no_face"),
        }
    }
}
