//! Detection events and the sink they are handed to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Kind of detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Nod,
    Shake,
    Yawn,
    Blink,
    Sleep,
    Fatigue,
    HandGesture,
    NoFace,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Nod,
        EventKind::Shake,
        EventKind::Yawn,
        EventKind::Blink,
        EventKind::Sleep,
        EventKind::Fatigue,
        EventKind::HandGesture,
        EventKind::NoFace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Nod => "nod",
            EventKind::Shake => "shake",
            EventKind::Yawn => "yawn",
            EventKind::Blink => "blink",
            EventKind::Sleep => "sleep",
            EventKind::Fatigue => "fatigue",
            EventKind::HandGesture => "hand_gesture",
            EventKind::NoFace => "no_face",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Hand gesture name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub details: BTreeMap<String, f64>,
}

impl GestureEvent {
    pub fn new(kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp,
            label: None,
            details: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<f64>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<f64> {
        self.details.get(key).copied()
    }
}

/// Consumer of detection events.
///
/// Called from the processing thread, so implementations must not block:
/// queue the event and return.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &GestureEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert_eq!(EventKind::parse("wave"), None);
    }

    #[test]
    fn test_event_builder() {
        let event = GestureEvent::new(EventKind::HandGesture, Utc::now())
            .with_label("thumbs_up")
            .with_detail("hold_time", 1.2f32)
            .with_detail("bbox_x1", 10u32);

        assert_eq!(event.label.as_deref(), Some("thumbs_up"));
        assert!((event.detail("hold_time").unwrap() - 1.2).abs() < 1e-6);
        assert_eq!(event.detail("bbox_x1"), Some(10.0));
        assert_eq!(event.detail("missing"), None);
    }
}
