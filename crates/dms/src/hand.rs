//! Hand gesture hold tracking
//!
//! A recognised gesture is reported once it has been held for the
//! configured time, and at most once per 10-second wall-clock bucket.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::info;

use crate::detector::HandDetection;
use crate::event::{EventKind, GestureEvent};
use crate::FrameInstant;

/// Width of the de-duplication bucket (seconds)
const REPORT_BUCKET_SECS: i64 = 10;
/// Reported keys kept before trimming
const MAX_REPORTED_KEYS: usize = 100;
/// Reported keys left after trimming
const TRIMMED_REPORTED_KEYS: usize = 50;

#[derive(Debug, Clone)]
struct HeldGesture {
    name: String,
    since: Instant,
}

pub struct HandGestureTracker {
    hold_time: Duration,
    current: Option<HeldGesture>,
    reported: HashSet<String>,
    reported_order: VecDeque<String>,
}

impl HandGestureTracker {
    pub fn new(hold_time: Duration) -> Self {
        Self {
            hold_time,
            current: None,
            reported: HashSet::new(),
            reported_order: VecDeque::new(),
        }
    }

    pub fn hold_time(&self) -> Duration {
        self.hold_time
    }

    pub fn set_hold_time(&mut self, hold_time: Duration) {
        self.hold_time = hold_time;
    }

    /// Name of the gesture currently being held
    pub fn current_gesture(&self) -> Option<&str> {
        self.current.as_ref().map(|held| held.name.as_str())
    }

    /// Feed one frame of hand detections
    pub fn update(&mut self, hands: &[HandDetection], at: FrameInstant) -> Option<GestureEvent> {
        let Some((hand, name)) = hands
            .iter()
            .find_map(|hand| hand.label.as_deref().map(|name| (hand, name)))
        else {
            self.current = None;
            return None;
        };

        let held = match &self.current {
            Some(held) if held.name == name => at.monotonic.saturating_duration_since(held.since),
            _ => {
                self.current = Some(HeldGesture {
                    name: name.to_string(),
                    since: at.monotonic,
                });
                Duration::ZERO
            }
        };

        if held < self.hold_time {
            return None;
        }

        let key = format!("{}_{}", name, at.wall.timestamp().div_euclid(REPORT_BUCKET_SECS));
        if !self.remember(key) {
            return None;
        }

        info!("Hand gesture '{}' held for {:.2}s", name, held.as_secs_f64());
        let [x1, y1, x2, y2] = hand.bbox;
        Some(
            GestureEvent::new(EventKind::HandGesture, at.wall)
                .with_label(name)
                .with_detail("hold_time", held.as_secs_f64())
                .with_detail("hold_threshold", self.hold_time.as_secs_f64())
                .with_detail("bbox_x1", x1)
                .with_detail("bbox_y1", y1)
                .with_detail("bbox_x2", x2)
                .with_detail("bbox_y2", y2),
        )
    }

    /// Record a report key; false when it was already reported
    fn remember(&mut self, key: String) -> bool {
        if !self.reported.insert(key.clone()) {
            return false;
        }
        self.reported_order.push_back(key);

        if self.reported_order.len() > MAX_REPORTED_KEYS {
            while self.reported_order.len() > TRIMMED_REPORTED_KEYS {
                if let Some(old) = self.reported_order.pop_front() {
                    self.reported.remove(&old);
                }
            }
        }
        true
    }

    pub fn reported_keys(&self) -> usize {
        self.reported.len()
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.reported.clear();
        self.reported_order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn hand(label: Option<&str>) -> HandDetection {
        HandDetection {
            label: label.map(str::to_string),
            bbox: [10.0, 20.0, 110.0, 140.0],
            score: 0.9,
        }
    }

    struct Clock {
        mono: Instant,
        wall: chrono::DateTime<Utc>,
    }

    impl Clock {
        fn new() -> Self {
            Self {
                mono: Instant::now(),
                wall: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            }
        }

        fn at(&self, ms: u64) -> FrameInstant {
            FrameInstant {
                monotonic: self.mono + Duration::from_millis(ms),
                wall: self.wall + chrono::Duration::milliseconds(ms as i64),
            }
        }
    }

    #[test]
    fn test_reports_after_hold_time() {
        let clock = Clock::new();
        let mut tracker = HandGestureTracker::new(Duration::from_secs(1));
        let hands = [hand(Some("thumbs_up"))];

        assert!(tracker.update(&hands, clock.at(0)).is_none());
        assert_eq!(tracker.current_gesture(), Some("thumbs_up"));
        assert!(tracker.update(&hands, clock.at(900)).is_none());

        let event = tracker.update(&hands, clock.at(1000)).unwrap();
        assert_eq!(event.kind, EventKind::HandGesture);
        assert_eq!(event.label.as_deref(), Some("thumbs_up"));
        assert_eq!(event.detail("hold_time"), Some(1.0));
        assert_eq!(event.detail("hold_threshold"), Some(1.0));
        assert_eq!(event.detail("bbox_x2"), Some(110.0));
    }

    #[test]
    fn test_once_per_bucket() {
        let clock = Clock::new();
        let mut tracker = HandGestureTracker::new(Duration::from_secs(1));
        let hands = [hand(Some("ok"))];

        tracker.update(&hands, clock.at(0));
        assert!(tracker.update(&hands, clock.at(1000)).is_some());
        assert!(tracker.update(&hands, clock.at(5000)).is_none());
        assert!(tracker.update(&hands, clock.at(9999)).is_none());
        // Next 10 s bucket
        assert!(tracker.update(&hands, clock.at(10_000)).is_some());
    }

    #[test]
    fn test_label_change_restarts_hold() {
        let clock = Clock::new();
        let mut tracker = HandGestureTracker::new(Duration::from_secs(1));

        tracker.update(&[hand(Some("ok"))], clock.at(0));
        tracker.update(&[hand(Some("peace"))], clock.at(800));
        assert!(tracker.update(&[hand(Some("peace"))], clock.at(1200)).is_none());
        let event = tracker.update(&[hand(Some("peace"))], clock.at(1800)).unwrap();
        assert_eq!(event.label.as_deref(), Some("peace"));
    }

    #[test]
    fn test_unlabelled_hand_clears_gesture() {
        let clock = Clock::new();
        let mut tracker = HandGestureTracker::new(Duration::from_secs(1));

        tracker.update(&[hand(Some("ok"))], clock.at(0));
        assert!(tracker.update(&[hand(None)], clock.at(500)).is_none());
        assert_eq!(tracker.current_gesture(), None);
        assert!(tracker.update(&[hand(Some("ok"))], clock.at(1100)).is_none());
        assert!(tracker.update(&[], clock.at(1200)).is_none());
    }

    #[test]
    fn test_first_labelled_hand_wins() {
        let clock = Clock::new();
        let mut tracker = HandGestureTracker::new(Duration::ZERO);
        let event = tracker
            .update(&[hand(None), hand(Some("fist")), hand(Some("ok"))], clock.at(0))
            .unwrap();
        assert_eq!(event.label.as_deref(), Some("fist"));
    }

    #[test]
    fn test_reported_keys_are_trimmed() {
        let clock = Clock::new();
        let mut tracker = HandGestureTracker::new(Duration::ZERO);

        for i in 0..101u64 {
            let name = format!("g{}", i);
            tracker.update(&[hand(Some(&name))], clock.at(i));
        }
        assert_eq!(tracker.reported_keys(), TRIMMED_REPORTED_KEYS);

        // Recent keys survive the trim
        assert!(tracker.update(&[hand(Some("g100"))], clock.at(200)).is_none());
    }
}
