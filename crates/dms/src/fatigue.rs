//! Blink, sleep, yawn and fatigue aggregation
//!
//! Eye and mouth counters run independently on every analysed face frame.
//! A yawn is counted when the mouth closes again after being open for at
//! least `mouth_ar_consec_frames`. A run of `yawns_for_fatigue` yawns whose
//! first and last timestamps lie strictly inside `(0, fatigue_window)`
//! produces a fatigue verdict and starts a new run.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::FatigueConfig;
use crate::event::{EventKind, GestureEvent};
use crate::state::FatigueState;

pub struct FatigueAggregator {
    config: FatigueConfig,
    state: FatigueState,
}

impl FatigueAggregator {
    pub fn new(config: FatigueConfig) -> Self {
        Self {
            config,
            state: FatigueState::default(),
        }
    }

    pub fn state(&self) -> &FatigueState {
        &self.state
    }

    pub fn config(&self) -> &FatigueConfig {
        &self.config
    }

    /// Feed one frame's ratios; returns the events it completed
    pub fn update(&mut self, ear: f32, mar: f32, now: DateTime<Utc>) -> Vec<GestureEvent> {
        let mut events = Vec::new();
        if let Some(event) = self.update_eyes(ear, now) {
            events.push(event);
        }
        events.extend(self.update_mouth(mar, now));
        events
    }

    fn update_eyes(&mut self, ear: f32, now: DateTime<Utc>) -> Option<GestureEvent> {
        let state = &mut self.state;

        if ear < self.config.eye_ar_threshold {
            // One sleep per closure; frames after it are not counted
            if state.eyes_shut {
                return None;
            }
            state.closed_eye_frames += 1;
            if state.closed_eye_frames >= self.config.eye_ar_consec_frames {
                let frames = state.closed_eye_frames;
                state.closed_eye_frames = 0;
                state.eyes_shut = true;
                info!("Sleep detected: eyes closed for {} frames", frames);
                return Some(
                    GestureEvent::new(EventKind::Sleep, now)
                        .with_detail("frames_count", frames)
                        .with_detail("threshold_frames", self.config.eye_ar_consec_frames),
                );
            }
            return None;
        }

        let frames = state.closed_eye_frames;
        let was_shut = state.eyes_shut;
        state.closed_eye_frames = 0;
        state.eyes_shut = false;

        if !was_shut
            && frames >= self.config.blink_min_frames
            && frames < self.config.eye_ar_consec_frames
        {
            state.blink_total += 1;
            info!("Blink detected: {} frames, EAR {:.3}", frames, ear);
            return Some(
                GestureEvent::new(EventKind::Blink, now)
                    .with_detail("frames_count", frames)
                    .with_detail("ear", ear)
                    .with_detail("threshold", self.config.eye_ar_threshold),
            );
        }
        None
    }

    fn update_mouth(&mut self, mar: f32, now: DateTime<Utc>) -> Vec<GestureEvent> {
        if mar > self.config.mouth_ar_threshold {
            self.state.open_mouth_frames += 1;
            if self.state.open_mouth_frames >= self.config.mouth_ar_consec_frames && !self.state.yawning {
                debug!("Mouth open for {} frames", self.state.open_mouth_frames);
                self.state.yawning = true;
            }
            return Vec::new();
        }

        let frames = self.state.open_mouth_frames;
        let completed = self.state.yawning;
        self.state.open_mouth_frames = 0;
        self.state.yawning = false;

        if completed {
            self.complete_yawn(frames, mar, now)
        } else {
            Vec::new()
        }
    }

    fn complete_yawn(&mut self, frames: u32, mar: f32, now: DateTime<Utc>) -> Vec<GestureEvent> {
        let required = self.config.yawns_for_fatigue.max(1);
        let state = &mut self.state;

        if state.yawn_count == 0 {
            state.first_yawn = Some(now);
        }
        state.yawn_count += 1;
        info!("Yawn #{} completed after {} frames", state.yawn_count, frames);

        let mut events = vec![GestureEvent::new(EventKind::Yawn, now)
            .with_detail("counter", state.yawn_count)
            .with_detail("mar", mar)
            .with_detail("threshold", self.config.mouth_ar_threshold)
            .with_detail("frames_count", frames)];

        if state.yawn_count < required {
            return events;
        }
        state.last_yawn = Some(now);

        let (Some(first), Some(last)) = (state.first_yawn, state.last_yawn) else {
            return events;
        };
        let elapsed = (last - first).num_milliseconds() as f64 / 1000.0;
        let window = self.config.fatigue_window.as_secs_f64();

        if elapsed > 0.0 && elapsed < window {
            info!(
                "Fatigue detected: {} yawns in {:.1}s",
                state.yawn_count, elapsed
            );
            events.push(
                GestureEvent::new(EventKind::Fatigue, now)
                    .with_detail("yawn_count", state.yawn_count)
                    .with_detail("threshold_count", required)
                    .with_detail("time_window", elapsed)
                    .with_detail("max_time_window", window)
                    .with_detail("first_yawn_time", unix_seconds(first))
                    .with_detail("last_yawn_time", unix_seconds(last)),
            );
            state.clear_yawn_run();
        } else if elapsed >= window {
            // Too slow to be fatigue: this yawn opens a new run
            debug!("Yawn run spanned {:.1}s, restarting", elapsed);
            state.yawn_count = 1;
            state.first_yawn = Some(now);
            state.last_yawn = None;
        }
        events
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }
}

fn unix_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn run_ear(agg: &mut FatigueAggregator, seq: &[(f32, usize)]) -> Vec<GestureEvent> {
        let mut events = Vec::new();
        for &(ear, n) in seq {
            for _ in 0..n {
                events.extend(agg.update(ear, 0.2, t0()));
            }
        }
        events
    }

    /// One full yawn cycle ending at `at`: 15 open frames, then closure
    fn yawn(agg: &mut FatigueAggregator, at: DateTime<Utc>) -> Vec<GestureEvent> {
        let mut events = Vec::new();
        for _ in 0..15 {
            events.extend(agg.update(0.3, 0.7, at));
        }
        events.extend(agg.update(0.3, 0.3, at));
        events
    }

    fn kinds(events: &[GestureEvent]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_long_closure_is_one_sleep() {
        let mut agg = FatigueAggregator::new(FatigueConfig::default());
        let events = run_ear(&mut agg, &[(0.30, 10), (0.15, 65), (0.30, 1)]);

        assert_eq!(kinds(&events), vec![EventKind::Sleep]);
        assert_eq!(events[0].detail("frames_count"), Some(60.0));
        assert_eq!(events[0].detail("threshold_frames"), Some(60.0));
        assert_eq!(agg.state().closed_eye_frames, 0);
        assert!(!agg.state().eyes_shut);
    }

    #[test]
    fn test_short_closure_is_one_blink() {
        let mut agg = FatigueAggregator::new(FatigueConfig::default());
        let events = run_ear(&mut agg, &[(0.30, 5), (0.15, 10), (0.30, 5)]);

        assert_eq!(kinds(&events), vec![EventKind::Blink]);
        assert_eq!(events[0].detail("frames_count"), Some(10.0));
        assert!((events[0].detail("ear").unwrap() - 0.30).abs() < 1e-6);
        assert_eq!(agg.state().blink_total, 1);
    }

    #[test]
    fn test_flicker_is_not_a_blink() {
        let mut agg = FatigueAggregator::new(FatigueConfig::default());
        let events = run_ear(&mut agg, &[(0.15, 4), (0.30, 1)]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_yawn_counted_once_on_falling_edge() {
        let mut agg = FatigueAggregator::new(FatigueConfig::default());

        let mut events = Vec::new();
        for _ in 0..40 {
            events.extend(agg.update(0.3, 0.8, t0()));
        }
        assert!(events.is_empty());
        assert!(agg.state().yawning);

        events.extend(agg.update(0.3, 0.2, t0()));
        events.extend(agg.update(0.3, 0.2, t0()));
        assert_eq!(kinds(&events), vec![EventKind::Yawn]);
        assert_eq!(events[0].detail("frames_count"), Some(40.0));
        assert_eq!(events[0].detail("counter"), Some(1.0));
        assert_eq!(agg.state().first_yawn, Some(t0()));
    }

    #[test]
    fn test_short_mouth_opening_is_not_a_yawn() {
        let mut agg = FatigueAggregator::new(FatigueConfig::default());
        let mut events = Vec::new();
        for _ in 0..14 {
            events.extend(agg.update(0.3, 0.8, t0()));
        }
        events.extend(agg.update(0.3, 0.2, t0()));
        assert!(events.is_empty());
        assert_eq!(agg.state().yawn_count, 0);
    }

    #[test]
    fn test_four_yawns_in_window_fire_fatigue() {
        let mut agg = FatigueAggregator::new(FatigueConfig::default());
        let mut events = Vec::new();
        for offset in [0, 50, 110, 170] {
            events.extend(yawn(&mut agg, t0() + Duration::seconds(offset)));
        }

        assert_eq!(
            kinds(&events),
            vec![EventKind::Yawn, EventKind::Yawn, EventKind::Yawn, EventKind::Yawn, EventKind::Fatigue]
        );
        let fatigue = events.last().unwrap();
        assert_eq!(fatigue.detail("yawn_count"), Some(4.0));
        assert_eq!(fatigue.detail("time_window"), Some(170.0));
        assert_eq!(fatigue.detail("max_time_window"), Some(180.0));
        assert_eq!(fatigue.detail("first_yawn_time"), Some(t0().timestamp() as f64));
        assert_eq!(agg.state().yawn_count, 0);
        assert!(agg.state().first_yawn.is_none());
    }

    #[test]
    fn test_zero_second_window_does_not_fire() {
        let mut agg = FatigueAggregator::new(FatigueConfig::default());
        let mut events = Vec::new();
        for _ in 0..4 {
            events.extend(yawn(&mut agg, t0()));
        }
        assert!(!kinds(&events).contains(&EventKind::Fatigue));
        assert_eq!(agg.state().yawn_count, 4);

        // A later yawn gives the run a positive span
        let events = yawn(&mut agg, t0() + Duration::seconds(20));
        assert_eq!(kinds(&events), vec![EventKind::Yawn, EventKind::Fatigue]);
    }

    #[test]
    fn test_inverted_window_does_not_fire() {
        let mut agg = FatigueAggregator::new(FatigueConfig::default());
        let mut events = Vec::new();
        for offset in [0, -10, -20, -30] {
            events.extend(yawn(&mut agg, t0() + Duration::seconds(offset)));
        }
        assert!(!kinds(&events).contains(&EventKind::Fatigue));
    }

    #[test]
    fn test_slow_yawns_restart_run() {
        let mut agg = FatigueAggregator::new(FatigueConfig::default());
        let mut events = Vec::new();
        for offset in [0, 60, 120, 180] {
            events.extend(yawn(&mut agg, t0() + Duration::seconds(offset)));
        }
        assert!(!kinds(&events).contains(&EventKind::Fatigue));
        assert_eq!(agg.state().yawn_count, 1);
        assert_eq!(agg.state().first_yawn, Some(t0() + Duration::seconds(180)));
    }

    #[test]
    fn test_eye_and_mouth_counters_are_independent() {
        let mut agg = FatigueAggregator::new(FatigueConfig::default());
        for _ in 0..20 {
            agg.update(0.1, 0.9, t0());
        }
        assert_eq!(agg.state().closed_eye_frames, 20);
        assert_eq!(agg.state().open_mouth_frames, 20);

        let events = agg.update(0.3, 0.1, t0());
        assert_eq!(kinds(&events), vec![EventKind::Blink, EventKind::Yawn]);
    }
}
