//! Nod / shake motion classification

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::GestureConfig;
use crate::trajectory::TrajectoryBuffer;

/// Discrete head gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadGesture {
    Nod,
    Shake,
}

impl HeadGesture {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeadGesture::Nod => "nod",
            HeadGesture::Shake => "shake",
        }
    }
}

/// Motion measured over the current trajectory window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSummary {
    pub total_x: f32,
    pub total_y: f32,
    pub total_displacement: f32,
    pub track_points: usize,
    pub direction_samples: usize,
    pub direction_changes: usize,
}

impl MotionSummary {
    fn measure(buffer: &TrajectoryBuffer) -> Option<Self> {
        let (first, last) = (buffer.first()?, buffer.last()?);
        let total_x = last.x - first.x;
        let total_y = last.y - first.y;
        Some(Self {
            total_x,
            total_y,
            total_displacement: (total_x * total_x + total_y * total_y).sqrt(),
            track_points: buffer.len(),
            direction_samples: buffer.direction_len(),
            direction_changes: buffer.direction_changes(),
        })
    }

    /// Share of |x| and |y| in |x|+|y|; both zero for no motion
    pub fn axis_ratios(&self) -> (f32, f32) {
        let sum = self.total_x.abs() + self.total_y.abs();
        if sum == 0.0 {
            return (0.0, 0.0);
        }
        let x_ratio = self.total_x.abs() / sum;
        (x_ratio, 1.0 - x_ratio)
    }
}

/// Accepted gesture with the motion that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureDetection {
    pub gesture: HeadGesture,
    pub motion: MotionSummary,
    /// Threshold of the axis that fired
    pub threshold: f32,
}

/// Classifies accumulated trajectories, enforcing a cooldown between
/// accepted gestures.
#[derive(Debug, Clone)]
pub struct MotionClassifier {
    last_detection: Option<Instant>,
    last_motion: Option<MotionSummary>,
}

impl MotionClassifier {
    pub fn new() -> Self {
        Self {
            last_detection: None,
            last_motion: None,
        }
    }

    /// True once the cooldown since the last accepted gesture has elapsed
    pub fn ready(&self, now: Instant, cooldown: Duration) -> bool {
        match self.last_detection {
            Some(last) => now.saturating_duration_since(last) >= cooldown,
            None => true,
        }
    }

    /// Motion measured by the latest classification attempt past the sample gate
    pub fn last_motion(&self) -> Option<MotionSummary> {
        self.last_motion
    }

    /// Decide whether the buffered motion is a nod, a shake, or nothing
    pub fn classify(
        &mut self,
        buffer: &TrajectoryBuffer,
        now: Instant,
        config: &GestureConfig,
    ) -> Option<GestureDetection> {
        if !self.ready(now, config.cooldown) {
            return None;
        }
        if buffer.len() < config.min_samples {
            return None;
        }

        let motion = MotionSummary::measure(buffer)?;
        self.last_motion = Some(motion);

        let abs_x = motion.total_x.abs();
        let abs_y = motion.total_y.abs();
        if abs_x + abs_y < config.min_motion() {
            return None;
        }
        if motion.total_displacement < config.min_displacement() {
            return None;
        }

        let (x_ratio, y_ratio) = motion.axis_ratios();
        let y_dominant = y_ratio > x_ratio * config.dominance_ratio;
        let x_dominant = x_ratio > y_ratio * config.dominance_ratio;

        // A disabled gesture still starts the cooldown, it just goes unreported
        if y_dominant && abs_y > config.nod_threshold && abs_y > motion.total_displacement * 0.7 {
            debug!("Nod: dy={:.1} disp={:.1}", motion.total_y, motion.total_displacement);
            self.last_detection = Some(now);
            if !config.nod_enabled {
                return None;
            }
            return Some(GestureDetection {
                gesture: HeadGesture::Nod,
                motion,
                threshold: config.nod_threshold,
            });
        }

        // A single sustained pan has no reversals and must not count as shaking
        if x_dominant
            && abs_x > config.shake_threshold
            && motion.direction_changes >= config.direction_changes
        {
            debug!(
                "Shake: dx={:.1} reversals={}",
                motion.total_x, motion.direction_changes
            );
            self.last_detection = Some(now);
            if !config.shake_enabled {
                return None;
            }
            return Some(GestureDetection {
                gesture: HeadGesture::Shake,
                motion,
                threshold: config.shake_threshold,
            });
        }

        None
    }

    /// Forget the last detection time
    pub fn reset(&mut self) {
        self.last_detection = None;
        self.last_motion = None;
    }
}

impl Default for MotionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::TrackedPoint;
    use proptest::prelude::*;

    fn trajectory(points: &[(f32, f32)]) -> TrajectoryBuffer {
        let config = GestureConfig::default();
        let mut buffer = TrajectoryBuffer::new(config.tracking_frames, config.direction_history, config.min_move);
        for &(x, y) in points {
            buffer.append(TrackedPoint::new(x, y));
        }
        buffer
    }

    fn vertical(total_y: f32) -> TrajectoryBuffer {
        let steps: Vec<(f32, f32)> = (0..=5).map(|i| (100.0, 100.0 + total_y * i as f32 / 5.0)).collect();
        trajectory(&steps)
    }

    fn oscillating(total_x: f32) -> TrajectoryBuffer {
        // +10, -6, +8, then the remainder in two equal steps: two reversals
        let rest = (total_x - 12.0) / 2.0;
        let xs = [0.0, 10.0, 4.0, 12.0, 12.0 + rest, total_x];
        trajectory(&xs.iter().map(|&x| (200.0 + x, 50.0)).collect::<Vec<_>>())
    }

    #[test]
    fn test_nod_fires() {
        let mut classifier = MotionClassifier::new();
        let config = GestureConfig::default();

        let detection = classifier.classify(&vertical(40.0), Instant::now(), &config).unwrap();
        assert_eq!(detection.gesture, HeadGesture::Nod);
        assert!((detection.motion.total_y - 40.0).abs() < 1e-3);
        assert_eq!(detection.threshold, 35.0);
    }

    #[test]
    fn test_upward_nod_fires() {
        let mut classifier = MotionClassifier::new();
        let detection = classifier.classify(&vertical(-38.0), Instant::now(), &GestureConfig::default());
        assert_eq!(detection.map(|d| d.gesture), Some(HeadGesture::Nod));
    }

    #[test]
    fn test_nod_below_threshold() {
        let mut classifier = MotionClassifier::new();
        // Passes both floors (30 >= 21, 30 >= 28) but not the 35 px threshold
        assert!(classifier.classify(&vertical(30.0), Instant::now(), &GestureConfig::default()).is_none());
    }

    #[test]
    fn test_insufficient_samples() {
        let mut classifier = MotionClassifier::new();
        let buffer = trajectory(&[(0.0, 0.0), (0.0, 20.0), (0.0, 40.0), (0.0, 60.0)]);
        assert!(classifier.classify(&buffer, Instant::now(), &GestureConfig::default()).is_none());
        assert!(classifier.last_motion().is_none());
    }

    #[test]
    fn test_shake_fires_with_reversals() {
        let mut classifier = MotionClassifier::new();
        let buffer = oscillating(30.0);
        assert_eq!(buffer.direction_changes(), 2);

        let detection = classifier.classify(&buffer, Instant::now(), &GestureConfig::default()).unwrap();
        assert_eq!(detection.gesture, HeadGesture::Shake);
        assert_eq!(detection.threshold, 10.0);
    }

    #[test]
    fn test_small_shake_needs_lower_nod_floor() {
        // |dx| = 15 is under the default 21 px / 28 px motion floors
        let buffer = oscillating(15.0);
        let mut classifier = MotionClassifier::new();
        assert!(classifier.classify(&buffer, Instant::now(), &GestureConfig::default()).is_none());

        let sensitive = GestureConfig {
            nod_threshold: 15.0,
            ..Default::default()
        };
        let mut classifier = MotionClassifier::new();
        let detection = classifier.classify(&buffer, Instant::now(), &sensitive);
        assert_eq!(detection.map(|d| d.gesture), Some(HeadGesture::Shake));
    }

    #[test]
    fn test_pan_without_reversals_is_not_shake() {
        let mut classifier = MotionClassifier::new();
        let pan: Vec<(f32, f32)> = (0..6).map(|i| (i as f32 * 8.0, 0.0)).collect();
        assert!(classifier.classify(&trajectory(&pan), Instant::now(), &GestureConfig::default()).is_none());
    }

    #[test]
    fn test_diagonal_motion_is_ambiguous() {
        let mut classifier = MotionClassifier::new();
        let diagonal: Vec<(f32, f32)> = (0..6).map(|i| (i as f32 * 8.0, i as f32 * 8.0)).collect();
        assert!(classifier.classify(&trajectory(&diagonal), Instant::now(), &GestureConfig::default()).is_none());
    }

    #[test]
    fn test_cooldown_blocks_any_input() {
        let mut classifier = MotionClassifier::new();
        let config = GestureConfig::default();
        let t0 = Instant::now();

        assert!(classifier.classify(&vertical(40.0), t0, &config).is_some());
        assert!(!classifier.ready(t0 + Duration::from_millis(100), config.cooldown));
        assert!(classifier.classify(&vertical(60.0), t0 + Duration::from_millis(500), &config).is_none());
        assert!(classifier.classify(&oscillating(40.0), t0 + Duration::from_millis(1499), &config).is_none());
        assert!(classifier.classify(&vertical(40.0), t0 + Duration::from_millis(1500), &config).is_some());
    }

    #[test]
    fn test_disabled_gesture_still_starts_cooldown() {
        let mut classifier = MotionClassifier::new();
        let config = GestureConfig {
            nod_enabled: false,
            ..Default::default()
        };
        let t0 = Instant::now();
        assert!(classifier.classify(&vertical(40.0), t0, &config).is_none());
        assert!(!classifier.ready(t0 + Duration::from_millis(500), config.cooldown));

        // Once re-enabled, the next nod still waits out the cooldown
        let enabled = GestureConfig::default();
        assert!(classifier
            .classify(&vertical(40.0), t0 + Duration::from_millis(500), &enabled)
            .is_none());
        assert!(classifier
            .classify(&vertical(40.0), t0 + Duration::from_millis(1600), &enabled)
            .is_some());
    }

    #[test]
    fn test_axis_ratios_zero_motion() {
        let motion = MotionSummary::default();
        assert_eq!(motion.axis_ratios(), (0.0, 0.0));
    }

    proptest! {
        #[test]
        fn prop_small_motion_never_classifies(
            dx in -10.4f32..10.4,
            dy in -10.4f32..10.4,
            wobble in proptest::collection::vec(-30.0f32..30.0, 4..13),
        ) {
            // Interior points are arbitrary; only the endpoints bound |dx|+|dy| < 21
            let mut points = vec![(0.0, 0.0)];
            points.extend(wobble.iter().enumerate().map(|(i, w)| (*w, if i % 2 == 0 { *w } else { -*w })));
            points.push((dx, dy));

            let mut classifier = MotionClassifier::new();
            prop_assert!(classifier
                .classify(&trajectory(&points), Instant::now(), &GestureConfig::default())
                .is_none());
        }
    }
}
