//! Head gesture tracking state machine
//!
//! `Idle` waits for a face box, `Tracking` follows one point with optical
//! flow and classifies the trajectory, `WaitSuppressed` skips all head
//! processing for a fixed window after a nod or shake.

use image::GrayImage;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::classifier::{GestureDetection, MotionClassifier};
use crate::config::GestureConfig;
use crate::flow::{PointTracker, PyramidalLk};
use crate::trajectory::{TrackedPoint, TrajectoryBuffer};
use crate::GestureError;

/// Face bounding box in frame pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceRegion {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Point followed by the tracker: box center pushed down by a fifth of the height
    pub fn anchor(&self) -> TrackedPoint {
        TrackedPoint::new(
            self.x + self.width / 2.0,
            self.y + self.height / 2.0 + self.height / 5.0,
        )
    }
}

/// Tracking phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerPhase {
    /// No anchor; waiting for a face box
    Idle,
    /// Following the anchor
    Tracking {
        anchor: TrackedPoint,
        lost_frames: u32,
    },
    /// Head gesture processing paused after a detection
    WaitSuppressed {
        anchor: TrackedPoint,
        until: Instant,
    },
}

/// Nod/shake detector for one camera session
pub struct HeadGestureDetector<T: PointTracker = PyramidalLk> {
    config: GestureConfig,
    tracker: T,
    classifier: MotionClassifier,
    trajectory: TrajectoryBuffer,
    phase: TrackerPhase,
    prev_frame: Option<GrayImage>,
}

impl HeadGestureDetector<PyramidalLk> {
    /// Create a detector using the Lucas-Kanade tracker
    pub fn new(config: GestureConfig) -> Self {
        Self::with_tracker(config, PyramidalLk::new())
    }
}

impl<T: PointTracker> HeadGestureDetector<T> {
    /// Create a detector with a custom point tracker
    pub fn with_tracker(config: GestureConfig, tracker: T) -> Self {
        let trajectory = TrajectoryBuffer::new(
            config.tracking_frames,
            config.direction_history,
            config.min_move,
        );
        Self {
            config,
            tracker,
            classifier: MotionClassifier::new(),
            trajectory,
            phase: TrackerPhase::Idle,
            prev_frame: None,
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    pub fn trajectory(&self) -> &TrajectoryBuffer {
        &self.trajectory
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// False while the classifier cooldown is running
    pub fn ready_for_detection(&self, now: Instant) -> bool {
        self.classifier.ready(now, self.config.cooldown)
    }

    /// Process a frame in which a face was found
    pub fn on_face(&mut self, gray: &GrayImage, face: &FaceRegion, now: Instant) -> Option<GestureDetection> {
        match self.phase {
            TrackerPhase::WaitSuppressed { anchor, until } => {
                if now >= until {
                    info!("Head gesture detection resumed");
                    self.phase = TrackerPhase::Tracking {
                        anchor,
                        lost_frames: 0,
                    };
                }
                return None;
            }
            TrackerPhase::Idle => {
                self.acquire(gray, face);
                return None;
            }
            TrackerPhase::Tracking { .. } => {}
        }

        let Some(last) = self.trajectory.last() else {
            self.acquire(gray, face);
            return None;
        };
        let Some(prev) = self.prev_frame.as_ref() else {
            self.acquire(gray, face);
            return None;
        };

        match self.tracker.track(prev, gray, last) {
            Ok(point) => {
                self.trajectory.append(point);
                self.prev_frame = Some(gray.clone());
                if let TrackerPhase::Tracking { lost_frames, .. } = &mut self.phase {
                    *lost_frames = 0;
                }

                let detection = self.classifier.classify(&self.trajectory, now, &self.config)?;
                info!(
                    "Head gesture: {} (dx={:.1}, dy={:.1})",
                    detection.gesture.as_str(),
                    detection.motion.total_x,
                    detection.motion.total_y
                );
                self.enter_suppression(now);
                Some(detection)
            }
            Err(e) => {
                debug!("Point tracking failed: {}", e);
                self.prev_frame = Some(gray.clone());
                self.register_loss();
                None
            }
        }
    }

    /// Process a frame without a face
    pub fn on_face_missing(&mut self, now: Instant) {
        match self.phase {
            TrackerPhase::Tracking { .. } => self.register_loss(),
            TrackerPhase::WaitSuppressed { anchor, until } if now >= until => {
                self.phase = TrackerPhase::Tracking {
                    anchor,
                    lost_frames: 0,
                };
                self.register_loss();
            }
            _ => {}
        }
    }

    /// Change the nod threshold; in-flight trajectory and directions are dropped
    pub fn set_nod_sensitivity(&mut self, value: u32) -> Result<(), GestureError> {
        self.config.nod_threshold = GestureConfig::check_nod_sensitivity(value)?;
        let resume_from = self.anchor();
        self.trajectory.clear();
        if let Some(point) = resume_from {
            // Keep following the current point instead of waiting for a new face box
            self.trajectory.append(point);
        }
        info!("Nod threshold set to {} px", value);
        Ok(())
    }

    /// Change the minimum time between accepted gestures
    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.config.cooldown = cooldown;
        info!("Gesture cooldown set to {:.1}s", cooldown.as_secs_f32());
    }

    /// Enable or disable nod and shake reporting
    pub fn set_enabled(&mut self, nod: bool, shake: bool) {
        self.config.nod_enabled = nod;
        self.config.shake_enabled = shake;
    }

    /// Drop all state (new session or driver change)
    pub fn reset(&mut self) {
        self.phase = TrackerPhase::Idle;
        self.trajectory.clear();
        self.prev_frame = None;
        self.classifier.reset();
    }

    fn anchor(&self) -> Option<TrackedPoint> {
        match self.phase {
            TrackerPhase::Idle => None,
            TrackerPhase::Tracking { anchor, .. } | TrackerPhase::WaitSuppressed { anchor, .. } => {
                Some(self.trajectory.last().unwrap_or(anchor))
            }
        }
    }

    fn acquire(&mut self, gray: &GrayImage, face: &FaceRegion) {
        let anchor = face.anchor();
        // Directions from an earlier track must not count toward this one
        self.trajectory.clear();
        self.trajectory.append(anchor);
        self.prev_frame = Some(gray.clone());
        self.phase = TrackerPhase::Tracking {
            anchor,
            lost_frames: 0,
        };
        debug!("Tracking anchor at ({:.1}, {:.1})", anchor.x, anchor.y);
    }

    fn register_loss(&mut self) {
        if let TrackerPhase::Tracking { lost_frames, .. } = &mut self.phase {
            *lost_frames += 1;
            if *lost_frames > self.config.max_lost_frames {
                debug!("Track dropped after {} lost frames", lost_frames);
                self.phase = TrackerPhase::Idle;
                self.trajectory.clear();
                self.prev_frame = None;
            }
        }
    }

    fn enter_suppression(&mut self, now: Instant) {
        self.trajectory.retain_last();
        self.trajectory.clear_directions();
        let anchor = self.anchor().unwrap_or_default();
        self.phase = TrackerPhase::WaitSuppressed {
            anchor,
            until: now + self.config.suppression,
        };
    }
}
