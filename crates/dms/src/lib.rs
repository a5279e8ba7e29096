//! Driver Monitoring System (DMS)
//!
//! Per-frame driver state analysis for the cockpit monitor:
//! - Eye and mouth aspect ratios from facial landmarks
//! - Blink, sleep, yawn and fatigue detection
//! - Nod / shake head gestures via optical-flow tracking
//! - Hand gesture hold detection
//! - Out-of-range (no driver visible) detection

pub mod analysis;
pub mod config;
pub mod detector;
pub mod event;
pub mod fatigue;
pub mod hand;
pub mod landmarks;
pub mod state;

pub use analysis::{DmsAnalysis, FramePass};
pub use config::{DmsConfig, FatigueConfig};
pub use detector::{FaceBox, FaceDetector, HandDetection, HandDetector, LandmarkPredictor, TraceReplay};
pub use event::{EventKind, EventSink, GestureEvent};
pub use fatigue::FatigueAggregator;
pub use hand::HandGestureTracker;
pub use landmarks::{FaceLandmarks, Point2};
pub use state::FatigueState;

use camera_capture::VideoFrame;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use head_gesture::{GestureDetection, GestureError, HeadGesture, HeadGestureDetector, PointTracker, PyramidalLk};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Minimum spacing of repeated landmark failure logs
const LANDMARK_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("Detection failed: {0}")]
    Detection(String),

    #[error("Invalid landmarks: {0}")]
    Landmarks(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Gesture(#[from] GestureError),
}

/// Frame time on both clocks: monotonic for gesture timing, wall for events
#[derive(Debug, Clone, Copy)]
pub struct FrameInstant {
    pub monotonic: Instant,
    pub wall: DateTime<Utc>,
}

impl FrameInstant {
    pub fn now() -> Self {
        Self {
            monotonic: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// External detector collaborators; `None` means the model is not available
#[derive(Clone, Default)]
pub struct Detectors {
    pub faces: Option<Arc<dyn FaceDetector>>,
    pub landmarks: Option<Arc<dyn LandmarkPredictor>>,
    pub hands: Option<Arc<dyn HandDetector>>,
}

impl Detectors {
    /// All three roles served by one recorded trace
    pub fn from_trace(trace: TraceReplay) -> Self {
        let trace = Arc::new(trace);
        Self {
            faces: Some(trace.clone()),
            landmarks: Some(trace.clone()),
            hands: Some(trace),
        }
    }
}

/// Driver monitoring module
pub struct DmsModule<T: PointTracker = PyramidalLk> {
    config: DmsConfig,
    detectors: Detectors,
    head: HeadGestureDetector<T>,
    fatigue: FatigueAggregator,
    hands: HandGestureTracker,
    frame_index: u64,
    face_visible: bool,
    hand_visible: bool,
    face_box: Option<FaceBox>,
    face_box_age: u32,
    ear: Option<f32>,
    mar: Option<f32>,
    last_presence: Option<Instant>,
    out_of_range_reported: bool,
    landmark_log: DefaultDirectRateLimiter,
}

impl DmsModule {
    /// Create a new DMS module with configuration
    pub fn new(config: DmsConfig, detectors: Detectors) -> Result<Self, DmsError> {
        Self::with_tracker(config, detectors, PyramidalLk::new())
    }
}

impl<T: PointTracker> DmsModule<T> {
    pub fn with_tracker(mut config: DmsConfig, detectors: Detectors, tracker: T) -> Result<Self, DmsError> {
        if config.gesture.tracking_frames < config.gesture.min_samples {
            return Err(DmsError::Config(format!(
                "tracking window {} is shorter than the {} samples needed to classify",
                config.gesture.tracking_frames, config.gesture.min_samples
            )));
        }

        if detectors.faces.is_none() && (config.fatigue_enabled || config.head_gesture_enabled) {
            warn!("No face detector available, face analysis disabled");
            config.fatigue_enabled = false;
            config.head_gesture_enabled = false;
        }
        if detectors.landmarks.is_none() && config.fatigue_enabled {
            warn!("No landmark predictor available, fatigue detection disabled");
            config.fatigue_enabled = false;
        }
        if detectors.hands.is_none() && config.hand_enabled {
            warn!("No hand detector available, hand gestures disabled");
            config.hand_enabled = false;
        }

        Ok(Self {
            head: HeadGestureDetector::with_tracker(config.gesture.clone(), tracker),
            fatigue: FatigueAggregator::new(config.fatigue.clone()),
            hands: HandGestureTracker::new(config.hand_hold_time),
            detectors,
            frame_index: 0,
            face_visible: false,
            hand_visible: false,
            face_box: None,
            face_box_age: 0,
            ear: None,
            mar: None,
            last_presence: None,
            out_of_range_reported: false,
            landmark_log: RateLimiter::direct(
                Quota::with_period(LANDMARK_LOG_INTERVAL).unwrap_or_else(|| Quota::per_minute(NonZeroU32::MIN)),
            ),
            config,
        })
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    pub fn head_gesture(&self) -> &HeadGestureDetector<T> {
        &self.head
    }

    pub fn fatigue(&self) -> &FatigueAggregator {
        &self.fatigue
    }

    /// Analyze a single frame for driver state
    pub fn analyze(&mut self, frame: &VideoFrame, at: FrameInstant) -> Result<DmsAnalysis, DmsError> {
        let pass = self.next_pass();
        let face_pass = matches!(pass, FramePass::Face | FramePass::Both) && self.face_analysis_enabled();
        let hand_pass = matches!(pass, FramePass::Hand | FramePass::Both) && self.config.hand_enabled;

        // Detectors run before any state changes so a failed frame leaves no trace
        let gray = face_pass.then(|| frame.to_gray());
        let faces = match &gray {
            Some(gray) => self.detect_face(frame, gray)?,
            None => None,
        };
        let landmarks = match (&gray, faces.as_ref().and_then(|f| f.first())) {
            (Some(gray), Some(face)) if self.config.fatigue_enabled => self.predict_landmarks(frame, gray, face),
            _ => None,
        };
        let hands = if hand_pass { self.detect_hands(frame)? } else { None };

        let mut events = Vec::new();

        if let (Some(gray), Some(faces)) = (&gray, faces) {
            match faces.first() {
                Some(face) => {
                    self.face_visible = true;
                    self.face_box = Some(*face);
                    self.face_box_age = 0;
                    self.mark_presence(at);

                    if self.config.head_gesture_enabled {
                        if let Some(detection) = self.head.on_face(gray, &face.region(), at.monotonic) {
                            events.push(gesture_event(&detection, at.wall));
                        }
                    }
                    match landmarks {
                        Some(landmarks) => {
                            let ear = landmarks.eye_aspect_ratio();
                            let mar = landmarks.mouth_aspect_ratio();
                            self.ear = Some(ear);
                            self.mar = Some(mar);
                            events.extend(self.fatigue.update(ear, mar, at.wall));
                        }
                        None => {
                            self.ear = None;
                            self.mar = None;
                        }
                    }
                }
                None => {
                    self.face_visible = false;
                    self.ear = None;
                    self.mar = None;
                    self.head.on_face_missing(at.monotonic);
                    self.face_box_age += 1;
                    if self.face_box_age > self.config.face_box_frames {
                        self.face_box = None;
                    }
                }
            }
        }

        if let Some(hands) = hands {
            self.hand_visible = !hands.is_empty();
            if self.hand_visible {
                self.mark_presence(at);
            }
            events.extend(self.hands.update(&hands, at));
        }

        events.extend(self.check_out_of_range(at));

        Ok(DmsAnalysis {
            timestamp: at.wall,
            pass,
            face_detected: self.face_visible,
            hand_detected: self.hand_visible,
            face_box: self.face_box,
            ear: self.ear,
            mar: self.mar,
            current_gesture: self.hands.current_gesture().map(str::to_string),
            events,
        })
    }

    /// Change the nod threshold (20..=50 px); clears in-flight tracking buffers
    pub fn set_nod_sensitivity(&mut self, value: u32) -> Result<(), DmsError> {
        self.head.set_nod_sensitivity(value)?;
        self.config.gesture.nod_threshold = value as f32;
        Ok(())
    }

    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.head.set_cooldown(cooldown);
        self.config.gesture.cooldown = cooldown;
    }

    pub fn set_hand_hold_time(&mut self, hold_time: Duration) {
        self.hands.set_hold_time(hold_time);
        self.config.hand_hold_time = hold_time;
        info!("Hand hold time set to {:.1}s", hold_time.as_secs_f32());
    }

    pub fn set_face_box_frames(&mut self, frames: u32) {
        self.config.face_box_frames = frames;
        info!("Face box persistence set to {} frames", frames);
    }

    /// Drop all per-driver state
    pub fn reset(&mut self) {
        self.head.reset();
        self.fatigue.reset();
        self.hands.reset();
        self.frame_index = 0;
        self.face_visible = false;
        self.hand_visible = false;
        self.face_box = None;
        self.face_box_age = 0;
        self.ear = None;
        self.mar = None;
        self.last_presence = None;
        self.out_of_range_reported = false;
    }

    fn face_analysis_enabled(&self) -> bool {
        self.config.fatigue_enabled || self.config.head_gesture_enabled
    }

    fn next_pass(&mut self) -> FramePass {
        let index = self.frame_index;
        self.frame_index += 1;

        if !self.config.alternating_mode || !(self.face_analysis_enabled() && self.config.hand_enabled) {
            FramePass::Both
        } else if index % 2 == 0 {
            FramePass::Face
        } else {
            FramePass::Hand
        }
    }

    fn detect_face(&mut self, frame: &VideoFrame, gray: &image::GrayImage) -> Result<Option<Vec<FaceBox>>, DmsError> {
        let Some(detector) = &self.detectors.faces else {
            return Ok(None);
        };
        match detector.detect(frame, gray) {
            Ok(faces) => Ok(Some(faces)),
            Err(DmsError::DetectorUnavailable(reason)) => {
                warn!("Face detector unavailable ({}), face analysis disabled", reason);
                self.config.fatigue_enabled = false;
                self.config.head_gesture_enabled = false;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn predict_landmarks(
        &mut self,
        frame: &VideoFrame,
        gray: &image::GrayImage,
        face: &FaceBox,
    ) -> Option<FaceLandmarks> {
        let predictor = self.detectors.landmarks.as_ref()?;
        match predictor.predict(frame, gray, face) {
            Ok(landmarks) => Some(landmarks),
            Err(DmsError::DetectorUnavailable(reason)) => {
                warn!("Landmark predictor unavailable ({}), fatigue detection disabled", reason);
                self.config.fatigue_enabled = false;
                None
            }
            // A bad fit costs this frame's ratios only; head tracking goes on
            Err(e) => {
                if self.landmark_log.check().is_ok() {
                    warn!("Frame {} has no usable landmarks: {}", frame.sequence, e);
                }
                None
            }
        }
    }

    fn detect_hands(&mut self, frame: &VideoFrame) -> Result<Option<Vec<HandDetection>>, DmsError> {
        let Some(detector) = &self.detectors.hands else {
            return Ok(None);
        };
        match detector.detect(frame) {
            Ok(hands) => Ok(Some(hands)),
            Err(DmsError::DetectorUnavailable(reason)) => {
                warn!("Hand detector unavailable ({}), hand gestures disabled", reason);
                self.config.hand_enabled = false;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn mark_presence(&mut self, at: FrameInstant) {
        self.last_presence = Some(at.monotonic);
        self.out_of_range_reported = false;
    }

    fn check_out_of_range(&mut self, at: FrameInstant) -> Option<GestureEvent> {
        let since = *self.last_presence.get_or_insert(at.monotonic);
        let absent = at.monotonic.saturating_duration_since(since);
        if self.out_of_range_reported || absent <= self.config.out_of_range_timeout {
            return None;
        }

        self.out_of_range_reported = true;
        info!("Driver out of range for {:.1}s", absent.as_secs_f32());
        Some(GestureEvent::new(EventKind::NoFace, at.wall).with_detail("absent_seconds", absent.as_secs_f64()))
    }
}

fn gesture_event(detection: &GestureDetection, wall: DateTime<Utc>) -> GestureEvent {
    let kind = match detection.gesture {
        HeadGesture::Nod => EventKind::Nod,
        HeadGesture::Shake => EventKind::Shake,
    };
    let motion = &detection.motion;
    GestureEvent::new(kind, wall)
        .with_detail("total_x", motion.total_x)
        .with_detail("total_y", motion.total_y)
        .with_detail("abs_x", motion.total_x.abs())
        .with_detail("abs_y", motion.total_y.abs())
        .with_detail("total_disp", motion.total_displacement)
        .with_detail("track_points", motion.track_points as u32)
        .with_detail("dir_history", motion.direction_samples as u32)
        .with_detail("threshold", detection.threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures;
    use head_gesture::TrackedPoint;
    use std::sync::Mutex;

    /// Face detector that reports whatever face the test sets
    #[derive(Default)]
    struct StubFace(Mutex<Option<FaceBox>>);

    impl FaceDetector for StubFace {
        fn detect(&self, _frame: &VideoFrame, _gray: &image::GrayImage) -> Result<Vec<FaceBox>, DmsError> {
            Ok(self.0.lock().unwrap().iter().copied().collect())
        }
    }

    /// Landmarks with a settable EAR / MAR
    struct StubLandmarks(Mutex<(f32, f32)>);

    impl LandmarkPredictor for StubLandmarks {
        fn predict(&self, _frame: &VideoFrame, _gray: &image::GrayImage, _face: &FaceBox) -> Result<FaceLandmarks, DmsError> {
            let (ear, mar) = *self.0.lock().unwrap();
            Ok(fixtures::face(ear, mar))
        }
    }

    struct StubHands(Mutex<Result<Vec<HandDetection>, String>>);

    impl HandDetector for StubHands {
        fn detect(&self, _frame: &VideoFrame) -> Result<Vec<HandDetection>, DmsError> {
            self.0.lock().unwrap().clone().map_err(DmsError::DetectorUnavailable)
        }
    }

    impl Default for StubLandmarks {
        fn default() -> Self {
            Self(Mutex::new((0.3, 0.2)))
        }
    }

    impl Default for StubHands {
        fn default() -> Self {
            Self(Mutex::new(Ok(Vec::new())))
        }
    }

    /// Moves the tracked point 10 px down per frame
    struct Drift;

    impl PointTracker for Drift {
        fn track(
            &mut self,
            _prev: &image::GrayImage,
            _next: &image::GrayImage,
            point: TrackedPoint,
        ) -> Result<TrackedPoint, GestureError> {
            Ok(TrackedPoint::new(point.x, point.y + 10.0))
        }
    }

    struct Rig {
        face: Arc<StubFace>,
        landmarks: Arc<StubLandmarks>,
        hands: Arc<StubHands>,
        module: DmsModule<Drift>,
        start: FrameInstant,
        sequence: u32,
    }

    impl Rig {
        fn new(config: DmsConfig) -> Self {
            let face = Arc::new(StubFace::default());
            let landmarks = Arc::new(StubLandmarks::default());
            let hands = Arc::new(StubHands::default());
            let detectors = Detectors {
                faces: Some(face.clone()),
                landmarks: Some(landmarks.clone()),
                hands: Some(hands.clone()),
            };
            Self {
                module: DmsModule::with_tracker(config, detectors, Drift).unwrap(),
                face,
                landmarks,
                hands,
                start: FrameInstant::now(),
                sequence: 0,
            }
        }

        fn sequential() -> Self {
            Self::new(DmsConfig {
                alternating_mode: false,
                ..Default::default()
            })
        }

        fn show_face(&self, visible: bool) {
            *self.face.0.lock().unwrap() = visible.then(|| FaceBox::new(40.0, 30.0, 80.0, 100.0));
        }

        fn step(&mut self, ms: u64) -> DmsAnalysis {
            let frame = VideoFrame::new(vec![0; 160 * 120 * 3], 160, 120, 0, self.sequence);
            self.sequence += 1;
            let at = FrameInstant {
                monotonic: self.start.monotonic + Duration::from_millis(ms),
                wall: self.start.wall + chrono::Duration::milliseconds(ms as i64),
            };
            self.module.analyze(&frame, at).unwrap()
        }
    }

    #[test]
    fn test_alternating_passes() {
        let mut rig = Rig::new(DmsConfig::default());
        let passes: Vec<FramePass> = (0..4).map(|i| rig.step(i * 66).pass).collect();
        assert_eq!(passes, vec![FramePass::Face, FramePass::Hand, FramePass::Face, FramePass::Hand]);
    }

    #[test]
    fn test_single_feature_runs_every_frame() {
        let mut rig = Rig::new(DmsConfig {
            hand_enabled: false,
            ..Default::default()
        });
        assert_eq!(rig.step(0).pass, FramePass::Both);
        assert_eq!(rig.step(66).pass, FramePass::Both);
    }

    #[test]
    fn test_missing_detectors_disable_features() {
        let module = DmsModule::new(DmsConfig::default(), Detectors::default()).unwrap();
        assert!(!module.config().fatigue_enabled);
        assert!(!module.config().head_gesture_enabled);
        assert!(!module.config().hand_enabled);

        let detectors = Detectors {
            faces: Some(Arc::new(StubFace::default())),
            ..Default::default()
        };
        let module = DmsModule::new(DmsConfig::default(), detectors).unwrap();
        assert!(!module.config().fatigue_enabled);
        assert!(module.config().head_gesture_enabled);
    }

    #[test]
    fn test_invalid_gesture_window() {
        let config = DmsConfig {
            gesture: head_gesture::GestureConfig {
                tracking_frames: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            DmsModule::new(config, Detectors::default()),
            Err(DmsError::Config(_))
        ));
    }

    #[test]
    fn test_hand_detector_failure_disables_hands() {
        let mut rig = Rig::sequential();
        *rig.hands.0.lock().unwrap() = Err("model file missing".into());
        rig.show_face(true);

        let analysis = rig.step(0);
        assert!(analysis.face_detected);
        assert!(!rig.module.config().hand_enabled);
        assert!(rig.module.config().head_gesture_enabled);
    }

    #[test]
    fn test_sleep_through_module() {
        let mut rig = Rig::sequential();
        rig.show_face(true);
        *rig.landmarks.0.lock().unwrap() = (0.15, 0.2);

        let mut sleeps = 0;
        for i in 0..65 {
            let analysis = rig.step(i * 66);
            sleeps += analysis.events.iter().filter(|e| e.kind == EventKind::Sleep).count();
            assert!((analysis.ear.unwrap() - 0.15).abs() < 1e-4);
        }
        assert_eq!(sleeps, 1);
    }

    #[test]
    fn test_nod_through_module() {
        let mut rig = Rig::sequential();
        rig.show_face(true);

        let mut events = Vec::new();
        for i in 0..5 {
            events.extend(rig.step(i * 66).events);
        }
        assert_eq!(events.len(), 1);
        let nod = &events[0];
        assert_eq!(nod.kind, EventKind::Nod);
        assert_eq!(nod.detail("total_y"), Some(40.0));
        assert_eq!(nod.detail("abs_x"), Some(0.0));
        assert_eq!(nod.detail("track_points"), Some(5.0));
        assert_eq!(nod.detail("threshold"), Some(35.0));
    }

    /// Predictor whose fit never has the full point set
    struct ShortLandmarks;

    impl LandmarkPredictor for ShortLandmarks {
        fn predict(&self, _frame: &VideoFrame, _gray: &image::GrayImage, _face: &FaceBox) -> Result<FaceLandmarks, DmsError> {
            FaceLandmarks::new(Vec::new())
        }
    }

    #[test]
    fn test_bad_landmarks_keep_head_tracking() {
        let face = Arc::new(StubFace::default());
        *face.0.lock().unwrap() = Some(FaceBox::new(40.0, 30.0, 80.0, 100.0));
        let detectors = Detectors {
            faces: Some(face),
            landmarks: Some(Arc::new(ShortLandmarks)),
            hands: None,
        };
        let config = DmsConfig {
            alternating_mode: false,
            ..Default::default()
        };
        let mut module = DmsModule::with_tracker(config, detectors, Drift).unwrap();
        let start = FrameInstant::now();

        let mut nods = 0;
        for i in 0..10u32 {
            let frame = VideoFrame::new(vec![0; 160 * 120 * 3], 160, 120, 0, i);
            let at = FrameInstant {
                monotonic: start.monotonic + Duration::from_millis(i as u64 * 66),
                wall: start.wall + chrono::Duration::milliseconds(i as i64 * 66),
            };
            let analysis = module.analyze(&frame, at).unwrap();
            assert!(analysis.face_detected);
            assert!(analysis.ear.is_none());
            nods += analysis.events.iter().filter(|e| e.kind == EventKind::Nod).count();
        }

        assert_eq!(nods, 1);
        // A bad fit is not a missing model
        assert!(module.config().fatigue_enabled);
    }

    #[test]
    fn test_face_box_persists_then_clears() {
        let mut rig = Rig::sequential();
        rig.show_face(true);
        assert!(rig.step(0).face_box.is_some());

        rig.show_face(false);
        for i in 1..=5 {
            let analysis = rig.step(i * 66);
            assert!(!analysis.face_detected);
            assert!(analysis.face_box.is_some(), "frame {}", i);
        }
        assert!(rig.step(6 * 66).face_box.is_none());
    }

    #[test]
    fn test_out_of_range_fires_once_and_rearms() {
        let mut rig = Rig::sequential();
        rig.show_face(true);
        rig.step(0);
        rig.show_face(false);

        assert!(!rig.step(3000).contains(EventKind::NoFace));
        assert!(rig.step(3100).contains(EventKind::NoFace));
        assert!(!rig.step(5000).contains(EventKind::NoFace));

        rig.show_face(true);
        rig.step(5100);
        rig.show_face(false);
        assert!(!rig.step(8000).contains(EventKind::NoFace));
        assert!(rig.step(8200).contains(EventKind::NoFace));
    }

    #[test]
    fn test_hand_keeps_driver_in_range() {
        let mut rig = Rig::sequential();
        *rig.hands.0.lock().unwrap() = Ok(vec![HandDetection {
            label: None,
            bbox: [0.0, 0.0, 10.0, 10.0],
            score: 0.8,
        }]);

        for i in 0..10 {
            let analysis = rig.step(i * 1000);
            assert!(analysis.hand_detected);
            assert!(!analysis.contains(EventKind::NoFace));
        }
    }

    #[test]
    fn test_nod_sensitivity_validation() {
        let mut rig = Rig::sequential();
        rig.module.set_nod_sensitivity(25).unwrap();
        assert_eq!(rig.module.config().gesture.nod_threshold, 25.0);
        assert!(matches!(
            rig.module.set_nod_sensitivity(80),
            Err(DmsError::Gesture(GestureError::Config(_)))
        ));
        assert_eq!(rig.module.head_gesture().config().nod_threshold, 25.0);
    }
}
