//! Face, landmark and hand detector collaborators
//!
//! The neural detectors themselves live outside this crate. `TraceReplay`
//! serves recorded detector output from a JSON-lines trace so sessions can
//! be replayed without any model files.

use camera_capture::VideoFrame;
use head_gesture::FaceRegion;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use crate::landmarks::{FaceLandmarks, Point2};
use crate::DmsError;

/// Face bounding box (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl FaceBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 1.0,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn region(&self) -> FaceRegion {
        FaceRegion::new(self.x, self.y, self.width, self.height)
    }
}

/// One detected hand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandDetection {
    /// Recognised gesture name, if any
    #[serde(default)]
    pub label: Option<String>,
    /// x1, y1, x2, y2 (pixels)
    pub bbox: [f32; 4],
    #[serde(default = "default_confidence")]
    pub score: f32,
}

/// Finds faces in a grayscale frame
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &VideoFrame, gray: &GrayImage) -> Result<Vec<FaceBox>, DmsError>;
}

/// Places the 68 landmarks inside a face box
pub trait LandmarkPredictor: Send + Sync {
    fn predict(&self, frame: &VideoFrame, gray: &GrayImage, face: &FaceBox) -> Result<FaceLandmarks, DmsError>;
}

/// Finds hands and classifies their gesture
pub trait HandDetector: Send + Sync {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<HandDetection>, DmsError>;
}

#[derive(Debug, Clone, Deserialize)]
struct TraceFace {
    #[serde(rename = "box")]
    bbox: FaceBox,
    #[serde(default)]
    landmarks: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
struct TraceRecord {
    sequence: u32,
    #[serde(default)]
    faces: Vec<TraceFace>,
    #[serde(default)]
    hands: Vec<HandDetection>,
}

/// Recorded detector output keyed by frame sequence number.
///
/// Each line of the trace is one frame:
/// `{"sequence": 3, "faces": [{"box": {...}, "landmarks": [[x, y], ...]}], "hands": [...]}`.
/// Frames absent from the trace have no detections.
#[derive(Debug, Default)]
pub struct TraceReplay {
    frames: HashMap<u32, TraceRecord>,
}

impl TraceReplay {
    /// Load a trace file; a missing or unreadable file makes the detectors unavailable
    pub fn open(path: &Path) -> Result<Self, DmsError> {
        let file = File::open(path)
            .map_err(|e| DmsError::DetectorUnavailable(format!("{}: {}", path.display(), e)))?;

        let mut frames = HashMap::new();
        let mut skipped = 0usize;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| DmsError::DetectorUnavailable(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TraceRecord>(&line) {
                Ok(record) => {
                    frames.insert(record.sequence, record);
                }
                Err(e) => {
                    skipped += 1;
                    warn!("Trace line {} skipped: {}", line_no + 1, e);
                }
            }
        }

        info!(
            "Loaded detector trace with {} frames from {} ({} lines skipped)",
            frames.len(),
            path.display(),
            skipped
        );
        Ok(Self { frames })
    }

    pub fn from_json_lines(text: &str) -> Result<Self, DmsError> {
        let mut frames = HashMap::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let record: TraceRecord =
                serde_json::from_str(line).map_err(|e| DmsError::Config(format!("trace: {}", e)))?;
            frames.insert(record.sequence, record);
        }
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FaceDetector for TraceReplay {
    fn detect(&self, frame: &VideoFrame, _gray: &GrayImage) -> Result<Vec<FaceBox>, DmsError> {
        Ok(self
            .frames
            .get(&frame.sequence)
            .map(|record| record.faces.iter().map(|face| face.bbox).collect())
            .unwrap_or_default())
    }
}

impl LandmarkPredictor for TraceReplay {
    fn predict(&self, frame: &VideoFrame, _gray: &GrayImage, face: &FaceBox) -> Result<FaceLandmarks, DmsError> {
        let traced = self
            .frames
            .get(&frame.sequence)
            .and_then(|record| record.faces.iter().find(|f| f.bbox == *face))
            .ok_or_else(|| DmsError::Landmarks(format!("no traced face for frame {}", frame.sequence)))?;

        FaceLandmarks::new(traced.landmarks.iter().map(|&[x, y]| Point2::new(x, y)).collect())
    }
}

impl HandDetector for TraceReplay {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<HandDetection>, DmsError> {
        Ok(self
            .frames
            .get(&frame.sequence)
            .map(|record| record.hands.clone())
            .unwrap_or_default())
    }
}
