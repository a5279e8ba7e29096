//! 68-point facial landmark layout and aspect ratios
//!
//! Index ranges follow the iBUG 300-W annotation used by dlib's shape
//! predictor: jaw 0..17, brows 17..27, nose 27..36, right eye 36..42,
//! left eye 42..48, mouth 48..68.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::DmsError;

/// Number of points in the face model
pub const LANDMARK_COUNT: usize = 68;

const RIGHT_EYE: Range<usize> = 36..42;
const LEFT_EYE: Range<usize> = 42..48;
const MOUTH: Range<usize> = 48..68;

/// 2-D landmark position (pixels)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Landmarks of one face in model order
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    points: Vec<Point2>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point2>) -> Result<Self, DmsError> {
        if points.len() != LANDMARK_COUNT {
            return Err(DmsError::Landmarks(format!(
                "expected {} points, got {}",
                LANDMARK_COUNT,
                points.len()
            )));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    /// Six-point contour of the subject's right eye
    pub fn right_eye(&self) -> &[Point2] {
        &self.points[RIGHT_EYE]
    }

    /// Six-point contour of the subject's left eye
    pub fn left_eye(&self) -> &[Point2] {
        &self.points[LEFT_EYE]
    }

    /// Twenty-point outer and inner lip contour
    pub fn mouth(&self) -> &[Point2] {
        &self.points[MOUTH]
    }

    /// Mean EAR over both eyes
    pub fn eye_aspect_ratio(&self) -> f32 {
        (eye_aspect_ratio(self.left_eye()) + eye_aspect_ratio(self.right_eye())) / 2.0
    }

    pub fn mouth_aspect_ratio(&self) -> f32 {
        mouth_aspect_ratio(self.mouth())
    }
}

/// (|p1-p5| + |p2-p4|) / (2 |p0-p3|) over a six-point eye contour
pub fn eye_aspect_ratio(eye: &[Point2]) -> f32 {
    if eye.len() < 6 {
        return 0.0;
    }
    let a = eye[1].distance(&eye[5]);
    let b = eye[2].distance(&eye[4]);
    let c = eye[0].distance(&eye[3]);
    if c == 0.0 {
        return 0.0;
    }
    (a + b) / (2.0 * c)
}

/// (|m2-m9| + |m4-m7|) / (2 |m0-m6|) over the twenty-point mouth contour
pub fn mouth_aspect_ratio(mouth: &[Point2]) -> f32 {
    if mouth.len() < 10 {
        return 0.0;
    }
    let a = mouth[2].distance(&mouth[9]);
    let b = mouth[4].distance(&mouth[7]);
    let c = mouth[0].distance(&mouth[6]);
    if c == 0.0 {
        return 0.0;
    }
    (a + b) / (2.0 * c)
}
