//! Pyramidal Lucas-Kanade point tracking
//!
//! Single-point sparse optical flow over grayscale frames. Search parameters
//! are fixed: 35x35 window, 3 pyramid levels above the base image,
//! at most 20 iterations per level or a 0.03 px update.

use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::debug;

use crate::trajectory::TrackedPoint;
use crate::GestureError;

/// Search window side (pixels)
pub const WINDOW_SIZE: usize = 35;
/// Pyramid levels above the base image
pub const MAX_LEVEL: usize = 3;
/// Iterations per pyramid level
pub const MAX_ITERATIONS: usize = 20;
/// Convergence threshold on the update step (pixels)
pub const EPSILON: f32 = 0.03;
/// Minimum eigenvalue of the normalized structure tensor
pub const MIN_EIGEN_THRESHOLD: f32 = 1e-4;

/// Tracks one point from a previous frame into the current one
pub trait PointTracker {
    /// Returns the new position, or `GestureError::TrackingLost`
    fn track(
        &mut self,
        prev: &GrayImage,
        next: &GrayImage,
        point: TrackedPoint,
    ) -> Result<TrackedPoint, GestureError>;
}

/// Intensity plane in [0, 1]
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_gray(img: &GrayImage) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.as_raw().iter().map(|&v| v as f32 / 255.0).collect(),
        }
    }

    #[inline]
    fn at(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.width + x]
    }

    /// Bilinear sample with clamped borders
    fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (xi, yi) = (x0 as isize, y0 as isize);

        let top = self.at(xi, yi) * (1.0 - fx) + self.at(xi + 1, yi) * fx;
        let bottom = self.at(xi, yi + 1) * (1.0 - fx) + self.at(xi + 1, yi + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Central-difference gradients
    fn gradient(&self, x: f32, y: f32) -> (f32, f32) {
        let gx = (self.sample(x + 1.0, y) - self.sample(x - 1.0, y)) * 0.5;
        let gy = (self.sample(x, y + 1.0) - self.sample(x, y - 1.0)) * 0.5;
        (gx, gy)
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x <= self.width.saturating_sub(1) as f32 && y <= self.height.saturating_sub(1) as f32
    }
}

fn build_pyramid(base: &GrayImage, levels: usize) -> Vec<Plane> {
    let mut planes = Vec::with_capacity(levels + 1);
    let mut current = base.clone();
    planes.push(Plane::from_gray(&current));

    for _ in 0..levels {
        let (w, h) = (current.width() / 2, current.height() / 2);
        if w < 2 || h < 2 {
            break;
        }
        current = imageops::resize(&current, w, h, FilterType::Triangle);
        planes.push(Plane::from_gray(&current));
    }
    planes
}

/// Pyramidal Lucas-Kanade tracker with fixed search parameters
#[derive(Debug, Clone, Default)]
pub struct PyramidalLk;

impl PyramidalLk {
    pub fn new() -> Self {
        Self
    }

    /// Refine the displacement `guess` at one level.
    /// Returns `None` when the structure tensor is degenerate.
    fn refine(prev: &Plane, next: &Plane, center: (f32, f32), guess: (f32, f32)) -> Option<(f32, f32)> {
        let half = (WINDOW_SIZE / 2) as isize;
        let count = (WINDOW_SIZE * WINDOW_SIZE) as f32;

        // Structure tensor and template only depend on the previous frame
        let mut template = Vec::with_capacity(WINDOW_SIZE * WINDOW_SIZE);
        let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
        for wy in -half..=half {
            for wx in -half..=half {
                let px = center.0 + wx as f32;
                let py = center.1 + wy as f32;
                let (gx, gy) = prev.gradient(px, py);
                template.push((prev.sample(px, py), gx, gy));
                a += gx * gx;
                b += gx * gy;
                c += gy * gy;
            }
        }
        a /= count;
        b /= count;
        c /= count;

        let det = a * c - b * b;
        let min_eigen = ((a + c) - ((a - c) * (a - c) + 4.0 * b * b).sqrt()) * 0.5;
        if det.abs() < f32::EPSILON || min_eigen < MIN_EIGEN_THRESHOLD {
            return None;
        }

        let (mut dx, mut dy) = guess;
        for _ in 0..MAX_ITERATIONS {
            let (mut ex, mut ey) = (0.0f32, 0.0f32);
            let mut idx = 0;
            for wy in -half..=half {
                for wx in -half..=half {
                    let (i0, gx, gy) = template[idx];
                    idx += 1;
                    let i1 = next.sample(center.0 + wx as f32 + dx, center.1 + wy as f32 + dy);
                    let it = i1 - i0;
                    ex += gx * it;
                    ey += gy * it;
                }
            }
            ex /= count;
            ey /= count;

            let step_x = -(c * ex - b * ey) / det;
            let step_y = -(a * ey - b * ex) / det;
            dx += step_x;
            dy += step_y;

            if step_x * step_x + step_y * step_y < EPSILON * EPSILON {
                break;
            }
        }
        Some((dx, dy))
    }
}

impl PointTracker for PyramidalLk {
    fn track(
        &mut self,
        prev: &GrayImage,
        next: &GrayImage,
        point: TrackedPoint,
    ) -> Result<TrackedPoint, GestureError> {
        if prev.dimensions() != next.dimensions() {
            return Err(GestureError::FrameMismatch(format!(
                "{:?} vs {:?}",
                prev.dimensions(),
                next.dimensions()
            )));
        }

        if prev.width() == 0 || prev.height() == 0 {
            return Err(GestureError::TrackingLost);
        }

        let prev_pyr = build_pyramid(prev, MAX_LEVEL);
        let next_pyr = build_pyramid(next, MAX_LEVEL);
        if !prev_pyr[0].contains(point.x, point.y) {
            return Err(GestureError::TrackingLost);
        }

        let top = prev_pyr.len() - 1;
        let mut flow = (0.0f32, 0.0f32);

        for level in (0..=top).rev() {
            let scale = (1u32 << level) as f32;
            let center = (point.x / scale, point.y / scale);

            match Self::refine(&prev_pyr[level], &next_pyr[level], center, flow) {
                Some(refined) => flow = refined,
                // Coarse levels may be too blurred to constrain the flow
                None if level > 0 => {}
                None => {
                    debug!("LK tensor degenerate at ({:.1}, {:.1})", point.x, point.y);
                    return Err(GestureError::TrackingLost);
                }
            }

            if level > 0 {
                flow = (flow.0 * 2.0, flow.1 * 2.0);
            }
        }

        let tracked = TrackedPoint::new(point.x + flow.0, point.y + flow.1);
        if !tracked.x.is_finite() || !tracked.y.is_finite() || !prev_pyr[0].contains(tracked.x, tracked.y) {
            return Err(GestureError::TrackingLost);
        }
        Ok(tracked)
    }
}
