//! Trajectory buffer and horizontal direction history

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Position of the tracked point in one frame (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackedPoint {
    pub x: f32,
    pub y: f32,
}

impl TrackedPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Fixed-window trajectory with a derived sequence of horizontal directions
/// (+1 rightward, -1 leftward).
#[derive(Debug, Clone)]
pub struct TrajectoryBuffer {
    points: VecDeque<TrackedPoint>,
    directions: VecDeque<i8>,
    capacity: usize,
    direction_capacity: usize,
    min_move: f32,
}

impl TrajectoryBuffer {
    /// Create an empty buffer
    pub fn new(capacity: usize, direction_capacity: usize, min_move: f32) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity + 1),
            directions: VecDeque::with_capacity(direction_capacity + 1),
            capacity: capacity.max(1),
            direction_capacity: direction_capacity.max(1),
            min_move,
        }
    }

    /// Append a point, evicting the oldest beyond capacity
    pub fn append(&mut self, point: TrackedPoint) {
        let previous = self.points.back().copied();

        self.points.push_back(point);
        if self.points.len() > self.capacity {
            self.points.pop_front();
        }

        if let Some(prev) = previous {
            let dx = point.x - prev.x;
            if dx.abs() > self.min_move {
                self.directions.push_back(if dx > 0.0 { 1 } else { -1 });
                if self.directions.len() > self.direction_capacity {
                    self.directions.pop_front();
                }
            }
        }
    }

    /// Empty both sequences
    pub fn clear(&mut self) {
        self.points.clear();
        self.directions.clear();
    }

    /// Drop the trajectory but keep the direction history
    pub fn clear_points(&mut self) {
        self.points.clear();
    }

    /// Drop the direction history only
    pub fn clear_directions(&mut self) {
        self.directions.clear();
    }

    /// Keep only the newest point so tracking can resume from it
    pub fn retain_last(&mut self) {
        if let Some(last) = self.points.back().copied() {
            self.points.clear();
            self.points.push_back(last);
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn first(&self) -> Option<TrackedPoint> {
        self.points.front().copied()
    }

    pub fn last(&self) -> Option<TrackedPoint> {
        self.points.back().copied()
    }

    pub fn points(&self) -> impl Iterator<Item = &TrackedPoint> {
        self.points.iter()
    }

    pub fn directions(&self) -> impl Iterator<Item = &i8> {
        self.directions.iter()
    }

    pub fn direction_len(&self) -> usize {
        self.directions.len()
    }

    /// Number of adjacent unequal entries in the direction history
    pub fn direction_changes(&self) -> usize {
        self.directions
            .iter()
            .zip(self.directions.iter().skip(1))
            .filter(|(a, b)| a != b)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn buffer() -> TrajectoryBuffer {
        TrajectoryBuffer::new(15, 20, 2.0)
    }

    #[test]
    fn test_small_moves_do_not_record_direction() {
        let mut traj = buffer();
        traj.append(TrackedPoint::new(0.0, 0.0));
        traj.append(TrackedPoint::new(2.0, 0.0));
        traj.append(TrackedPoint::new(0.5, 9.0));
        assert_eq!(traj.direction_len(), 0);

        traj.append(TrackedPoint::new(3.0, 9.0));
        traj.append(TrackedPoint::new(-1.0, 9.0));
        assert_eq!(traj.directions().copied().collect::<Vec<_>>(), vec![1, -1]);
        assert_eq!(traj.direction_changes(), 1);
    }

    #[test]
    fn test_direction_history_trimmed() {
        let mut traj = buffer();
        for i in 0..40 {
            let x = if i % 2 == 0 { 0.0 } else { 10.0 };
            traj.append(TrackedPoint::new(x, 0.0));
        }
        assert_eq!(traj.direction_len(), 20);
        assert_eq!(traj.direction_changes(), 19);
    }

    #[test]
    fn test_retain_last() {
        let mut traj = buffer();
        traj.append(TrackedPoint::new(1.0, 1.0));
        traj.append(TrackedPoint::new(9.0, 4.0));
        traj.retain_last();
        assert_eq!(traj.len(), 1);
        assert_eq!(traj.first(), Some(TrackedPoint::new(9.0, 4.0)));
        // direction history is untouched by retain_last
        assert_eq!(traj.direction_len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut traj = buffer();
        traj.append(TrackedPoint::new(0.0, 0.0));
        traj.append(TrackedPoint::new(10.0, 0.0));
        traj.clear();
        assert!(traj.is_empty());
        assert_eq!(traj.direction_len(), 0);
    }

    proptest! {
        #[test]
        fn prop_fifo_keeps_newest(xs in proptest::collection::vec(-500.0f32..500.0, 16..64)) {
            let mut traj = buffer();
            for (i, x) in xs.iter().enumerate() {
                traj.append(TrackedPoint::new(*x, i as f32));
            }
            prop_assert_eq!(traj.len(), 15);
            let kept: Vec<f32> = traj.points().map(|p| p.x).collect();
            prop_assert_eq!(kept.as_slice(), &xs[xs.len() - 15..]);
        }
    }
}
