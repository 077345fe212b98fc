//! Bounded light-trail point buffer

use crate::geometry::point_segment_distance;
use glam::Vec3;
use std::collections::VecDeque;

/// Ordered trail points, oldest first.
///
/// A point is only recorded once the vehicle has moved at least
/// `min_point_distance` from the previous one, so consecutive points never form
/// zero-length segments. When the buffer is full the oldest point is dropped.
#[derive(Debug, Clone)]
pub struct Trail {
    points: VecDeque<Vec3>,
    max_points: usize,
    min_point_distance: f32,
}

impl Trail {
    pub fn new(max_points: usize, min_point_distance: f32) -> Self {
        Self {
            points: VecDeque::with_capacity(max_points.min(256)),
            max_points: max_points.max(2),
            min_point_distance,
        }
    }

    /// Records `point` if it is far enough from the last one.
    ///
    /// Returns true when the point was appended.
    pub fn record(&mut self, point: Vec3) -> bool {
        if let Some(last) = self.points.back() {
            if last.distance(point) < self.min_point_distance {
                return false;
            }
        }

        if self.points.len() >= self.max_points {
            self.points.pop_front();
        }
        self.points.push_back(point);
        true
    }

    pub fn last(&self) -> Option<Vec3> {
        self.points.back().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn points(&self) -> impl Iterator<Item = &Vec3> + '_ {
        self.points.iter()
    }

    /// Copies the points out for consumers that must not hold a borrow.
    pub fn to_vec(&self) -> Vec<Vec3> {
        self.points.iter().copied().collect()
    }

    /// Consecutive segments, newest first.
    pub fn segments_newest_first(&self) -> impl Iterator<Item = (Vec3, Vec3)> + '_ {
        let len = self.points.len();
        (1..len)
            .rev()
            .map(move |i| (self.points[i - 1], self.points[i]))
    }

    /// Whether any non-exempt segment lies strictly closer than `threshold`.
    ///
    /// `skip_arc` exempts the newest part of the trail: segments are skipped
    /// while the arc length walked back from `head` (the owner's current
    /// position) to the segment's newer end is below `skip_arc`.
    pub fn hits(&self, point: Vec3, head: Option<Vec3>, skip_arc: f32, threshold: f32) -> bool {
        let mut arc = match (head, self.last()) {
            (Some(head), Some(last)) => head.distance(last),
            _ => 0.0,
        };

        for (older, newer) in self.segments_newest_first() {
            if arc < skip_arc {
                arc += older.distance(newer);
                continue;
            }
            if point_segment_distance(point, older, newer) < threshold {
                return true;
            }
        }
        false
    }
}
