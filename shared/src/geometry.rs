//! Small geometry helpers for headings and trail segments

use glam::Vec3;
use std::f32::consts::{FRAC_PI_2, PI, TAU};

/// Unit direction on the XZ plane for a heading. Heading 0 faces +Z.
pub fn heading_vector(heading: f32) -> Vec3 {
    Vec3::new(heading.sin(), 0.0, heading.cos())
}

/// Wraps an angle into `[0, 2π)`.
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can return TAU itself for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in `(-π, π]`.
pub fn shortest_angle_delta(from: f32, to: f32) -> f32 {
    let delta = (to - from).rem_euclid(TAU);
    if delta > PI {
        delta - TAU
    } else {
        delta
    }
}

pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    normalize_angle(from + shortest_angle_delta(from, to) * t)
}

/// Closest multiple of 90° to `heading`, not normalised.
pub fn nearest_grid_heading(heading: f32) -> f32 {
    (heading / FRAC_PI_2).round() * FRAC_PI_2
}

/// Minimum distance from `point` to the segment `a`-`b`.
///
/// Degenerate segments fall back to point distance.
pub fn point_segment_distance(point: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b - a;
    let length_squared = ab.length_squared();
    if length_squared <= f32::EPSILON {
        return point.distance(a);
    }

    let t = ((point - a).dot(ab) / length_squared).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}
