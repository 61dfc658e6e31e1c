//! 2D points in raster pixel space.

use serde::{Deserialize, Serialize};

/// Tolerance for geometric predicates (pixels).
pub const EPSILON: f64 = 1e-9;

/// A 2D point with sub-pixel precision.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_sq(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Distance from this point to the segment `start..end`.
    pub fn distance_to_segment(&self, start: &Point, end: &Point) -> f64 {
        let dx = end.x - start.x;
        let dy = end.y - start.y;
        let length_sq = dx * dx + dy * dy;

        if length_sq < EPSILON {
            return self.distance_to(start);
        }

        // Project onto the line, clamped to the segment
        let t = ((self.x - start.x) * dx + (self.y - start.y) * dy) / length_sq;
        let t = t.clamp(0.0, 1.0);

        let px = self.x - (start.x + t * dx);
        let py = self.y - (start.y + t * dy);
        (px * px + py * py).sqrt()
    }

    /// Translate by `(dx, dy)`.
    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

/// Z component of `(a - o) x (b - o)`. Positive for a counter-clockwise
/// turn `o -> a -> b` in a y-up frame.
#[inline]
pub fn cross(o: &Point, a: &Point, b: &Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}
