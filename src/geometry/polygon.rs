//! Closed polygons and the point-in-polygon test used for hull protection.

use serde::{Deserialize, Serialize};

use super::point::{cross, Point, EPSILON};

/// Points closer than this to an edge count as on the boundary.
const BOUNDARY_TOLERANCE: f64 = 1e-7;

/// Axis-aligned bounds in floating point pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingRect {
    /// Bounds of a point set, `None` when empty.
    pub fn of_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut rect = BoundingRect {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &points[1..] {
            rect.min_x = rect.min_x.min(p.x);
            rect.min_y = rect.min_y.min(p.y);
            rect.max_x = rect.max_x.max(p.x);
            rect.max_y = rect.max_y.max(p.y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn diagonal(&self) -> f64 {
        self.width().hypot(self.height())
    }

    pub fn contains(&self, p: &Point, tolerance: f64) -> bool {
        p.x >= self.min_x - tolerance
            && p.x <= self.max_x + tolerance
            && p.y >= self.min_y - tolerance
            && p.y <= self.max_y + tolerance
    }
}

/// Ordered vertex list, implicitly closed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Iterate edges as `(start, end)` pairs, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (&Point, &Point)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (&self.vertices[i], &self.vertices[(i + 1) % n]))
    }

    /// Shoelace area; positive when vertices turn counter-clockwise in a
    /// y-up frame.
    pub fn signed_area(&self) -> f64 {
        if self.vertices.len() < 3 {
            return 0.0;
        }
        let twice: f64 = self.edges().map(|(a, b)| a.x * b.y - b.x * a.y).sum();
        twice / 2.0
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn perimeter(&self) -> f64 {
        if self.vertices.len() < 2 {
            return 0.0;
        }
        self.edges().map(|(a, b)| a.distance_to(b)).sum()
    }

    pub fn bounding_rect(&self) -> Option<BoundingRect> {
        BoundingRect::of_points(&self.vertices)
    }

    /// Point-in-polygon by ray casting; points on an edge count as inside.
    pub fn contains(&self, p: &Point) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }
        match self.bounding_rect() {
            Some(rect) if rect.contains(p, BOUNDARY_TOLERANCE) => {}
            _ => return false,
        }

        let mut inside = false;
        for (a, b) in self.edges() {
            if p.distance_to_segment(a, b) <= BOUNDARY_TOLERANCE {
                return true;
            }
            if (a.y > p.y) != (b.y > p.y) {
                let x_at = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if p.x < x_at {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// True when no two non-adjacent edges touch.
    pub fn is_simple(&self) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        for i in 0..n {
            let a1 = &self.vertices[i];
            let a2 = &self.vertices[(i + 1) % n];
            if a1.distance_sq(a2) < EPSILON {
                return false;
            }
            for j in (i + 2)..n {
                // The first and last edges share a vertex
                if i == 0 && j == n - 1 {
                    continue;
                }
                let b1 = &self.vertices[j];
                let b2 = &self.vertices[(j + 1) % n];
                if segments_intersect(a1, a2, b1, b2) {
                    return false;
                }
            }
        }
        true
    }

    /// Consecutive edge cross products share one sign and the polygon is
    /// simple.
    pub fn is_convex(&self) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut sign = 0.0f64;
        for i in 0..n {
            let c = cross(
                &self.vertices[i],
                &self.vertices[(i + 1) % n],
                &self.vertices[(i + 2) % n],
            );
            if c.abs() < EPSILON {
                continue;
            }
            if sign == 0.0 {
                sign = c.signum();
            } else if c.signum() != sign {
                return false;
            }
        }
        sign != 0.0 && self.is_simple()
    }
}

fn orientation(o: &Point, a: &Point, b: &Point) -> i8 {
    let c = cross(o, a, b);
    if c > EPSILON {
        1
    } else if c < -EPSILON {
        -1
    } else {
        0
    }
}

fn on_segment(p: &Point, a: &Point, b: &Point) -> bool {
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

/// Closed-segment intersection test, collinear overlap included.
pub fn segments_intersect(a1: &Point, a2: &Point, b1: &Point, b2: &Point) -> bool {
    let o1 = orientation(a1, a2, b1);
    let o2 = orientation(a1, a2, b2);
    let o3 = orientation(b1, b2, a1);
    let o4 = orientation(b1, b2, a2);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && on_segment(b1, a1, a2))
        || (o2 == 0 && on_segment(b2, a1, a2))
        || (o3 == 0 && on_segment(a1, b1, b2))
        || (o4 == 0 && on_segment(a2, b1, b2))
}
