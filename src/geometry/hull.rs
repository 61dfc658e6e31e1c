//! Convex hull construction (Graham scan) and outward margin expansion.
//!
//! The hull of the subject's keypoints is the protected region. It is grown
//! by a margin proportional to the keypoint spread so hair, fingers and
//! loose clothing just outside the skeleton stay protected.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::point::{cross, Point, EPSILON};
use super::polygon::{BoundingRect, Polygon};
use crate::config::MIN_HULL_POINTS;

/// The point set cannot span a polygon: fewer than three distinct points,
/// or all of them collinear.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DegenerateHull {
    pub distinct_points: usize,
}

/// How an expanded hull was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpansionMethod {
    /// Vertices pushed along their averaged outward edge normals
    VertexNormals,
    /// Convex hull of a disk polygon placed on every vertex
    Disk,
}

/// Expanded hull with the margin it was grown by.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpandedHull {
    pub polygon: Polygon,
    pub margin: f64,
    pub method: ExpansionMethod,
}

/// Graham scan over `points`.
///
/// The pivot is the point with lowest y (ties: lowest x). Remaining points
/// are swept in polar-angle order keeping strictly counter-clockwise turns;
/// points collinear with the pivot are reduced to the farthest one. The
/// returned polygon has positive signed area.
pub fn convex_hull(points: &[Point]) -> Result<Polygon, DegenerateHull> {
    let mut unique: Vec<Point> = points.iter().copied().filter(Point::is_finite).collect();
    unique.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
    });
    unique.dedup_by(|a, b| a.distance_sq(b) < EPSILON);

    let distinct_points = unique.len();
    if distinct_points < MIN_HULL_POINTS {
        return Err(DegenerateHull { distinct_points });
    }

    let pivot_idx = unique
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.y.partial_cmp(&b.y)
                .unwrap_or(Ordering::Equal)
                .then(a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    let pivot = unique.swap_remove(pivot_idx);

    unique.sort_by(|a, b| {
        let c = cross(&pivot, a, b);
        if c > EPSILON {
            Ordering::Less
        } else if c < -EPSILON {
            Ordering::Greater
        } else {
            pivot
                .distance_sq(a)
                .partial_cmp(&pivot.distance_sq(b))
                .unwrap_or(Ordering::Equal)
        }
    });

    // Keep only the farthest point of each ray from the pivot
    let mut by_angle: Vec<Point> = Vec::with_capacity(unique.len());
    let mut i = 0;
    while i < unique.len() {
        while i + 1 < unique.len() && cross(&pivot, &unique[i], &unique[i + 1]).abs() <= EPSILON {
            i += 1;
        }
        by_angle.push(unique[i]);
        i += 1;
    }

    if by_angle.len() < 2 {
        return Err(DegenerateHull { distinct_points });
    }

    let mut stack: Vec<Point> = Vec::with_capacity(by_angle.len() + 1);
    stack.push(pivot);
    for p in by_angle {
        while stack.len() >= 2 && cross(&stack[stack.len() - 2], &stack[stack.len() - 1], &p) <= EPSILON {
            stack.pop();
        }
        stack.push(p);
    }

    if stack.len() < MIN_HULL_POINTS {
        return Err(DegenerateHull { distinct_points });
    }
    Ok(Polygon::new(stack))
}

/// Margin for a hull: `ratio` times the diagonal of its bounding box.
pub fn margin_radius(hull: &Polygon, ratio: f64) -> f64 {
    hull.bounding_rect()
        .map(|rect: BoundingRect| rect.diagonal() * ratio)
        .unwrap_or(0.0)
}

/// Grow `hull` outward by `margin`.
///
/// Each vertex moves `margin` pixels along the normalized sum of its two
/// adjacent outward edge normals. Very acute vertices can make that result
/// non-convex, so it must stay convex, simple and contain the raw
/// hull; otherwise the disk expansion is used instead.
pub fn expand_hull(hull: &Polygon, margin: f64, disk_segments: usize) -> ExpandedHull {
    let oriented = if hull.signed_area() < 0.0 {
        Polygon::new(hull.vertices().iter().rev().copied().collect())
    } else {
        hull.clone()
    };

    if margin <= 0.0 || oriented.len() < MIN_HULL_POINTS {
        return ExpandedHull {
            polygon: oriented,
            margin: margin.max(0.0),
            method: ExpansionMethod::VertexNormals,
        };
    }

    let offset = offset_vertices(&oriented, margin);
    if is_valid_expansion(&oriented, &offset) {
        return ExpandedHull {
            polygon: offset,
            margin,
            method: ExpansionMethod::VertexNormals,
        };
    }

    debug!(
        vertices = oriented.len(),
        margin, "vertex-normal expansion rejected, using disk expansion"
    );
    ExpandedHull {
        polygon: disk_expansion(&oriented, margin, disk_segments),
        margin,
        method: ExpansionMethod::Disk,
    }
}

/// Outward normal of the edge `a -> b` on a positively oriented polygon.
fn outward_normal(a: &Point, b: &Point) -> Option<(f64, f64)> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = dx.hypot(dy);
    if len < EPSILON {
        None
    } else {
        Some((dy / len, -dx / len))
    }
}

fn offset_vertices(hull: &Polygon, margin: f64) -> Polygon {
    let v = hull.vertices();
    let n = v.len();
    let moved = (0..n)
        .map(|i| {
            let prev = &v[(i + n - 1) % n];
            let cur = &v[i];
            let next = &v[(i + 1) % n];
            let (nx, ny) = match (outward_normal(prev, cur), outward_normal(cur, next)) {
                (Some(a), Some(b)) => (a.0 + b.0, a.1 + b.1),
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => (0.0, 0.0),
            };
            let len = nx.hypot(ny);
            if len < EPSILON {
                *cur
            } else {
                cur.offset(nx / len * margin, ny / len * margin)
            }
        })
        .collect();
    Polygon::new(moved)
}

fn is_valid_expansion(raw: &Polygon, expanded: &Polygon) -> bool {
    expanded.is_convex()
        && expanded.area() >= raw.area()
        && raw.vertices().iter().all(|p| expanded.contains(p))
}

fn disk_expansion(hull: &Polygon, margin: f64, segments: usize) -> Polygon {
    let segments = segments.max(8);
    let step = std::f64::consts::TAU / segments as f64;
    let samples: Vec<Point> = hull
        .vertices()
        .iter()
        .flat_map(|v| {
            (0..segments).map(move |k| {
                let t = k as f64 * step;
                v.offset(t.cos() * margin, t.sin() * margin)
            })
        })
        .collect();
    convex_hull(&samples).unwrap_or_else(|_| hull.clone())
}
