//! Connected-component grouping of residue candidates.
//!
//! Residue pixels are labeled by breadth-first search with 4-connectivity.
//! Seeds are taken in row-major order, so identical input always yields the
//! same components in the same order with the same ids.

use std::collections::VecDeque;
use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::runs::{PixelBounds, PixelRuns};
use crate::analysis::CancelToken;
use crate::classify::{ClassificationMask, PixelClass};
use crate::error::Result;

/// Session-unique identifier of an erasable group. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A connected residue blob the caller may erase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentGroup {
    pub id: GroupId,
    pub pixels: PixelRuns,
}

impl ComponentGroup {
    pub fn area(&self) -> usize {
        self.pixels.area()
    }

    pub fn bounds(&self) -> Option<PixelBounds> {
        self.pixels.bounds()
    }
}

/// A component too large to be residue; reported but never erasable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OversizedComponent {
    pub area: usize,
    pub bounds: Option<PixelBounds>,
}

/// Grouper output.
#[derive(Clone, Debug, PartialEq)]
pub struct Grouping {
    /// Group id per pixel, 0 where no erasable group
    pub labels: Array2<u32>,
    /// Retained groups in discovery order (ascending id)
    pub groups: Vec<ComponentGroup>,
    pub oversized: Vec<OversizedComponent>,
}

impl Grouping {
    /// Id following the last one handed out.
    pub fn next_id(&self, first_id: u32) -> u32 {
        self.groups.last().map_or(first_id.max(1), |g| g.id.0 + 1)
    }
}

/// Label connected residue components.
///
/// Components with `area > max_group_ratio * width * height` are dropped
/// and logged. Retained groups get sequential ids starting at `first_id`
/// (bumped to 1 if zero).
pub fn group_residue(
    mask: &ClassificationMask,
    max_group_ratio: f64,
    first_id: u32,
    cancel: &CancelToken,
) -> Result<Grouping> {
    let width = mask.width();
    let height = mask.height();
    let total = width * height;
    let max_area = max_group_ratio * total as f64;
    let classes = mask.classes();

    let mut labels = vec![0u32; total];
    let mut visited = vec![false; total];
    let mut queue = VecDeque::new();
    let mut groups = Vec::new();
    let mut oversized = Vec::new();
    let mut next_id = first_id.max(1);

    let is_candidate = |idx: usize| classes[[idx / width, idx % width]] == PixelClass::Residue;

    for y in 0..height {
        cancel.check()?;
        for x in 0..width {
            let seed = y * width + x;
            if visited[seed] || !is_candidate(seed) {
                continue;
            }

            let mut members = Vec::new();
            visited[seed] = true;
            queue.push_back(seed);

            while let Some(idx) = queue.pop_front() {
                members.push(idx);
                let px = idx % width;
                let py = idx / width;

                let mut visit = |n: usize| {
                    if !visited[n] && is_candidate(n) {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                };
                if px + 1 < width {
                    visit(idx + 1);
                }
                if px > 0 {
                    visit(idx - 1);
                }
                if py + 1 < height {
                    visit(idx + width);
                }
                if py > 0 {
                    visit(idx - width);
                }
            }

            let pixels = PixelRuns::from_indices(members, width);
            if pixels.area() as f64 > max_area {
                warn!(
                    area = pixels.area(),
                    share = pixels.area() as f64 / total as f64,
                    "residue component too large, keeping it protected"
                );
                oversized.push(OversizedComponent {
                    area: pixels.area(),
                    bounds: pixels.bounds(),
                });
                continue;
            }

            let id = GroupId(next_id);
            next_id += 1;
            for idx in pixels.indices() {
                labels[idx] = id.0;
            }
            groups.push(ComponentGroup { id, pixels });
        }
    }

    debug!(groups = groups.len(), oversized = oversized.len(), "grouped residue");

    let labels = Array2::from_shape_vec((height, width), labels)
        .unwrap_or_else(|_| unreachable!("label vector sized from mask dimensions"));
    Ok(Grouping {
        labels,
        groups,
        oversized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelBuffer;
    use crate::classify::classify_pixels;
    use crate::geometry::{Point, Polygon};

    /// Classify with a hull far outside the raster so every opaque pixel
    /// is residue.
    fn all_residue(width: usize, height: usize, opaque: &[(usize, usize)]) -> ClassificationMask {
        let mut data = vec![0u8; width * height * 4];
        for &(x, y) in opaque {
            data[(y * width + x) * 4 + 3] = 255;
        }
        let buffer = PixelBuffer::new(width, height, data).unwrap();
        let far = Polygon::new(vec![
            Point::new(-100.0, -100.0),
            Point::new(-90.0, -100.0),
            Point::new(-90.0, -90.0),
        ]);
        classify_pixels(&buffer, &far, 30)
    }

    #[test]
    fn test_two_components_in_scan_order() {
        // Blob A at top-right, blob B at bottom-left
        let mask = all_residue(6, 6, &[(4, 0), (5, 0), (5, 1), (0, 4), (0, 5), (1, 5)]);
        let grouping = group_residue(&mask, 0.5, 1, &CancelToken::never()).unwrap();

        assert_eq!(grouping.groups.len(), 2);
        assert_eq!(grouping.groups[0].id, GroupId(1));
        assert!(grouping.groups[0].pixels.contains(5, 1));
        assert_eq!(grouping.groups[1].id, GroupId(2));
        assert_eq!(grouping.groups[1].area(), 3);
        assert_eq!(grouping.labels[[5, 1]], 2);
        assert_eq!(grouping.labels[[0, 0]], 0);
        assert_eq!(grouping.next_id(1), 3);
    }

    #[test]
    fn test_diagonal_pixels_are_separate() {
        let mask = all_residue(4, 4, &[(0, 0), (1, 1), (2, 2)]);
        let grouping = group_residue(&mask, 0.5, 10, &CancelToken::never()).unwrap();
        let ids: Vec<GroupId> = grouping.groups.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![GroupId(10), GroupId(11), GroupId(12)]);
    }

    #[test]
    fn test_oversized_component_dropped() {
        // 4x4 raster, 9 connected pixels > 0.5 * 16
        let mut opaque = Vec::new();
        for y in 0..3 {
            for x in 0..3 {
                opaque.push((x, y));
            }
        }
        opaque.push((3, 3));
        let mask = all_residue(4, 4, &opaque);
        let grouping = group_residue(&mask, 0.5, 1, &CancelToken::never()).unwrap();

        assert_eq!(grouping.oversized.len(), 1);
        assert_eq!(grouping.oversized[0].area, 9);
        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.groups[0].area(), 1);
        assert_eq!(grouping.labels[[1, 1]], 0);
        assert_eq!(grouping.labels[[3, 3]], 1);
    }

    #[test]
    fn test_component_at_ratio_limit_is_kept() {
        // 4x4 raster, two full rows: exactly 0.5 * 16 pixels
        let opaque: Vec<(usize, usize)> = (0..2).flat_map(|y| (0..4).map(move |x| (x, y))).collect();
        let mask = all_residue(4, 4, &opaque);
        let grouping = group_residue(&mask, 0.5, 1, &CancelToken::never()).unwrap();
        assert!(grouping.oversized.is_empty());
        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.groups[0].area(), 8);

        // One pixel more crosses the limit
        let mut opaque = opaque;
        opaque.push((0, 2));
        let mask = all_residue(4, 4, &opaque);
        let grouping = group_residue(&mask, 0.5, 1, &CancelToken::never()).unwrap();
        assert!(grouping.groups.is_empty());
        assert_eq!(grouping.oversized[0].area, 9);
    }

    #[test]
    fn test_deterministic() {
        let mask = all_residue(8, 8, &[(1, 1), (1, 2), (6, 6), (7, 6), (3, 0)]);
        let a = group_residue(&mask, 0.5, 1, &CancelToken::never()).unwrap();
        let b = group_residue(&mask, 0.5, 1, &CancelToken::never()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cancelled() {
        let mask = all_residue(4, 4, &[(0, 0)]);
        let token = CancelToken::new(7);
        token.cancel();
        assert!(group_residue(&mask, 0.5, 1, &token).is_err());
    }
}
