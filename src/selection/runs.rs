//! Run-length encoded pixel sets.
//!
//! Groups and magic wand regions store their membership as horizontal runs
//! sorted in row-major order, which keeps large blobs compact and makes
//! membership tests a binary search.

use serde::{Deserialize, Serialize};

/// Inclusive-exclusive pixel rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelBounds {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelBounds {
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// `len` consecutive pixels on row `y` starting at `x`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRun {
    pub y: usize,
    pub x: usize,
    pub len: usize,
}

/// Set of pixels of a `raster_width`-wide raster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRuns {
    raster_width: usize,
    runs: Vec<PixelRun>,
    area: usize,
    bounds: Option<PixelBounds>,
}

impl PixelRuns {
    /// Build from linear pixel indices in any order. Duplicates are merged.
    pub fn from_indices(mut indices: Vec<usize>, raster_width: usize) -> Self {
        indices.sort_unstable();
        indices.dedup();

        let mut runs: Vec<PixelRun> = Vec::new();
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (usize::MAX, usize::MAX, 0, 0);

        for &idx in &indices {
            let y = idx / raster_width.max(1);
            let x = idx - y * raster_width;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            match runs.last_mut() {
                Some(run) if run.y == y && run.x + run.len == x => run.len += 1,
                _ => runs.push(PixelRun { y, x, len: 1 }),
            }
        }

        let bounds = (!indices.is_empty()).then(|| PixelBounds {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        });

        Self {
            raster_width,
            runs,
            area: indices.len(),
            bounds,
        }
    }

    pub fn area(&self) -> usize {
        self.area
    }

    pub fn is_empty(&self) -> bool {
        self.area == 0
    }

    pub fn bounds(&self) -> Option<PixelBounds> {
        self.bounds
    }

    pub fn runs(&self) -> &[PixelRun] {
        &self.runs
    }

    pub fn raster_width(&self) -> usize {
        self.raster_width
    }

    /// Linear indices in row-major order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        let w = self.raster_width;
        self.runs
            .iter()
            .flat_map(move |run| (run.x..run.x + run.len).map(move |x| run.y * w + x))
    }

    /// `(x, y)` coordinates in row-major order.
    pub fn coords(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.runs
            .iter()
            .flat_map(|run| (run.x..run.x + run.len).map(move |x| (x, run.y)))
    }

    /// True when every run lies inside a `width` x `height` raster of the
    /// same row stride.
    pub fn fits(&self, width: usize, height: usize) -> bool {
        self.raster_width == width
            && self
                .runs
                .iter()
                .all(|r| r.y < height && r.x.checked_add(r.len).is_some_and(|end| end <= width))
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        if !self.bounds.is_some_and(|b| b.contains(x, y)) {
            return false;
        }
        // Last run starting at or before (y, x)
        let pos = self.runs.partition_point(|r| (r.y, r.x) <= (y, x));
        pos > 0 && {
            let run = &self.runs[pos - 1];
            run.y == y && x < run.x + run.len
        }
    }
}
