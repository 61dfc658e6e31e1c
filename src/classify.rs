//! Pixel classification against the protected hull.
//!
//! Every pixel with alpha above the threshold is either protected (its
//! center lies inside or on the expanded hull) or a residue candidate.
//! Pixels at or below the threshold are background and belong to neither.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::PixelBuffer;
use crate::geometry::{Point, Polygon};

/// Per-pixel classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PixelClass {
    /// Alpha at or below the threshold
    #[default]
    Background = 0,
    /// Opaque and inside the hull
    Protected = 1,
    /// Opaque and outside the hull
    Residue = 2,
}

/// Pixel counts per class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStats {
    pub opaque: usize,
    pub protected: usize,
    pub residue: usize,
}

/// `(height, width)` raster of pixel classes.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationMask {
    classes: Array2<PixelClass>,
    stats: ClassStats,
}

impl ClassificationMask {
    pub fn width(&self) -> usize {
        self.classes.ncols()
    }

    pub fn height(&self) -> usize {
        self.classes.nrows()
    }

    pub fn classes(&self) -> &Array2<PixelClass> {
        &self.classes
    }

    pub fn stats(&self) -> ClassStats {
        self.stats
    }

    #[inline]
    pub fn class_at(&self, x: usize, y: usize) -> PixelClass {
        self.classes[[y, x]]
    }

    /// Residue candidacy by linear pixel index.
    #[inline]
    pub fn is_residue_index(&self, index: usize) -> bool {
        self.classes
            .as_slice()
            .map(|s| s[index] == PixelClass::Residue)
            .unwrap_or(false)
    }

    /// Single-channel mask, 255 where `class` matches.
    pub fn to_mask(&self, class: PixelClass) -> Array2<u8> {
        self.classes.mapv(|c| if c == class { 255 } else { 0 })
    }
}

/// Classify every pixel of `buffer` against `hull`.
///
/// Pixels are tested at their centers `(x + 0.5, y + 0.5)`. Rows are
/// processed in parallel.
pub fn classify_pixels(buffer: &PixelBuffer, hull: &Polygon, alpha_threshold: u8) -> ClassificationMask {
    let width = buffer.width();
    let height = buffer.height();
    let bytes = buffer.as_bytes();
    let bounds = hull.bounding_rect();

    let mut classes = vec![PixelClass::Background; width * height];
    let (opaque, protected) = classes
        .par_chunks_mut(width)
        .enumerate()
        .map(|(y, row)| {
            let cy = y as f64 + 0.5;
            let row_may_hit = bounds.map_or(false, |b| cy >= b.min_y - 0.5 && cy <= b.max_y + 0.5);
            let row_bytes = &bytes[y * width * 4..(y + 1) * width * 4];

            let mut opaque = 0usize;
            let mut protected = 0usize;
            for (x, class) in row.iter_mut().enumerate() {
                if row_bytes[x * 4 + 3] <= alpha_threshold {
                    continue;
                }
                opaque += 1;
                if row_may_hit && hull.contains(&Point::new(x as f64 + 0.5, cy)) {
                    *class = PixelClass::Protected;
                    protected += 1;
                } else {
                    *class = PixelClass::Residue;
                }
            }
            (opaque, protected)
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    let stats = ClassStats {
        opaque,
        protected,
        residue: opaque - protected,
    };
    debug!(
        opaque = stats.opaque,
        protected = stats.protected,
        residue = stats.residue,
        "classified pixels"
    );

    let classes = Array2::from_shape_vec((height, width), classes)
        .unwrap_or_else(|_| unreachable!("class vector sized from buffer dimensions"));
    ClassificationMask { classes, stats }
}
