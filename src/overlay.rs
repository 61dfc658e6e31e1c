//! Overlay rasters for the interaction layer.
//!
//! The engine does not draw on any surface itself; it hands the UI RGBA
//! patches to composite over the image:
//! - **Highlight**: translucent tint over a group or magic wand region
//! - **Hull debug**: raw hull, expanded hull (dashed) and keypoint dots

use ndarray::Array3;

use crate::analysis::HullAnalysis;
use crate::buffer::PixelBuffer;
use crate::error::Result;
use crate::geometry::{Point, Polygon};
use crate::selection::{PixelBounds, PixelRuns};

/// Default hover tint.
pub const HIGHLIGHT_COLOR: [u8; 4] = [255, 50, 50, 100];
pub const RAW_HULL_COLOR: [u8; 4] = [0, 255, 0, 204];
pub const EXPANDED_HULL_COLOR: [u8; 4] = [255, 255, 0, 204];
pub const KEYPOINT_COLOR: [u8; 4] = [255, 0, 0, 204];
const KEYPOINT_RADIUS: f64 = 3.0;
/// Dash pattern of the expanded hull, in pixels on / off.
const DASH: (usize, usize) = (6, 4);

/// RGBA patch to draw at `(bounds.x, bounds.y)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayPatch {
    pub bounds: PixelBounds,
    pub rgba: Vec<u8>,
}

/// Tint every pixel of `pixels` with `color`, cropped to their bounds.
/// `None` for an empty set.
pub fn highlight_patch(pixels: &PixelRuns, color: [u8; 4]) -> Option<OverlayPatch> {
    let bounds = pixels.bounds()?;
    let mut patch = Array3::<u8>::zeros((bounds.height, bounds.width, 4));
    for (x, y) in pixels.coords() {
        let (px, py) = (x - bounds.x, y - bounds.y);
        for c in 0..4 {
            patch[[py, px, c]] = color[c];
        }
    }
    Some(OverlayPatch {
        bounds,
        rgba: patch.into_raw_vec_and_offset().0,
    })
}

/// Full-size debug drawing of the protective hull.
pub fn hull_debug_overlay(width: usize, height: usize, hull: &HullAnalysis) -> Result<PixelBuffer> {
    let mut canvas = Array3::<u8>::zeros((height, width, 4));

    draw_polygon(&mut canvas, &hull.raw, RAW_HULL_COLOR, None);
    draw_polygon(&mut canvas, &hull.expanded.polygon, EXPANDED_HULL_COLOR, Some(DASH));
    for p in &hull.points {
        fill_disk(&mut canvas, p, KEYPOINT_RADIUS, KEYPOINT_COLOR);
    }

    PixelBuffer::new(width, height, canvas.into_raw_vec_and_offset().0)
}

#[inline]
fn put(canvas: &mut Array3<u8>, x: i64, y: i64, color: [u8; 4]) {
    let (height, width, _) = canvas.dim();
    if x < 0 || y < 0 || x as usize >= width || y as usize >= height {
        return;
    }
    for c in 0..4 {
        canvas[[y as usize, x as usize, c]] = color[c];
    }
}

fn draw_polygon(canvas: &mut Array3<u8>, polygon: &Polygon, color: [u8; 4], dash: Option<(usize, usize)>) {
    // Dash phase carries across edges so corners don't restart the pattern
    let mut step = 0usize;
    for (a, b) in polygon.edges() {
        draw_line(canvas, a, b, color, dash, &mut step);
    }
}

/// Bresenham line between rounded endpoints.
fn draw_line(
    canvas: &mut Array3<u8>,
    a: &Point,
    b: &Point,
    color: [u8; 4],
    dash: Option<(usize, usize)>,
    step: &mut usize,
) {
    let (mut x0, mut y0) = (a.x.round() as i64, a.y.round() as i64);
    let (x1, y1) = (b.x.round() as i64, b.y.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        let visible = match dash {
            Some((on, off)) => *step % (on + off) < on,
            None => true,
        };
        if visible {
            put(canvas, x0, y0, color);
        }
        *step += 1;

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn fill_disk(canvas: &mut Array3<u8>, center: &Point, radius: f64, color: [u8; 4]) {
    let r_ceil = radius.ceil() as i64;
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;
    let r_sq = radius * radius;
    for dy in -r_ceil..=r_ceil {
        for dx in -r_ceil..=r_ceil {
            if (dx * dx + dy * dy) as f64 <= r_sq {
                put(canvas, cx + dx, cy + dy, color);
            }
        }
    }
}
