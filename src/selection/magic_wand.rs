//! Magic wand selection using flood fill.
//!
//! Fallback selector for rasters without usable pose data: grows a region
//! from a seed pixel over 4-connected neighbors whose RGB color lies within
//! a Euclidean tolerance of the seed color.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::runs::{PixelBounds, PixelRuns};
use crate::buffer::PixelBuffer;
use crate::config::EraserConfig;
use crate::error::Result;

/// Ad-hoc region produced by one magic wand click.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackRegion {
    pub seed: (usize, usize),
    pub seed_color: [u8; 3],
    pub raster_width: usize,
    pub raster_height: usize,
    pub pixels: PixelRuns,
}

impl FallbackRegion {
    pub fn area(&self) -> usize {
        self.pixels.area()
    }

    pub fn bounds(&self) -> Option<PixelBounds> {
        self.pixels.bounds()
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        self.pixels.contains(x, y)
    }
}

/// Result of a magic wand click. Everything except `Region` is a no-op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WandOutcome {
    Region(FallbackRegion),
    /// Fewer pixels than the minimum region size
    TooSmall { area: usize },
    /// Grew past the size cap; `area` is where the fill stopped
    RegionTooLarge { area: usize },
    /// The seed pixel itself is transparent
    TransparentSeed,
}

impl WandOutcome {
    pub fn region(&self) -> Option<&FallbackRegion> {
        match self {
            WandOutcome::Region(region) => Some(region),
            _ => None,
        }
    }

    pub fn into_region(self) -> Option<FallbackRegion> {
        match self {
            WandOutcome::Region(region) => Some(region),
            _ => None,
        }
    }

    pub fn is_noop(&self) -> bool {
        !matches!(self, WandOutcome::Region(_))
    }
}

/// Perform magic wand selection from `(start_x, start_y)`.
///
/// Pixels at or below the alpha threshold never join the region. The fill
/// stops as soon as it exceeds `max_region_ratio * width * height` pixels.
///
/// # Errors
/// `OutOfBounds` when the seed is outside the raster.
pub fn magic_wand_select(
    buffer: &PixelBuffer,
    start_x: i64,
    start_y: i64,
    config: &EraserConfig,
) -> Result<WandOutcome> {
    let width = buffer.width();
    let height = buffer.height();
    let start = buffer.index_of(start_x, start_y)?;

    let [ref_r, ref_g, ref_b, ref_a] = buffer.rgba_at(start);
    if ref_a <= config.alpha_threshold {
        return Ok(WandOutcome::TransparentSeed);
    }

    let max_pixels = (config.max_region_ratio * (width * height) as f64).floor() as usize;
    let tol_sq = config.color_tolerance * config.color_tolerance;

    let mut members = Vec::new();
    let mut queue = VecDeque::new();
    let mut visited = vec![false; width * height];
    queue.push_back(start);
    visited[start] = true;

    while let Some(idx) = queue.pop_front() {
        members.push(idx);
        if members.len() > max_pixels {
            debug!(area = members.len(), max_pixels, "magic wand region too large");
            return Ok(WandOutcome::RegionTooLarge { area: members.len() });
        }

        let x = idx % width;
        let y = idx / width;
        for (dx, dy) in &[(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            let nidx = ny as usize * width + nx as usize;
            if visited[nidx] {
                continue;
            }
            let [r, g, b, a] = buffer.rgba_at(nidx);
            if a <= config.alpha_threshold {
                continue;
            }
            if color_distance_sq(r, g, b, ref_r, ref_g, ref_b) <= tol_sq {
                visited[nidx] = true;
                queue.push_back(nidx);
            }
        }
    }

    if members.len() < config.min_region_size {
        debug!(area = members.len(), "magic wand region too small");
        return Ok(WandOutcome::TooSmall { area: members.len() });
    }

    Ok(WandOutcome::Region(FallbackRegion {
        seed: (start % width, start / width),
        seed_color: [ref_r, ref_g, ref_b],
        raster_width: width,
        raster_height: height,
        pixels: PixelRuns::from_indices(members, width),
    }))
}

/// Squared Euclidean RGB distance; alpha is ignored.
#[inline]
fn color_distance_sq(r: u8, g: u8, b: u8, ref_r: u8, ref_g: u8, ref_b: u8) -> f64 {
    let dr = r as f64 - ref_r as f64;
    let dg = g as f64 - ref_g as f64;
    let db = b as f64 - ref_b as f64;
    dr * dr + dg * dg + db * db
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EraserConfig {
        EraserConfig::builder().min_region_size(4).build().unwrap()
    }

    /// 10x10 opaque image: left half red, right half blue
    fn split_image() -> PixelBuffer {
        let mut data = vec![0u8; 10 * 10 * 4];
        for y in 0..10 {
            for x in 0..10 {
                let idx = (y * 10 + x) * 4;
                if x < 5 {
                    data[idx] = 255;
                } else {
                    data[idx + 2] = 255;
                }
                data[idx + 3] = 255;
            }
        }
        PixelBuffer::new(10, 10, data).unwrap()
    }

    #[test]
    fn test_selects_half() {
        let config = EraserConfig::builder()
            .min_region_size(4)
            .max_region_ratio(0.5)
            .build()
            .unwrap();
        let outcome = magic_wand_select(&split_image(), 0, 0, &config).unwrap();
        let region = outcome.region().unwrap();
        assert_eq!(region.area(), 50);
        assert_eq!(region.seed_color, [255, 0, 0]);
        assert!(region.contains(4, 9));
        assert!(!region.contains(5, 0));
    }

    #[test]
    fn test_too_large() {
        let config = EraserConfig::builder()
            .min_region_size(4)
            .max_region_ratio(0.3)
            .build()
            .unwrap();
        let outcome = magic_wand_select(&split_image(), 7, 7, &config).unwrap();
        assert_eq!(outcome, WandOutcome::RegionTooLarge { area: 31 });
        assert!(outcome.is_noop());
    }

    #[test]
    fn test_tolerance_is_euclidean() {
        // 3x3 red gradient; 230 at the center
        let values = [250u8, 245, 240, 235, 230, 225, 220, 215, 160];
        let mut data = vec![0u8; 9 * 4];
        for (i, &v) in values.iter().enumerate() {
            data[i * 4] = v;
            data[i * 4 + 3] = 255;
        }
        let buffer = PixelBuffer::new(3, 3, data).unwrap();
        let config = EraserConfig::builder()
            .min_region_size(1)
            .max_region_ratio(1.0)
            .color_tolerance(20.0)
            .build()
            .unwrap();
        let region = magic_wand_select(&buffer, 1, 1, &config).unwrap().into_region().unwrap();
        // 250..215 are within 20 of 230 or reachable through them; 160 is not
        assert_eq!(region.area(), 8);
        assert!(!region.contains(2, 2));
    }

    #[test]
    fn test_transparent_pixels_excluded() {
        let mut buffer = PixelBuffer::filled(4, 4, [10, 10, 10, 255]).unwrap();
        buffer.clear_alpha([0usize, 1, 2, 3]);
        let outcome = magic_wand_select(&buffer, 0, 0, &config()).unwrap();
        assert_eq!(outcome, WandOutcome::TransparentSeed);

        let config = EraserConfig::builder()
            .min_region_size(4)
            .max_region_ratio(1.0)
            .build()
            .unwrap();
        let region = magic_wand_select(&buffer, 0, 3, &config).unwrap().into_region().unwrap();
        assert_eq!(region.area(), 12);
    }

    /// 20x20 transparent raster with the first `count` pixels of a
    /// 10-wide block opaque green.
    fn block_image(count: usize) -> PixelBuffer {
        let mut data = vec![0u8; 20 * 20 * 4];
        for i in 0..count {
            let (x, y) = (i % 10, i / 10);
            let o = (y * 20 + x) * 4;
            data[o + 1] = 200;
            data[o + 3] = 255;
        }
        PixelBuffer::new(20, 20, data).unwrap()
    }

    #[test]
    fn test_min_region_size_limit() {
        let config = EraserConfig::default();
        assert_eq!(config.min_region_size, 50);
        assert_eq!(
            magic_wand_select(&block_image(49), 0, 0, &config).unwrap(),
            WandOutcome::TooSmall { area: 49 }
        );
        let region = magic_wand_select(&block_image(50), 0, 0, &config)
            .unwrap()
            .into_region()
            .unwrap();
        assert_eq!(region.area(), 50);
    }

    #[test]
    fn test_max_region_limit() {
        // 10x10 raster: cap is 0.5 * 100 = 50 pixels
        let config = EraserConfig::builder().min_region_size(1).build().unwrap();
        let image = |count: usize| {
            let mut data = vec![0u8; 10 * 10 * 4];
            for i in 0..count {
                data[i * 4] = 255;
                data[i * 4 + 3] = 255;
            }
            PixelBuffer::new(10, 10, data).unwrap()
        };
        let region = magic_wand_select(&image(50), 0, 0, &config)
            .unwrap()
            .into_region()
            .unwrap();
        assert_eq!(region.area(), 50);
        assert_eq!(
            magic_wand_select(&image(51), 0, 0, &config).unwrap(),
            WandOutcome::RegionTooLarge { area: 51 }
        );
    }

    #[test]
    fn test_too_small_and_out_of_bounds() {
        let buffer = PixelBuffer::filled(2, 2, [0, 0, 0, 255]).unwrap();
        let config = EraserConfig::builder().max_region_ratio(1.0).build().unwrap();
        assert_eq!(
            magic_wand_select(&buffer, 1, 1, &config).unwrap(),
            WandOutcome::TooSmall { area: 4 }
        );
        assert!(magic_wand_select(&buffer, 2, 0, &config).is_err());
        assert!(magic_wand_select(&buffer, -1, 0, &config).is_err());
    }
}
