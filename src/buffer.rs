//! RGBA pixel buffer owned by an eraser session.
//!
//! ## Layout
//! Row-major, 4 bytes per pixel (R, G, B, A), `width * height * 4` bytes.
//! Views are exposed as ndarray arrays of shape `(height, width, 4)`.

use ndarray::{ArrayView2, ArrayView3, s};

use crate::error::{EraserError, Result};

/// Width/height tagged RGBA raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA bytes, checking the length against the dimensions.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EraserError::EmptyBuffer { width, height });
        }
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(4))
            .ok_or(EraserError::MalformedBuffer {
                width,
                height,
                expected: usize::MAX,
                actual: data.len(),
            })?;
        if data.len() != expected {
            return Err(EraserError::MalformedBuffer {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Fully transparent black raster.
    pub fn transparent(width: usize, height: usize) -> Result<Self> {
        Self::new(width, height, vec![0u8; width.saturating_mul(height).saturating_mul(4)])
    }

    /// Raster filled with a single RGBA color.
    pub fn filled(width: usize, height: usize, rgba: [u8; 4]) -> Result<Self> {
        let pixels = width.saturating_mul(height);
        let mut data = Vec::with_capacity(pixels.saturating_mul(4));
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self::new(width, height, data)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// `(height, width, 4)` view of the raster.
    pub fn view(&self) -> ArrayView3<'_, u8> {
        // The length was checked in `new`, so the shape always fits.
        ArrayView3::from_shape((self.height, self.width, 4), &self.data)
            .unwrap_or_else(|_| unreachable!("buffer length validated at construction"))
    }

    /// `(height, width)` view of the alpha channel.
    pub fn alpha_view(&self) -> ArrayView2<'_, u8> {
        self.view().slice_move(s![.., .., 3])
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Linear pixel index for an in-bounds coordinate.
    pub fn index_of(&self, x: i64, y: i64) -> Result<usize> {
        if self.contains(x, y) {
            Ok(y as usize * self.width + x as usize)
        } else {
            Err(EraserError::out_of_bounds(x, y, self.width, self.height))
        }
    }

    /// RGBA of the pixel at a linear index.
    #[inline]
    pub fn rgba_at(&self, index: usize) -> [u8; 4] {
        let o = index * 4;
        [self.data[o], self.data[o + 1], self.data[o + 2], self.data[o + 3]]
    }

    #[inline]
    pub fn alpha_at(&self, index: usize) -> u8 {
        self.data[index * 4 + 3]
    }

    /// Count of pixels with alpha above `threshold`.
    pub fn opaque_count(&self, threshold: u8) -> usize {
        self.data.chunks_exact(4).filter(|px| px[3] > threshold).count()
    }

    /// Fail unless the raster is exactly `width` x `height`.
    pub fn ensure_dimensions(&self, width: usize, height: usize) -> Result<()> {
        if self.width == width && self.height == height {
            Ok(())
        } else {
            Err(EraserError::DimensionMismatch {
                buffer_width: self.width,
                buffer_height: self.height,
                width,
                height,
            })
        }
    }

    /// Set alpha to zero for every linear index yielded. Returns how many
    /// pixels were still visible before the call.
    ///
    /// Callers check that the indices fit the raster before mutating.
    pub(crate) fn clear_alpha<I>(&mut self, indices: I) -> usize
    where
        I: IntoIterator<Item = usize>,
    {
        let mut cleared = 0;
        for index in indices {
            let a = &mut self.data[index * 4 + 3];
            if *a != 0 {
                *a = 0;
                cleared += 1;
            }
        }
        cleared
    }
}
