//! Residue Eraser
//!
//! Pose-aware cleanup of background-removal leftovers, with Python bindings
//! via PyO3 and WASM bindings for JavaScript.
//!
//! A segmentation model usually leaves small opaque fragments around the
//! subject. Given the RGBA cutout and the subject's pose keypoints, the
//! engine protects everything inside an expanded convex hull of the pose,
//! groups the opaque pixels outside it into connected components, and lets
//! the user erase a component with one click.
//!
//! ## Image Format
//! RGBA `u8`, row-major, shape `(height, width, 4)`. Erasing only ever
//! sets alpha to 0; color channels are never touched.
//!
//! ## Modes
//! - **Hull**: residue groups outside the protective hull
//! - **Fallback**: magic wand selection when the pose is unusable or
//!   nothing is left to erase outside the hull

pub mod analysis;
pub mod buffer;
pub mod classify;
pub mod config;
pub mod error;
pub mod geometry;
pub mod keypoints;
pub mod overlay;
pub mod selection;
pub mod session;
pub mod worker;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use analysis::{analyze, Analysis, CancelToken, FallbackReason, HullAnalysis};
pub use buffer::PixelBuffer;
pub use classify::{classify_pixels, ClassificationMask, PixelClass};
pub use config::{EraserConfig, EraserConfigBuilder};
pub use error::{EraserError, Result};
pub use geometry::{Point, Polygon};
pub use keypoints::{Keypoint, Projection, BLAZEPOSE_KEYPOINTS};
pub use selection::{ComponentGroup, FallbackRegion, GroupId, WandOutcome};
pub use session::{EraserSession, SessionMode, SessionStats};
pub use worker::AnalysisWorker;

// Python bindings (only when python feature is enabled)
#[cfg(feature = "python")]
mod python {
    use numpy::{IntoPyArray, PyArray2, PyArray3, PyReadonlyArray3};
    use pyo3::exceptions::PyValueError;
    use pyo3::prelude::*;

    use crate::buffer::PixelBuffer;
    use crate::config::EraserConfig;
    use crate::error::EraserError;
    use crate::keypoints::{Keypoint, Projection};
    use crate::selection::GroupId;
    use crate::session::{EraserSession, SessionMode};

    impl From<EraserError> for PyErr {
        fn from(err: EraserError) -> PyErr {
            PyValueError::new_err(err.to_string())
        }
    }

    /// Interactive eraser over one RGBA image.
    ///
    /// # Arguments
    /// * `image` - RGBA u8 array of shape (height, width, 4)
    /// * `keypoints` - `(name, x, y, score)` tuples in image pixel space
    #[pyclass(name = "EraserSession")]
    pub struct PyEraserSession {
        inner: EraserSession,
    }

    #[pymethods]
    impl PyEraserSession {
        #[new]
        #[pyo3(signature = (image, keypoints, hull_margin_ratio=None, min_keypoint_score=None, color_tolerance=None, min_region_size=None))]
        fn new(
            image: PyReadonlyArray3<'_, u8>,
            keypoints: Vec<(String, f64, f64, f64)>,
            hull_margin_ratio: Option<f64>,
            min_keypoint_score: Option<f64>,
            color_tolerance: Option<f64>,
            min_region_size: Option<usize>,
        ) -> PyResult<Self> {
            let input = image.as_array();
            let (height, width, channels) = input.dim();
            if channels != 4 {
                return Err(PyValueError::new_err(format!(
                    "expected an RGBA image, got {channels} channels"
                )));
            }
            let buffer = PixelBuffer::new(width, height, input.iter().copied().collect())?;

            let mut builder = EraserConfig::builder();
            if let Some(v) = hull_margin_ratio {
                builder = builder.hull_margin_ratio(v);
            }
            if let Some(v) = min_keypoint_score {
                builder = builder.min_keypoint_score(v);
            }
            if let Some(v) = color_tolerance {
                builder = builder.color_tolerance(v);
            }
            if let Some(v) = min_region_size {
                builder = builder.min_region_size(v);
            }
            let config = builder.build()?;

            let keypoints: Vec<Keypoint> = keypoints
                .into_iter()
                .map(|(name, x, y, score)| Keypoint::new(name, x, y, score))
                .collect();
            let inner = EraserSession::new(buffer, &keypoints, Projection::Identity, config)?;
            Ok(Self { inner })
        }

        /// "hull" or "fallback"
        #[getter]
        fn mode(&self) -> &'static str {
            match self.inner.mode() {
                SessionMode::Hull => "hull",
                SessionMode::Fallback(_) => "fallback",
            }
        }

        #[getter]
        fn fallback_reason(&self) -> Option<String> {
            match self.inner.mode() {
                SessionMode::Hull => None,
                SessionMode::Fallback(reason) => Some(format!("{reason:?}")),
            }
        }

        fn group_ids(&self) -> Vec<u32> {
            self.inner.groups().map(|g| g.id.0).collect()
        }

        /// `(x, y, width, height)` of a live group
        fn group_bounds(&self, id: u32) -> Option<(usize, usize, usize, usize)> {
            let b = self.inner.group(GroupId(id))?.bounds()?;
            Some((b.x, b.y, b.width, b.height))
        }

        fn hit_test_group(&self, x: i64, y: i64) -> Option<u32> {
            self.inner.hit_test_group(x, y).map(|id| id.0)
        }

        /// Erase a group; returns the number of pixels cleared.
        fn commit(&mut self, id: u32) -> PyResult<usize> {
            Ok(self.inner.commit(GroupId(id))?)
        }

        /// Area of the magic wand region under the pointer, if any.
        fn hover_fallback(&mut self, x: i64, y: i64) -> Option<usize> {
            self.inner.hover_fallback(x, y).map(|r| r.area())
        }

        fn commit_highlight(&mut self, x: i64, y: i64) -> PyResult<usize> {
            Ok(self.inner.commit_highlight(x, y)?)
        }

        fn recompute(&mut self) -> PyResult<()> {
            Ok(self.inner.recompute()?)
        }

        /// Current RGBA image as (height, width, 4).
        fn image<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray3<u8>> {
            self.inner.buffer().view().to_owned().into_pyarray(py)
        }

        /// Group id per pixel (0 for none), in hull mode.
        fn labels<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray2<u32>>> {
            self.inner.labels().map(|l| l.clone().into_pyarray(py))
        }
    }

    /// Residue eraser extension module
    #[pymodule]
    pub fn residue_eraser(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<PyEraserSession>()?;
        Ok(())
    }
}

#[cfg(feature = "python")]
pub use python::residue_eraser;
