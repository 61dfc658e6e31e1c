//! WebAssembly exports for the eraser session.
//!
//! These types are exposed to JavaScript via wasm-bindgen. Images cross
//! the boundary as flat RGBA byte arrays (length = width * height * 4);
//! keypoints and configuration as JSON strings.

use wasm_bindgen::prelude::*;

use crate::buffer::PixelBuffer;
use crate::config::EraserConfig;
use crate::keypoints::{Keypoint, Projection};
use crate::overlay::{highlight_patch, hull_debug_overlay, OverlayPatch, HIGHLIGHT_COLOR};
use crate::selection::GroupId;
use crate::session::EraserSession;

/// Eraser session driven by pointer events from the canvas.
#[wasm_bindgen]
pub struct WasmEraserSession {
    inner: EraserSession,
    hovered: Option<GroupId>,
}

impl WasmEraserSession {
    fn current_patch(&self) -> Option<OverlayPatch> {
        if self.inner.is_fallback() {
            let region = self.inner.highlight()?;
            highlight_patch(&region.pixels, HIGHLIGHT_COLOR)
        } else {
            let group = self.inner.group(self.hovered?)?;
            highlight_patch(&group.pixels, HIGHLIGHT_COLOR)
        }
    }
}

#[wasm_bindgen]
impl WasmEraserSession {
    /// Analyze an image and open a session on it.
    ///
    /// # Arguments
    /// * `data` - Flat array of RGBA bytes
    /// * `width` - Image width in pixels
    /// * `height` - Image height in pixels
    /// * `keypoints_json` - `[{"name", "x", "y", "score"}, ...]` in image pixels
    /// * `config_json` - Optional partial `EraserConfig`; missing fields use defaults
    #[wasm_bindgen(constructor)]
    pub fn new(
        data: &[u8],
        width: usize,
        height: usize,
        keypoints_json: &str,
        config_json: Option<String>,
    ) -> Result<WasmEraserSession, JsError> {
        let buffer = PixelBuffer::new(width, height, data.to_vec())?;
        let keypoints: Vec<Keypoint> = serde_json::from_str(keypoints_json)?;
        let config = match config_json {
            Some(json) => serde_json::from_str::<EraserConfig>(&json)?,
            None => EraserConfig::default(),
        };
        let inner = EraserSession::new(buffer, &keypoints, Projection::Identity, config)?;
        Ok(WasmEraserSession {
            inner,
            hovered: None,
        })
    }

    #[wasm_bindgen(getter)]
    pub fn fallback(&self) -> bool {
        self.inner.is_fallback()
    }

    /// `{"Hull": ...}` style description of the current mode
    pub fn mode_json(&self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.inner.mode())?)
    }

    pub fn stats_json(&self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.inner.stats())?)
    }

    pub fn group_count(&self) -> usize {
        self.inner.group_count()
    }

    /// Update the hover target. Returns true when something is highlighted.
    pub fn hover(&mut self, x: i32, y: i32) -> bool {
        let (x, y) = (x as i64, y as i64);
        if self.inner.is_fallback() {
            self.hovered = None;
            self.inner.hover_fallback(x, y).is_some()
        } else {
            self.hovered = self.inner.hit_test_group(x, y);
            self.hovered.is_some()
        }
    }

    /// `[x, y, width, height]` of the highlight patch, empty when nothing
    /// is highlighted.
    pub fn highlight_bounds(&self) -> Vec<u32> {
        match self.current_patch() {
            Some(patch) => vec![
                patch.bounds.x as u32,
                patch.bounds.y as u32,
                patch.bounds.width as u32,
                patch.bounds.height as u32,
            ],
            None => Vec::new(),
        }
    }

    /// RGBA bytes of the highlight patch, to draw at `highlight_bounds`.
    pub fn highlight_rgba(&self) -> Vec<u8> {
        self.current_patch().map(|p| p.rgba).unwrap_or_default()
    }

    /// Erase whatever is under the pointer. Returns the number of pixels
    /// cleared; 0 when the click hits nothing erasable.
    pub fn click(&mut self, x: i32, y: i32) -> Result<usize, JsError> {
        let (x, y) = (x as i64, y as i64);
        let cleared = if self.inner.is_fallback() {
            self.inner.commit_highlight(x, y)?
        } else {
            match self.inner.hit_test_group(x, y) {
                Some(id) => self.inner.commit(id)?,
                None => 0,
            }
        };
        self.hovered = None;
        Ok(cleared)
    }

    pub fn recompute(&mut self) -> Result<(), JsError> {
        self.hovered = None;
        Ok(self.inner.recompute()?)
    }

    /// Current image as flat RGBA bytes.
    pub fn pixels(&self) -> Vec<u8> {
        self.inner.buffer().as_bytes().to_vec()
    }

    /// Full-size debug drawing of the pose hull; empty in fallback mode
    /// without a hull.
    pub fn hull_overlay(&self) -> Result<Vec<u8>, JsError> {
        match self.inner.hull_analysis() {
            Some(hull) => {
                let buffer = self.inner.buffer();
                Ok(hull_debug_overlay(buffer.width(), buffer.height(), hull)?.into_bytes())
            }
            None => Ok(Vec::new()),
        }
    }
}
