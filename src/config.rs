//! Tunable thresholds for hull protection, grouping and the magic wand.

use serde::{Deserialize, Serialize};

use crate::error::{EraserError, Result};

/// Pixels with alpha above this value count as opaque.
pub const ALPHA_THRESHOLD: u8 = 30;
/// Hull margin as a fraction of the keypoint bounding-box diagonal.
pub const HULL_MARGIN_RATIO: f64 = 0.08;
/// Keypoints scoring below this are ignored.
pub const MIN_KEYPOINT_SCORE: f64 = 0.3;
/// Components larger than this fraction of the raster are never erasable.
pub const MAX_GROUP_RATIO: f64 = 0.5;
/// Euclidean RGB distance accepted by the magic wand.
pub const COLOR_TOLERANCE: f64 = 80.0;
/// Magic wand regions smaller than this are ignored.
pub const MIN_REGION_SIZE: usize = 50;
/// Magic wand regions larger than this fraction of the raster are rejected.
pub const MW_MAX_REGION_RATIO: f64 = 0.5;
/// Directions sampled for the disk-based hull expansion.
pub const DISK_SEGMENTS: usize = 32;
/// Minimum number of keypoints needed to build a hull.
pub const MIN_HULL_POINTS: usize = 3;

/// Engine configuration. `Default` yields the standard constants above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EraserConfig {
    pub alpha_threshold: u8,
    pub hull_margin_ratio: f64,
    pub min_keypoint_score: f64,
    pub max_group_ratio: f64,
    pub color_tolerance: f64,
    pub min_region_size: usize,
    pub max_region_ratio: f64,
    pub disk_segments: usize,
    /// Report fallback mode when a valid hull leaves nothing to erase.
    pub fallback_when_no_groups: bool,
    /// Re-run classification and grouping after every commit.
    pub recompute_after_commit: bool,
}

impl Default for EraserConfig {
    fn default() -> Self {
        Self {
            alpha_threshold: ALPHA_THRESHOLD,
            hull_margin_ratio: HULL_MARGIN_RATIO,
            min_keypoint_score: MIN_KEYPOINT_SCORE,
            max_group_ratio: MAX_GROUP_RATIO,
            color_tolerance: COLOR_TOLERANCE,
            min_region_size: MIN_REGION_SIZE,
            max_region_ratio: MW_MAX_REGION_RATIO,
            disk_segments: DISK_SEGMENTS,
            fallback_when_no_groups: true,
            recompute_after_commit: false,
        }
    }
}

impl EraserConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use residue_eraser::EraserConfig;
    ///
    /// let config = EraserConfig::builder()
    ///     .alpha_threshold(40)
    ///     .color_tolerance(60.0)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.alpha_threshold, 40);
    /// ```
    #[must_use]
    pub fn builder() -> EraserConfigBuilder {
        EraserConfigBuilder::default()
    }

    /// Validate all parameters.
    ///
    /// # Errors
    /// - Ratios outside (0, 1]
    /// - Negative or non-finite margin ratio or color tolerance
    /// - Keypoint score threshold outside [0, 1]
    /// - Alpha threshold of 255 (nothing could ever be opaque)
    /// - Fewer than 8 disk segments
    pub fn validate(&self) -> Result<()> {
        check_unit_ratio("max group ratio", self.max_group_ratio)?;
        check_unit_ratio("magic wand max region ratio", self.max_region_ratio)?;

        if !self.hull_margin_ratio.is_finite() || self.hull_margin_ratio < 0.0 {
            return Err(EraserError::config_value_error(
                "hull margin ratio",
                self.hull_margin_ratio,
                ">= 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_keypoint_score) {
            return Err(EraserError::config_value_error(
                "minimum keypoint score",
                self.min_keypoint_score,
                "[0, 1]",
            ));
        }
        if !self.color_tolerance.is_finite() || self.color_tolerance < 0.0 {
            return Err(EraserError::config_value_error(
                "color tolerance",
                self.color_tolerance,
                ">= 0",
            ));
        }
        if self.alpha_threshold == u8::MAX {
            return Err(EraserError::config_value_error(
                "alpha threshold",
                self.alpha_threshold,
                "0-254",
            ));
        }
        if self.disk_segments < 8 {
            return Err(EraserError::config_value_error(
                "disk segments",
                self.disk_segments,
                ">= 8",
            ));
        }
        Ok(())
    }
}

fn check_unit_ratio(parameter: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(EraserError::config_value_error(parameter, value, "(0, 1]"))
    }
}

/// Builder for `EraserConfig`
#[derive(Debug, Default)]
pub struct EraserConfigBuilder {
    config: EraserConfig,
}

impl EraserConfigBuilder {
    #[must_use]
    pub fn alpha_threshold(mut self, threshold: u8) -> Self {
        self.config.alpha_threshold = threshold;
        self
    }

    #[must_use]
    pub fn hull_margin_ratio(mut self, ratio: f64) -> Self {
        self.config.hull_margin_ratio = ratio;
        self
    }

    #[must_use]
    pub fn min_keypoint_score(mut self, score: f64) -> Self {
        self.config.min_keypoint_score = score;
        self
    }

    #[must_use]
    pub fn max_group_ratio(mut self, ratio: f64) -> Self {
        self.config.max_group_ratio = ratio;
        self
    }

    #[must_use]
    pub fn color_tolerance(mut self, tolerance: f64) -> Self {
        self.config.color_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn min_region_size(mut self, size: usize) -> Self {
        self.config.min_region_size = size;
        self
    }

    #[must_use]
    pub fn max_region_ratio(mut self, ratio: f64) -> Self {
        self.config.max_region_ratio = ratio;
        self
    }

    #[must_use]
    pub fn disk_segments(mut self, segments: usize) -> Self {
        self.config.disk_segments = segments;
        self
    }

    #[must_use]
    pub fn fallback_when_no_groups(mut self, enabled: bool) -> Self {
        self.config.fallback_when_no_groups = enabled;
        self
    }

    #[must_use]
    pub fn recompute_after_commit(mut self, enabled: bool) -> Self {
        self.config.recompute_after_commit = enabled;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<EraserConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
