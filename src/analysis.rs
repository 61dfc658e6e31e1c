//! The residue analysis pipeline.
//!
//! keypoints -> projection -> convex hull -> expansion -> classification
//! -> grouping. Every stage is a pure function of its inputs; the only
//! shared state is the cancellation flag checked between rows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::buffer::PixelBuffer;
use crate::classify::{classify_pixels, ClassStats};
use crate::config::EraserConfig;
use crate::error::{EraserError, Result};
use crate::geometry::{convex_hull, expand_hull, margin_radius, ExpandedHull, Point, Polygon};
use crate::keypoints::{project_keypoints, Keypoint, Projection};
use crate::selection::components::{group_residue, Grouping};

/// Cooperative cancellation flag tagged with the generation it belongs to.
#[derive(Clone, Debug)]
pub struct CancelToken {
    generation: u64,
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Token for synchronous callers; nothing ever cancels it.
    pub fn never() -> Self {
        Self::new(0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once `cancel` has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EraserError::Cancelled {
                generation: self.generation,
            })
        } else {
            Ok(())
        }
    }
}

/// Why a session runs the magic wand instead of hull-based groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackReason {
    InsufficientKeypoints { found: usize },
    DegenerateHull { distinct_points: usize },
    /// The hull is fine but nothing outside it is erasable
    NoResidueGroups,
}

/// Protected region derived from the pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HullAnalysis {
    /// Filtered keypoints in raster space
    pub points: Vec<Point>,
    pub raw: Polygon,
    pub expanded: ExpandedHull,
}

/// Classification and grouping of one buffer state.
#[derive(Clone, Debug, PartialEq)]
pub struct ResidueAnalysis {
    pub stats: ClassStats,
    pub grouping: Grouping,
}

/// Full pipeline result for one buffer snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    pub generation: u64,
    /// First group id handed to the grouper
    pub first_id: u32,
    pub hull: std::result::Result<HullAnalysis, FallbackReason>,
    pub residue: Option<ResidueAnalysis>,
}

impl Analysis {
    /// Fallback reason, if the session should use the magic wand.
    pub fn fallback_reason(&self, config: &EraserConfig) -> Option<FallbackReason> {
        match (&self.hull, &self.residue) {
            (Err(reason), _) => Some(*reason),
            (Ok(_), Some(residue)) if residue.grouping.groups.is_empty() && config.fallback_when_no_groups => {
                Some(FallbackReason::NoResidueGroups)
            }
            _ => None,
        }
    }
}

/// Project keypoints and build the expanded protective hull.
pub fn build_hull(
    keypoints: &[Keypoint],
    projection: &Projection,
    config: &EraserConfig,
    raster_width: usize,
    raster_height: usize,
) -> std::result::Result<HullAnalysis, FallbackReason> {
    let points = project_keypoints(
        keypoints,
        projection,
        config.min_keypoint_score,
        raster_width,
        raster_height,
    )
    .map_err(|e| FallbackReason::InsufficientKeypoints { found: e.found })?;

    let raw = convex_hull(&points).map_err(|e| FallbackReason::DegenerateHull {
        distinct_points: e.distinct_points,
    })?;

    let margin = margin_radius(&raw, config.hull_margin_ratio);
    let expanded = expand_hull(&raw, margin, config.disk_segments);
    debug!(
        vertices = raw.len(),
        margin,
        method = ?expanded.method,
        raw_area = raw.area(),
        expanded_area = expanded.polygon.area(),
        "built protective hull"
    );

    Ok(HullAnalysis {
        points,
        raw,
        expanded,
    })
}

/// Classify the buffer against the hull and group what lies outside it.
pub fn analyze_residue(
    buffer: &PixelBuffer,
    hull: &HullAnalysis,
    config: &EraserConfig,
    first_id: u32,
    cancel: &CancelToken,
) -> Result<ResidueAnalysis> {
    cancel.check()?;
    let mask = classify_pixels(buffer, &hull.expanded.polygon, config.alpha_threshold);
    cancel.check()?;
    let grouping = group_residue(&mask, config.max_group_ratio, first_id, cancel)?;
    Ok(ResidueAnalysis {
        stats: mask.stats(),
        grouping,
    })
}

/// Run the whole pipeline over one buffer snapshot.
///
/// Too few keypoints or a degenerate hull are not errors: the result
/// carries the fallback reason and no residue analysis.
#[instrument(skip_all, fields(width = buffer.width(), height = buffer.height(), generation = cancel.generation()))]
pub fn analyze(
    buffer: &PixelBuffer,
    keypoints: &[Keypoint],
    projection: &Projection,
    config: &EraserConfig,
    first_id: u32,
    cancel: &CancelToken,
) -> Result<Analysis> {
    config.validate()?;

    let hull = build_hull(keypoints, projection, config, buffer.width(), buffer.height());
    let residue = match &hull {
        Ok(hull) => Some(analyze_residue(buffer, hull, config, first_id, cancel)?),
        Err(reason) => {
            warn!(?reason, "pose unusable, switching to magic wand");
            None
        }
    };

    if let (Ok(hull), Some(residue)) = (&hull, &residue) {
        let coverage = residue.stats.protected as f64 / buffer.pixel_count() as f64;
        info!(
            hull_vertices = hull.raw.len(),
            margin = hull.expanded.margin,
            opaque = residue.stats.opaque,
            protected_share = coverage,
            groups = residue.grouping.groups.len(),
            oversized = residue.grouping.oversized.len(),
            "residue analysis complete"
        );
    }

    Ok(Analysis {
        generation: cancel.generation(),
        first_id,
        hull,
        residue,
    })
}
