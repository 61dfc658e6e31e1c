//! Interactive eraser session over one image.
//!
//! A session owns the raster plus everything derived from it (hull, label
//! map, groups) and answers hover/click requests from the UI layer:
//!
//! - hull mode: `hit_test_group` on hover, `commit` on click
//! - fallback mode: `hover_fallback` on hover, `commit_highlight` on click
//!
//! Commits are the only operations that mutate the raster, and they only
//! ever set alpha to 0.

use std::collections::{BTreeMap, HashMap};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::analysis::{analyze, analyze_residue, Analysis, CancelToken, FallbackReason, HullAnalysis, ResidueAnalysis};
use crate::buffer::PixelBuffer;
use crate::classify::ClassStats;
use crate::config::EraserConfig;
use crate::error::{EraserError, Result};
use crate::geometry::Polygon;
use crate::keypoints::{Keypoint, Projection};
use crate::selection::{
    magic_wand_select, ComponentGroup, FallbackRegion, GroupId, Grouping, OversizedComponent, PixelBounds,
    WandOutcome,
};

/// Which selector the UI should drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// Residue groups outside the pose hull
    Hull,
    /// Magic wand, with the reason hull mode is unavailable
    Fallback(FallbackReason),
}

/// Counters for the current session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub opaque: usize,
    pub protected: usize,
    pub residue: usize,
    pub groups: usize,
    pub oversized: usize,
    pub commits: usize,
    pub erased_pixels: usize,
}

#[derive(Debug)]
pub struct EraserSession {
    buffer: PixelBuffer,
    config: EraserConfig,
    hull: std::result::Result<HullAnalysis, FallbackReason>,
    labels: Option<Array2<u32>>,
    groups: BTreeMap<GroupId, ComponentGroup>,
    oversized: Vec<OversizedComponent>,
    class_stats: ClassStats,
    mode: SessionMode,
    next_id: u32,
    highlight: Option<FallbackRegion>,
    revision: u64,
    commits: usize,
    erased_pixels: usize,
}

impl EraserSession {
    /// Analyze `buffer` synchronously and open a session on it.
    ///
    /// # Errors
    /// Invalid configuration. Unusable pose data is not an error; the
    /// session starts in fallback mode instead.
    #[instrument(skip_all, fields(width = buffer.width(), height = buffer.height(), keypoints = keypoints.len()))]
    pub fn new(
        buffer: PixelBuffer,
        keypoints: &[Keypoint],
        projection: Projection,
        config: EraserConfig,
    ) -> Result<Self> {
        let analysis = analyze(&buffer, keypoints, &projection, &config, 1, &CancelToken::never())?;
        Self::from_analysis(buffer, analysis, config)
    }

    /// Open a session from an analysis computed elsewhere, typically by
    /// [`crate::worker::AnalysisWorker`] on a snapshot of `buffer`.
    ///
    /// # Errors
    /// `DimensionMismatch` when the analysis was computed for a raster of
    /// another size.
    pub fn from_analysis(buffer: PixelBuffer, analysis: Analysis, config: EraserConfig) -> Result<Self> {
        config.validate()?;
        if let Some(residue) = &analysis.residue {
            let (h, w) = residue.grouping.labels.dim();
            buffer.ensure_dimensions(w, h)?;
        }

        let mut session = Self {
            buffer,
            config,
            hull: analysis.hull,
            labels: None,
            groups: BTreeMap::new(),
            oversized: Vec::new(),
            class_stats: ClassStats::default(),
            mode: SessionMode::Hull,
            next_id: analysis.first_id.max(1),
            highlight: None,
            revision: 0,
            commits: 0,
            erased_pixels: 0,
        };
        session.install(analysis.residue);
        Ok(session)
    }

    fn install(&mut self, residue: Option<ResidueAnalysis>) {
        match residue {
            Some(ResidueAnalysis { stats, grouping }) => {
                self.next_id = self.next_id.max(grouping.next_id(self.next_id));
                self.class_stats = stats;
                self.oversized = grouping.oversized;
                self.groups = grouping.groups.into_iter().map(|g| (g.id, g)).collect();
                self.labels = Some(grouping.labels);
            }
            None => {
                self.class_stats = ClassStats {
                    opaque: self.buffer.opaque_count(self.config.alpha_threshold),
                    ..ClassStats::default()
                };
                self.oversized.clear();
                self.groups.clear();
                self.labels = None;
            }
        }
        self.refresh_mode();
    }

    fn refresh_mode(&mut self) {
        self.mode = match &self.hull {
            Err(reason) => SessionMode::Fallback(*reason),
            Ok(_) if self.groups.is_empty() && self.config.fallback_when_no_groups => {
                SessionMode::Fallback(FallbackReason::NoResidueGroups)
            }
            Ok(_) => SessionMode::Hull,
        };
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.mode, SessionMode::Fallback(_))
    }

    pub fn config(&self) -> &EraserConfig {
        &self.config
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }

    /// Incremented on every mutation of the raster.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn hull_analysis(&self) -> Option<&HullAnalysis> {
        self.hull.as_ref().ok()
    }

    /// Expanded protective hull.
    pub fn hull(&self) -> Option<&Polygon> {
        self.hull_analysis().map(|h| &h.expanded.polygon)
    }

    /// Hull of the keypoints before expansion.
    pub fn raw_hull(&self) -> Option<&Polygon> {
        self.hull_analysis().map(|h| &h.raw)
    }

    /// Active groups in ascending id order.
    ///
    /// A group keeps its id across [`recompute`](Self::recompute) as long
    /// as its pixels are unchanged; a group that lost pixels comes back
    /// under a fresh id and the old id no longer resolves.
    pub fn groups(&self) -> impl Iterator<Item = &ComponentGroup> + '_ {
        self.groups.values()
    }

    pub fn group(&self, id: GroupId) -> Option<&ComponentGroup> {
        self.groups.get(&id)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn oversized(&self) -> &[OversizedComponent] {
        &self.oversized
    }

    /// Label map (group id per pixel, 0 for none), in hull mode.
    pub fn labels(&self) -> Option<&Array2<u32>> {
        self.labels.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            opaque: self.class_stats.opaque,
            protected: self.class_stats.protected,
            residue: self.class_stats.residue,
            groups: self.groups.len(),
            oversized: self.oversized.len(),
            commits: self.commits,
            erased_pixels: self.erased_pixels,
        }
    }

    /// Group under the pixel `(x, y)`, if any. Out-of-range coordinates
    /// hit nothing.
    pub fn hit_test_group(&self, x: i64, y: i64) -> Option<GroupId> {
        if !self.buffer.contains(x, y) {
            return None;
        }
        let label = self.labels.as_ref()?[[y as usize, x as usize]];
        let id = GroupId(label);
        (label != 0 && self.groups.contains_key(&id)).then_some(id)
    }

    /// Erase a group: alpha of all its pixels becomes 0 and the group is
    /// retired. Unknown or already committed ids are a no-op, and so are
    /// ids of groups that were reshaped by an earlier commit.
    ///
    /// Returns the number of pixels whose alpha changed.
    pub fn commit(&mut self, id: GroupId) -> Result<usize> {
        let Some(group) = self.groups.remove(&id) else {
            debug!(%id, "commit of unknown or retired group ignored");
            return Ok(0);
        };

        if let Some(labels) = self.labels.as_mut() {
            for (x, y) in group.pixels.coords() {
                labels[[y, x]] = 0;
            }
        }
        let cleared = self.buffer.clear_alpha(group.pixels.indices());
        self.record_commit(cleared);
        info!(%id, area = group.area(), cleared, "committed residue group");

        if self.config.recompute_after_commit {
            self.recompute()?;
        } else {
            self.class_stats.opaque -= cleared.min(self.class_stats.opaque);
            self.class_stats.residue -= cleared.min(self.class_stats.residue);
            self.refresh_mode();
        }
        Ok(cleared)
    }

    /// Run the magic wand at `(x, y)` on the current raster. The result is
    /// not cached.
    ///
    /// # Errors
    /// `OutOfBounds` for seeds outside the raster.
    pub fn select_fallback(&self, x: i64, y: i64) -> Result<WandOutcome> {
        magic_wand_select(&self.buffer, x, y, &self.config)
    }

    /// Hover in fallback mode: keep the current highlight while the pointer
    /// stays inside it, otherwise run the magic wand at the pointer.
    pub fn hover_fallback(&mut self, x: i64, y: i64) -> Option<&FallbackRegion> {
        if !self.buffer.contains(x, y) {
            self.highlight = None;
            return None;
        }
        let inside = self
            .highlight
            .as_ref()
            .is_some_and(|r| r.contains(x as usize, y as usize));
        if !inside {
            self.highlight = self.select_fallback(x, y).ok().and_then(WandOutcome::into_region);
        }
        self.highlight.as_ref()
    }

    pub fn highlight(&self) -> Option<&FallbackRegion> {
        self.highlight.as_ref()
    }

    pub fn clear_highlight(&mut self) {
        self.highlight = None;
    }

    /// Click in fallback mode: commit the highlighted region if the click
    /// lands inside it.
    pub fn commit_highlight(&mut self, x: i64, y: i64) -> Result<usize> {
        let hit = self.buffer.contains(x, y)
            && self
                .highlight
                .as_ref()
                .is_some_and(|r| r.contains(x as usize, y as usize));
        match (hit, self.highlight.take()) {
            (true, Some(region)) => self.commit_fallback(&region),
            (_, highlight) => {
                self.highlight = highlight;
                Ok(0)
            }
        }
    }

    /// Erase an ad-hoc magic wand region.
    ///
    /// # Errors
    /// `DimensionMismatch` when the region was computed for another raster
    /// size or its pixels do not fit this raster; nothing is erased in that
    /// case.
    pub fn commit_fallback(&mut self, region: &FallbackRegion) -> Result<usize> {
        self.buffer
            .ensure_dimensions(region.raster_width, region.raster_height)?;
        if !region.pixels.fits(self.buffer.width(), self.buffer.height()) {
            let bounds = region.bounds().unwrap_or(PixelBounds {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            });
            return Err(EraserError::DimensionMismatch {
                buffer_width: self.buffer.width(),
                buffer_height: self.buffer.height(),
                width: region.pixels.raster_width().max(bounds.x + bounds.width),
                height: bounds.y + bounds.height,
            });
        }

        let cleared = self.buffer.clear_alpha(region.pixels.indices());
        self.record_commit(cleared);
        self.highlight = None;
        info!(area = region.area(), cleared, "committed magic wand region");

        // Erased pixels may have belonged to hull groups
        if self.hull.is_ok() {
            self.recompute()?;
        } else {
            self.class_stats.opaque -= cleared.min(self.class_stats.opaque);
        }
        Ok(cleared)
    }

    /// Re-run classification and grouping over the current raster.
    /// Components identical to a live group keep that group's id; every
    /// other component gets a fresh one. Ids are never reused within a
    /// session.
    pub fn recompute(&mut self) -> Result<()> {
        let mut residue = match &self.hull {
            Ok(hull) => Some(analyze_residue(
                &self.buffer,
                hull,
                &self.config,
                self.next_id,
                &CancelToken::never(),
            )?),
            Err(_) => None,
        };
        if let Some(residue) = residue.as_mut() {
            self.next_id = self.carry_over_ids(&mut residue.grouping, self.next_id);
        }
        self.install(residue);
        debug!(groups = self.groups.len(), mode = ?self.mode, "recomputed residue groups");
        Ok(())
    }

    /// Give components identical to a live group that group's id and
    /// number the rest from `next_id`. Returns the following free id.
    fn carry_over_ids(&self, grouping: &mut Grouping, mut next_id: u32) -> u32 {
        let mut live: HashMap<(Option<PixelBounds>, usize), Vec<&ComponentGroup>> = HashMap::new();
        for g in self.groups.values() {
            live.entry((g.bounds(), g.area())).or_default().push(g);
        }

        for group in &mut grouping.groups {
            let unchanged = live
                .get(&(group.bounds(), group.area()))
                .and_then(|candidates| candidates.iter().find(|old| old.pixels == group.pixels));
            let id = match unchanged {
                Some(old) => old.id,
                None => {
                    next_id += 1;
                    GroupId(next_id - 1)
                }
            };
            if id != group.id {
                group.id = id;
                for (x, y) in group.pixels.coords() {
                    grouping.labels[[y, x]] = id.0;
                }
            }
        }
        grouping.groups.sort_by_key(|g| g.id);
        next_id
    }

    fn record_commit(&mut self, cleared: usize) {
        self.revision += 1;
        self.commits += 1;
        self.erased_pixels += cleared;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::PixelRuns;

    /// 60x60 raster: subject block in the middle, two residue blobs.
    fn scene() -> (PixelBuffer, Vec<Keypoint>) {
        let mut data = vec![0u8; 60 * 60 * 4];
        for y in 0..60 {
            for x in 0..60 {
                let subject = (25..35).contains(&x) && (20..40).contains(&y);
                let blob_a = x < 3 && y < 3;
                let blob_b = x >= 55 && y >= 56;
                if subject || blob_a || blob_b {
                    let o = (y * 60 + x) * 4;
                    data[o] = 200;
                    data[o + 3] = 255;
                }
            }
        }
        let keypoints = vec![
            Keypoint::new("left_shoulder", 25.0, 20.0, 0.9),
            Keypoint::new("right_shoulder", 35.0, 20.0, 0.9),
            Keypoint::new("left_ankle", 25.0, 40.0, 0.9),
            Keypoint::new("right_ankle", 35.0, 40.0, 0.9),
        ];
        (PixelBuffer::new(60, 60, data).unwrap(), keypoints)
    }

    fn session() -> EraserSession {
        let (buffer, keypoints) = scene();
        EraserSession::new(buffer, &keypoints, Projection::Identity, EraserConfig::default()).unwrap()
    }

    #[test]
    fn test_hull_mode_groups() {
        let session = session();
        assert_eq!(session.mode(), SessionMode::Hull);
        let areas: Vec<usize> = session.groups().map(|g| g.area()).collect();
        assert_eq!(areas, vec![9, 20]);
        assert_eq!(session.stats().protected, 200);
        assert!(session.hull().unwrap().area() > session.raw_hull().unwrap().area());
    }

    #[test]
    fn test_hit_test() {
        let session = session();
        assert_eq!(session.hit_test_group(1, 1), Some(GroupId(1)));
        assert_eq!(session.hit_test_group(57, 58), Some(GroupId(2)));
        assert_eq!(session.hit_test_group(30, 30), None);
        assert_eq!(session.hit_test_group(10, 10), None);
        assert_eq!(session.hit_test_group(-1, 5), None);
        assert_eq!(session.hit_test_group(60, 5), None);
    }

    #[test]
    fn test_commit_is_idempotent() {
        let mut session = session();
        assert_eq!(session.commit(GroupId(1)).unwrap(), 9);
        let after_first = session.buffer().clone();
        assert_eq!(session.commit(GroupId(1)).unwrap(), 0);
        assert_eq!(session.buffer(), &after_first);
        assert_eq!(session.hit_test_group(1, 1), None);
        assert_eq!(session.buffer().alpha_at(0), 0);
        assert_eq!(session.stats().commits, 1);
        assert_eq!(session.commit(GroupId(99)).unwrap(), 0);
    }

    #[test]
    fn test_last_commit_switches_to_fallback() {
        let mut session = session();
        session.commit(GroupId(1)).unwrap();
        session.commit(GroupId(2)).unwrap();
        assert_eq!(session.mode(), SessionMode::Fallback(FallbackReason::NoResidueGroups));
        assert_eq!(session.stats().erased_pixels, 29);
    }

    #[test]
    fn test_recompute_keeps_ids_of_unchanged_groups() {
        let mut session = session();
        session.commit(GroupId(1)).unwrap();
        session.recompute().unwrap();
        let ids: Vec<GroupId> = session.groups().map(|g| g.id).collect();
        assert_eq!(ids, vec![GroupId(2)]);
        assert_eq!(session.group(GroupId(2)).unwrap().area(), 20);
        assert_eq!(session.hit_test_group(57, 58), Some(GroupId(2)));
    }

    #[test]
    fn test_reshaped_group_gets_fresh_id() {
        let mut session = session();
        // Two pixels off the top row of blob B
        let region = FallbackRegion {
            seed: (55, 56),
            seed_color: [200, 0, 0],
            raster_width: 60,
            raster_height: 60,
            pixels: PixelRuns::from_indices(vec![56 * 60 + 55, 56 * 60 + 56], 60),
        };
        assert_eq!(session.commit_fallback(&region).unwrap(), 2);

        let groups: Vec<(GroupId, usize)> = session.groups().map(|g| (g.id, g.area())).collect();
        assert_eq!(groups, vec![(GroupId(1), 9), (GroupId(3), 18)]);
        assert_eq!(session.hit_test_group(58, 58), Some(GroupId(3)));
        // The old id of the reshaped group is gone for good
        assert_eq!(session.commit(GroupId(2)).unwrap(), 0);

        // Fresh ids keep counting up
        session.commit(GroupId(3)).unwrap();
        session.commit_fallback(&FallbackRegion {
            pixels: PixelRuns::from_indices(vec![0], 60),
            ..region
        })
        .unwrap();
        assert_eq!(session.groups().map(|g| g.id).collect::<Vec<_>>(), vec![GroupId(4)]);
    }

    #[test]
    fn test_recompute_after_commit_config() {
        let (buffer, keypoints) = scene();
        let config = EraserConfig::builder().recompute_after_commit(true).build().unwrap();
        let mut session = EraserSession::new(buffer, &keypoints, Projection::Identity, config).unwrap();
        session.commit(GroupId(2)).unwrap();
        assert_eq!(session.groups().map(|g| g.id).collect::<Vec<_>>(), vec![GroupId(1)]);
        assert_eq!(session.stats().residue, 9);
    }

    #[test]
    fn test_fallback_hover_and_click() {
        let (buffer, _) = scene();
        let config = EraserConfig::builder().min_region_size(5).build().unwrap();
        let mut session = EraserSession::new(buffer, &[], Projection::Identity, config).unwrap();
        assert_eq!(
            session.mode(),
            SessionMode::Fallback(FallbackReason::InsufficientKeypoints { found: 0 })
        );
        assert_eq!(session.group_count(), 0);
        assert_eq!(session.hit_test_group(1, 1), None);

        // Transparent pixel: nothing highlighted
        assert!(session.hover_fallback(10, 10).is_none());
        // Blob A is 9 pixels
        assert_eq!(session.hover_fallback(1, 1).map(|r| r.area()), Some(9));
        // Clicking elsewhere does nothing and keeps the highlight
        assert_eq!(session.commit_highlight(30, 30).unwrap(), 0);
        assert!(session.highlight().is_some());
        assert_eq!(session.commit_highlight(2, 2).unwrap(), 9);
        assert!(session.highlight().is_none());
        assert_eq!(session.buffer().alpha_at(0), 0);
    }

    #[test]
    fn test_commit_fallback_rejects_pixels_outside_raster() {
        let buffer = PixelBuffer::filled(10, 10, [9, 9, 9, 255]).unwrap();
        let mut session = EraserSession::new(buffer, &[], Projection::Identity, EraserConfig::default()).unwrap();
        assert!(session.is_fallback());

        // Matching raster size, but index 250 is past the last row
        let region = FallbackRegion {
            seed: (0, 0),
            seed_color: [9, 9, 9],
            raster_width: 10,
            raster_height: 10,
            pixels: PixelRuns::from_indices(vec![0, 1, 250], 10),
        };
        let before = session.buffer().clone();
        assert!(matches!(
            session.commit_fallback(&region),
            Err(EraserError::DimensionMismatch { .. })
        ));
        assert_eq!(session.buffer(), &before);
        assert_eq!(session.stats().commits, 0);

        // Same raster size, different row stride
        let region = FallbackRegion {
            pixels: PixelRuns::from_indices(vec![0, 1], 20),
            ..region
        };
        assert!(session.commit_fallback(&region).is_err());
        assert_eq!(session.buffer().alpha_at(0), 255);
    }

    #[test]
    fn test_commit_fallback_dimension_mismatch() {
        let mut session = session();
        let other = PixelBuffer::filled(10, 10, [1, 2, 3, 255]).unwrap();
        let region = magic_wand_select(&other, 0, 0, &EraserConfig::builder().max_region_ratio(1.0).build().unwrap())
            .unwrap()
            .into_region()
            .unwrap();
        let before = session.buffer().clone();
        assert!(session.commit_fallback(&region).is_err());
        assert_eq!(session.buffer(), &before);
    }
}
