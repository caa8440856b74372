use serde::Serialize;

use crate::algorithms::buckets::BucketCache;
use crate::algorithms::lanes::LaneSlot;
use crate::algorithms::mapping::Bookmark;
use crate::algorithms::stacked::StackedGroup;
use crate::config::ViewConfig;
use crate::error::{Error, Result};
use crate::model::{Color, SegmentId, SequenceSegment};

/// Bucket range plus the stack depth it was drawn at. A frame is recomputed
/// only when this changes or a repaint was requested.
pub type FrameKey = (Option<u32>, usize, usize);

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tile {
    pub segment: SegmentId,
    pub lane_start: u32,
    pub lane_height: u32,
    pub rect: Rect,
    pub color: Color,
    pub collapsed: bool,
    pub bookmarks: Vec<Bookmark>,
    pub annotations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StackedTile {
    pub group: u32,
    pub representative: SegmentId,
    pub members: u32,
    pub lane_start: u32,
    pub lane_height: u32,
    pub rect: Rect,
    pub color: Color,
}

/// Zoom state and the scroll-to-bucket mapping.
#[derive(Clone, Debug)]
pub struct Viewport {
    config: ViewConfig,
    level: u32,
    last: Option<FrameKey>,
    repaint: bool,
}

impl Viewport {
    pub fn new(config: ViewConfig) -> Self {
        let level = config.default_zoom_level.min(config.max_zoom_level);
        Viewport {
            config,
            level,
            last: None,
            repaint: true,
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Clamps to `[0, max_zoom_level]` and returns the level applied.
    pub fn set_level(&mut self, level: u32) -> u32 {
        let level = level.min(self.config.max_zoom_level);
        if level != self.level {
            log::trace!("zoom level {} -> {}", self.level, level);
            self.level = level;
            self.repaint = true;
        }
        level
    }

    pub fn zoom_in(&mut self) -> u32 {
        self.set_level(self.level.saturating_sub(1))
    }

    pub fn zoom_out(&mut self) -> u32 {
        self.set_level(self.level.saturating_add(1))
    }

    /// `zoom_factor^(default - level)`: 1 at the default level, shrinking as
    /// the view zooms out.
    pub fn scale(&self) -> f64 {
        let exp = self.config.default_zoom_level as i32 - self.level as i32;
        self.config.zoom_factor.powi(exp)
    }

    pub fn is_diagram(&self) -> bool {
        self.level > self.config.switch_level
    }

    pub fn stack_depth(&self) -> Option<u32> {
        self.is_diagram().then(|| {
            (self.level - self.config.switch_level - 1).min(self.config.max_stack_depth)
        })
    }

    pub fn request_repaint(&mut self) {
        self.repaint = true;
    }

    /// Unified window for scroll value `h` and visible fraction `t`.
    pub fn window(&self, h: f64, t: f64, max: u64) -> Result<(f64, f64)> {
        if !h.is_finite() || !t.is_finite() {
            return Err(Error::OutOfBounds("scroll value"));
        }
        let max = max as f64;
        let lo = ((h - t) * max).clamp(0.0, max);
        let hi = ((h + t) * max).clamp(0.0, max);
        Ok((lo, hi.max(lo)))
    }

    /// Inclusive bucket range for the window, widened by the prefetch margin.
    pub fn bucket_range(
        &self,
        index: &BucketCache,
        h: f64,
        t: f64,
        max: u64,
    ) -> Result<(usize, usize)> {
        let (lo, hi) = self.window(h, t, max)?;
        let p = self.config.prefetch_buckets;
        let start = index.bucket_position(lo).saturating_sub(p);
        let end = index
            .bucket_position(hi)
            .saturating_add(p)
            .min(index.number_buckets() - 1);
        Ok((start, end))
    }

    /// Returns true when the frame for `key` must be recomputed.
    pub fn gate(&mut self, key: FrameKey) -> bool {
        if self.repaint || self.last != Some(key) {
            self.last = Some(key);
            self.repaint = false;
            return true;
        }
        false
    }

    /// Scroll value that brings unified `position` into view.
    pub fn goto(&self, position: u64, max: u64) -> f64 {
        if max == 0 {
            return 0.0;
        }
        (position as f64 / max as f64).clamp(0.0, 1.0)
    }

    fn rect(&self, start: u64, end: u64, lane_start: u32, lane_height: u32) -> Rect {
        let s = self.scale();
        let c = &self.config;
        Rect {
            x: start as f64 * c.horizontal_scale * s,
            y: lane_start as f64 * c.vertical_scale * s,
            width: ((end - start) as f64 * c.horizontal_scale * s - c.spacing).max(0.0),
            height: (lane_height as f64 * c.vertical_scale * s - c.spacing).max(0.0),
        }
    }

    pub fn tile(
        &self,
        seg: &SequenceSegment,
        slot: &LaneSlot,
        bookmarks: Vec<Bookmark>,
        annotations: Vec<String>,
    ) -> Tile {
        Tile {
            segment: slot.id,
            lane_start: slot.lane_start,
            lane_height: slot.lane_height,
            rect: self.rect(slot.start, slot.end, slot.lane_start, slot.lane_height),
            color: seg.color(),
            collapsed: seg.content.is_collapsed(),
            bookmarks,
            annotations,
        }
    }

    pub fn stacked_tile(&self, group: &StackedGroup, color: Color) -> StackedTile {
        StackedTile {
            group: group.id,
            representative: group.representative,
            members: group.members.len() as u32,
            lane_start: group.lane_start,
            lane_height: group.height,
            rect: self.rect(group.start, group.end, group.lane_start, group.height),
            color,
        }
    }
}
