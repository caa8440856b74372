use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Viewer tuning. Every field has a default so callers can pass a partial
/// object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Fixed bucket width in unified coordinates; chosen from segment
    /// density when unset.
    pub bucket_width: Option<u64>,
    pub target_segments_per_bucket: u32,
    pub default_zoom_level: u32,
    /// Levels above this render stacked groups instead of segments.
    pub switch_level: u32,
    pub max_zoom_level: u32,
    pub zoom_factor: f64,
    pub horizontal_scale: f64,
    pub vertical_scale: f64,
    pub spacing: f64,
    pub prefetch_buckets: usize,
    pub max_stack_depth: u32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            bucket_width: None,
            target_segments_per_bucket: 8,
            default_zoom_level: 10,
            switch_level: 15,
            max_zoom_level: 20,
            zoom_factor: 2.0,
            horizontal_scale: 11.0,
            vertical_scale: 40.0,
            spacing: 2.0,
            prefetch_buckets: 1,
            max_stack_depth: 8,
        }
    }
}

impl ViewConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = |x: f64| x.is_finite() && x > 0.0;
        if !positive(self.zoom_factor)
            || !positive(self.horizontal_scale)
            || !positive(self.vertical_scale)
            || !self.spacing.is_finite()
            || self.spacing < 0.0
        {
            return Err(Error::OutOfBounds("view scale"));
        }
        if self.default_zoom_level > self.max_zoom_level || self.switch_level > self.max_zoom_level {
            return Err(Error::OutOfBounds("zoom level"));
        }
        if self.bucket_width == Some(0) {
            return Err(Error::OutOfBounds("bucket width"));
        }
        Ok(())
    }

    pub fn from_json_value(v: serde_json::Value) -> Result<Self> {
        let cfg: ViewConfig = serde_json::from_value(v)?;
        cfg.validate()?;
        Ok(cfg)
    }
}
