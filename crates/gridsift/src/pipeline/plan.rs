//! Pass parameters for a triage run.

use std::time::Duration;

use crate::config::Config;

/// Grid shape and thumbnail resolution of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSettings {
    /// Grid side length; a full grid holds `grid_size²` photos.
    pub grid_size: usize,
    pub thumbnail_size: u32,
}

impl PassSettings {
    pub fn photos_per_grid(&self) -> usize {
        self.grid_size * self.grid_size
    }

    /// Grids needed to cover `photo_count` photos.
    pub fn grids_for(&self, photo_count: usize) -> usize {
        photo_count.div_ceil(self.photos_per_grid().max(1))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub coarse: PassSettings,
    pub fine: PassSettings,
    pub coarse_multiplier: f64,
    pub coarse_cap_pct: f64,
    pub jpeg_quality: u8,
    pub reclaim_every: usize,
    pub model_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            coarse: PassSettings {
                grid_size: 20,
                thumbnail_size: 128,
            },
            fine: PassSettings {
                grid_size: 4,
                thumbnail_size: 384,
            },
            coarse_multiplier: 2.5,
            coarse_cap_pct: 50.0,
            jpeg_quality: 85,
            reclaim_every: 10,
            model_timeout: Duration::from_secs(120),
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            coarse: PassSettings {
                grid_size: config.coarse.grid_size,
                thumbnail_size: config.coarse.thumbnail_size,
            },
            fine: PassSettings {
                grid_size: config.fine.grid_size,
                thumbnail_size: config.fine.thumbnail_size,
            },
            coarse_multiplier: config.selection.coarse_multiplier,
            coarse_cap_pct: config.selection.coarse_cap_pct,
            jpeg_quality: config.selection.jpeg_quality,
            reclaim_every: config.thumbnails.reclaim_every,
            model_timeout: Duration::from_secs(config.gateway.timeout_secs),
        }
    }
}
