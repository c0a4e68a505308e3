//! Cache builder for flexible configuration
//!
//! Settings are only checked when the cache is built, so a bad value read
//! from user configuration surfaces as an error instead of a panic.

use crate::cache::MapDataCache;
use crate::error::{CacheError, Result};
use crate::map_data::FetchedMapData;
use crate::types::Config;
use mapcache_types::BoundingBox;

/// Builder for a [`MapDataCache`].
#[derive(Debug, Default)]
pub struct CacheBuilder {
    config: Config,
}

impl CacheBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zoom level of the spatial tiles.
    pub fn tile_zoom(mut self, zoom: u8) -> Self {
        self.config.tile_zoom = zoom;
        self
    }

    /// Maximum number of resident tiles.
    pub fn max_tiles(mut self, max_tiles: usize) -> Self {
        self.config.max_tiles = max_tiles;
        self
    }

    /// Element count automatic trims shrink the store to.
    pub fn trim_threshold(mut self, threshold: usize) -> Self {
        self.config.trim_threshold = threshold;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the cache, loading missing tiles through `fetch_map_data`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidConfig`] if the configuration does not
    /// validate.
    pub fn build<F>(self, fetch_map_data: F) -> Result<MapDataCache>
    where
        F: Fn(&BoundingBox) -> Result<FetchedMapData> + Send + Sync + 'static,
    {
        self.config.validate().map_err(CacheError::InvalidConfig)?;
        Ok(MapDataCache::new(self.config, fetch_map_data))
    }
}
