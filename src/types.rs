//! Configuration and statistics types for the map data cache.
use serde::de::Error;
use serde::{Deserialize, Serialize};

use crate::tiles::MAX_ZOOM;

/// Cache configuration
///
/// Serializable so it can be loaded alongside the rest of an application's
/// settings. Missing fields take their defaults.
///
/// # Example
///
/// ```rust
/// use mapcache::Config;
///
/// let config = Config::default();
/// assert_eq!(config.tile_zoom, 16);
///
/// let json = r#"{ "max_tiles": 4, "trim_threshold": 10 }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.max_tiles, 4);
/// assert_eq!(config.tile_zoom, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Zoom level of the spatial tiles (0-22, default: 16)
    #[serde(default = "Config::default_tile_zoom")]
    pub tile_zoom: u8,

    /// Maximum number of resident tiles before LRU eviction kicks in
    #[serde(default = "Config::default_max_tiles")]
    pub max_tiles: usize,

    /// Element count an automatic trim shrinks the store to after tiles
    /// have been evicted
    #[serde(default = "Config::default_trim_threshold")]
    pub trim_threshold: usize,
}

impl Config {
    const fn default_tile_zoom() -> u8 {
        16
    }

    const fn default_max_tiles() -> usize {
        64
    }

    const fn default_trim_threshold() -> usize {
        50_000
    }

    /// Create a configuration from all three parameters.
    ///
    /// # Panics
    ///
    /// Panics if `tile_zoom` exceeds [`MAX_ZOOM`] or `max_tiles` is zero.
    pub fn new(tile_zoom: u8, max_tiles: usize, trim_threshold: usize) -> Self {
        assert!(
            tile_zoom <= MAX_ZOOM,
            "Tile zoom must be between 0 and {MAX_ZOOM}"
        );
        assert!(max_tiles > 0, "Max tiles must be greater than zero");
        Self {
            tile_zoom,
            max_tiles,
            trim_threshold,
        }
    }

    pub fn with_tile_zoom(mut self, tile_zoom: u8) -> Self {
        assert!(
            tile_zoom <= MAX_ZOOM,
            "Tile zoom must be between 0 and {MAX_ZOOM}"
        );
        self.tile_zoom = tile_zoom;
        self
    }

    pub fn with_max_tiles(mut self, max_tiles: usize) -> Self {
        assert!(max_tiles > 0, "Max tiles must be greater than zero");
        self.max_tiles = max_tiles;
        self
    }

    pub fn with_trim_threshold(mut self, trim_threshold: usize) -> Self {
        self.trim_threshold = trim_threshold;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_zoom > MAX_ZOOM {
            return Err(format!("Tile zoom must be between 0 and {MAX_ZOOM}"));
        }

        if self.max_tiles == 0 {
            return Err("Max tiles must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tile_zoom: Self::default_tile_zoom(),
            max_tiles: Self::default_max_tiles(),
            trim_threshold: Self::default_trim_threshold(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that had to go to the backing store
    pub misses: u64,
    /// Number of fetch callbacks invoked
    pub fetches: u64,
    /// Tiles fetched and made resident
    pub tiles_loaded: u64,
    /// Tiles dropped by LRU eviction or `trim_tiles`
    pub tiles_evicted: u64,
    /// Store entries removed by trims
    pub elements_trimmed: u64,
    /// Tiles currently resident
    pub resident_tiles: usize,
    /// Entries currently in the element store
    pub element_count: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
