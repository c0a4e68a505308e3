//! Tile-partitioned, LRU-bounded client-side cache for OSM map data.
//!
//! The cache sits between a map UI and a persistent store of nodes, ways and
//! relations. It answers "everything in this bounding box" and "everything
//! referencing this element" while going to the store at most once per miss.
//!
//! ```rust
//! use mapcache::{BoundingBox, Config, ElementKey, FetchedMapData, MapDataCache, Node};
//! use geo::Point;
//!
//! let cache = MapDataCache::new(Config::default(), |_bbox| {
//!     Ok(FetchedMapData::from_iter([Node::new(1, Point::new(8.54001, 47.37001)).into()]))
//! });
//!
//! let data = cache.get_map_data_with_geometry(&BoundingBox::new(8.54, 47.37, 8.541, 47.371))?;
//! assert_eq!(data.nodes.len(), 1);
//! assert!(cache.get_cached(&ElementKey::node(1)).is_some());
//! # Ok::<(), mapcache::CacheError>(())
//! ```

pub mod builder;
pub mod cache;
pub mod controller;
pub mod error;
pub mod map_data;
pub mod source;
pub mod tiles;
pub mod types;

pub use builder::CacheBuilder;
pub use cache::{MapDataCache, RegionFetch};
pub use controller::MapDataController;
pub use error::{CacheError, Result};
pub use map_data::{FetchedMapData, MapDataUpdate, MapDataWithGeometry};
pub use source::{MapDataSource, MemorySource, SourceStats};
pub use tiles::{MAX_ZOOM, TilePos, TilesRect, enclosing_tiles_rect, tile_of, tiles_overlapping};
pub use types::{CacheStats, Config};

pub use mapcache_types::{
    BoundingBox, Element, ElementGeometry, ElementGeometryEntry, ElementKey, ElementType, Node,
    Relation, RelationMember, Tags, Way,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{CacheBuilder, CacheError, MapDataCache, Result};

    pub use crate::{Config, FetchedMapData, MapDataUpdate, MapDataWithGeometry};

    pub use crate::{MapDataController, MapDataSource, MemorySource};

    pub use crate::{BoundingBox, Element, ElementKey, ElementType, Node, Relation, Way};

    pub use crate::{TilePos, TilesRect};

    pub use geo::Point;
}
