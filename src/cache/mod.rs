//! Thread-safe map data cache.
//!
//! `MapDataCache` combines four structures behind one `RwLock`:
//!
//! - a spatial tile index holding the node ids of up to `max_tiles` tiles,
//!   evicted least recently used first,
//! - an element store with fetch-through lookups,
//! - way-by-node and relation-by-element indices that know whether their
//!   entries are complete,
//! - a trim controller that drops whatever is no longer reachable from a
//!   resident tile or a pinned element.
//!
//! # Examples
//!
//! ```rust
//! use mapcache::{Config, FetchedMapData, MapDataCache, MapDataUpdate};
//! use mapcache::{BoundingBox, ElementKey, Node, Way};
//! use geo::Point;
//!
//! # fn main() -> mapcache::Result<()> {
//! let cache = MapDataCache::new(Config::new(16, 4, 100), |_bbox| Ok(FetchedMapData::new()));
//!
//! let bbox = BoundingBox::new(13.400, 52.500, 13.401, 52.501);
//! cache.update(
//!     MapDataUpdate::new()
//!         .with_element(Node::new(1, Point::new(13.4005, 52.5005)))
//!         .with_element(Way::new(1, vec![1, 2]))
//!         .with_bbox(bbox),
//! )?;
//!
//! let data = cache.get_map_data_with_geometry(&bbox)?;
//! assert_eq!(data.nodes.len(), 1);
//! assert_eq!(data.ways.len(), 1);
//!
//! // Served from the cache, the callback is never called
//! let way = cache.get_element(ElementKey::way(1), |_| unreachable!())?;
//! assert!(way.is_some());
//! # Ok(())
//! # }
//! ```

mod internal;
mod relations;
mod spatial;
mod store;
mod trim;

use crate::builder::CacheBuilder;
use crate::error::Result;
use crate::map_data::{FetchedMapData, MapDataUpdate, MapDataWithGeometry};
use crate::tiles::{TilePos, TilesRect};
use crate::types::{CacheStats, Config};
use internal::{CacheInner, validate_bbox};
use mapcache_types::{BoundingBox, Element, ElementKey, Node, Relation, Way};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Region fetch used to load missing tiles.
///
/// Called with the bounding box of one tile at a time.
pub type RegionFetch = dyn Fn(&BoundingBox) -> Result<FetchedMapData> + Send + Sync;

#[derive(Default)]
struct LookupCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LookupCounters {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

/// Tile-partitioned, LRU-bounded cache of map data.
///
/// Cheap to clone; clones share the same cache. Cache hits run under a
/// shared read lock, so readers proceed in parallel. A miss takes the write
/// lock, checks again and fetches while holding it, so a fetch and the
/// insertion of its result are one transition.
///
/// Fetch callbacks run while the lock is held and must not call back into
/// the cache.
#[derive(Clone)]
pub struct MapDataCache {
    inner: Arc<RwLock<CacheInner>>,
    fetch_map_data: Arc<RegionFetch>,
    lookups: Arc<LookupCounters>,
}

impl MapDataCache {
    /// Create a cache that loads missing tiles through `fetch_map_data`.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate. Use [`CacheBuilder`] to get an
    /// error instead.
    pub fn new<F>(config: Config, fetch_map_data: F) -> Self
    where
        F: Fn(&BoundingBox) -> Result<FetchedMapData> + Send + Sync + 'static,
    {
        Self::with_region_fetch(config, Arc::new(fetch_map_data))
    }

    pub(crate) fn with_region_fetch(config: Config, fetch_map_data: Arc<RegionFetch>) -> Self {
        if let Err(e) = config.validate() {
            panic!("Invalid cache configuration: {e}");
        }
        Self {
            inner: Arc::new(RwLock::new(CacheInner::new(config))),
            fetch_map_data,
            lookups: Arc::new(LookupCounters::default()),
        }
    }

    pub fn builder() -> CacheBuilder {
        CacheBuilder::new()
    }

    pub fn config(&self) -> Config {
        self.inner.read().config.clone()
    }

    // ===== Element lookups =====

    /// Get an element, fetching it on a miss.
    ///
    /// Fetched ways and relations are kept, including the fact that they do
    /// not exist. A fetched node is only kept if its tile is resident.
    pub fn get_element<F>(&self, key: ElementKey, fetch: F) -> Result<Option<Element>>
    where
        F: FnOnce(ElementKey) -> Result<Option<Element>>,
    {
        if let Some(slot) = self.inner.read().store.get(&key) {
            self.lookups.hit();
            return Ok(slot.element().cloned());
        }

        let mut inner = self.inner.write();
        if let Some(slot) = inner.store.get(&key) {
            self.lookups.hit();
            return Ok(slot.element().cloned());
        }
        self.lookups.miss();
        inner.fetch_element(key, fetch)
    }

    /// Get several elements, fetching all misses with a single call.
    ///
    /// Elements that do not exist are left out. The result follows the order
    /// of `keys`.
    pub fn get_elements<F>(&self, keys: &[ElementKey], fetch: F) -> Result<Vec<Element>>
    where
        F: FnOnce(&[ElementKey]) -> Result<Vec<Element>>,
    {
        let mut resolved: FxHashMap<ElementKey, Option<Element>> = FxHashMap::default();
        let mut missing = Vec::new();
        {
            let inner = self.inner.read();
            for key in keys {
                if resolved.contains_key(key) || missing.contains(key) {
                    continue;
                }
                match inner.store.get(key) {
                    Some(slot) => {
                        self.lookups.hit();
                        resolved.insert(*key, slot.element().cloned());
                    }
                    None => missing.push(*key),
                }
            }
        }

        if !missing.is_empty() {
            let mut inner = self.inner.write();
            missing.retain(|key| match inner.store.get(key) {
                Some(slot) => {
                    self.lookups.hit();
                    resolved.insert(*key, slot.element().cloned());
                    false
                }
                None => true,
            });
            for _ in &missing {
                self.lookups.miss();
            }
            if !missing.is_empty() {
                resolved.extend(inner.fetch_elements(&missing, fetch)?);
            }
        }

        Ok(keys
            .iter()
            .filter_map(|key| resolved.get(key).cloned().flatten())
            .collect())
    }

    /// Get a cached element without ever fetching.
    pub fn get_cached(&self, key: &ElementKey) -> Option<Element> {
        self.inner.read().store.element(key).cloned()
    }

    /// Get a cached node without ever fetching.
    pub fn get_node(&self, id: i64) -> Option<Node> {
        self.inner.read().store.node(id).cloned()
    }

    // ===== Relationship lookups =====

    /// Ways referencing a node, sorted by id.
    ///
    /// Served from the cache once the full set is known, otherwise fetched
    /// and remembered as complete.
    pub fn get_ways_for_node<F>(&self, node_id: i64, fetch: F) -> Result<Vec<Way>>
    where
        F: FnOnce(i64) -> Result<Vec<Way>>,
    {
        if let Some(ways) = self.inner.read().cached_ways_for_node(node_id) {
            self.lookups.hit();
            return Ok(ways);
        }

        let mut inner = self.inner.write();
        if let Some(ways) = inner.cached_ways_for_node(node_id) {
            self.lookups.hit();
            return Ok(ways);
        }
        self.lookups.miss();
        inner.fetch_ways_for_node(node_id, fetch)
    }

    /// Relations with the given node as a member, sorted by id.
    pub fn get_relations_for_node<F>(&self, node_id: i64, fetch: F) -> Result<Vec<Relation>>
    where
        F: FnOnce(i64) -> Result<Vec<Relation>>,
    {
        self.relations_for(ElementKey::node(node_id), fetch)
    }

    /// Relations with the given way as a member, sorted by id.
    pub fn get_relations_for_way<F>(&self, way_id: i64, fetch: F) -> Result<Vec<Relation>>
    where
        F: FnOnce(i64) -> Result<Vec<Relation>>,
    {
        self.relations_for(ElementKey::way(way_id), fetch)
    }

    fn relations_for<F>(&self, key: ElementKey, fetch: F) -> Result<Vec<Relation>>
    where
        F: FnOnce(i64) -> Result<Vec<Relation>>,
    {
        if let Some(relations) = self.inner.read().cached_relations_for(&key) {
            self.lookups.hit();
            return Ok(relations);
        }

        let mut inner = self.inner.write();
        if let Some(relations) = inner.cached_relations_for(&key) {
            self.lookups.hit();
            return Ok(relations);
        }
        self.lookups.miss();
        inner.fetch_relations_for(key, fetch)
    }

    // ===== Region queries =====

    /// All cached data in `bbox`, loading missing tiles first.
    ///
    /// Contains the nodes inside `bbox`, the ways known to reference them
    /// and the relations known to reference any of those nodes or ways.
    pub fn get_map_data_with_geometry(&self, bbox: &BoundingBox) -> Result<MapDataWithGeometry> {
        validate_bbox(bbox)?;
        let mut inner = self.inner.write();
        let tiles = inner.ensure_loaded(bbox, self.fetch_map_data.as_ref())?;
        let data = inner.map_data_in(bbox, &tiles);
        inner.enforce_capacity();
        Ok(data)
    }

    /// Like [`get_map_data_with_geometry`](Self::get_map_data_with_geometry)
    /// for the area of a tile rect.
    ///
    /// # Panics
    ///
    /// Panics if `zoom` is not the configured tile zoom.
    pub fn get_map_data_in_tiles(&self, rect: &TilesRect, zoom: u8) -> Result<MapDataWithGeometry> {
        let tile_zoom = self.inner.read().config.tile_zoom;
        assert_eq!(
            zoom, tile_zoom,
            "Tiles rect zoom {zoom} does not match the cache tile zoom {tile_zoom}"
        );
        self.get_map_data_with_geometry(&rect.bounding_box(zoom))
    }

    /// True if every tile overlapping `bbox` is resident, so querying it
    /// would not fetch.
    pub fn is_covered(&self, bbox: &BoundingBox) -> bool {
        self.inner.read().tiles.is_covered(bbox)
    }

    // ===== Mutation =====

    /// Apply additions, updates and deletions as one transition.
    ///
    /// See [`MapDataUpdate`] for the meaning of its bounding box.
    pub fn update(&self, update: MapDataUpdate) -> Result<()> {
        self.inner.write().apply_update(update)
    }

    /// Drop entries not reachable from a resident tile or a pinned element
    /// until at most `target` remain. Returns the number of dropped entries.
    pub fn trim(&self, target: usize) -> usize {
        self.inner.write().trim(target)
    }

    /// Evict least recently used tiles until at most `max_tiles` remain and
    /// drop everything no longer reachable.
    pub fn trim_tiles(&self, max_tiles: usize) -> usize {
        self.inner.write().trim_tiles(max_tiles)
    }

    /// Drop all tiles, elements, index entries and pins.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Keep an element (and its members) through trims. Returns `false` if
    /// it was already pinned.
    pub fn pin(&self, key: ElementKey) -> bool {
        self.inner.write().pin(key)
    }

    pub fn unpin(&self, key: &ElementKey) -> bool {
        self.inner.write().unpin(key)
    }

    // ===== Introspection =====

    /// Resident tiles, least recently used first.
    pub fn resident_tiles(&self) -> Vec<TilePos> {
        self.inner.read().tiles.resident_tiles()
    }

    /// Union of the bounding boxes of all resident tiles.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.inner.read().tiles.bounds()
    }

    /// Number of entries in the element store, absent markers included.
    pub fn len(&self) -> usize {
        self.inner.read().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            hits: self.lookups.hits.load(Ordering::Relaxed),
            misses: self.lookups.misses.load(Ordering::Relaxed),
            fetches: inner.counters.fetches,
            tiles_loaded: inner.counters.tiles_loaded,
            tiles_evicted: inner.counters.tiles_evicted,
            elements_trimmed: inner.counters.elements_trimmed,
            resident_tiles: inner.tiles.len(),
            element_count: inner.store.len(),
        }
    }
}

impl std::fmt::Debug for MapDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MapDataCache")
            .field("config", &inner.config)
            .field("resident_tiles", &inner.tiles.len())
            .field("elements", &inner.store.len())
            .finish()
    }
}
