//! LRU-bounded mapping from tiles to the nodes positioned in them.

use crate::tiles::{TilePos, tile_of, tiles_overlapping};
use geo::Point;
use lru::LruCache;
use mapcache_types::BoundingBox;
use rustc_hash::{FxHashMap, FxHashSet};

/// Resident tiles and the node ids they contain.
///
/// Tiles are kept in access order, least recently used first. Capacity is
/// not enforced on insert; callers evict explicitly once a whole query or
/// update has been applied.
pub(crate) struct SpatialTileIndex {
    zoom: u8,
    max_tiles: usize,
    tiles: LruCache<TilePos, FxHashSet<i64>>,
    /// Reverse lookup for nodes in resident tiles.
    node_tiles: FxHashMap<i64, TilePos>,
    bounds: Option<BoundingBox>,
}

impl SpatialTileIndex {
    pub(crate) fn new(zoom: u8, max_tiles: usize) -> Self {
        Self {
            zoom,
            max_tiles,
            tiles: LruCache::unbounded(),
            node_tiles: FxHashMap::default(),
            bounds: None,
        }
    }

    pub(crate) fn zoom(&self) -> u8 {
        self.zoom
    }

    pub(crate) fn max_tiles(&self) -> usize {
        self.max_tiles
    }

    /// Tiles covering `bbox`. No effect on residency.
    pub(crate) fn resolve_tiles(&self, bbox: &BoundingBox) -> Vec<TilePos> {
        tiles_overlapping(bbox, self.zoom)
    }

    pub(crate) fn tile_of(&self, position: &Point<f64>) -> TilePos {
        tile_of(position, self.zoom)
    }

    pub(crate) fn is_resident(&self, tile: &TilePos) -> bool {
        self.tiles.contains(tile)
    }

    /// Mark `tile` most recently used.
    pub(crate) fn touch(&mut self, tile: &TilePos) {
        self.tiles.promote(tile);
    }

    /// Make `tile` resident and most recently used with an empty node set.
    ///
    /// Returns the node ids the tile held before, which are no longer
    /// associated with any tile.
    pub(crate) fn reset_tile(&mut self, tile: TilePos) -> Vec<i64> {
        let previous = self.tiles.put(tile, FxHashSet::default());
        if previous.is_none() {
            let bbox = tile.bounding_box(self.zoom);
            self.bounds = Some(match self.bounds {
                Some(bounds) => bounds.union(&bbox),
                None => bbox,
            });
        }
        let previous: Vec<i64> = previous.into_iter().flatten().collect();
        for id in &previous {
            self.node_tiles.remove(id);
        }
        previous
    }

    /// Place a node at `position`.
    ///
    /// The node leaves the tile it was in before. Returns `true` if its new
    /// tile is resident and it was added there.
    pub(crate) fn add_node(&mut self, id: i64, position: &Point<f64>) -> bool {
        let tile = self.tile_of(position);
        if let Some(old) = self.node_tiles.get(&id).copied()
            && old != tile
        {
            self.remove_node(id);
        }
        match self.tiles.peek_mut(&tile) {
            Some(nodes) => {
                nodes.insert(id);
                self.node_tiles.insert(id, tile);
                true
            }
            None => {
                self.remove_node(id);
                false
            }
        }
    }

    pub(crate) fn remove_node(&mut self, id: i64) -> Option<TilePos> {
        let tile = self.node_tiles.remove(&id)?;
        if let Some(nodes) = self.tiles.peek_mut(&tile) {
            nodes.remove(&id);
        }
        Some(tile)
    }

    pub(crate) fn contains_node(&self, id: i64) -> bool {
        self.node_tiles.contains_key(&id)
    }

    /// Node ids of one resident tile, without touching it.
    pub(crate) fn nodes_in(&self, tile: &TilePos) -> impl Iterator<Item = i64> + '_ {
        self.tiles.peek(tile).into_iter().flatten().copied()
    }

    /// Node ids of all resident tiles.
    pub(crate) fn node_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.node_tiles.keys().copied()
    }

    /// Evict least recently used tiles until at most `max_tiles` remain.
    pub(crate) fn evict_over_capacity(&mut self) -> Vec<TilePos> {
        self.evict_down_to(self.max_tiles)
    }

    /// Evict least recently used tiles until at most `count` remain.
    ///
    /// Only the tile-to-node association is dropped; the nodes themselves
    /// stay wherever else they are referenced.
    pub(crate) fn evict_down_to(&mut self, count: usize) -> Vec<TilePos> {
        let mut evicted = Vec::new();
        while self.tiles.len() > count {
            let Some((tile, nodes)) = self.tiles.pop_lru() else {
                break;
            };
            for id in nodes {
                self.node_tiles.remove(&id);
            }
            evicted.push(tile);
        }
        if !evicted.is_empty() {
            self.recompute_bounds();
        }
        evicted
    }

    /// True if every tile overlapping `bbox` is resident.
    pub(crate) fn is_covered(&self, bbox: &BoundingBox) -> bool {
        let Some(bounds) = self.bounds else {
            return false;
        };
        let (west, east) = bbox.split_at_antimeridian();
        let within_bounds = bounds.contains(&west) && east.is_none_or(|east| bounds.contains(&east));
        within_bounds
            && self
                .resolve_tiles(bbox)
                .iter()
                .all(|tile| self.is_resident(tile))
    }

    /// Union of all resident tiles' bounding boxes.
    pub(crate) fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    /// Resident tiles, least recently used first.
    pub(crate) fn resident_tiles(&self) -> Vec<TilePos> {
        self.tiles.iter().rev().map(|(tile, _)| *tile).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.tiles.len()
    }

    pub(crate) fn clear(&mut self) {
        self.tiles.clear();
        self.node_tiles.clear();
        self.bounds = None;
    }

    fn recompute_bounds(&mut self) {
        let zoom = self.zoom;
        self.bounds = self
            .tiles
            .iter()
            .map(|(tile, _)| tile.bounding_box(zoom))
            .reduce(|a, b| a.union(&b));
    }
}
