//! Single-threaded cache core.
//!
//! `CacheInner` owns the tile index, the element store and both
//! relationship indices, and keeps them consistent. `MapDataCache` wraps it
//! in a lock; everything here assumes exclusive access for `&mut self`.

use super::relations::RelationshipIndex;
use super::spatial::SpatialTileIndex;
use super::store::{ElementStore, Slot};
use crate::error::{CacheError, Result};
use crate::map_data::{FetchedMapData, MapDataUpdate, MapDataWithGeometry};
use crate::tiles::TilePos;
use crate::types::Config;
use log::{debug, trace, warn};
use mapcache_types::{
    BoundingBox, Element, ElementGeometry, ElementGeometryEntry, ElementKey, ElementType, Node,
    Relation, Way,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;

/// Counters only touched under the write lock.
#[derive(Debug, Default, Clone)]
pub(crate) struct InnerCounters {
    pub(crate) fetches: u64,
    pub(crate) tiles_loaded: u64,
    pub(crate) tiles_evicted: u64,
    pub(crate) elements_trimmed: u64,
}

pub(crate) struct CacheInner {
    pub(crate) config: Config,
    pub(crate) tiles: SpatialTileIndex,
    pub(crate) store: ElementStore,
    /// node id -> ids of ways referencing it
    pub(crate) ways_by_node: RelationshipIndex<i64>,
    /// node or way key -> ids of relations referencing it
    pub(crate) relations_by_element: RelationshipIndex<ElementKey>,
    pub(crate) pinned: FxHashSet<ElementKey>,
    pub(crate) counters: InnerCounters,
}

impl CacheInner {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            tiles: SpatialTileIndex::new(config.tile_zoom, config.max_tiles),
            store: ElementStore::new(),
            ways_by_node: RelationshipIndex::new(),
            relations_by_element: RelationshipIndex::new(),
            pinned: FxHashSet::default(),
            counters: InnerCounters::default(),
            config,
        }
    }

    // ===== Element lookups =====

    /// Fetch a missing element and retain it according to its type.
    ///
    /// Ways and relations are always kept, found or not. A node is only kept
    /// if its tile is resident.
    pub(crate) fn fetch_element<F>(
        &mut self,
        key: ElementKey,
        fetch: F,
    ) -> Result<Option<Element>>
    where
        F: FnOnce(ElementKey) -> Result<Option<Element>>,
    {
        trace!("Cache miss for {key}, fetching from backing store");
        self.counters.fetches += 1;
        match fetch(key)? {
            Some(element) if element.key() != key => {
                warn!(
                    "Backing store returned {} when asked for {key}, ignoring it",
                    element.key()
                );
                Ok(None)
            }
            Some(element) => {
                self.retain_fetched(&element);
                Ok(Some(element))
            }
            None => {
                if key.element_type != ElementType::Node {
                    self.store.mark_absent(key);
                }
                Ok(None)
            }
        }
    }

    /// Fetch several missing elements with one call.
    ///
    /// Returns the outcome for every requested key. Nothing is retained if
    /// the fetch fails.
    pub(crate) fn fetch_elements<F>(
        &mut self,
        keys: &[ElementKey],
        fetch: F,
    ) -> Result<FxHashMap<ElementKey, Option<Element>>>
    where
        F: FnOnce(&[ElementKey]) -> Result<Vec<Element>>,
    {
        trace!(
            "Cache miss for {} elements, fetching from backing store",
            keys.len()
        );
        self.counters.fetches += 1;
        let fetched = fetch(keys)?;

        let requested: FxHashSet<ElementKey> = keys.iter().copied().collect();
        let mut outcome: FxHashMap<ElementKey, Option<Element>> = FxHashMap::default();
        for element in fetched {
            let key = element.key();
            if !requested.contains(&key) {
                warn!("Backing store returned unrequested element {key}, ignoring it");
                continue;
            }
            self.retain_fetched(&element);
            outcome.insert(key, Some(element));
        }
        for key in keys {
            if outcome.contains_key(key) {
                continue;
            }
            if key.element_type != ElementType::Node {
                self.store.mark_absent(*key);
            }
            outcome.insert(*key, None);
        }
        Ok(outcome)
    }

    fn retain_fetched(&mut self, element: &Element) {
        match element {
            Element::Node(node) => {
                self.put_node(node.clone());
            }
            _ => self.put_element(element.clone()),
        }
    }

    // ===== Relationship lookups =====

    /// Cached ways referencing `node_id`, if that set is fully known and
    /// every way is in the store.
    pub(crate) fn cached_ways_for_node(&self, node_id: i64) -> Option<Vec<Way>> {
        let ids = self.ways_by_node.complete(&node_id)?;
        let mut ways = ids
            .iter()
            .map(|id| self.store.way(*id).cloned())
            .collect::<Option<Vec<_>>>()?;
        ways.sort_by_key(|way| way.id);
        Some(ways)
    }

    pub(crate) fn fetch_ways_for_node<F>(&mut self, node_id: i64, fetch: F) -> Result<Vec<Way>>
    where
        F: FnOnce(i64) -> Result<Vec<Way>>,
    {
        trace!("Ways of node/{node_id} not fully known, fetching from backing store");
        self.counters.fetches += 1;
        let mut ways = fetch(node_id)?;
        ways.sort_by_key(|way| way.id);

        for way in &ways {
            self.put_element(Element::Way(way.clone()));
        }
        self.ways_by_node
            .set_complete(node_id, ways.iter().map(|way| way.id));
        Ok(ways)
    }

    /// Cached relations referencing `key`, if that set is fully known and
    /// every relation is in the store.
    pub(crate) fn cached_relations_for(&self, key: &ElementKey) -> Option<Vec<Relation>> {
        let ids = self.relations_by_element.complete(key)?;
        let mut relations = ids
            .iter()
            .map(|id| self.store.relation(*id).cloned())
            .collect::<Option<Vec<_>>>()?;
        relations.sort_by_key(|relation| relation.id);
        Some(relations)
    }

    pub(crate) fn fetch_relations_for<F>(
        &mut self,
        key: ElementKey,
        fetch: F,
    ) -> Result<Vec<Relation>>
    where
        F: FnOnce(i64) -> Result<Vec<Relation>>,
    {
        trace!("Relations of {key} not fully known, fetching from backing store");
        self.counters.fetches += 1;
        let mut relations = fetch(key.id)?;
        relations.sort_by_key(|relation| relation.id);

        for relation in &relations {
            self.put_element(Element::Relation(relation.clone()));
        }
        self.relations_by_element
            .set_complete(key, relations.iter().map(|relation| relation.id));
        Ok(relations)
    }

    // ===== Mutation =====

    /// Store a node if its tile is resident, otherwise drop it from the store.
    fn put_node(&mut self, node: Node) -> bool {
        if self.tiles.add_node(node.id, &node.position) {
            self.store.put(Element::Node(node));
            true
        } else {
            self.store.remove(&node.key());
            false
        }
    }

    /// Store an element and bring the relationship indices up to date.
    pub(crate) fn put_element(&mut self, element: Element) {
        match element {
            Element::Node(node) => {
                self.put_node(node);
            }
            Element::Way(way) => {
                let old_nodes = self
                    .store
                    .way(way.id)
                    .map(|old| old.node_ids.clone())
                    .unwrap_or_default();
                self.ways_by_node
                    .apply_diff(way.id, old_nodes, way.node_ids.iter().copied());
                self.store.put(Element::Way(way));
            }
            Element::Relation(relation) => {
                let old_members: Vec<ElementKey> = self
                    .store
                    .relation(relation.id)
                    .map(|old| old.member_keys().collect())
                    .unwrap_or_default();
                self.relations_by_element.apply_diff(
                    relation.id,
                    old_members,
                    relation.member_keys(),
                );
                self.store.put(Element::Relation(relation));
            }
        }
    }

    /// Remove an element and every index reference it contributed.
    pub(crate) fn remove_element(&mut self, key: ElementKey) {
        match self.store.remove(&key) {
            Some(Slot::Present(Element::Way(way))) => {
                for node_id in &way.node_ids {
                    self.ways_by_node.remove_referrer(node_id, way.id);
                }
            }
            Some(Slot::Present(Element::Relation(relation))) => {
                for member in relation.member_keys() {
                    self.relations_by_element
                        .remove_referrer(&member, relation.id);
                }
            }
            Some(_) => {}
            None => match key.element_type {
                ElementType::Way => self.ways_by_node.forget_referrer(key.id),
                ElementType::Relation => self.relations_by_element.forget_referrer(key.id),
                ElementType::Node => {}
            },
        }

        match key.element_type {
            ElementType::Node => {
                self.tiles.remove_node(key.id);
                self.ways_by_node.remove(&key.id);
                self.relations_by_element.remove(&key);
            }
            ElementType::Way => {
                self.relations_by_element.remove(&key);
            }
            ElementType::Relation => {}
        }
        self.pinned.remove(&key);
    }

    /// Apply an update as one transition.
    pub(crate) fn apply_update(&mut self, update: MapDataUpdate) -> Result<()> {
        let MapDataUpdate {
            added_or_updated,
            deleted,
            geometries,
            bbox,
        } = update;
        if let Some(bbox) = &bbox {
            validate_bbox(bbox)?;
        }

        for key in deleted {
            self.remove_element(key);
        }

        match bbox {
            Some(bbox) => {
                let region = self.tiles.resolve_tiles(&bbox);
                debug!(
                    "Replacing {} tiles with {} updated elements",
                    region.len(),
                    added_or_updated.len()
                );
                self.apply_region(&region, added_or_updated, geometries);
            }
            None => {
                for element in added_or_updated {
                    self.put_element(element);
                }
                self.put_geometries(geometries);
            }
        }

        self.enforce_capacity();
        Ok(())
    }

    /// Replace the content of `region` by `elements`, declaring the
    /// relationship indices of the region's nodes fully known.
    fn apply_region(
        &mut self,
        region: &[TilePos],
        elements: Vec<Element>,
        geometries: Vec<ElementGeometryEntry>,
    ) {
        let region_tiles: FxHashSet<TilePos> = region.iter().copied().collect();
        let region_nodes: FxHashSet<i64> = elements
            .iter()
            .filter_map(Element::as_node)
            .filter(|node| region_tiles.contains(&self.tiles.tile_of(&node.position)))
            .map(|node| node.id)
            .collect();
        let updated_nodes: FxHashSet<i64> = elements
            .iter()
            .filter_map(Element::as_node)
            .map(|node| node.id)
            .collect();

        for tile in region {
            for id in self.tiles.reset_tile(*tile) {
                if !updated_nodes.contains(&id) {
                    self.store.remove(&ElementKey::node(id));
                }
            }
        }

        // Referrers already in the store stay; the update's elements add theirs.
        for id in &region_nodes {
            let ways = self.stored_ways_of(*id);
            self.ways_by_node.set_complete(*id, ways);
            let key = ElementKey::node(*id);
            let relations = self.stored_relations_of(&key);
            self.relations_by_element.set_complete(key, relations);
        }
        for way in elements.iter().filter_map(Element::as_way) {
            if way.node_ids.iter().any(|id| region_nodes.contains(id)) {
                let relations = self.stored_relations_of(&way.key());
                self.relations_by_element.set_complete(way.key(), relations);
            }
        }

        for element in elements {
            self.put_element(element);
        }
        self.put_geometries(geometries);
    }

    /// Indexed ways of `node_id` that are stored and still reference it.
    fn stored_ways_of(&self, node_id: i64) -> Vec<i64> {
        self.ways_by_node
            .referrers(&node_id)
            .filter(|id| {
                self.store
                    .way(*id)
                    .is_some_and(|way| way.references_node(node_id))
            })
            .collect()
    }

    /// Indexed relations of `key` that are stored and still have it as a member.
    fn stored_relations_of(&self, key: &ElementKey) -> Vec<i64> {
        self.relations_by_element
            .referrers(key)
            .filter(|id| {
                self.store
                    .relation(*id)
                    .is_some_and(|relation| relation.references(*key))
            })
            .collect()
    }

    fn put_geometries(&mut self, geometries: Vec<ElementGeometryEntry>) {
        for entry in geometries {
            if entry.key.element_type == ElementType::Node {
                continue;
            }
            if self.store.element(&entry.key).is_some() {
                self.store.set_geometry(entry.key, entry.geometry);
            }
        }
    }

    // ===== Region queries =====

    /// Make every tile overlapping `bbox` resident.
    ///
    /// Missing tiles are all fetched before any of them is applied, so a
    /// failing fetch leaves the cache as it was. Returns the query's tiles.
    pub(crate) fn ensure_loaded(
        &mut self,
        bbox: &BoundingBox,
        fetch: &dyn Fn(&BoundingBox) -> Result<FetchedMapData>,
    ) -> Result<Vec<TilePos>> {
        let tiles = self.tiles.resolve_tiles(bbox);
        if tiles.len() > self.tiles.max_tiles() {
            warn!(
                "Query spans {} tiles but only {} can stay resident",
                tiles.len(),
                self.tiles.max_tiles()
            );
        }

        let zoom = self.tiles.zoom();
        let mut fetched = Vec::new();
        for tile in tiles.iter().filter(|tile| !self.tiles.is_resident(tile)) {
            self.counters.fetches += 1;
            let data = fetch(&tile.bounding_box(zoom))?;
            fetched.push((*tile, data));
        }

        for (tile, data) in fetched {
            debug!(
                "Loaded tile {}/{} with {} elements",
                tile.x,
                tile.y,
                data.len()
            );
            self.counters.tiles_loaded += 1;
            self.apply_region(&[tile], data.elements, data.geometries);
        }
        for tile in &tiles {
            self.tiles.touch(tile);
        }
        Ok(tiles)
    }

    /// Collect the cached data of `tiles` that lies in `bbox`.
    pub(crate) fn map_data_in(
        &self,
        bbox: &BoundingBox,
        tiles: &[TilePos],
    ) -> MapDataWithGeometry {
        let mut data = MapDataWithGeometry::new(*bbox);

        let mut nodes: BTreeMap<i64, Node> = BTreeMap::new();
        for tile in tiles {
            for id in self.tiles.nodes_in(tile) {
                if let Some(node) = self.store.node(id)
                    && bbox.contains_point(&node.position)
                {
                    nodes.insert(id, node.clone());
                }
            }
        }

        let mut ways: BTreeMap<i64, Way> = BTreeMap::new();
        for id in nodes.keys() {
            for way_id in self.ways_by_node.referrers(id) {
                if let Some(way) = self.store.way(way_id) {
                    ways.insert(way_id, way.clone());
                }
            }
        }

        let mut relations: BTreeMap<i64, Relation> = BTreeMap::new();
        let member_keys = nodes
            .keys()
            .map(|id| ElementKey::node(*id))
            .chain(ways.keys().map(|id| ElementKey::way(*id)));
        for key in member_keys {
            for relation_id in self.relations_by_element.referrers(&key) {
                if let Some(relation) = self.store.relation(relation_id) {
                    relations.insert(relation_id, relation.clone());
                }
            }
        }

        for node in nodes.values() {
            data.geometries
                .insert(node.key(), ElementGeometry::Point(node.position));
        }
        let keys = ways
            .values()
            .map(Way::key)
            .chain(relations.values().map(Relation::key));
        for key in keys {
            if let Some(geometry) = self.store.geometry(&key) {
                data.geometries.insert(key, geometry.clone());
            }
        }

        data.nodes = nodes.into_values().collect();
        data.ways = ways.into_values().collect();
        data.relations = relations.into_values().collect();
        data
    }

    // ===== Capacity =====

    /// Evict tiles over capacity and trim what they leave behind.
    pub(crate) fn enforce_capacity(&mut self) {
        let evicted = self.tiles.evict_over_capacity();
        if evicted.is_empty() {
            return;
        }
        debug!(
            "Evicted {} tiles, {} remain resident",
            evicted.len(),
            self.tiles.len()
        );
        self.counters.tiles_evicted += evicted.len() as u64;
        self.trim(self.config.trim_threshold);
    }

    pub(crate) fn clear(&mut self) {
        self.tiles.clear();
        self.store.clear();
        self.ways_by_node.clear();
        self.relations_by_element.clear();
        self.pinned.clear();
    }
}

pub(crate) fn validate_bbox(bbox: &BoundingBox) -> Result<()> {
    if bbox.is_valid() {
        Ok(())
    } else {
        Err(CacheError::InvalidBoundingBox(format!("{bbox:?}")))
    }
}
