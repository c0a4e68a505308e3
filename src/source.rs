//! Backing store abstraction
//!
//! The cache itself only talks to closures. `MapDataSource` bundles the
//! lookups a persistent map data store offers so that a
//! [`MapDataController`](crate::MapDataController) can wire them into a cache.

use crate::error::{CacheError, Result};
use crate::map_data::FetchedMapData;
use mapcache_types::{BoundingBox, Element, ElementKey, ElementType, Relation, Way};
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Trait for backing store implementations
///
/// Lookups report a missing element with `Ok(None)` or by leaving it out of a
/// returned list. `Err` is reserved for failures of the store itself.
pub trait MapDataSource: Send + Sync {
    fn get_element(&self, key: ElementKey) -> Result<Option<Element>>;

    /// Get all existing elements of `keys`.
    fn get_elements(&self, keys: &[ElementKey]) -> Result<Vec<Element>> {
        keys.iter()
            .filter_map(|key| self.get_element(*key).transpose())
            .collect()
    }

    /// All ways referencing the node.
    fn get_ways_for_node(&self, node_id: i64) -> Result<Vec<Way>>;

    /// All relations with the node as a member.
    fn get_relations_for_node(&self, node_id: i64) -> Result<Vec<Relation>>;

    /// All relations with the way as a member.
    fn get_relations_for_way(&self, way_id: i64) -> Result<Vec<Relation>>;

    /// Nodes inside `bbox`, the ways referencing them and the relations
    /// referencing any of those nodes or ways.
    fn get_map_data(&self, bbox: &BoundingBox) -> Result<FetchedMapData>;

    /// Insert or replace elements.
    fn put_all(&self, elements: &[Element]) -> Result<()>;

    /// Delete elements. Missing keys are ignored.
    fn delete_all(&self, keys: &[ElementKey]) -> Result<()>;
}

/// Number of calls a [`MemorySource`] has served, per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub element_fetches: u64,
    pub batch_fetches: u64,
    pub way_fetches: u64,
    pub relation_fetches: u64,
    pub region_fetches: u64,
    pub writes: u64,
}

#[derive(Default)]
struct SourceCounters {
    element_fetches: AtomicU64,
    batch_fetches: AtomicU64,
    way_fetches: AtomicU64,
    relation_fetches: AtomicU64,
    region_fetches: AtomicU64,
    writes: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// In-memory backing store using BTreeMap
///
/// Counts its calls so callers can check how often a cache went to the
/// store, and can be switched offline to simulate store failures.
#[derive(Default)]
pub struct MemorySource {
    elements: RwLock<BTreeMap<ElementKey, Element>>,
    counters: SourceCounters,
    offline: AtomicBool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elements(elements: impl IntoIterator<Item = Element>) -> Self {
        let source = Self::new();
        source
            .elements
            .write()
            .extend(elements.into_iter().map(|element| (element.key(), element)));
        source
    }

    /// Make every following call fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }

    pub fn stats(&self) -> SourceStats {
        let c = &self.counters;
        SourceStats {
            element_fetches: c.element_fetches.load(Ordering::Relaxed),
            batch_fetches: c.batch_fetches.load(Ordering::Relaxed),
            way_fetches: c.way_fetches.load(Ordering::Relaxed),
            relation_fetches: c.relation_fetches.load(Ordering::Relaxed),
            region_fetches: c.region_fetches.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
        }
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::source("memory source is offline"));
        }
        Ok(())
    }

    fn relations_with_member(&self, member: ElementKey) -> Vec<Relation> {
        self.elements
            .read()
            .values()
            .filter_map(Element::as_relation)
            .filter(|relation| relation.references(member))
            .cloned()
            .collect()
    }
}

impl MapDataSource for MemorySource {
    fn get_element(&self, key: ElementKey) -> Result<Option<Element>> {
        bump(&self.counters.element_fetches);
        self.check_online()?;
        Ok(self.elements.read().get(&key).cloned())
    }

    fn get_elements(&self, keys: &[ElementKey]) -> Result<Vec<Element>> {
        bump(&self.counters.batch_fetches);
        self.check_online()?;
        let elements = self.elements.read();
        Ok(keys
            .iter()
            .filter_map(|key| elements.get(key).cloned())
            .collect())
    }

    fn get_ways_for_node(&self, node_id: i64) -> Result<Vec<Way>> {
        bump(&self.counters.way_fetches);
        self.check_online()?;
        Ok(self
            .elements
            .read()
            .values()
            .filter_map(Element::as_way)
            .filter(|way| way.references_node(node_id))
            .cloned()
            .collect())
    }

    fn get_relations_for_node(&self, node_id: i64) -> Result<Vec<Relation>> {
        bump(&self.counters.relation_fetches);
        self.check_online()?;
        Ok(self.relations_with_member(ElementKey::node(node_id)))
    }

    fn get_relations_for_way(&self, way_id: i64) -> Result<Vec<Relation>> {
        bump(&self.counters.relation_fetches);
        self.check_online()?;
        Ok(self.relations_with_member(ElementKey::way(way_id)))
    }

    fn get_map_data(&self, bbox: &BoundingBox) -> Result<FetchedMapData> {
        bump(&self.counters.region_fetches);
        self.check_online()?;
        let elements = self.elements.read();

        let nodes: FxHashSet<i64> = elements
            .values()
            .filter_map(Element::as_node)
            .filter(|node| bbox.contains_point(&node.position))
            .map(|node| node.id)
            .collect();
        let ways: FxHashSet<i64> = elements
            .values()
            .filter_map(Element::as_way)
            .filter(|way| way.node_ids.iter().any(|id| nodes.contains(id)))
            .map(|way| way.id)
            .collect();

        let data = elements
            .values()
            .filter(|element| match element {
                Element::Node(node) => nodes.contains(&node.id),
                Element::Way(way) => ways.contains(&way.id),
                Element::Relation(relation) => {
                    relation.member_keys().any(|key| match key.element_type {
                        ElementType::Node => nodes.contains(&key.id),
                        ElementType::Way => ways.contains(&key.id),
                        ElementType::Relation => false,
                    })
                }
            })
            .cloned()
            .collect();
        Ok(data)
    }

    fn put_all(&self, elements: &[Element]) -> Result<()> {
        bump(&self.counters.writes);
        self.check_online()?;
        let mut stored = self.elements.write();
        for element in elements {
            stored.insert(element.key(), element.clone());
        }
        Ok(())
    }

    fn delete_all(&self, keys: &[ElementKey]) -> Result<()> {
        bump(&self.counters.writes);
        self.check_online()?;
        let mut stored = self.elements.write();
        for key in keys {
            stored.remove(key);
        }
        Ok(())
    }
}
