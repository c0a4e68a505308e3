//! Map data containers passed into and out of the cache.

use mapcache_types::{
    BoundingBox, Element, ElementGeometry, ElementGeometryEntry, ElementKey, Node, Relation, Way,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Elements returned by the backing store for a region.
///
/// A region fetch is expected to return every node inside the region, every
/// way referencing one of those nodes, and every relation referencing one of
/// those nodes or ways. The cache trusts that contract and marks the
/// region's relationship indices as fully known after applying it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchedMapData {
    pub elements: Vec<Element>,
    #[serde(default)]
    pub geometries: Vec<ElementGeometryEntry>,
}

impl FetchedMapData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geometries(
        mut self,
        geometries: impl IntoIterator<Item = ElementGeometryEntry>,
    ) -> Self {
        self.geometries.extend(geometries);
        self
    }

    pub fn push(&mut self, element: impl Into<Element>) {
        self.elements.push(element.into());
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl FromIterator<Element> for FetchedMapData {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
            geometries: Vec::new(),
        }
    }
}

/// A batch of changes applied atomically by [`MapDataCache::update`].
///
/// When `bbox` is set the caller declares that `added_or_updated` is the
/// complete content of that region: its tiles become resident and are
/// replaced by the update's nodes.
///
/// [`MapDataCache::update`]: crate::MapDataCache::update
///
/// # Examples
///
/// ```
/// use mapcache::MapDataUpdate;
/// use mapcache::{ElementKey, Way};
///
/// let update = MapDataUpdate::new()
///     .with_element(Way::new(1, vec![1, 2]))
///     .with_deleted([ElementKey::node(7)]);
/// assert!(!update.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapDataUpdate {
    pub added_or_updated: Vec<Element>,
    pub deleted: Vec<ElementKey>,
    pub geometries: Vec<ElementGeometryEntry>,
    pub bbox: Option<BoundingBox>,
}

impl MapDataUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, element: impl Into<Element>) -> Self {
        self.added_or_updated.push(element.into());
        self
    }

    pub fn with_elements(mut self, elements: impl IntoIterator<Item = Element>) -> Self {
        self.added_or_updated.extend(elements);
        self
    }

    pub fn with_deleted(mut self, keys: impl IntoIterator<Item = ElementKey>) -> Self {
        self.deleted.extend(keys);
        self
    }

    pub fn with_geometries(
        mut self,
        geometries: impl IntoIterator<Item = ElementGeometryEntry>,
    ) -> Self {
        self.geometries.extend(geometries);
        self
    }

    /// Declare the update to be the full content of `bbox`.
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.added_or_updated.is_empty() && self.deleted.is_empty() && self.geometries.is_empty()
    }
}

impl From<FetchedMapData> for MapDataUpdate {
    fn from(data: FetchedMapData) -> Self {
        Self {
            added_or_updated: data.elements,
            deleted: Vec::new(),
            geometries: data.geometries,
            bbox: None,
        }
    }
}

/// Result of a region query: elements sorted by id, plus their geometries.
///
/// Nodes always have a point geometry. Ways and relations only have one if
/// a caller supplied it through an update or a region fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDataWithGeometry {
    pub bounding_box: BoundingBox,
    pub nodes: Vec<Node>,
    pub ways: Vec<Way>,
    pub relations: Vec<Relation>,
    pub geometries: BTreeMap<ElementKey, ElementGeometry>,
}

impl MapDataWithGeometry {
    pub fn new(bounding_box: BoundingBox) -> Self {
        Self {
            bounding_box,
            nodes: Vec::new(),
            ways: Vec::new(),
            relations: Vec::new(),
            geometries: BTreeMap::new(),
        }
    }

    pub fn node(&self, id: i64) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn way(&self, id: i64) -> Option<&Way> {
        self.ways.iter().find(|way| way.id == id)
    }

    pub fn relation(&self, id: i64) -> Option<&Relation> {
        self.relations.iter().find(|relation| relation.id == id)
    }

    pub fn geometry(&self, key: &ElementKey) -> Option<&ElementGeometry> {
        self.geometries.get(key)
    }

    /// Keys of all contained elements: nodes, then ways, then relations.
    pub fn keys(&self) -> impl Iterator<Item = ElementKey> + '_ {
        self.nodes
            .iter()
            .map(Node::key)
            .chain(self.ways.iter().map(Way::key))
            .chain(self.relations.iter().map(Relation::key))
    }

    pub fn contains(&self, key: &ElementKey) -> bool {
        self.keys().any(|k| k == *key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
