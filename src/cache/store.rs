//! Element storage keyed by `ElementKey`.

use mapcache_types::{Element, ElementGeometry, ElementKey, ElementType, Node, Relation, Way};
use rustc_hash::FxHashMap;

/// A store entry: either the element or the knowledge that it does not exist.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Present(Element),
    /// Fetched and confirmed absent. Only used for ways and relations.
    Absent,
}

impl Slot {
    pub(crate) fn element(&self) -> Option<&Element> {
        match self {
            Slot::Present(element) => Some(element),
            Slot::Absent => None,
        }
    }
}

/// Elements plus the way and relation geometries supplied by callers.
#[derive(Default)]
pub(crate) struct ElementStore {
    entries: FxHashMap<ElementKey, Slot>,
    geometries: FxHashMap<ElementKey, ElementGeometry>,
}

impl ElementStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &ElementKey) -> Option<&Slot> {
        self.entries.get(key)
    }

    pub(crate) fn element(&self, key: &ElementKey) -> Option<&Element> {
        self.entries.get(key).and_then(Slot::element)
    }

    pub(crate) fn node(&self, id: i64) -> Option<&Node> {
        self.element(&ElementKey::node(id)).and_then(Element::as_node)
    }

    pub(crate) fn way(&self, id: i64) -> Option<&Way> {
        self.element(&ElementKey::way(id)).and_then(Element::as_way)
    }

    pub(crate) fn relation(&self, id: i64) -> Option<&Relation> {
        self.element(&ElementKey::relation(id))
            .and_then(Element::as_relation)
    }

    /// Insert or replace an element, returning the replaced one.
    ///
    /// A replaced element loses its stored geometry.
    pub(crate) fn put(&mut self, element: Element) -> Option<Element> {
        let key = element.key();
        match self.entries.insert(key, Slot::Present(element)) {
            Some(Slot::Present(previous)) => {
                self.geometries.remove(&key);
                Some(previous)
            }
            _ => None,
        }
    }

    pub(crate) fn mark_absent(&mut self, key: ElementKey) {
        assert!(
            key.element_type != ElementType::Node,
            "Absent markers are only kept for ways and relations"
        );
        self.entries.insert(key, Slot::Absent);
        self.geometries.remove(&key);
    }

    pub(crate) fn remove(&mut self, key: &ElementKey) -> Option<Slot> {
        self.geometries.remove(key);
        self.entries.remove(key)
    }

    pub(crate) fn contains(&self, key: &ElementKey) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn set_geometry(&mut self, key: ElementKey, geometry: ElementGeometry) {
        self.geometries.insert(key, geometry);
    }

    pub(crate) fn geometry(&self, key: &ElementKey) -> Option<&ElementGeometry> {
        self.geometries.get(key)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&ElementKey, &Slot)> {
        self.entries.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.geometries.clear();
    }
}
