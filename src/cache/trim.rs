//! Trimming: dropping everything no longer reachable from a resident tile
//! or a pinned element.

use super::internal::CacheInner;
use super::store::Slot;
use log::debug;
use mapcache_types::{Element, ElementKey, ElementType};
use rustc_hash::FxHashSet;

/// Removal priority of an unreachable store entry, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TrimClass {
    /// A node whose tile was evicted.
    OrphanNode,
    AbsentMarker,
    Way,
    Relation,
}

impl CacheInner {
    /// Remove unreachable entries until the store holds at most `target`.
    ///
    /// Returns the number of removed entries.
    pub(crate) fn trim(&mut self, target: usize) -> usize {
        if self.store.len() <= target {
            return 0;
        }
        let reachable = self.reachable_keys();

        let mut candidates: Vec<(TrimClass, ElementKey)> = self
            .store
            .iter()
            .filter(|(key, _)| !reachable.contains(key))
            .map(|(key, slot)| (trim_class(key, slot), *key))
            .collect();
        candidates.sort_unstable();

        let excess = self.store.len() - target;
        let mut removed = 0;
        for (_, key) in candidates.into_iter().take(excess) {
            self.remove_element(key);
            removed += 1;
        }

        let store = &self.store;
        self.ways_by_node.retain(|node_id| {
            let key = ElementKey::node(*node_id);
            reachable.contains(&key) || store.contains(&key)
        });
        self.relations_by_element
            .retain(|key| reachable.contains(key) || store.contains(key));

        self.counters.elements_trimmed += removed as u64;
        debug!(
            "Trimmed {removed} elements, {} remain ({} reachable)",
            self.store.len(),
            reachable.len()
        );
        removed
    }

    /// Evict least recently used tiles down to `max_tiles`, then drop
    /// everything that became unreachable.
    pub(crate) fn trim_tiles(&mut self, max_tiles: usize) -> usize {
        let evicted = self.tiles.evict_down_to(max_tiles);
        if !evicted.is_empty() {
            debug!("Evicted {} tiles on request", evicted.len());
        }
        self.counters.tiles_evicted += evicted.len() as u64;
        self.trim(0)
    }

    /// Keys that must survive a trim.
    ///
    /// Roots are the nodes of resident tiles and the pinned elements. The
    /// members of pinned ways and relations are reachable too. From there,
    /// ways referencing a reachable node and relations with a reachable
    /// member are added until nothing changes.
    pub(crate) fn reachable_keys(&self) -> FxHashSet<ElementKey> {
        let mut reachable: FxHashSet<ElementKey> =
            self.tiles.node_ids().map(ElementKey::node).collect();

        let mut pending: Vec<ElementKey> = self.pinned.iter().copied().collect();
        while let Some(key) = pending.pop() {
            if !reachable.insert(key) {
                continue;
            }
            match self.store.element(&key) {
                Some(Element::Way(way)) => {
                    pending.extend(way.node_ids.iter().copied().map(ElementKey::node));
                }
                Some(Element::Relation(relation)) => pending.extend(relation.member_keys()),
                _ => {}
            }
        }

        for (key, slot) in self.store.iter() {
            if let Slot::Present(Element::Way(way)) = slot
                && way
                    .node_ids
                    .iter()
                    .any(|id| reachable.contains(&ElementKey::node(*id)))
            {
                reachable.insert(*key);
            }
        }

        loop {
            let added: Vec<ElementKey> = self
                .store
                .iter()
                .filter(|(key, _)| !reachable.contains(key))
                .filter_map(|(key, slot)| match slot {
                    Slot::Present(Element::Relation(relation))
                        if relation.member_keys().any(|m| reachable.contains(&m)) =>
                    {
                        Some(*key)
                    }
                    _ => None,
                })
                .collect();
            if added.is_empty() {
                break;
            }
            reachable.extend(added);
        }
        reachable
    }

    pub(crate) fn pin(&mut self, key: ElementKey) -> bool {
        self.pinned.insert(key)
    }

    pub(crate) fn unpin(&mut self, key: &ElementKey) -> bool {
        self.pinned.remove(key)
    }
}

fn trim_class(key: &ElementKey, slot: &Slot) -> TrimClass {
    match (key.element_type, slot) {
        (_, Slot::Absent) => TrimClass::AbsentMarker,
        (ElementType::Node, _) => TrimClass::OrphanNode,
        (ElementType::Way, _) => TrimClass::Way,
        (ElementType::Relation, _) => TrimClass::Relation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_data::MapDataUpdate;
    use crate::tiles::tile_of;
    use crate::types::Config;
    use geo::Point;
    use mapcache_types::{Node, Relation, RelationMember, Way};

    fn inner_with_region() -> CacheInner {
        let mut inner = CacheInner::new(Config::new(16, 4, 10));
        let bbox = tile_of(&Point::new(13.40001, 52.50001), 16).bounding_box(16);
        inner
            .apply_update(
                MapDataUpdate::new()
                    .with_element(Node::new(1, Point::new(13.40001, 52.50001)))
                    .with_element(Node::new(2, Point::new(13.40002, 52.50002)))
                    .with_element(Way::new(1, vec![1, 2]))
                    .with_element(Way::new(2, vec![2, 99]))
                    .with_bbox(bbox),
            )
            .unwrap();
        inner
    }

    #[test]
    fn test_trim_below_target_does_nothing() {
        let mut inner = inner_with_region();
        inner.put_element(Way::new(7, vec![70, 71]).into());
        assert_eq!(inner.trim(100), 0);
        assert!(inner.store.way(7).is_some());
    }

    #[test]
    fn test_trim_keeps_reachable() {
        let mut inner = inner_with_region();
        inner.put_element(Way::new(7, vec![70, 71]).into());
        inner.put_element(
            Relation::new(1, vec![RelationMember::new(ElementType::Way, 1, "")]).into(),
        );
        inner.put_element(
            Relation::new(2, vec![RelationMember::new(ElementType::Way, 7, "")]).into(),
        );
        // relation 3 is only reachable through relation 1
        inner.put_element(
            Relation::new(3, vec![RelationMember::new(ElementType::Relation, 1, "")]).into(),
        );

        assert_eq!(inner.trim(0), 2);
        assert!(inner.store.way(1).is_some());
        assert!(inner.store.way(2).is_some());
        assert!(inner.store.relation(1).is_some());
        assert!(inner.store.relation(3).is_some());
        assert!(inner.store.way(7).is_none());
        assert!(inner.store.relation(2).is_none());
        assert!(inner.ways_by_node.get(&70).is_none());
        assert_eq!(inner.counters.elements_trimmed, 2);
    }

    #[test]
    fn test_trim_stops_at_target() {
        let mut inner = inner_with_region();
        inner.put_element(Way::new(7, vec![70]).into());
        inner.put_element(Way::new(8, vec![80]).into());
        let before = inner.store.len();

        assert_eq!(inner.trim(before - 1), 1);
        assert_eq!(inner.store.len(), before - 1);
    }

    #[test]
    fn test_orphans_and_markers_go_first() {
        let mut inner = inner_with_region();
        inner.put_element(Way::new(7, vec![70]).into());
        inner.store.mark_absent(ElementKey::relation(9));
        inner.tiles.evict_down_to(0);
        let before = inner.store.len();

        // two orphaned nodes, then the absent marker
        assert_eq!(inner.trim(before - 3), 3);
        assert!(inner.store.node(1).is_none());
        assert!(inner.store.node(2).is_none());
        assert!(inner.store.get(&ElementKey::relation(9)).is_none());
        assert!(inner.store.way(7).is_some());
    }

    #[test]
    fn test_pinned_way_survives_with_its_nodes() {
        let mut inner = inner_with_region();
        inner.put_element(Way::new(7, vec![70]).into());
        assert!(inner.pin(ElementKey::way(7)));
        inner.tiles.evict_down_to(0);

        inner.trim(0);
        assert!(inner.store.way(7).is_some());
        assert!(inner.store.way(1).is_none());

        assert!(inner.unpin(&ElementKey::way(7)));
        inner.trim(0);
        assert_eq!(inner.store.len(), 0);
    }

    #[test]
    fn test_trim_tiles() {
        let mut inner = inner_with_region();
        assert_eq!(inner.trim_tiles(0), 4);
        assert_eq!(inner.tiles.len(), 0);
        assert_eq!(inner.store.len(), 0);
        assert_eq!(inner.counters.tiles_evicted, 1);
    }
}
