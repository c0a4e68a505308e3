//! A cache bound to its backing store.

use crate::cache::MapDataCache;
use crate::error::Result;
use crate::map_data::{MapDataUpdate, MapDataWithGeometry};
use crate::source::MapDataSource;
use crate::types::Config;
use log::{debug, warn};
use mapcache_types::{BoundingBox, Element, ElementKey, Relation, Way};
use std::sync::Arc;

/// Read-through, write-through access to a [`MapDataSource`].
///
/// Reads go through the cache and fall back to the source on a miss.
/// Writes go to the source first and only reach the cache once the source
/// accepted them.
///
/// # Examples
///
/// ```rust
/// use mapcache::{Config, MapDataController, MapDataUpdate, MemorySource};
/// use mapcache::{ElementKey, Way};
/// use std::sync::Arc;
///
/// # fn main() -> mapcache::Result<()> {
/// let source = Arc::new(MemorySource::new());
/// let controller = MapDataController::new(source.clone(), Config::default());
///
/// controller.put_all(MapDataUpdate::new().with_element(Way::new(1, vec![1, 2])))?;
/// assert_eq!(source.len(), 1);
/// assert!(controller.get(ElementKey::way(1))?.is_some());
/// # Ok(())
/// # }
/// ```
pub struct MapDataController<S: MapDataSource + 'static> {
    source: Arc<S>,
    cache: MapDataCache,
}

impl<S: MapDataSource + 'static> MapDataController<S> {
    pub fn new(source: Arc<S>, config: Config) -> Self {
        let region_source = Arc::clone(&source);
        let cache = MapDataCache::new(config, move |bbox| region_source.get_map_data(bbox));
        Self { source, cache }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn cache(&self) -> &MapDataCache {
        &self.cache
    }

    pub fn get(&self, key: ElementKey) -> Result<Option<Element>> {
        self.cache
            .get_element(key, |key| self.source.get_element(key))
    }

    pub fn get_all(&self, keys: &[ElementKey]) -> Result<Vec<Element>> {
        self.cache
            .get_elements(keys, |missing| self.source.get_elements(missing))
    }

    pub fn get_ways_for_node(&self, node_id: i64) -> Result<Vec<Way>> {
        self.cache
            .get_ways_for_node(node_id, |id| self.source.get_ways_for_node(id))
    }

    pub fn get_relations_for_node(&self, node_id: i64) -> Result<Vec<Relation>> {
        self.cache
            .get_relations_for_node(node_id, |id| self.source.get_relations_for_node(id))
    }

    pub fn get_relations_for_way(&self, way_id: i64) -> Result<Vec<Relation>> {
        self.cache
            .get_relations_for_way(way_id, |id| self.source.get_relations_for_way(id))
    }

    pub fn get_map_data_with_geometry(&self, bbox: &BoundingBox) -> Result<MapDataWithGeometry> {
        self.cache.get_map_data_with_geometry(bbox)
    }

    /// Write an update to the source, then apply it to the cache.
    ///
    /// If the source rejects the deletions the cache is left untouched. If it
    /// accepts them but rejects the puts, only the deletions reach the cache.
    pub fn put_all(&self, update: MapDataUpdate) -> Result<()> {
        debug!(
            "Writing {} elements and {} deletions through to the source",
            update.added_or_updated.len(),
            update.deleted.len()
        );
        if !update.deleted.is_empty() {
            self.source.delete_all(&update.deleted)?;
        }
        if !update.added_or_updated.is_empty()
            && let Err(e) = self.source.put_all(&update.added_or_updated)
        {
            warn!("Source rejected {} elements: {e}", update.added_or_updated.len());
            self.cache
                .update(MapDataUpdate::new().with_deleted(update.deleted))?;
            return Err(e);
        }
        self.cache.update(update)
    }

    pub fn trim(&self, target: usize) -> usize {
        self.cache.trim(target)
    }
}

impl<S: MapDataSource + 'static> Clone for MapDataController<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            cache: self.cache.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::source::MemorySource;
    use geo::Point;
    use mapcache_types::Node;

    fn controller() -> (Arc<MemorySource>, MapDataController<MemorySource>) {
        let source = Arc::new(MemorySource::with_elements([
            Node::new(1, Point::new(13.40001, 52.50001)).into(),
            Way::new(1, vec![1]).into(),
        ]));
        let controller = MapDataController::new(source.clone(), Config::new(16, 4, 100));
        (source, controller)
    }

    #[test]
    fn test_reads_fetch_once() {
        let (source, controller) = controller();
        assert!(controller.get(ElementKey::way(1)).unwrap().is_some());
        assert!(controller.get(ElementKey::way(1)).unwrap().is_some());
        assert_eq!(source.stats().element_fetches, 1);

        assert_eq!(controller.get_ways_for_node(1).unwrap().len(), 1);
        assert_eq!(controller.get_ways_for_node(1).unwrap().len(), 1);
        assert_eq!(source.stats().way_fetches, 1);
    }

    #[test]
    fn test_region_query_uses_source() {
        let (source, controller) = controller();
        let bbox = BoundingBox::new(13.400005, 52.500005, 13.400015, 52.500015);
        let data = controller.get_map_data_with_geometry(&bbox).unwrap();
        assert_eq!(data.nodes.len(), 1);
        assert_eq!(data.ways.len(), 1);

        controller.get_map_data_with_geometry(&bbox).unwrap();
        assert_eq!(source.stats().region_fetches, 1);
    }

    #[test]
    fn test_failed_write_leaves_cache_untouched() {
        let (source, controller) = controller();
        source.set_offline(true);
        let result = controller.put_all(MapDataUpdate::new().with_element(Way::new(2, vec![1])));
        assert!(matches!(result, Err(CacheError::Source(_))));
        assert!(controller.cache().get_cached(&ElementKey::way(2)).is_none());
    }
}
