use geo::Point;
use mapcache::{
    BoundingBox, CacheError, Config, Element, ElementKey, ElementType, FetchedMapData,
    MapDataCache, MapDataUpdate, Node, Relation, RelationMember, TilePos, Way, tile_of,
};
use std::cell::Cell;

const ZOOM: u8 = 16;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cache() -> MapDataCache {
    init_logging();
    MapDataCache::new(Config::new(ZOOM, 4, 10), |_| Ok(FetchedMapData::new()))
}

fn node(id: i64, lon: f64, lat: f64) -> Node {
    Node::new(id, Point::new(lon, lat))
}

fn tile_bbox(node: &Node) -> BoundingBox {
    tile_of(&node.position, ZOOM).bounding_box(ZOOM)
}

fn no_element(_: ElementKey) -> mapcache::Result<Option<Element>> {
    Ok(None)
}

fn unexpected_fetch<T>() -> mapcache::Result<T> {
    panic!("backing store must not be called")
}

/// Three nodes inside one tile, plus that tile's bounding box.
fn nodes_in_one_tile() -> (Node, Node, Node, BoundingBox) {
    let node1 = node(1, 13.40001, 52.50001);
    let node2 = node(2, 13.40011, 52.50011);
    let node3 = node(3, 13.40021, 52.50021);
    let bbox = tile_bbox(&node1);
    (node1, node2, node3, bbox)
}

fn ids<T>(elements: &[T], id: impl Fn(&T) -> i64) -> Vec<i64> {
    elements.iter().map(id).collect()
}

#[test]
fn test_update_puts_way() {
    let cache = cache();
    let way = Way::new(1, vec![1, 2]);
    cache
        .update(MapDataUpdate::new().with_element(way.clone()))
        .unwrap();

    let found = cache
        .get_element(ElementKey::way(1), |_| unexpected_fetch())
        .unwrap();
    assert_eq!(found, Some(Element::Way(way)));
}

#[test]
fn test_way_is_fetched_once_then_cached() {
    let cache = cache();
    let way = Way::new(2, vec![]);
    let calls = Cell::new(0);
    let fetch = |_| {
        calls.set(calls.get() + 1);
        Ok(Some(Element::Way(way.clone())))
    };

    assert_eq!(
        cache.get_element(ElementKey::way(2), fetch).unwrap(),
        Some(Element::Way(way.clone()))
    );
    assert_eq!(
        cache
            .get_element(ElementKey::way(2), |_| unexpected_fetch())
            .unwrap(),
        Some(Element::Way(way))
    );
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_missing_relation_is_remembered() {
    let cache = cache();
    assert!(
        cache
            .get_element(ElementKey::relation(5), no_element)
            .unwrap()
            .is_none()
    );
    assert!(
        cache
            .get_element(ElementKey::relation(5), |_| unexpected_fetch())
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_node_outside_resident_tiles_is_not_retained() {
    let cache = cache();
    let node = node(1, 13.40001, 52.50001);
    let calls = Cell::new(0);

    let found = cache
        .get_element(ElementKey::node(1), |_| {
            calls.set(calls.get() + 1);
            Ok(Some(Element::Node(node.clone())))
        })
        .unwrap();
    assert_eq!(found, Some(Element::Node(node)));

    // fetched again, and the store now says it is gone
    let found = cache
        .get_element(ElementKey::node(1), |_| {
            calls.set(calls.get() + 1);
            Ok(None)
        })
        .unwrap();
    assert!(found.is_none());
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_node_in_resident_tile_is_fetched_once() {
    let cache = cache();
    let node = node(1, 13.40001, 52.50001);
    cache.get_map_data_with_geometry(&tile_bbox(&node)).unwrap();

    let fetched = node.clone();
    cache
        .get_element(ElementKey::node(1), move |_| Ok(Some(fetched.into())))
        .unwrap();
    let found = cache
        .get_element(ElementKey::node(1), |_| unexpected_fetch())
        .unwrap();
    assert_eq!(found, Some(Element::Node(node)));
}

#[test]
fn test_update_only_puts_nodes_of_resident_tiles() {
    let cache = cache();
    let node = node(1, 13.40001, 52.50001);
    let node_tile = tile_bbox(&node);
    assert!(cache.get_map_data_with_geometry(&node_tile).unwrap().is_empty());

    // the node's tile is resident now
    cache
        .update(MapDataUpdate::new().with_element(node.clone()))
        .unwrap();
    let data = cache.get_map_data_with_geometry(&node_tile).unwrap();
    assert_eq!(data.nodes, vec![node.clone()]);
    assert_eq!(
        cache.get_element(ElementKey::node(1), no_element).unwrap(),
        Some(Element::Node(node))
    );

    let other = self::node(2, 14.0, 53.0);
    cache
        .update(MapDataUpdate::new().with_element(other.clone()))
        .unwrap();
    assert!(
        cache
            .get_element(ElementKey::node(2), no_element)
            .unwrap()
            .is_none()
    );
    assert!(
        cache
            .get_map_data_with_geometry(&tile_bbox(&other))
            .unwrap()
            .nodes
            .is_empty()
    );
}

#[test]
fn test_node_moved_out_of_resident_tile_is_dropped() {
    let cache = cache();
    let node = node(1, 13.40001, 52.50001);
    let node_tile = tile_bbox(&node);
    cache
        .update(
            MapDataUpdate::new()
                .with_element(node.clone())
                .with_bbox(node_tile),
        )
        .unwrap();

    let moved = self::node(1, 13.5, 52.5);
    cache
        .update(MapDataUpdate::new().with_element(moved.clone()))
        .unwrap();

    assert!(
        cache
            .get_element(ElementKey::node(1), no_element)
            .unwrap()
            .is_none()
    );
    assert!(
        cache
            .get_map_data_with_geometry(&tile_bbox(&moved))
            .unwrap()
            .nodes
            .is_empty()
    );
    assert!(
        cache
            .get_map_data_with_geometry(&node_tile)
            .unwrap()
            .nodes
            .is_empty()
    );
}

#[test]
fn test_node_moved_between_resident_tiles() {
    let cache = cache();
    let node = node(1, 13.40001, 52.50001);
    let moved = self::node(1, 13.405, 52.5001);
    let old_tile = tile_bbox(&node);
    let new_tile = tile_bbox(&moved);
    assert_ne!(old_tile, new_tile);

    cache
        .update(MapDataUpdate::new().with_element(node).with_bbox(old_tile))
        .unwrap();
    cache.get_map_data_with_geometry(&new_tile).unwrap();

    cache
        .update(MapDataUpdate::new().with_element(moved.clone()))
        .unwrap();
    assert!(
        cache
            .get_map_data_with_geometry(&old_tile)
            .unwrap()
            .nodes
            .is_empty()
    );
    assert_eq!(
        cache.get_map_data_with_geometry(&new_tile).unwrap().nodes,
        vec![moved]
    );
}

#[test]
fn test_update_removes_elements() {
    init_logging();
    let node = node(1, 13.40001, 52.50001);
    let region_node = node.clone();
    let cache = MapDataCache::new(Config::new(ZOOM, 4, 10), move |_| {
        Ok(FetchedMapData::from_iter([Element::Node(region_node.clone())]))
    });
    cache.get_map_data_with_geometry(&tile_bbox(&node)).unwrap();

    let way = Way::new(2, vec![1]);
    cache
        .update(MapDataUpdate::new().with_element(way.clone()))
        .unwrap();
    let found = cache
        .get_elements(&[ElementKey::node(1), ElementKey::way(2)], |_| {
            unexpected_fetch()
        })
        .unwrap();
    assert_eq!(found, vec![Element::Node(node), Element::Way(way)]);

    cache
        .update(MapDataUpdate::new().with_deleted([ElementKey::node(1), ElementKey::way(2)]))
        .unwrap();
    assert!(
        cache
            .get_element(ElementKey::node(1), no_element)
            .unwrap()
            .is_none()
    );
    assert!(
        cache
            .get_element(ElementKey::way(2), no_element)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_get_ways_for_node_fetches_once() {
    let cache = cache();
    let way1 = Way::new(1, vec![1, 2]);
    let way2 = Way::new(2, vec![3, 1]);
    let way3 = Way::new(3, vec![3, 2]);
    cache
        .update(MapDataUpdate::new().with_elements([
            way1.clone().into(),
            way2.clone().into(),
            way3.into(),
        ]))
        .unwrap();

    // ways seen through updates alone are not trusted to be all of them
    let calls = Cell::new(0);
    let ways = cache
        .get_ways_for_node(1, |_| {
            calls.set(calls.get() + 1);
            Ok(vec![way1.clone(), way2.clone()])
        })
        .unwrap();
    assert_eq!(ways, vec![way1.clone(), way2.clone()]);
    assert_eq!(calls.get(), 1);

    let ways = cache
        .get_ways_for_node(1, |_| unexpected_fetch())
        .unwrap();
    assert_eq!(ways, vec![way1, way2]);
}

#[test]
fn test_replaced_way_leaves_node_index_without_fetch() {
    let cache = cache();
    let way1 = Way::new(1, vec![1, 2]);
    let way2 = Way::new(2, vec![1, 3]);
    let fetched = vec![way1.clone(), way2];
    cache.get_ways_for_node(1, move |_| Ok(fetched)).unwrap();

    cache
        .update(MapDataUpdate::new().with_element(Way::new(2, vec![3, 4])))
        .unwrap();
    let ways = cache
        .get_ways_for_node(1, |_| unexpected_fetch())
        .unwrap();
    assert_eq!(ways, vec![way1]);
}

#[test]
fn test_ways_for_node_filled_inside_bbox() {
    let cache = cache();
    let (node1, node2, node3, bbox) = nodes_in_one_tile();
    let way1 = Way::new(1, vec![1, 2]);
    let way2 = Way::new(2, vec![3, 1]);
    let way3 = Way::new(3, vec![3, 2]);
    cache
        .update(
            MapDataUpdate::new()
                .with_elements([
                    node1.into(),
                    node2.into(),
                    node3.into(),
                    way1.clone().into(),
                    way2.clone().into(),
                    way3.clone().into(),
                ])
                .with_bbox(bbox),
        )
        .unwrap();

    let ways = cache.get_ways_for_node(1, |_| unexpected_fetch()).unwrap();
    assert_eq!(ways, vec![way1.clone(), way2.clone()]);
    let ways = cache.get_ways_for_node(2, |_| unexpected_fetch()).unwrap();
    assert_eq!(ways, vec![way1.clone(), way3]);

    let way3_updated = Way::new(3, vec![3, 2, 1]);
    cache
        .update(MapDataUpdate::new().with_element(way3_updated.clone()))
        .unwrap();
    let ways = cache.get_ways_for_node(1, |_| unexpected_fetch()).unwrap();
    assert_eq!(ways, vec![way1, way2, way3_updated]);
}

#[test]
fn test_relation_index_follows_member_type() {
    let cache = cache();
    let (node1, node2, _, bbox) = nodes_in_one_tile();
    let way1 = Way::new(1, vec![1, 2]);
    let rel1 = Relation::new(1, vec![RelationMember::new(ElementType::Node, 1, "")]);
    let rel2 = Relation::new(2, vec![RelationMember::new(ElementType::Way, 1, "")]);
    cache
        .update(
            MapDataUpdate::new()
                .with_elements([
                    node1.into(),
                    node2.into(),
                    way1.into(),
                    rel1.clone().into(),
                    rel2.clone().into(),
                ])
                .with_bbox(bbox),
        )
        .unwrap();

    let relations = cache.get_relations_for_node(1, |_| unexpected_fetch()).unwrap();
    assert_eq!(relations, vec![rel1.clone()]);
    let relations = cache.get_relations_for_way(1, |_| unexpected_fetch()).unwrap();
    assert_eq!(relations, vec![rel2]);

    let rel2_updated = Relation::new(2, vec![RelationMember::new(ElementType::Node, 1, "")]);
    cache
        .update(MapDataUpdate::new().with_element(rel2_updated.clone()))
        .unwrap();
    let relations = cache.get_relations_for_node(1, |_| unexpected_fetch()).unwrap();
    assert_eq!(relations, vec![rel1, rel2_updated]);
    let relations = cache.get_relations_for_way(1, |_| unexpected_fetch()).unwrap();
    assert!(relations.is_empty());
}

#[test]
fn test_relation_member_node_and_way_with_same_id() {
    let cache = cache();
    let relation = Relation::new(1, vec![RelationMember::new(ElementType::Node, 7, "")]);
    let fetched = vec![relation.clone()];
    cache.get_relations_for_node(7, move |_| Ok(fetched)).unwrap();
    cache.get_relations_for_way(7, |_| Ok(vec![])).unwrap();

    let moved = Relation::new(1, vec![RelationMember::new(ElementType::Way, 7, "")]);
    cache
        .update(MapDataUpdate::new().with_element(moved.clone()))
        .unwrap();
    assert!(
        cache
            .get_relations_for_node(7, |_| unexpected_fetch())
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        cache.get_relations_for_way(7, |_| unexpected_fetch()).unwrap(),
        vec![moved]
    );
}

#[test]
fn test_trim_removes_everything_not_reachable_from_tiles() {
    let cache = cache();
    let (node1, node2, node3, bbox) = nodes_in_one_tile();
    let outside_node = node(4, 14.0, 53.0);
    let way1 = Way::new(1, vec![1, 2]);
    let way2 = Way::new(2, vec![3, 1]);
    let way3 = Way::new(3, vec![3, 2, 4]);
    let outside_way = Way::new(4, vec![4, 5]);
    let rel1 = Relation::new(
        1,
        vec![
            RelationMember::new(ElementType::Node, 1, ""),
            RelationMember::new(ElementType::Way, 5, ""),
        ],
    );
    let outside_rel = Relation::new(
        2,
        vec![
            RelationMember::new(ElementType::Node, 4, ""),
            RelationMember::new(ElementType::Way, 5, ""),
        ],
    );
    cache
        .update(
            MapDataUpdate::new()
                .with_elements([
                    node1.clone().into(),
                    node2.clone().into(),
                    node3.clone().into(),
                    way1.clone().into(),
                    way2.clone().into(),
                    way3.clone().into(),
                    outside_node.into(),
                    outside_way.clone().into(),
                    rel1.clone().into(),
                    outside_rel.clone().into(),
                ])
                .with_bbox(bbox),
        )
        .unwrap();

    let data = cache.get_map_data_with_geometry(&bbox).unwrap();
    assert_eq!(data.bounding_box, bbox);
    assert_eq!(data.nodes, vec![node1.clone(), node2, node3]);
    assert_eq!(data.ways, vec![way1, way2, way3]);
    assert_eq!(data.relations, vec![rel1.clone()]);
    assert_eq!(
        data.geometry(&ElementKey::node(1)),
        Some(&mapcache::ElementGeometry::Point(node1.position))
    );
    assert!(data.geometry(&ElementKey::way(1)).is_none());

    assert!(cache.get_node(4).is_none());
    assert_eq!(
        cache.get_element(ElementKey::way(4), no_element).unwrap(),
        Some(Element::Way(outside_way))
    );
    assert_eq!(
        cache.get_element(ElementKey::relation(2), no_element).unwrap(),
        Some(Element::Relation(outside_rel))
    );

    cache.trim(4);
    assert!(
        cache
            .get_element(ElementKey::way(4), no_element)
            .unwrap()
            .is_none()
    );
    assert!(
        cache
            .get_element(ElementKey::relation(2), no_element)
            .unwrap()
            .is_none()
    );
    assert_eq!(
        cache.get_element(ElementKey::relation(1), no_element).unwrap(),
        Some(Element::Relation(rel1))
    );
}

#[test]
fn test_relation_added_after_its_members() {
    let cache = cache();
    let node1 = node(1, 13.40001, 52.50001);
    let way = Way::new(1, vec![1, 2]);
    cache
        .update(
            MapDataUpdate::new()
                .with_element(way)
                .with_element(node1.clone())
                .with_bbox(tile_bbox(&node1)),
        )
        .unwrap();

    let rel1 = Relation::new(1, vec![RelationMember::new(ElementType::Node, 1, "")]);
    let rel2 = Relation::new(2, vec![RelationMember::new(ElementType::Way, 1, "")]);
    cache
        .update(MapDataUpdate::new().with_elements([rel1.clone().into(), rel2.clone().into()]))
        .unwrap();

    assert_eq!(
        cache.get_relations_for_node(1, |_| unexpected_fetch()).unwrap(),
        vec![rel1]
    );
    assert_eq!(
        cache.get_relations_for_way(1, |_| unexpected_fetch()).unwrap(),
        vec![rel2]
    );
}

#[test]
fn test_get_elements_batches_misses() {
    let cache = cache();
    cache
        .update(MapDataUpdate::new().with_element(Way::new(1, vec![])))
        .unwrap();

    let calls = Cell::new(0);
    let found = cache
        .get_elements(
            &[
                ElementKey::relation(3),
                ElementKey::way(1),
                ElementKey::way(2),
                ElementKey::way(2),
            ],
            |missing| {
                calls.set(calls.get() + 1);
                assert_eq!(missing, &[ElementKey::relation(3), ElementKey::way(2)]);
                Ok(vec![Element::Way(Way::new(2, vec![]))])
            },
        )
        .unwrap();

    assert_eq!(calls.get(), 1);
    let keys: Vec<_> = found.iter().map(Element::key).collect();
    assert_eq!(
        keys,
        vec![ElementKey::way(1), ElementKey::way(2), ElementKey::way(2)]
    );

    // relation 3 is known to be missing, way 2 is cached
    let found = cache
        .get_elements(&[ElementKey::relation(3), ElementKey::way(2)], |_| {
            unexpected_fetch()
        })
        .unwrap();
    assert_eq!(ids(&found, Element::id), vec![2]);
}

#[test]
fn test_failed_fetch_leaves_cache_unchanged() {
    let cache = cache();
    let result = cache.get_element(ElementKey::way(1), |_| Err(CacheError::source("disk error")));
    assert!(matches!(result, Err(CacheError::Source(message)) if message == "disk error"));
    assert!(cache.is_empty());

    let result = cache.get_ways_for_node(1, |_| Err(CacheError::source("disk error")));
    assert!(result.is_err());

    // still a miss, so the next call fetches
    let calls = Cell::new(0);
    cache
        .get_ways_for_node(1, |_| {
            calls.set(calls.get() + 1);
            Ok(vec![])
        })
        .unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_region_update_replaces_tile_content() {
    let cache = cache();
    let (node1, node2, _, bbox) = nodes_in_one_tile();
    cache
        .update(
            MapDataUpdate::new()
                .with_elements([node1.into(), node2.clone().into()])
                .with_bbox(bbox),
        )
        .unwrap();
    cache
        .update(
            MapDataUpdate::new()
                .with_element(node2.clone())
                .with_bbox(bbox),
        )
        .unwrap();

    let data = cache.get_map_data_with_geometry(&bbox).unwrap();
    assert_eq!(data.nodes, vec![node2]);
    assert!(cache.get_node(1).is_none());
}

#[test]
fn test_geometries_are_kept_for_ways() {
    let cache = cache();
    let (node1, node2, _, bbox) = nodes_in_one_tile();
    let way = Way::new(1, vec![1, 2]);
    let geometry = mapcache::ElementGeometry::Polyline(geo::MultiLineString::new(vec![
        geo::LineString::from(vec![node1.position, node2.position]),
    ]));
    cache
        .update(
            MapDataUpdate::new()
                .with_elements([node1.into(), node2.into(), way.clone().into()])
                .with_geometries([mapcache::ElementGeometryEntry::new(way.key(), geometry.clone())])
                .with_bbox(bbox),
        )
        .unwrap();

    let data = cache.get_map_data_with_geometry(&bbox).unwrap();
    assert_eq!(data.geometry(&way.key()), Some(&geometry));

    // a new version without geometry drops the stale one
    cache
        .update(MapDataUpdate::new().with_element(Way::new(1, vec![2, 1])))
        .unwrap();
    let data = cache.get_map_data_with_geometry(&bbox).unwrap();
    assert!(data.geometry(&way.key()).is_none());
}

#[test]
fn test_stats_count_hits_and_misses() {
    let cache = cache();
    cache
        .get_element(ElementKey::way(1), |_| Ok(Some(Way::new(1, vec![]).into())))
        .unwrap();
    cache
        .get_element(ElementKey::way(1), |_| unexpected_fetch())
        .unwrap();

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.fetches, 1);
    assert_eq!(stats.element_count, 1);
    assert_eq!(stats.resident_tiles, 0);
}

#[test]
fn test_resident_tiles_after_query() {
    let cache = cache();
    let node = node(1, 13.40001, 52.50001);
    let bbox = tile_bbox(&node);
    assert!(!cache.is_covered(&bbox));

    cache.get_map_data_with_geometry(&bbox).unwrap();
    assert!(cache.is_covered(&bbox));
    assert_eq!(cache.resident_tiles(), vec![TilePos::new(35207, 21498)]);
    assert_eq!(cache.bounds(), Some(bbox));
    assert_eq!(cache.stats().tiles_loaded, 1);
}

#[test]
fn test_region_update_keeps_known_referrers() {
    let cache = cache();
    let node1 = node(1, 13.40001, 52.50001);
    let bbox = tile_bbox(&node1);
    let way = Way::new(7, vec![1, 2]);
    let relation = Relation::new(3, vec![RelationMember::new(ElementType::Node, 1, "")]);
    let fetched_ways = vec![way.clone()];
    let fetched_relations = vec![relation.clone()];
    cache.get_ways_for_node(1, move |_| Ok(fetched_ways)).unwrap();
    cache
        .get_relations_for_node(1, move |_| Ok(fetched_relations))
        .unwrap();

    cache
        .update(MapDataUpdate::new().with_element(node1).with_bbox(bbox))
        .unwrap();

    assert_eq!(
        cache.get_ways_for_node(1, |_| unexpected_fetch()).unwrap(),
        vec![way.clone()]
    );
    assert_eq!(
        cache.get_relations_for_node(1, |_| unexpected_fetch()).unwrap(),
        vec![relation.clone()]
    );
    let data = cache.get_map_data_with_geometry(&bbox).unwrap();
    assert_eq!(data.ways, vec![way]);
    assert_eq!(data.relations, vec![relation]);
}
