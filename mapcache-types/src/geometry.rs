use crate::bbox::BoundingBox;
use crate::element::ElementKey;
use geo::{BoundingRect, MultiLineString, MultiPolygon, Point};
use serde::{Deserialize, Serialize};

/// The shape of an element as computed by a geometry builder.
///
/// The cache computes `Point` geometries for nodes itself and treats the
/// other variants as opaque payloads supplied by its callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates", rename_all = "snake_case")]
pub enum ElementGeometry {
    Point(Point<f64>),
    Polyline(MultiLineString<f64>),
    Polygon(MultiPolygon<f64>),
}

impl ElementGeometry {
    /// A point usable to place a label or marker for this geometry.
    pub fn center(&self) -> Option<Point<f64>> {
        match self {
            ElementGeometry::Point(point) => Some(*point),
            _ => self.bounding_box().map(|bbox| bbox.center()),
        }
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let rect = match self {
            ElementGeometry::Point(point) => Some(point.bounding_rect()),
            ElementGeometry::Polyline(lines) => lines.bounding_rect(),
            ElementGeometry::Polygon(polygons) => polygons.bounding_rect(),
        };
        rect.map(BoundingBox::from_rect)
    }
}

/// A geometry tagged with the key of the element it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementGeometryEntry {
    pub key: ElementKey,
    pub geometry: ElementGeometry,
}

impl ElementGeometryEntry {
    pub fn new(key: ElementKey, geometry: ElementGeometry) -> Self {
        Self { key, geometry }
    }
}
