use geo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees.
///
/// Containment is inclusive on all edges. A box whose `min_lon` is greater than
/// its `max_lon` crosses the 180th meridian; use [`BoundingBox::split_at_antimeridian`]
/// to get the two halves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box from minimum and maximum coordinates.
    ///
    /// # Arguments
    ///
    /// * `min_lon` - Western edge
    /// * `min_lat` - Southern edge
    /// * `max_lon` - Eastern edge
    /// * `max_lat` - Northern edge
    ///
    /// # Examples
    ///
    /// ```
    /// use mapcache_types::bbox::BoundingBox;
    ///
    /// let bbox = BoundingBox::new(-74.0, 40.7, -73.9, 40.8);
    /// assert!(bbox.is_valid());
    /// ```
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Create a bounding box from a `geo::Rect` (x = lon, y = lat).
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Smallest box containing all given points, `None` for an empty input.
    pub fn enclosing<'a>(points: impl IntoIterator<Item = &'a Point<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::new(first.x(), first.y(), first.x(), first.y());
        for point in iter {
            bbox.min_lon = bbox.min_lon.min(point.x());
            bbox.min_lat = bbox.min_lat.min(point.y());
            bbox.max_lon = bbox.max_lon.max(point.x());
            bbox.max_lat = bbox.max_lat.max(point.y());
        }
        Some(bbox)
    }

    /// Coordinates are finite, within range and `min_lat <= max_lat`.
    pub fn is_valid(&self) -> bool {
        let lats = [self.min_lat, self.max_lat];
        let lons = [self.min_lon, self.max_lon];
        lats.iter().all(|lat| lat.is_finite() && (-90.0..=90.0).contains(lat))
            && lons
                .iter()
                .all(|lon| lon.is_finite() && (-180.0..=180.0).contains(lon))
            && self.min_lat <= self.max_lat
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon > self.max_lon
    }

    /// The box itself, or its western and eastern halves if it crosses the
    /// 180th meridian.
    pub fn split_at_antimeridian(&self) -> (BoundingBox, Option<BoundingBox>) {
        if !self.crosses_antimeridian() {
            return (*self, None);
        }
        (
            Self::new(self.min_lon, self.min_lat, 180.0, self.max_lat),
            Some(Self::new(-180.0, self.min_lat, self.max_lon, self.max_lat)),
        )
    }

    /// Check if a point (x = lon, y = lat) is contained within this bounding box.
    pub fn contains_point(&self, point: &Point<f64>) -> bool {
        let lat_ok = point.y() >= self.min_lat && point.y() <= self.max_lat;
        let lon_ok = if self.crosses_antimeridian() {
            point.x() >= self.min_lon || point.x() <= self.max_lon
        } else {
            point.x() >= self.min_lon && point.x() <= self.max_lon
        };
        lat_ok && lon_ok
    }

    /// Check if `other` lies completely inside this box. Only defined for
    /// boxes not crossing the 180th meridian.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
            && other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
    }

    /// Smallest box covering both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        Self::new(
            self.min_lon.min(other.min_lon),
            self.min_lat.min(other.min_lat),
            self.max_lon.max(other.max_lon),
            self.max_lat.max(other.max_lat),
        )
    }

    /// Get the center point of the bounding box.
    pub fn center(&self) -> Point<f64> {
        Point::new(
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Expand the bounding box by a given amount of degrees in all directions.
    pub fn expand(&self, amount: f64) -> Self {
        Self::new(
            self.min_lon - amount,
            self.min_lat - amount,
            self.max_lon + amount,
            self.max_lat + amount,
        )
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            geo::coord! { x: self.min_lon, y: self.min_lat },
            geo::coord! { x: self.max_lon, y: self.max_lat },
        )
    }
}
