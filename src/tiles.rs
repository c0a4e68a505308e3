//! Slippy map tile grid
//!
//! Conversions between geographic coordinates and Web Mercator tile
//! positions at a fixed zoom level. The cache partitions space into the
//! tiles of one configured zoom.

use geo::Point;
use mapcache_types::BoundingBox;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Deepest supported zoom level.
pub const MAX_ZOOM: u8 = 22;

/// Latitude limit of the Web Mercator projection.
pub const MAX_LAT: f64 = 85.05112878;

/// Boxes are shrunk by this many degrees before tile lookup, so that a box
/// touching a tile edge does not pull in the neighbour.
const EDGE_EPSILON: f64 = 1e-7;

/// Position of a tile at the cache's zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePos {
    pub x: u32,
    pub y: u32,
}

impl TilePos {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Geographic area covered by this tile.
    pub fn bounding_box(&self, zoom: u8) -> BoundingBox {
        let n = tiles_per_axis(zoom);
        BoundingBox::new(
            tile_lon(self.x, n),
            tile_lat(self.y + 1, n),
            tile_lon(self.x + 1, n),
            tile_lat(self.y, n),
        )
    }

    pub fn to_tiles_rect(&self) -> TilesRect {
        TilesRect::new(self.x, self.y, self.x, self.y)
    }
}

/// An inclusive rectangle of tiles. `top` is the northern row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilesRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl TilesRect {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        assert!(
            left <= right && top <= bottom,
            "Tiles rect must not be empty: left={left} right={right} top={top} bottom={bottom}"
        );
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Smallest rect containing all given tiles, `None` for an empty input.
    pub fn enclosing(positions: impl IntoIterator<Item = TilePos>) -> Option<Self> {
        let mut iter = positions.into_iter();
        let first = iter.next()?;
        let mut rect = first.to_tiles_rect();
        for pos in iter {
            rect.left = rect.left.min(pos.x);
            rect.top = rect.top.min(pos.y);
            rect.right = rect.right.max(pos.x);
            rect.bottom = rect.bottom.max(pos.y);
        }
        Some(rect)
    }

    /// Number of tiles in the rect.
    pub fn size(&self) -> usize {
        let width = (self.right - self.left) as usize + 1;
        let height = (self.bottom - self.top) as usize + 1;
        width * height
    }

    pub fn contains(&self, pos: &TilePos) -> bool {
        (self.left..=self.right).contains(&pos.x) && (self.top..=self.bottom).contains(&pos.y)
    }

    /// All tiles of the rect, row by row from the north-west corner.
    pub fn tiles(&self) -> impl Iterator<Item = TilePos> + use<> {
        let (left, right) = (self.left, self.right);
        (self.top..=self.bottom).flat_map(move |y| (left..=right).map(move |x| TilePos::new(x, y)))
    }

    pub fn bounding_box(&self, zoom: u8) -> BoundingBox {
        let north_west = TilePos::new(self.left, self.top).bounding_box(zoom);
        let south_east = TilePos::new(self.right, self.bottom).bounding_box(zoom);
        BoundingBox::new(
            north_west.min_lon,
            south_east.min_lat,
            south_east.max_lon,
            north_west.max_lat,
        )
    }
}

/// Tile containing `point` (x = lon, y = lat) at `zoom`.
///
/// Latitudes beyond the projection limit are clamped, longitudes are
/// wrapped into `[-180, 180)`.
///
/// # Examples
///
/// ```
/// use mapcache::tiles::{tile_of, TilePos};
/// use geo::Point;
///
/// // New York City
/// let tile = tile_of(&Point::new(-74.0060, 40.7128), 16);
/// assert_eq!(tile, TilePos::new(19295, 24640));
/// ```
pub fn tile_of(point: &Point<f64>, zoom: u8) -> TilePos {
    assert!(zoom <= MAX_ZOOM, "Zoom must be between 0 and {MAX_ZOOM}");
    let n = tiles_per_axis(zoom);
    let max_index = n - 1.0;

    let lon = normalize_lon(point.x());
    let lat = point.y().clamp(-MAX_LAT, MAX_LAT);

    let x = ((lon + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - lat.to_radians().tan().asinh() / PI) / 2.0 * n).floor();

    TilePos::new(x.clamp(0.0, max_index) as u32, y.clamp(0.0, max_index) as u32)
}

/// Rect of tiles covering `bbox`, which must not cross the 180th meridian.
pub fn enclosing_tiles_rect(bbox: &BoundingBox, zoom: u8) -> TilesRect {
    assert!(
        !bbox.crosses_antimeridian(),
        "Bounding box must be split at the 180th meridian first"
    );
    let (min_lon, max_lon) = shrink(bbox.min_lon, bbox.max_lon);
    let (min_lat, max_lat) = shrink(bbox.min_lat, bbox.max_lat);

    let north_west = tile_of(&Point::new(min_lon, max_lat), zoom);
    let south_east = tile_of(&Point::new(max_lon, min_lat), zoom);
    // an east edge on the 180th meridian wraps to column 0
    let right = if south_east.x < north_west.x {
        tiles_per_axis(zoom) as u32 - 1
    } else {
        south_east.x
    };
    TilesRect::new(north_west.x, north_west.y, right, south_east.y)
}

/// All tiles overlapping `bbox`, splitting it at the 180th meridian if needed.
pub fn tiles_overlapping(bbox: &BoundingBox, zoom: u8) -> Vec<TilePos> {
    let (west, east) = bbox.split_at_antimeridian();
    let mut tiles: Vec<TilePos> = enclosing_tiles_rect(&west, zoom).tiles().collect();
    if let Some(east) = east {
        tiles.extend(enclosing_tiles_rect(&east, zoom).tiles());
        tiles.sort_unstable();
        tiles.dedup();
    }
    tiles
}

fn shrink(min: f64, max: f64) -> (f64, f64) {
    if max - min > 2.0 * EDGE_EPSILON {
        (min + EDGE_EPSILON, max - EDGE_EPSILON)
    } else {
        (min, max)
    }
}

fn normalize_lon(lon: f64) -> f64 {
    if (-180.0..180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

fn tiles_per_axis(zoom: u8) -> f64 {
    2.0_f64.powi(zoom as i32)
}

fn tile_lon(x: u32, n: f64) -> f64 {
    x as f64 / n * 360.0 - 180.0
}

fn tile_lat(y: u32, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan().to_degrees()
}
