//! # mapcache-types
//!
//! Plain data types shared by the `mapcache` crate and its callers:
//!
//! - **Elements**: `Node`, `Way`, `Relation` and the `Element` enum over them,
//!   identified by an `ElementKey` (type + numeric id)
//! - **Bounding boxes**: `BoundingBox`, a lon/lat rectangle that may cross the
//!   180th meridian
//! - **Geometry**: `ElementGeometry`, the opaque shape attached to an element
//!
//! All types are serializable with Serde and built on top of the `geo` crate's
//! geometric primitives.
//!
//! ## Examples
//!
//! ```rust
//! use mapcache_types::element::{Element, ElementKey, Node, Way};
//! use geo::Point;
//!
//! let node = Node::new(1, Point::new(13.4050, 52.5200));
//! let way = Way::new(7, vec![1, 2, 3]);
//!
//! assert_eq!(Element::from(node).key(), ElementKey::node(1));
//! assert!(way.references_node(2));
//! ```

pub mod bbox;
pub mod element;
pub mod geometry;

pub use bbox::BoundingBox;
pub use element::{Element, ElementKey, ElementType, Node, Relation, RelationMember, Tags, Way};
pub use geometry::{ElementGeometry, ElementGeometryEntry};
