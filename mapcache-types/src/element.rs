use geo::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form element tags. The cache never interprets them.
pub type Tags = BTreeMap<String, String>;

/// The three OSM primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Node,
    Way,
    Relation,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Node => write!(f, "node"),
            ElementType::Way => write!(f, "way"),
            ElementType::Relation => write!(f, "relation"),
        }
    }
}

/// Identifies an element: its type plus its numeric id.
///
/// Ids are only unique per type, so `node/1` and `way/1` are different keys.
///
/// # Examples
///
/// ```
/// use mapcache_types::element::{ElementKey, ElementType};
///
/// let key = ElementKey::way(42);
/// assert_eq!(key.element_type, ElementType::Way);
/// assert_eq!(key.to_string(), "way/42");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementKey {
    pub element_type: ElementType,
    pub id: i64,
}

impl ElementKey {
    pub const fn new(element_type: ElementType, id: i64) -> Self {
        Self { element_type, id }
    }

    pub const fn node(id: i64) -> Self {
        Self::new(ElementType::Node, id)
    }

    pub const fn way(id: i64) -> Self {
        Self::new(ElementType::Way, id)
    }

    pub const fn relation(id: i64) -> Self {
        Self::new(ElementType::Relation, id)
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.element_type, self.id)
    }
}

/// A point feature. `position` is `x = longitude`, `y = latitude`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub position: Point<f64>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub version: i32,
}

impl Node {
    pub fn new(id: i64, position: Point<f64>) -> Self {
        Self {
            id,
            position,
            tags: Tags::new(),
            version: 1,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn key(&self) -> ElementKey {
        ElementKey::node(self.id)
    }

    pub fn lat(&self) -> f64 {
        self.position.y()
    }

    pub fn lon(&self) -> f64 {
        self.position.x()
    }
}

/// An ordered list of node references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Way {
    pub id: i64,
    pub node_ids: Vec<i64>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub version: i32,
}

impl Way {
    pub fn new(id: i64, node_ids: Vec<i64>) -> Self {
        Self {
            id,
            node_ids,
            tags: Tags::new(),
            version: 1,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn key(&self) -> ElementKey {
        ElementKey::way(self.id)
    }

    pub fn references_node(&self, node_id: i64) -> bool {
        self.node_ids.contains(&node_id)
    }
}

/// One entry of a relation's member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMember {
    pub element_type: ElementType,
    pub id: i64,
    #[serde(default)]
    pub role: String,
}

impl RelationMember {
    pub fn new(element_type: ElementType, id: i64, role: impl Into<String>) -> Self {
        Self {
            element_type,
            id,
            role: role.into(),
        }
    }

    pub fn key(&self) -> ElementKey {
        ElementKey::new(self.element_type, self.id)
    }
}

/// An ordered list of typed, role-annotated members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    pub members: Vec<RelationMember>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub version: i32,
}

impl Relation {
    pub fn new(id: i64, members: Vec<RelationMember>) -> Self {
        Self {
            id,
            members,
            tags: Tags::new(),
            version: 1,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn key(&self) -> ElementKey {
        ElementKey::relation(self.id)
    }

    /// Keys of all members, in member order (duplicates included).
    pub fn member_keys(&self) -> impl Iterator<Item = ElementKey> + '_ {
        self.members.iter().map(RelationMember::key)
    }

    pub fn references(&self, key: ElementKey) -> bool {
        self.member_keys().any(|k| k == key)
    }
}

/// A node, way or relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Element {
    pub fn key(&self) -> ElementKey {
        match self {
            Element::Node(node) => node.key(),
            Element::Way(way) => way.key(),
            Element::Relation(relation) => relation.key(),
        }
    }

    pub fn id(&self) -> i64 {
        self.key().id
    }

    pub fn element_type(&self) -> ElementType {
        self.key().element_type
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Element::Node(node) => &node.tags,
            Element::Way(way) => &way.tags,
            Element::Relation(relation) => &relation.tags,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Element::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_way(&self) -> Option<&Way> {
        match self {
            Element::Way(way) => Some(way),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match self {
            Element::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    pub fn into_way(self) -> Option<Way> {
        match self {
            Element::Way(way) => Some(way),
            _ => None,
        }
    }
}

impl From<Node> for Element {
    fn from(node: Node) -> Self {
        Element::Node(node)
    }
}

impl From<Way> for Element {
    fn from(way: Way) -> Self {
        Element::Way(way)
    }
}

impl From<Relation> for Element {
    fn from(relation: Relation) -> Self {
        Element::Relation(relation)
    }
}
