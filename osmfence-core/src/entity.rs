//! OpenStreetMap entities and the changes applied to them.
//!
//! Node, way and relation identifiers live in disjoint spaces: node `7` and
//! way `7` are unrelated features.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use geo::Coord;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a node, way or relation.
pub type EntityId = u64;

/// Key/value tags attached to an entity.
pub type Tags = BTreeMap<String, String>;

/// Kind of an OSM entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EntityKind {
    /// A point feature.
    Node,
    /// An ordered list of node references.
    Way,
    /// An ordered list of typed members.
    Relation,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        };
        f.write_str(label)
    }
}

/// A point feature.
///
/// Coordinates are WGS84 with `x = longitude`, `y = latitude`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Node {
    /// Node identifier.
    pub id: EntityId,
    /// Entity version.
    pub version: u32,
    /// Time of the edit, when known.
    #[cfg_attr(feature = "serde", serde(default))]
    pub timestamp: Option<DateTime<Utc>>,
    /// Geospatial position.
    pub location: Coord<f64>,
    /// Tags carried by the node.
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: Tags,
}

impl Node {
    /// Construct an untagged node.
    ///
    /// # Examples
    ///
    /// ```
    /// use osmfence_core::Node;
    ///
    /// let node = Node::new(1, 1, 13.4, 52.5);
    /// assert_eq!(node.lon(), 13.4);
    /// assert_eq!(node.lat(), 52.5);
    /// ```
    #[must_use]
    pub const fn new(id: EntityId, version: u32, lon: f64, lat: f64) -> Self {
        Self {
            id,
            version,
            timestamp: None,
            location: Coord { x: lon, y: lat },
            tags: Tags::new(),
        }
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn lon(&self) -> f64 {
        self.location.x
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.location.y
    }
}

/// An ordered sequence of node references.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Way {
    /// Way identifier.
    pub id: EntityId,
    /// Entity version.
    pub version: u32,
    /// Time of the edit, when known.
    #[cfg_attr(feature = "serde", serde(default))]
    pub timestamp: Option<DateTime<Utc>>,
    /// Referenced node identifiers in drawing order.
    pub nodes: Vec<EntityId>,
    /// Tags carried by the way.
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: Tags,
}

impl Way {
    /// Construct an untagged way.
    #[must_use]
    pub const fn new(id: EntityId, version: u32, nodes: Vec<EntityId>) -> Self {
        Self {
            id,
            version,
            timestamp: None,
            nodes,
            tags: Tags::new(),
        }
    }
}

/// A typed reference from a relation to another entity.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Member {
    /// Identifier of the referenced entity.
    pub id: EntityId,
    /// Kind of the referenced entity.
    pub kind: EntityKind,
    /// Role of the member within the relation.
    #[cfg_attr(feature = "serde", serde(default))]
    pub role: String,
}

impl Member {
    /// Construct a member reference.
    #[must_use]
    pub fn new(id: EntityId, kind: EntityKind, role: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            role: role.into(),
        }
    }
}

/// An ordered sequence of typed members.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Relation {
    /// Relation identifier.
    pub id: EntityId,
    /// Entity version.
    pub version: u32,
    /// Time of the edit, when known.
    #[cfg_attr(feature = "serde", serde(default))]
    pub timestamp: Option<DateTime<Utc>>,
    /// Members in relation order.
    pub members: Vec<Member>,
    /// Tags carried by the relation.
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: Tags,
}

impl Relation {
    /// Construct an untagged relation.
    #[must_use]
    pub const fn new(id: EntityId, version: u32, members: Vec<Member>) -> Self {
        Self {
            id,
            version,
            timestamp: None,
            members,
            tags: Tags::new(),
        }
    }
}

/// Any OSM entity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Entity {
    /// A point feature.
    Node(Node),
    /// A way.
    Way(Way),
    /// A relation.
    Relation(Relation),
}

impl Entity {
    /// Identifier of the wrapped entity.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        match self {
            Self::Node(node) => node.id,
            Self::Way(way) => way.id,
            Self::Relation(relation) => relation.id,
        }
    }

    /// Version of the wrapped entity.
    #[must_use]
    pub const fn version(&self) -> u32 {
        match self {
            Self::Node(node) => node.version,
            Self::Way(way) => way.version,
            Self::Relation(relation) => relation.version,
        }
    }

    /// Edit time of the wrapped entity, when known.
    #[must_use]
    pub const fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Node(node) => node.timestamp,
            Self::Way(way) => way.timestamp,
            Self::Relation(relation) => relation.timestamp,
        }
    }

    /// Kind of the wrapped entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Node(_) => EntityKind::Node,
            Self::Way(_) => EntityKind::Way,
            Self::Relation(_) => EntityKind::Relation,
        }
    }
}

/// Operation applied to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Action {
    /// The entity was created.
    Create,
    /// The entity was modified.
    Modify,
    /// The entity was deleted.
    Delete,
}

/// One create, modify or delete operation on one entity.
///
/// # Examples
///
/// ```
/// use osmfence_core::{Action, Change, EntityKind, Node};
///
/// let change = Change::create(Node::new(42, 1, 0.5, 0.5));
/// assert_eq!(change.action, Action::Create);
/// assert_eq!(change.entity.kind(), EntityKind::Node);
/// assert_eq!(change.entity.id(), 42);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Change {
    /// Operation tag.
    pub action: Action,
    /// Entity the operation applies to.
    pub entity: Entity,
}

impl Change {
    /// Pair an action with an entity.
    #[must_use]
    pub fn new(action: Action, entity: impl Into<Entity>) -> Self {
        Self {
            action,
            entity: entity.into(),
        }
    }

    /// A creation of `entity`.
    #[must_use]
    pub fn create(entity: impl Into<Entity>) -> Self {
        Self::new(Action::Create, entity)
    }

    /// A modification of `entity`.
    #[must_use]
    pub fn modify(entity: impl Into<Entity>) -> Self {
        Self::new(Action::Modify, entity)
    }

    /// A deletion of `entity`.
    #[must_use]
    pub fn delete(entity: impl Into<Entity>) -> Self {
        Self::new(Action::Delete, entity)
    }
}

impl From<Node> for Entity {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<Way> for Entity {
    fn from(way: Way) -> Self {
        Self::Way(way)
    }
}

impl From<Relation> for Entity {
    fn from(relation: Relation) -> Self {
        Self::Relation(relation)
    }
}
