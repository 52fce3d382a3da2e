//! Raw OSM-style elements returned by the feature API.

use std::collections::HashSet;
use std::fmt;

use geo::Coord;
use serde::{Deserialize, Serialize};
use zoneguard_core::Tags;
use zoneguard_core::geometry::is_valid_lon_lat;

/// Element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// A point with coordinates.
    Node,
    /// An ordered list of node references.
    Way,
    /// A group of member elements.
    Relation,
}

impl ElementKind {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an element: `kind:id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementKey {
    /// Element type.
    pub kind: ElementKind,
    /// Element id, unique per type.
    pub id: i64,
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A relation member reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Referenced element type.
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Referenced element id.
    #[serde(rename = "ref")]
    pub reference: i64,
    /// Member role such as `outer` or `inner`.
    #[serde(default)]
    pub role: String,
}

/// One element as delivered by the upstream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    /// Element type.
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Element id.
    pub id: i64,
    /// Tags; skeleton output omits them.
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    /// Node references of a way.
    #[serde(rename = "nodes", default, skip_serializing_if = "Vec::is_empty")]
    pub node_refs: Vec<i64>,
    /// Members of a relation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Member>,
    /// Node longitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    /// Node latitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
}

impl RawElement {
    /// A node at `(lon, lat)` without tags.
    #[must_use]
    pub fn node(id: i64, lon: f64, lat: f64) -> Self {
        Self {
            kind: ElementKind::Node,
            id,
            tags: Tags::new(),
            node_refs: Vec::new(),
            members: Vec::new(),
            lon: Some(lon),
            lat: Some(lat),
        }
    }

    /// A way over `node_refs`.
    #[must_use]
    pub fn way(id: i64, node_refs: Vec<i64>, tags: Tags) -> Self {
        Self {
            kind: ElementKind::Way,
            id,
            tags,
            node_refs,
            members: Vec::new(),
            lon: None,
            lat: None,
        }
    }

    /// A relation over `members`.
    #[must_use]
    pub fn relation(id: i64, members: Vec<Member>, tags: Tags) -> Self {
        Self {
            kind: ElementKind::Relation,
            id,
            tags,
            node_refs: Vec::new(),
            members,
            lon: None,
            lat: None,
        }
    }

    /// Identity key.
    #[must_use]
    pub const fn key(&self) -> ElementKey {
        ElementKey {
            kind: self.kind,
            id: self.id,
        }
    }

    /// Node position when both coordinates are present and within WGS84 bounds.
    #[must_use]
    pub fn coord(&self) -> Option<Coord<f64>> {
        let coord = Coord {
            x: self.lon?,
            y: self.lat?,
        };
        is_valid_lon_lat(coord).then_some(coord)
    }
}

/// Drop repeated elements, keeping the first occurrence of each `kind:id`.
#[must_use]
pub fn dedup_elements(elements: Vec<RawElement>) -> Vec<RawElement> {
    let mut seen = HashSet::new();
    elements
        .into_iter()
        .filter(|element| seen.insert(element.key()))
        .collect()
}
