//! Zone domain model: severity levels, classified zones and check results.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::geojson::{Position, ring_positions};
use crate::geometry::{BoundingBox, GeometryError, Ring};

/// How strongly a zone restricts nearby content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Hard block.
    Critical,
    /// Soft block; an override is required.
    Restricted,
    /// Informational only.
    Warning,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Self; 3] = [Self::Critical, Self::Restricted, Self::Warning];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Restricted => "restricted",
            Self::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown severity name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown severity: {0}")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "restricted" => Ok(Self::Restricted),
            "warning" => Ok(Self::Warning),
            other => Err(ParseSeverityError(other.to_owned())),
        }
    }
}

/// Errors returned by [`Zone::new`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ZoneError {
    /// A zone needs at least one ring.
    #[error("zone `{name}` has no polygons")]
    NoPolygons {
        /// Zone name.
        name: String,
    },
    /// One of the rings was not a valid closed ring.
    #[error("zone `{name}` has an invalid ring")]
    InvalidRing {
        /// Zone name.
        name: String,
        /// Underlying geometry failure.
        #[source]
        source: GeometryError,
    },
}

/// A named polygonal area with a severity classification.
///
/// Zones are immutable once built. The bounding box covers every ring and is
/// computed at construction.
///
/// # Examples
///
/// ```
/// use geo::Coord;
/// use zoneguard_core::{Severity, Zone, geometry::close_ring};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ring = close_ring(vec![
///     Coord { x: 0.0, y: 0.0 },
///     Coord { x: 1.0, y: 0.0 },
///     Coord { x: 1.0, y: 1.0 },
/// ])?;
/// let zone = Zone::new("Range", "military", Severity::Critical, vec![ring])?;
/// assert_eq!(zone.bbox().max_lon(), 1.0);
/// assert_eq!(zone.dedup_key(), "Range|military|critical");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    name: String,
    zone_type: String,
    severity: Severity,
    polygons: Vec<Ring>,
    bbox: BoundingBox,
}

impl Zone {
    /// Validate and construct a zone.
    ///
    /// Every ring must be closed and hold at least four coordinates.
    pub fn new(
        name: impl Into<String>,
        zone_type: impl Into<String>,
        severity: Severity,
        polygons: Vec<Ring>,
    ) -> Result<Self, ZoneError> {
        let name = name.into();
        for ring in &polygons {
            if ring.0.len() < 4 || !ring.is_closed() {
                return Err(ZoneError::InvalidRing {
                    name,
                    source: GeometryError::TooFewPoints {
                        distinct: ring.0.len().saturating_sub(1),
                    },
                });
            }
        }
        let Some(bbox) = BoundingBox::from_coords(polygons.iter().flat_map(|r| r.0.iter().copied()))
        else {
            return Err(ZoneError::NoPolygons { name });
        };
        Ok(Self {
            name,
            zone_type: zone_type.into(),
            severity,
            polygons,
            bbox,
        })
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Classification type, for example `military` or `aerodrome`.
    #[must_use]
    pub fn zone_type(&self) -> &str {
        &self.zone_type
    }

    /// Severity level.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Outer rings.
    #[must_use]
    pub fn polygons(&self) -> &[Ring] {
        &self.polygons
    }

    /// Bounding box over all rings.
    #[must_use]
    pub const fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Identity used when deduplicating hits: `name|type|severity`.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!("{}|{}|{}", self.name, self.zone_type, self.severity)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ZoneRecord<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    zone_type: &'a str,
    severity: Severity,
    polygons: Vec<Vec<Position>>,
    bbox: BoundingBox,
}

impl Serialize for Zone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ZoneRecord {
            name: &self.name,
            zone_type: &self.zone_type,
            severity: self.severity,
            polygons: self.polygons.iter().map(ring_positions).collect(),
            bbox: self.bbox,
        }
        .serialize(serializer)
    }
}

/// A single zone matched by a point or line check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitResult {
    /// Matched zone name.
    pub zone_name: String,
    /// Matched zone type.
    pub zone_type: String,
    /// Matched zone severity.
    pub severity: Severity,
    /// `true` when the hit lies outside the polygon but within its buffer.
    pub in_buffer: bool,
    /// Distance to the polygon edge in kilometres, present for buffer hits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_distance_km: Option<f64>,
}

impl HitResult {
    /// A hit strictly inside the zone.
    #[must_use]
    pub fn inside(zone: &Zone) -> Self {
        Self {
            zone_name: zone.name.clone(),
            zone_type: zone.zone_type.clone(),
            severity: zone.severity,
            in_buffer: false,
            buffer_distance_km: None,
        }
    }

    /// A hit in the buffer band around the zone.
    #[must_use]
    pub fn buffered(zone: &Zone, distance_km: f64) -> Self {
        Self {
            in_buffer: true,
            buffer_distance_km: Some(distance_km),
            ..Self::inside(zone)
        }
    }

    /// Identity used when deduplicating hits: `name|type|severity`.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!("{}|{}|{}", self.zone_name, self.zone_type, self.severity)
    }
}

/// Aggregate counts over a zone collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStats {
    /// Number of zones.
    pub total: usize,
    /// Zone count keyed by severity name.
    pub by_severity: BTreeMap<String, usize>,
    /// Zone count keyed by zone type.
    pub by_type: BTreeMap<String, usize>,
}

impl ZoneStats {
    /// Tally the given zones.
    pub fn from_zones<'a, I>(zones: I) -> Self
    where
        I: IntoIterator<Item = &'a Zone>,
    {
        zones.into_iter().fold(Self::default(), |mut stats, zone| {
            stats.total += 1;
            *stats
                .by_severity
                .entry(zone.severity.as_str().to_owned())
                .or_default() += 1;
            *stats.by_type.entry(zone.zone_type.clone()).or_default() += 1;
            stats
        })
    }
}
