//! GeoJSON wire types for zone import and persistence.
//!
//! Only the subset the zone store needs is modelled: feature collections and
//! single features carrying `Polygon` or `MultiPolygon` geometry. Interior
//! rings are ignored; each polygon contributes its outer ring only.

use geo::Coord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::geometry::Ring;
use crate::zone::Zone;

/// A `[lon, lat]` position.
pub type Position = [f64; 2];

/// Errors raised when reading GeoJSON input.
#[derive(Debug, Error)]
pub enum GeoJsonError {
    /// The document was not valid JSON or did not match the expected shape.
    #[error("invalid GeoJSON document")]
    Json(#[from] serde_json::Error),
    /// The geometry type is not `Polygon` or `MultiPolygon`.
    #[error("unsupported geometry type `{kind}`")]
    UnsupportedGeometry {
        /// Geometry type as supplied.
        kind: String,
    },
    /// The coordinates did not nest as the geometry type requires.
    #[error("malformed coordinates for `{kind}` geometry")]
    MalformedCoordinates {
        /// Geometry type as supplied.
        kind: String,
    },
}

/// Tag marking a feature collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionTag {
    /// `"FeatureCollection"`.
    #[default]
    FeatureCollection,
}

/// Tag marking a single feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureTag {
    /// `"Feature"`.
    #[default]
    Feature,
}

/// Either a feature collection or a single feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeoJsonDocument {
    /// A `FeatureCollection`.
    FeatureCollection(FeatureCollection),
    /// A lone `Feature`.
    Feature(Feature),
}

impl GeoJsonDocument {
    /// Parse a document from JSON text.
    ///
    /// # Examples
    ///
    /// ```
    /// use zoneguard_core::geojson::GeoJsonDocument;
    ///
    /// let doc = GeoJsonDocument::parse(r#"{
    ///     "type": "Feature",
    ///     "properties": {"name": "Yard"},
    ///     "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}
    /// }"#).expect("valid feature");
    /// assert_eq!(doc.features().len(), 1);
    /// ```
    pub fn parse(text: &str) -> Result<Self, GeoJsonError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Features carried by the document.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        match self {
            Self::FeatureCollection(collection) => &collection.features,
            Self::Feature(feature) => std::slice::from_ref(feature),
        }
    }
}

impl From<FeatureCollection> for GeoJsonDocument {
    fn from(collection: FeatureCollection) -> Self {
        Self::FeatureCollection(collection)
    }
}

impl From<Feature> for GeoJsonDocument {
    fn from(feature: Feature) -> Self {
        Self::Feature(feature)
    }
}

/// Bookkeeping written alongside persisted collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    /// RFC 3339 time of the write.
    pub saved_at: String,
    /// Number of zones in the collection.
    pub total_zones: usize,
}

/// A GeoJSON `FeatureCollection`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    kind: CollectionTag,
    /// Member features.
    #[serde(default)]
    pub features: Vec<Feature>,
    /// Persistence metadata, present in files written by the store.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<CollectionMeta>,
}

impl FeatureCollection {
    /// Wrap `features` in a collection without metadata.
    #[must_use]
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: CollectionTag::FeatureCollection,
            features,
            meta: None,
        }
    }

    /// Attach persistence metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: CollectionMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// One feature per zone ring.
    pub fn from_zones<'a, I>(zones: I) -> Self
    where
        I: IntoIterator<Item = &'a Zone>,
    {
        Self::new(zones.into_iter().flat_map(Feature::from_zone).collect())
    }
}

/// Zone attributes carried in a feature's `properties`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureProperties {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Zone type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub zone_type: Option<String>,
    /// Severity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

/// A GeoJSON `Feature`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    kind: FeatureTag,
    /// Feature geometry; `null` is allowed and yields no zones.
    #[serde(default)]
    pub geometry: Option<Geometry>,
    /// Feature attributes.
    #[serde(default)]
    pub properties: Option<FeatureProperties>,
}

impl Feature {
    /// A polygon feature with a single outer ring.
    #[must_use]
    pub fn polygon(ring: &Ring, properties: FeatureProperties) -> Self {
        Self {
            kind: FeatureTag::Feature,
            geometry: Some(Geometry::polygon(ring)),
            properties: Some(properties),
        }
    }

    /// One polygon feature per ring of `zone`.
    pub fn from_zone(zone: &Zone) -> impl Iterator<Item = Self> + '_ {
        zone.polygons().iter().map(move |ring| {
            Self::polygon(
                ring,
                FeatureProperties {
                    name: Some(zone.name().to_owned()),
                    zone_type: Some(zone.zone_type().to_owned()),
                    severity: Some(zone.severity().as_str().to_owned()),
                },
            )
        })
    }
}

/// Raw GeoJSON geometry; coordinates are decoded on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Geometry type, for example `Polygon`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Nested coordinate arrays.
    #[serde(default)]
    pub coordinates: Value,
}

impl Geometry {
    /// A `Polygon` geometry with one outer ring.
    #[must_use]
    pub fn polygon(ring: &Ring) -> Self {
        let positions: Vec<Value> = ring_positions(ring)
            .into_iter()
            .map(|[lon, lat]| Value::from(vec![lon, lat]))
            .collect();
        Self {
            kind: "Polygon".to_owned(),
            coordinates: Value::Array(vec![Value::Array(positions)]),
        }
    }

    /// Outer rings of every polygon, as raw coordinate sequences.
    ///
    /// Rings are returned unvalidated; positions with extra dimensions keep
    /// only longitude and latitude.
    pub fn outer_rings(&self) -> Result<Vec<Vec<Coord<f64>>>, GeoJsonError> {
        let malformed = || GeoJsonError::MalformedCoordinates {
            kind: self.kind.clone(),
        };
        match self.kind.as_str() {
            "Polygon" => {
                let outer = first_ring(&self.coordinates).ok_or_else(malformed)?;
                Ok(vec![parse_positions(outer).ok_or_else(malformed)?])
            }
            "MultiPolygon" => self
                .coordinates
                .as_array()
                .ok_or_else(malformed)?
                .iter()
                .map(|polygon| {
                    first_ring(polygon)
                        .and_then(parse_positions)
                        .ok_or_else(malformed)
                })
                .collect(),
            other => Err(GeoJsonError::UnsupportedGeometry {
                kind: other.to_owned(),
            }),
        }
    }
}

/// Convert a ring to `[lon, lat]` positions.
#[must_use]
pub fn ring_positions(ring: &Ring) -> Vec<Position> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

fn first_ring(polygon: &Value) -> Option<&Value> {
    polygon.as_array().and_then(|rings| rings.first())
}

fn parse_positions(ring: &Value) -> Option<Vec<Coord<f64>>> {
    ring.as_array()?
        .iter()
        .map(|position| {
            let values = position.as_array()?;
            match values.as_slice() {
                [lon, lat, ..] => Some(Coord {
                    x: lon.as_f64()?,
                    y: lat.as_f64()?,
                }),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn parses_feature_collections_and_single_features() {
        let collection = GeoJsonDocument::parse(
            &json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": null, "geometry": null},
                    {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": []}}
                ]
            })
            .to_string(),
        )
        .expect("collection");
        assert!(matches!(collection, GeoJsonDocument::FeatureCollection(_)));
        assert_eq!(collection.features().len(), 2);

        let single = GeoJsonDocument::parse(
            &json!({"type": "Feature", "properties": {"name": "x"}, "geometry": null}).to_string(),
        )
        .expect("feature");
        assert!(matches!(single, GeoJsonDocument::Feature(_)));
    }

    #[rstest]
    #[case(json!({"type": "Point", "coordinates": [0, 0]}))]
    #[case(json!({"type": "Topology"}))]
    fn rejects_unrelated_documents(#[case] value: serde_json::Value) {
        assert!(GeoJsonDocument::parse(&value.to_string()).is_err());
    }

    #[rstest]
    fn polygon_yields_outer_ring_only() {
        let geometry: Geometry = serde_json::from_value(json!({
            "type": "Polygon",
            "coordinates": [
                [[0, 0], [4, 0], [4, 4], [0, 0]],
                [[1, 1], [2, 1], [2, 2], [1, 1]]
            ]
        }))
        .expect("geometry");
        let rings = geometry.outer_rings().expect("rings");
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0][1], Coord { x: 4.0, y: 0.0 });
    }

    #[rstest]
    fn multipolygon_yields_one_ring_per_polygon() {
        let geometry: Geometry = serde_json::from_value(json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[0, 0], [1, 0], [1, 1], [0, 0]]],
                [[[5, 5, 120.0], [6, 5, 130.0], [6, 6, 0.0], [5, 5, 120.0]]]
            ]
        }))
        .expect("geometry");
        let rings = geometry.outer_rings().expect("rings");
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[1][0], Coord { x: 5.0, y: 5.0 });
    }

    #[rstest]
    #[case(json!({"type": "Polygon", "coordinates": [[[0, "a"], [1, 0]]]}), false)]
    #[case(json!({"type": "Polygon", "coordinates": 7}), false)]
    #[case(json!({"type": "LineString", "coordinates": [[0, 0], [1, 1]]}), true)]
    fn reports_bad_geometry(#[case] value: serde_json::Value, #[case] unsupported: bool) {
        let geometry: Geometry = serde_json::from_value(value).expect("geometry shape");
        let err = geometry.outer_rings().expect_err("bad geometry");
        assert_eq!(
            matches!(err, GeoJsonError::UnsupportedGeometry { .. }),
            unsupported
        );
    }

    #[rstest]
    fn collection_serialises_meta_and_polygon_coordinates() {
        let ring = crate::geometry::close_ring(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
        ])
        .expect("ring");
        let collection = FeatureCollection::new(vec![Feature::polygon(
            &ring,
            FeatureProperties {
                name: Some("Yard".into()),
                zone_type: Some("prison".into()),
                severity: Some("restricted".into()),
            },
        )])
        .with_meta(CollectionMeta {
            saved_at: "2024-01-01T00:00:00Z".into(),
            total_zones: 1,
        });
        let value = serde_json::to_value(&collection).expect("json");
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["_meta"]["totalZones"], 1);
        assert_eq!(value["_meta"]["savedAt"], "2024-01-01T00:00:00Z");
        assert_eq!(value["features"][0]["type"], "Feature");
        assert_eq!(value["features"][0]["properties"]["type"], "prison");
        assert_eq!(value["features"][0]["geometry"]["coordinates"][0][3], json!([0.0, 0.0]));
    }
}
