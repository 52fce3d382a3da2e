//! Fixture zones and GeoJSON documents shared by unit and behaviour tests.

use geo::Coord;
use serde_json::json;

use crate::geojson::GeoJsonDocument;
use crate::geometry::close_ring;
use crate::zone::{Severity, Zone};

/// Name of the Moscow Kremlin fixture zone.
pub const KREMLIN_NAME: &str = "Зона Кремль";

/// Outer ring of the Kremlin fixture zone as `[lon, lat]` pairs.
pub const KREMLIN_RING: [[f64; 2]; 5] = [
    [37.613, 55.752],
    [37.623, 55.752],
    [37.623, 55.758],
    [37.613, 55.758],
    [37.613, 55.752],
];

/// A critical zone around the Moscow Kremlin.
///
/// # Panics
///
/// Never in practice; the ring is a fixed valid rectangle.
#[must_use]
pub fn kremlin_zone() -> Zone {
    let ring = close_ring(KREMLIN_RING.iter().map(|&[x, y]| Coord { x, y }).collect())
        .expect("fixture ring is valid");
    Zone::new(KREMLIN_NAME, "government", Severity::Critical, vec![ring])
        .expect("fixture zone is valid")
}

/// The Kremlin zone as a single-feature GeoJSON document.
#[must_use]
pub fn kremlin_document() -> GeoJsonDocument {
    document(json!({
        "type": "Feature",
        "properties": {"name": KREMLIN_NAME, "type": "government", "severity": "critical"},
        "geometry": {"type": "Polygon", "coordinates": [KREMLIN_RING]}
    }))
}

/// A unit square feature offset diagonally by `offset` degrees.
#[must_use]
pub fn square_feature(name: &str, zone_type: &str, severity: &str, offset: f64) -> GeoJsonDocument {
    let o = offset;
    document(json!({
        "type": "Feature",
        "properties": {"name": name, "type": zone_type, "severity": severity},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[o, o], [o + 1.0, o], [o + 1.0, o + 1.0], [o, o + 1.0], [o, o]]]
        }
    }))
}

fn document(value: serde_json::Value) -> GeoJsonDocument {
    serde_json::from_value(value).expect("fixture document is valid")
}
