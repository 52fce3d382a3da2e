//! Core domain types for the ZoneGuard restricted-zone engine.
//!
//! The crate owns the zone model, tag classification, the persisted zone
//! store and the point/line check engine. It performs no network access;
//! ingestion lives in `zoneguard-data`.
//!
//! Coordinates are WGS84 degrees with longitude on the x axis.
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod check;
pub mod classify;
pub mod geojson;
pub mod geometry;
pub mod service;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
pub mod test_support;
pub mod zone;

pub use check::{CheckConfig, CheckEngine};
pub use classify::{Classification, Tags, classify, zone_name};
pub use geojson::{Feature, FeatureCollection, FeatureProperties, GeoJsonDocument, GeoJsonError};
pub use geometry::{BoundingBox, GeometryError, Ring};
pub use service::{ImportReport, ZoneListing, ZoneService};
pub use store::{ImportSummary, PersistenceError, StoreConfig, ZoneStore};
pub use zone::{HitResult, ParseSeverityError, Severity, Zone, ZoneError, ZoneStats};
