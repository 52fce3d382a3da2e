//! Facade crate for the ZoneGuard restricted-zone engine.
//!
//! This crate re-exports the zone model, store and check engine, and exposes
//! the ingestion pipeline behind the `ingest` feature.

#![forbid(unsafe_code)]

pub use zoneguard_core::{
    BoundingBox, CheckConfig, Feature, FeatureCollection, GeoJsonDocument, GeoJsonError,
    HitResult, ImportReport, PersistenceError, Severity, StoreConfig, Zone, ZoneError,
    ZoneListing, ZoneService, ZoneStats, ZoneStore, classify,
};

#[cfg(feature = "ingest")]
pub use zoneguard_data::{
    District, DistrictReport, DistrictStatus, FetcherConfig, HttpFeatureSource, HttpImportSink,
    IngestError, IngestPipeline, IngestReport, PipelineOptions, ProgressStore, RetryPolicy,
    StoreSink, TileCache, TileFetcher, ZoneSink, catalogue, select_districts,
};
