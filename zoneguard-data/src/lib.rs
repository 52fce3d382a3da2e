//! Ingestion for the ZoneGuard restricted-zone engine.
//!
//! Responsibilities:
//! - Query Overpass-style feature APIs tile by tile with retry, backoff,
//!   quadrant splitting and per-endpoint rate limits.
//! - Cache resolved tiles and checkpoint progress so interrupted runs resume.
//! - Stitch raw elements into rings and classify them into zone features.
//! - Hand each district's zones to a sink: an HTTP import endpoint or a local
//!   [`zoneguard_core::ZoneService`].
//!
//! Boundaries:
//! - Zone rules, geometry and persistence of zones live in `zoneguard-core`.
//! - Sources and sinks are single-task async; nothing here spawns.
//!
//! Invariants:
//! - Coverage gaps degrade a district to partial coverage; they never fail it.
//! - Skipped tiles are never cached.
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod assemble;
pub mod districts;
pub mod element;
pub mod fetch;
pub mod overpass;
pub mod pipeline;
pub mod sink;
#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
pub mod test_support;

pub use assemble::{AssembledPolygon, assemble};
pub use districts::{District, DistrictError, catalogue, select_districts};
pub use element::{ElementKey, ElementKind, Member, RawElement, dedup_elements};
pub use fetch::{
    FetcherConfig, IngestionProgress, ProgressStore, RetryPolicy, TileCache, TileFetcher,
    TileOutcome,
};
pub use overpass::{FeatureSource, FetchError, HttpFeatureSource, HttpFeatureSourceConfig};
pub use pipeline::{
    DistrictReport, DistrictStatus, IngestError, IngestPipeline, IngestReport, PipelineOptions,
};
pub use sink::{HttpImportSink, SinkError, SinkReceipt, StoreSink, ZoneSink};
