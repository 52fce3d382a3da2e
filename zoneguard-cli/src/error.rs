//! Error types emitted by the ZoneGuard CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use zoneguard_core::PersistenceError;
use zoneguard_data::DistrictError;
use zoneguard_data::IngestError;
use zoneguard_data::SinkError;
use zoneguard_data::fetch::{CacheError, ProgressError};
use zoneguard_data::overpass::SourceBuildError;

/// Errors emitted by the ZoneGuard CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// Two options that exclude each other were both set.
    #[error("--{first} and --{second} cannot be used together")]
    ConflictingArguments {
        first: &'static str,
        second: &'static str,
    },
    /// An option value is out of range.
    #[error("invalid --{field}: {reason}")]
    InvalidSetting {
        field: &'static str,
        reason: String,
    },
    /// A coordinate list could not be parsed.
    #[error("invalid --{field} value {value:?}: {reason}")]
    InvalidCoordinates {
        field: &'static str,
        value: String,
        reason: String,
    },
    /// The district selection could not be resolved.
    #[error(transparent)]
    Districts(#[from] DistrictError),
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An upstream endpoint could not be turned into a source.
    #[error("failed to build feature source for {endpoint:?}: {source}")]
    BuildSource {
        endpoint: String,
        #[source]
        source: SourceBuildError,
    },
    /// The import endpoint could not be configured.
    #[error("failed to configure import endpoint: {0}")]
    BuildSink(#[source] SinkError),
    /// Opening the local zone store failed.
    #[error("failed to open zone store at {path:?}: {source}")]
    OpenStore {
        path: Utf8PathBuf,
        #[source]
        source: PersistenceError,
    },
    /// The async runtime could not be started.
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Wiping the tile cache failed.
    #[error("failed to clear tile cache: {0}")]
    ClearCache(#[source] CacheError),
    /// Wiping the progress checkpoint failed.
    #[error("failed to clear progress checkpoint: {0}")]
    ClearProgress(#[source] ProgressError),
    /// The ingestion run aborted.
    #[error("ingestion failed: {0}")]
    Ingest(#[source] IngestError),
    /// The run was interrupted; saved progress allows a resumed run.
    #[error("ingestion cancelled; re-run with --resume to continue")]
    Cancelled,
    /// One or more districts were not imported.
    #[error("{count} district(s) failed ({districts}); re-run with --resume to retry them")]
    DistrictsFailed { count: usize, districts: String },
    /// Serializing the check results failed.
    #[error("failed to serialize check results: {0}")]
    SerializeHits(#[source] serde_json::Error),
    /// Writing the check output failed.
    #[error("failed to write check output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
