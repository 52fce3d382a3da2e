//! Ingest command implementation for the ZoneGuard CLI.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use log::{info, warn};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use zoneguard_core::{StoreConfig, ZoneService};
use zoneguard_data::districts::{ALL_DISTRICTS, DEFAULT_TILE_SIZE};
use zoneguard_data::fetch::{
    DEFAULT_MAX_SPLIT_DEPTH, DEFAULT_REQUEST_DELAY, FetcherConfig, ProgressStore, RetryPolicy,
    TileCache, TileFetcher,
};
use zoneguard_data::overpass::{DEFAULT_ENDPOINTS, FeatureSource, HttpFeatureSource};
use zoneguard_data::{
    District, DistrictStatus, HttpImportSink, IngestError, IngestPipeline, IngestReport,
    PipelineOptions, StoreSink, ZoneSink, select_districts,
};

use crate::{
    ARG_CACHE_DIR, ARG_CLEAR_URL, ARG_CONCURRENCY, ARG_DISTRICT, ARG_ENDPOINT, ARG_IMPORT_URL,
    ARG_MAX_SPLIT_DEPTH, ARG_PROGRESS_FILE, ARG_REQUEST_DELAY_MS, ARG_TILE_SIZE, ARG_ZONES_FILE,
    CliError,
};

pub(crate) const DEFAULT_ZONES_FILE: &str = "zones.geojson";
pub(crate) const DEFAULT_CACHE_DIR: &str = ".zoneguard/tiles";
pub(crate) const DEFAULT_PROGRESS_FILE: &str = ".zoneguard/progress.json";

/// The `ingest` subcommand: run-mode switches plus layered settings.
#[derive(Debug, Clone, Parser)]
#[command(
    long_about = "Fetch restricted areas (military, government, aerodromes and \
                 similar) from Overpass endpoints tile by tile, assemble them \
                 into zones and import one collection per district. Settings \
                 can come from CLI flags, configuration files, or ZONEGUARD_* \
                 environment variables.",
    about = "Ingest restricted zones district by district"
)]
pub(crate) struct IngestCommand {
    /// Continue from the saved progress checkpoint; existing zones are kept.
    #[arg(long)]
    pub(crate) resume: bool,
    /// Keep existing zones instead of wiping them before the first import.
    #[arg(long = "no-clear")]
    pub(crate) no_clear: bool,
    /// Delete the tile cache and progress checkpoint, then exit.
    #[arg(long, conflicts_with = "resume")]
    pub(crate) clean: bool,
    #[command(flatten)]
    pub(crate) settings: IngestArgs,
}

impl IngestCommand {
    pub(crate) const fn options(&self) -> PipelineOptions {
        PipelineOptions {
            resume: self.resume,
            clear_before_import: !self.no_clear,
        }
    }
}

/// Layered settings for the `ingest` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(name = "ingest")]
#[ortho_config(prefix = "ZONEGUARD")]
pub(crate) struct IngestArgs {
    /// Districts to ingest: `all`, one key, or a comma-separated list.
    #[arg(long = ARG_DISTRICT, value_name = "keys")]
    #[serde(default)]
    pub(crate) district: Option<String>,
    /// Overpass endpoint URL; repeat to rotate through several.
    #[arg(long = ARG_ENDPOINT, value_name = "url")]
    #[serde(default)]
    pub(crate) endpoints: Option<Vec<String>>,
    /// External zone import endpoint; zones go to the local store when unset.
    #[arg(long = ARG_IMPORT_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) import_url: Option<String>,
    /// Clear endpoint paired with --import-url (default `{import-url}/clear`).
    #[arg(long = ARG_CLEAR_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) clear_url: Option<String>,
    /// Local zone store file (`zones.geojson`).
    #[arg(long = ARG_ZONES_FILE, value_name = "path")]
    #[serde(default)]
    pub(crate) zones_file: Option<Utf8PathBuf>,
    /// Directory holding cached tile responses.
    #[arg(long = ARG_CACHE_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) cache_dir: Option<Utf8PathBuf>,
    /// Progress checkpoint used by --resume.
    #[arg(long = ARG_PROGRESS_FILE, value_name = "path")]
    #[serde(default)]
    pub(crate) progress_file: Option<Utf8PathBuf>,
    /// Edge length of a top-level tile in degrees.
    #[arg(long = ARG_TILE_SIZE, value_name = "degrees")]
    #[serde(default)]
    pub(crate) tile_size: Option<f64>,
    /// Tile requests kept in flight at once.
    #[arg(long = ARG_CONCURRENCY, value_name = "n")]
    #[serde(default)]
    pub(crate) concurrency: Option<usize>,
    /// How many times a failing tile may be split into quadrants.
    #[arg(long = ARG_MAX_SPLIT_DEPTH, value_name = "n")]
    #[serde(default)]
    pub(crate) max_split_depth: Option<u8>,
    /// Minimum delay between requests to one endpoint, in milliseconds.
    #[arg(long = ARG_REQUEST_DELAY_MS, value_name = "ms")]
    #[serde(default)]
    pub(crate) request_delay_ms: Option<u64>,
}

impl IngestArgs {
    pub(crate) fn into_config(self) -> Result<IngestConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        IngestConfig::try_from(merged)
    }
}

/// Resolved `ingest` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IngestConfig {
    /// Districts in run order.
    pub(crate) districts: Vec<District>,
    /// Upstream endpoints in rotation order.
    pub(crate) endpoints: Vec<String>,
    /// External import endpoint, if any.
    pub(crate) import_url: Option<String>,
    /// Explicit clear endpoint for the external sink.
    pub(crate) clear_url: Option<String>,
    /// Local zone store file.
    pub(crate) zones_file: Utf8PathBuf,
    /// Tile cache directory.
    pub(crate) cache_dir: Utf8PathBuf,
    /// Progress checkpoint file.
    pub(crate) progress_file: Utf8PathBuf,
    /// Top-level tile size in degrees.
    pub(crate) tile_size: f64,
    /// Scheduler settings.
    pub(crate) fetcher: FetcherConfig,
}

impl TryFrom<IngestArgs> for IngestConfig {
    type Error = CliError;

    fn try_from(args: IngestArgs) -> Result<Self, Self::Error> {
        let districts = select_districts(args.district.as_deref().unwrap_or(ALL_DISTRICTS))?;
        let endpoints = args
            .endpoints
            .filter(|endpoints| !endpoints.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINTS.iter().map(|&url| url.to_owned()).collect());
        if args.clear_url.is_some() && args.import_url.is_none() {
            return Err(CliError::InvalidSetting {
                field: ARG_CLEAR_URL,
                reason: format!("requires --{ARG_IMPORT_URL}"),
            });
        }

        let tile_size = args.tile_size.unwrap_or(DEFAULT_TILE_SIZE);
        if !tile_size.is_finite() || tile_size <= 0.0 {
            return Err(CliError::InvalidSetting {
                field: ARG_TILE_SIZE,
                reason: format!("must be a positive number of degrees, got {tile_size}"),
            });
        }
        for district in &districts {
            district.tile_count(tile_size)?;
        }
        let concurrency = args.concurrency.unwrap_or(1);
        if concurrency == 0 {
            return Err(CliError::InvalidSetting {
                field: ARG_CONCURRENCY,
                reason: "must be at least 1".to_owned(),
            });
        }
        let policy = RetryPolicy::default()
            .with_max_split_depth(args.max_split_depth.unwrap_or(DEFAULT_MAX_SPLIT_DEPTH));
        let request_delay = args
            .request_delay_ms
            .map_or(DEFAULT_REQUEST_DELAY, Duration::from_millis);
        let fetcher = FetcherConfig::default()
            .with_policy(policy)
            .with_request_delay(request_delay)
            .with_concurrency(concurrency);

        Ok(Self {
            districts,
            endpoints,
            import_url: args.import_url,
            clear_url: args.clear_url,
            zones_file: args
                .zones_file
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_ZONES_FILE)),
            cache_dir: args
                .cache_dir
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_CACHE_DIR)),
            progress_file: args
                .progress_file
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_PROGRESS_FILE)),
            tile_size,
            fetcher,
        })
    }
}

pub(super) fn run_ingest(command: IngestCommand) -> Result<(), CliError> {
    let options = command.options();
    let config = command.settings.into_config()?;
    if command.clean {
        return clean_workspace(&config);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let report = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
        let outcome = ingest_with_default_transports(&config, options, &cancel).await;
        watcher.abort();
        outcome
    })?;
    summarize(&report)
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("interrupt received; saving progress and stopping");
            cancel.cancel();
        }
        Err(err) => warn!("cannot listen for Ctrl-C: {err}"),
    }
}

async fn ingest_with_default_transports(
    config: &IngestConfig,
    options: PipelineOptions,
    cancel: &CancellationToken,
) -> Result<IngestReport, CliError> {
    let sources = build_sources(&config.endpoints)?;
    if let Some(import_url) = &config.import_url {
        let sink = match &config.clear_url {
            Some(clear_url) => HttpImportSink::with_clear_url(import_url, clear_url),
            None => HttpImportSink::new(import_url),
        }
        .map_err(CliError::BuildSink)?;
        info!("posting zones to {}", sink.import_url());
        return execute_ingest(config, options, sources, sink, cancel).await;
    }

    let service = Arc::new(open_store(config)?);
    info!("importing zones into {}", config.zones_file);
    let sink = StoreSink::new(Arc::clone(&service));
    let outcome = execute_ingest(config, options, sources, sink, cancel).await;
    service.flush();
    outcome
}

pub(crate) fn build_sources(endpoints: &[String]) -> Result<Vec<HttpFeatureSource>, CliError> {
    endpoints
        .iter()
        .map(|endpoint| {
            HttpFeatureSource::new(endpoint).map_err(|source| CliError::BuildSource {
                endpoint: endpoint.clone(),
                source,
            })
        })
        .collect()
}

/// Open the local store; clearing it also drops the tile cache.
pub(crate) fn open_store(config: &IngestConfig) -> Result<ZoneService, CliError> {
    let store = StoreConfig::new(config.zones_file.clone())
        .with_tile_cache_dir(config.cache_dir.clone());
    ZoneService::open(store).map_err(|source| CliError::OpenStore {
        path: config.zones_file.clone(),
        source,
    })
}

/// Run the pipeline over `sources` into `sink`.
pub(crate) async fn execute_ingest<S: FeatureSource, K: ZoneSink>(
    config: &IngestConfig,
    options: PipelineOptions,
    sources: Vec<S>,
    sink: K,
    cancel: &CancellationToken,
) -> Result<IngestReport, CliError> {
    let fetcher = TileFetcher::new(sources, config.fetcher.clone())
        .with_cache(TileCache::new(config.cache_dir.clone()));
    let pipeline = IngestPipeline::new(
        fetcher,
        sink,
        ProgressStore::new(config.progress_file.clone()),
    )
    .with_tile_size(config.tile_size)
    .with_options(options);
    pipeline
        .run(&config.districts, cancel)
        .await
        .map_err(|err| match err {
            IngestError::Cancelled => CliError::Cancelled,
            other => CliError::Ingest(other),
        })
}

/// Log one line per district and fail when any district was not imported.
pub(crate) fn summarize(report: &IngestReport) -> Result<(), CliError> {
    for district in &report.districts {
        let schedule = &district.schedule;
        match &district.status {
            DistrictStatus::Completed => info!(
                "{}: {} zones posted from {} tiles ({} fetched, {} cached, {} split, {} skipped)",
                district.key,
                district.zones_posted,
                district.tiles,
                schedule.fetched,
                schedule.cached,
                schedule.split,
                schedule.skipped
            ),
            DistrictStatus::AlreadyComplete => info!("{}: already complete", district.key),
            DistrictStatus::Failed(reason) => warn!("{}: failed: {reason}", district.key),
        }
    }

    let failed: Vec<&str> = report.failed().map(|district| district.key.as_str()).collect();
    let gaps = report.coverage_gaps();
    if gaps > 0 {
        warn!("{gaps} tile job(s) skipped as coverage gaps; re-run with --resume to retry them");
    }
    if failed.is_empty() {
        info!(
            "ingestion finished: {} zones posted across {} district(s)",
            report.zones_posted(),
            report.districts.len()
        );
        Ok(())
    } else {
        Err(CliError::DistrictsFailed {
            count: failed.len(),
            districts: failed.join(", "),
        })
    }
}

/// Remove the tile cache and the progress checkpoint.
pub(crate) fn clean_workspace(config: &IngestConfig) -> Result<(), CliError> {
    TileCache::new(config.cache_dir.clone())
        .clear()
        .map_err(CliError::ClearCache)?;
    ProgressStore::new(config.progress_file.clone())
        .clear()
        .map_err(CliError::ClearProgress)?;
    info!(
        "removed tile cache {} and progress checkpoint {}",
        config.cache_dir, config.progress_file
    );
    Ok(())
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<IngestConfig, CliError> {
    let merged = IngestArgs::merge_from_layers(layers).map_err(CliError::from)?;
    IngestConfig::try_from(merged)
}
