//! District ingestion: tiles → elements → polygons → zone features → sink.

use std::collections::HashSet;

use log::{info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use zoneguard_core::{Feature, FeatureCollection, FeatureProperties, classify, zone_name};

use crate::assemble::{AssembledPolygon, assemble};
use crate::districts::{DEFAULT_TILE_SIZE, District, DistrictError};
use crate::element::{ElementKey, dedup_elements};
use crate::fetch::{IngestionProgress, ProgressError, ProgressStore, ScheduleSummary, TileFetcher};
use crate::overpass::{FeatureSource, FetchError};
use crate::sink::{SinkError, ZoneSink};

/// Errors that abort a whole ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Saved progress could not be read for a resumed run.
    #[error("cannot resume: failed to load progress")]
    Progress(#[source] ProgressError),
    /// A district could not be tiled.
    #[error("failed to plan tiles for district {district}")]
    Tiles {
        /// District key.
        district: String,
        /// Tiling failure.
        #[source]
        source: DistrictError,
    },
    /// The pre-import wipe failed.
    #[error("failed to clear existing zones before import")]
    Clear(#[source] SinkError),
    /// Tile fetching could not start.
    #[error("tile fetching failed for district {district}")]
    Fetch {
        /// District key.
        district: String,
        /// Scheduler failure.
        #[source]
        source: FetchError,
    },
    /// The run was cancelled; progress up to this point is saved.
    #[error("ingestion cancelled")]
    Cancelled,
}

/// Run-level switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Continue from the saved progress checkpoint.
    pub resume: bool,
    /// Wipe the sink before the first import; ignored when resuming.
    pub clear_before_import: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            resume: false,
            clear_before_import: true,
        }
    }
}

/// Terminal state of one district.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistrictStatus {
    /// Imported in this run.
    Completed,
    /// Imported by an earlier run and skipped.
    AlreadyComplete,
    /// The sink rejected the district's zones.
    Failed(String),
}

/// Outcome of one district.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistrictReport {
    /// District key.
    pub key: String,
    /// Terminal state.
    pub status: DistrictStatus,
    /// Number of top-level tiles.
    pub tiles: usize,
    /// Scheduler job counts.
    pub schedule: ScheduleSummary,
    /// Zone features handed to the sink.
    pub zones_posted: usize,
    /// Zones the sink reported as new.
    pub imported: Option<usize>,
}

impl DistrictReport {
    fn already_complete(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            status: DistrictStatus::AlreadyComplete,
            tiles: 0,
            schedule: ScheduleSummary::default(),
            zones_posted: 0,
            imported: None,
        }
    }

    /// Jobs skipped as coverage gaps.
    #[must_use]
    pub const fn skipped_tiles(&self) -> usize {
        self.schedule.skipped
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Per-district outcomes, in run order.
    pub districts: Vec<DistrictReport>,
}

impl IngestReport {
    /// `true` when no district failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Districts the sink rejected.
    pub fn failed(&self) -> impl Iterator<Item = &DistrictReport> {
        self.districts
            .iter()
            .filter(|report| matches!(report.status, DistrictStatus::Failed(_)))
    }

    /// Tile jobs skipped as coverage gaps across all districts.
    #[must_use]
    pub fn coverage_gaps(&self) -> usize {
        self.districts.iter().map(DistrictReport::skipped_tiles).sum()
    }

    /// Zone features posted across all districts.
    #[must_use]
    pub fn zones_posted(&self) -> usize {
        self.districts.iter().map(|report| report.zones_posted).sum()
    }
}

/// Drives the fetcher and sink over a list of districts.
#[derive(Debug)]
pub struct IngestPipeline<S, K> {
    fetcher: TileFetcher<S>,
    sink: K,
    progress_store: ProgressStore,
    tile_size: f64,
    options: PipelineOptions,
}

impl<S: FeatureSource, K: ZoneSink> IngestPipeline<S, K> {
    /// Pipeline with default tile size and options.
    #[must_use]
    pub fn new(fetcher: TileFetcher<S>, sink: K, progress_store: ProgressStore) -> Self {
        Self {
            fetcher,
            sink,
            progress_store,
            tile_size: DEFAULT_TILE_SIZE,
            options: PipelineOptions::default(),
        }
    }

    /// Set the top-level tile size in degrees.
    #[must_use]
    pub const fn with_tile_size(mut self, tile_size: f64) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Set the run options.
    #[must_use]
    pub const fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Zone sink.
    #[must_use]
    pub const fn sink(&self) -> &K {
        &self.sink
    }

    /// Ingest `districts` in order.
    ///
    /// A district whose import fails is reported and the run moves on. A
    /// district with coverage gaps is imported but left open in the
    /// checkpoint, so a resumed run fetches it again and retries the gaps. The
    /// checkpoint is deleted once every district has succeeded without gaps.
    ///
    /// # Errors
    ///
    /// See [`IngestError`]; on [`IngestError::Cancelled`] the checkpoint holds
    /// every tile resolved so far.
    pub async fn run(
        &self,
        districts: &[District],
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestError> {
        let mut progress = if self.options.resume {
            self.progress_store.load().map_err(IngestError::Progress)?
        } else {
            IngestionProgress::default()
        };
        if self.options.clear_before_import && !self.options.resume {
            info!("clearing existing zones before import");
            self.sink.clear().await.map_err(IngestError::Clear)?;
        }

        let mut report = IngestReport::default();
        for district in districts {
            if progress.is_district_complete(&district.key) {
                info!("district {} already complete; skipping", district.key);
                report
                    .districts
                    .push(DistrictReport::already_complete(&district.key));
                continue;
            }
            let outcome = self.run_district(district, &mut progress, cancel).await;
            if matches!(outcome, Err(IngestError::Cancelled)) {
                self.save_progress(&progress);
            }
            report.districts.push(outcome?);
        }

        let gaps = report.coverage_gaps();
        if report.is_success() && gaps == 0 {
            if let Err(err) = self.progress_store.clear() {
                warn!("failed to remove progress checkpoint: {err}");
            }
        } else {
            warn!(
                "{} district(s) failed and {gaps} tile job(s) skipped; progress kept at {}",
                report.failed().count(),
                self.progress_store.path()
            );
        }
        Ok(report)
    }

    async fn run_district(
        &self,
        district: &District,
        progress: &mut IngestionProgress,
        cancel: &CancellationToken,
    ) -> Result<DistrictReport, IngestError> {
        let key = district.key.as_str();
        let tiles = district
            .tiles(self.tile_size)
            .map_err(|source| IngestError::Tiles {
                district: key.to_owned(),
                source,
            })?;
        let resolved_earlier = tiles
            .iter()
            .filter(|tile| progress.is_tile_complete(key, &tile.tile_key()))
            .count();
        info!(
            "district {key} ({}): {} tiles, {resolved_earlier} resolved by an earlier run",
            district.name,
            tiles.len(),
        );

        let mut features = Vec::new();
        let mut seen: HashSet<ElementKey> = HashSet::new();
        let schedule = self
            .fetcher
            .run(&tiles, cancel, &mut |tile| {
                for polygon in assemble(&dedup_elements(tile.elements)) {
                    if seen.insert(polygon.key) {
                        features.extend(zone_features(&polygon));
                    }
                }
                if tile.skipped == 0 {
                    progress.mark_tile(key, tile.bbox.tile_key());
                    self.save_progress(progress);
                }
            })
            .await
            .map_err(|source| match source {
                FetchError::Cancelled => IngestError::Cancelled,
                source => IngestError::Fetch {
                    district: key.to_owned(),
                    source,
                },
            })?;
        if schedule.skipped > 0 {
            warn!(
                "district {key}: {} tile job(s) skipped; coverage is partial and the district stays open for resume",
                schedule.skipped
            );
        }

        let zones_posted = features.len();
        let collection = FeatureCollection::new(features);
        let (status, imported) = match self.sink.import(&collection).await {
            Ok(receipt) => {
                if schedule.skipped == 0 {
                    progress.mark_district(key);
                }
                self.save_progress(progress);
                info!(
                    "district {key} complete: {zones_posted} zones posted, {} imported",
                    receipt
                        .imported
                        .map_or_else(|| "unknown".to_owned(), |count| count.to_string())
                );
                (DistrictStatus::Completed, receipt.imported)
            }
            Err(err) => {
                warn!("district {key} failed to import: {err}");
                (DistrictStatus::Failed(err.to_string()), None)
            }
        };
        Ok(DistrictReport {
            key: key.to_owned(),
            status,
            tiles: tiles.len(),
            schedule,
            zones_posted,
            imported,
        })
    }

    fn save_progress(&self, progress: &IngestionProgress) {
        if let Err(err) = self.progress_store.save(progress) {
            warn!("failed to save progress checkpoint: {err}");
        }
    }
}

/// One zone feature per ring of `polygon`, classified from its tags.
#[must_use]
pub fn zone_features(polygon: &AssembledPolygon) -> Vec<Feature> {
    let class = classify(&polygon.tags);
    let name = zone_name(
        &polygon.tags,
        &class.zone_type,
        polygon.key.kind.as_str(),
        polygon.key.id,
    );
    polygon
        .rings
        .iter()
        .map(|ring| {
            Feature::polygon(
                ring,
                FeatureProperties {
                    name: Some(name.clone()),
                    zone_type: Some(class.zone_type.clone()),
                    severity: Some(class.severity.as_str().to_owned()),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests;
