//! Resumable ingestion checkpoint.
//!
//! The checkpoint lists finished districts and the top-level tiles resolved
//! for districts still in progress. It is rewritten after every fully
//! resolved tile.

use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by [`ProgressStore`].
#[derive(Debug, Error)]
pub enum ProgressError {
    /// Filesystem access failed.
    #[error("failed to access progress file {path}")]
    Io {
        /// Checkpoint path.
        path: Utf8PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// The checkpoint could not be decoded or encoded.
    #[error("invalid progress file {path}")]
    Json {
        /// Checkpoint path.
        path: Utf8PathBuf,
        /// Underlying JSON failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Resumable record of finished districts and top-level tiles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionProgress {
    /// Districts fully imported.
    #[serde(default)]
    pub completed_districts: BTreeSet<String>,
    /// Tile keys resolved per district still in progress.
    #[serde(default)]
    pub completed_tiles: BTreeMap<String, BTreeSet<String>>,
}

impl IngestionProgress {
    /// `true` when `district` finished in an earlier run.
    #[must_use]
    pub fn is_district_complete(&self, district: &str) -> bool {
        self.completed_districts.contains(district)
    }

    /// `true` when `tile_key` of `district` was already resolved.
    #[must_use]
    pub fn is_tile_complete(&self, district: &str, tile_key: &str) -> bool {
        self.completed_tiles
            .get(district)
            .is_some_and(|tiles| tiles.contains(tile_key))
    }

    /// Record a resolved top-level tile.
    pub fn mark_tile(&mut self, district: &str, tile_key: impl Into<String>) {
        self.completed_tiles
            .entry(district.to_owned())
            .or_default()
            .insert(tile_key.into());
    }

    /// Record a finished district; its tile records are no longer needed.
    pub fn mark_district(&mut self, district: &str) {
        self.completed_tiles.remove(district);
        self.completed_districts.insert(district.to_owned());
    }

    /// Number of resolved tiles recorded for `district`.
    #[must_use]
    pub fn tile_count(&self, district: &str) -> usize {
        self.completed_tiles.get(district).map_or(0, BTreeSet::len)
    }
}

/// JSON checkpoint file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressStore {
    path: Utf8PathBuf,
}

impl ProgressStore {
    /// Checkpoint stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Checkpoint path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Load the checkpoint; a missing file is an empty one.
    pub fn load(&self) -> Result<IngestionProgress, ProgressError> {
        let text = zoneguard_fs::read_optional_string(&self.path).map_err(|source| {
            ProgressError::Io {
                path: self.path.clone(),
                source,
            }
        })?;
        text.map_or_else(
            || Ok(IngestionProgress::default()),
            |text| {
                serde_json::from_str(&text).map_err(|source| ProgressError::Json {
                    path: self.path.clone(),
                    source,
                })
            },
        )
    }

    /// Persist `progress` atomically.
    pub fn save(&self, progress: &IngestionProgress) -> Result<(), ProgressError> {
        let bytes = serde_json::to_vec_pretty(progress).map_err(|source| ProgressError::Json {
            path: self.path.clone(),
            source,
        })?;
        zoneguard_fs::write_atomic(&self.path, &bytes).map_err(|source| ProgressError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Delete the checkpoint.
    pub fn clear(&self) -> Result<(), ProgressError> {
        zoneguard_fs::remove_file_if_exists(&self.path).map_err(|source| ProgressError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
