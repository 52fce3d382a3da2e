//! On-disk cache of resolved tiles, one JSON file per tile key.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use zoneguard_core::BoundingBox;

use crate::element::RawElement;

/// Errors raised by [`TileCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem access failed.
    #[error("failed to access tile cache entry {path}")]
    Io {
        /// Entry path.
        path: Utf8PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// A cached entry could not be decoded or encoded.
    #[error("invalid tile cache entry {path}")]
    Json {
        /// Entry path.
        path: Utf8PathBuf,
        /// Underlying JSON failure.
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk cache of resolved tiles, one JSON file per tile key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCache {
    dir: Utf8PathBuf,
}

impl TileCache {
    /// Cache rooted at `dir`; the directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// File holding the entry for `bbox`.
    #[must_use]
    pub fn entry_path(&self, bbox: &BoundingBox) -> Utf8PathBuf {
        self.dir.join(format!("tile_{}.json", bbox.tile_key()))
    }

    /// Cached elements for `bbox`, or `None` on a miss.
    pub fn load(&self, bbox: &BoundingBox) -> Result<Option<Vec<RawElement>>, CacheError> {
        let path = self.entry_path(bbox);
        let Some(text) =
            zoneguard_fs::read_optional_string(&path).map_err(|source| CacheError::Io {
                path: path.clone(),
                source,
            })?
        else {
            return Ok(None);
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| CacheError::Json { path, source })
    }

    /// Store `elements` as the entry for `bbox`.
    pub fn store(&self, bbox: &BoundingBox, elements: &[RawElement]) -> Result<(), CacheError> {
        let path = self.entry_path(bbox);
        let bytes = serde_json::to_vec(elements).map_err(|source| CacheError::Json {
            path: path.clone(),
            source,
        })?;
        zoneguard_fs::write_atomic(&path, &bytes).map_err(|source| CacheError::Io { path, source })
    }

    /// Delete every cached tile.
    pub fn clear(&self) -> Result<(), CacheError> {
        zoneguard_fs::remove_dir_if_exists(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })
    }
}
