//! In-memory zone collection with GeoJSON import and file persistence.
//!
//! The store owns every [`Zone`]. Imports append rings that are not already
//! present, and a full clear is the only way to remove zones. When a zones
//! file is configured, each mutation hands a snapshot to a background
//! [`ZonePersister`].

mod persistence;

pub use persistence::{
    PersistenceError, ZonePersister, encode_zones, read_document, write_zones,
};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::geojson::{Feature, GeoJsonDocument};
use crate::geometry::{BoundingBox, close_ring};
use crate::zone::{Severity, Zone, ZoneStats};

/// Two same-named zones whose bounds differ by no more than this are duplicates.
pub const DUPLICATE_BBOX_EPSILON: f64 = 0.001;

/// Name given to features without a `name` property.
pub const DEFAULT_ZONE_NAME: &str = "unnamed";

/// Type given to features without a `type` property.
pub const DEFAULT_ZONE_TYPE: &str = "restricted";

/// Where the store keeps its files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Persisted GeoJSON file; `None` keeps the store in memory only.
    pub zones_path: Option<Utf8PathBuf>,
    /// Ingestion tile cache removed by a persisted clear.
    pub tile_cache_dir: Option<Utf8PathBuf>,
}

impl StoreConfig {
    /// Persist zones to `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            zones_path: Some(path.into()),
            tile_cache_dir: None,
        }
    }

    /// Remove `dir` whenever the store is cleared with persistence.
    #[must_use]
    pub fn with_tile_cache_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.tile_cache_dir = Some(dir.into());
        self
    }
}

/// Counts reported by [`ZoneStore::import_geojson`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Rings added as new zones.
    pub imported: usize,
    /// Rings skipped because an equivalent zone already exists.
    pub duplicates: usize,
    /// Features or rings that could not be turned into zones.
    pub rejected: usize,
}

impl ImportSummary {
    fn absorb(&mut self, other: Self) {
        self.imported += other.imported;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
    }
}

/// Owned collection of classified zones.
#[derive(Debug, Default)]
pub struct ZoneStore {
    zones: Vec<Zone>,
    config: StoreConfig,
    persister: Option<ZonePersister>,
}

impl ZoneStore {
    /// Create an empty store that never touches disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store, loading any zones previously persisted to the configured file.
    ///
    /// A missing file yields an empty store.
    pub fn open(config: StoreConfig) -> Result<Self, PersistenceError> {
        let persister = config
            .zones_path
            .clone()
            .map(ZonePersister::spawn)
            .transpose()?;
        let mut store = Self {
            zones: Vec::new(),
            config,
            persister,
        };
        store.load_from_disk()?;
        Ok(store)
    }

    /// Replace the in-memory zones with the contents of the zones file.
    ///
    /// Returns the number of zones loaded. Nothing is written back.
    pub fn load_from_disk(&mut self) -> Result<usize, PersistenceError> {
        let Some(path) = self.config.zones_path.clone() else {
            return Ok(0);
        };
        self.zones.clear();
        let Some(document) = read_document(&path)? else {
            debug!("no zone file at {path}; starting empty");
            return Ok(0);
        };
        let summary = self.absorb_features(document.features());
        info!(
            "loaded {} zones from {path} ({} rejected)",
            summary.imported, summary.rejected
        );
        Ok(self.zones.len())
    }

    /// Import every polygon in `document`, skipping duplicates.
    ///
    /// Each outer ring becomes its own zone. The store is persisted when at
    /// least one zone was added.
    pub fn import_geojson(&mut self, document: &GeoJsonDocument) -> ImportSummary {
        self.import_features(document.features())
    }

    /// Import `features` as [`ZoneStore::import_geojson`] does.
    pub fn import_features(&mut self, features: &[Feature]) -> ImportSummary {
        let summary = self.absorb_features(features);
        if summary.imported > 0 {
            self.persist();
        }
        summary
    }

    /// Remove every zone.
    ///
    /// With `persist`, the zones file is rewritten empty and the tile cache
    /// directory is deleted.
    pub fn clear(&mut self, persist: bool) -> Result<(), PersistenceError> {
        self.zones.clear();
        if !persist {
            return Ok(());
        }
        self.persist();
        if let Some(dir) = &self.config.tile_cache_dir {
            zoneguard_fs::remove_dir_if_exists(dir).map_err(|source| PersistenceError::Io {
                path: dir.clone(),
                source,
            })?;
            info!("removed tile cache {dir}");
        }
        Ok(())
    }

    /// Aggregate counts over the current zones.
    #[must_use]
    pub fn stats(&self) -> ZoneStats {
        ZoneStats::from_zones(&self.zones)
    }

    /// Owned copy of the current zones.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Zone> {
        self.zones.clone()
    }

    /// Borrow the current zones.
    #[must_use]
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Number of zones held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// `true` when the store holds no zones.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Persisted file, if any.
    #[must_use]
    pub fn zones_path(&self) -> Option<&Utf8Path> {
        self.config.zones_path.as_deref()
    }

    /// Block until queued writes have reached disk.
    pub fn flush(&self) {
        if let Some(persister) = &self.persister {
            persister.flush();
        }
    }

    fn persist(&self) {
        if let Some(persister) = &self.persister {
            persister.persist(self.zones.clone());
        }
    }

    fn absorb_features(&mut self, features: &[Feature]) -> ImportSummary {
        features
            .iter()
            .fold(ImportSummary::default(), |mut summary, feature| {
                summary.absorb(self.absorb_feature(feature));
                summary
            })
    }

    fn absorb_feature(&mut self, feature: &Feature) -> ImportSummary {
        let rejected = ImportSummary {
            rejected: 1,
            ..ImportSummary::default()
        };
        let properties = feature.properties.clone().unwrap_or_default();
        let name = properties
            .name
            .unwrap_or_else(|| DEFAULT_ZONE_NAME.to_owned());
        let zone_type = properties
            .zone_type
            .unwrap_or_else(|| DEFAULT_ZONE_TYPE.to_owned());
        let severity = match properties.severity.as_deref().map(str::parse::<Severity>) {
            None => Severity::Restricted,
            Some(Ok(severity)) => severity,
            Some(Err(err)) => {
                warn!("rejecting zone `{name}`: {err}");
                return rejected;
            }
        };
        let Some(geometry) = &feature.geometry else {
            warn!("rejecting zone `{name}`: feature has no geometry");
            return rejected;
        };
        let rings = match geometry.outer_rings() {
            Ok(rings) => rings,
            Err(err) => {
                warn!("rejecting zone `{name}`: {err}");
                return rejected;
            }
        };

        let mut summary = ImportSummary::default();
        for coords in rings {
            let ring = match close_ring(coords) {
                Ok(ring) => ring,
                Err(err) => {
                    debug!("dropping ring of zone `{name}`: {err}");
                    summary.rejected += 1;
                    continue;
                }
            };
            let zone = match Zone::new(name.clone(), zone_type.clone(), severity, vec![ring]) {
                Ok(zone) => zone,
                Err(err) => {
                    debug!("dropping ring of zone `{name}`: {err}");
                    summary.rejected += 1;
                    continue;
                }
            };
            if self.contains_equivalent(&zone) {
                summary.duplicates += 1;
            } else {
                self.zones.push(zone);
                summary.imported += 1;
            }
        }
        summary
    }

    fn contains_equivalent(&self, candidate: &Zone) -> bool {
        self.zones
            .iter()
            .any(|existing| is_duplicate(existing, candidate))
    }
}

fn is_duplicate(a: &Zone, b: &Zone) -> bool {
    a.name() == b.name()
        && a.zone_type() == b.zone_type()
        && a.severity() == b.severity()
        && bbox_matches(a.bbox(), b.bbox())
}

fn bbox_matches(a: &BoundingBox, b: &BoundingBox) -> bool {
    a.approx_eq(b, DUPLICATE_BBOX_EPSILON)
}
