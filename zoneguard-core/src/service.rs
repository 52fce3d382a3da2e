//! Application context that shares one zone store between callers.
//!
//! Checks take a read lock and may run concurrently. Import and clear take the
//! write lock, so a check never observes a partially applied import.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use geo::Coord;
use log::{info, warn};
use serde::Serialize;

use crate::check::{CheckConfig, CheckEngine};
use crate::geojson::{Feature, GeoJsonDocument};
use crate::store::{PersistenceError, StoreConfig, ZoneStore};
use crate::zone::{HitResult, Zone, ZoneStats};

/// Outcome of [`ZoneService::import_zones`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Zones added by this import.
    pub imported_count: usize,
    /// Rings skipped as duplicates.
    pub duplicates: usize,
    /// Features or rings that could not be imported.
    pub rejected: usize,
    /// Store totals after the import.
    pub stats: ZoneStats,
}

/// Read-only view returned by [`ZoneService::list_zones`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneListing {
    /// Store totals.
    pub stats: ZoneStats,
    /// Every zone currently held.
    pub zones: Vec<Zone>,
}

/// Thread-safe entry point for checks and zone administration.
///
/// # Examples
///
/// ```
/// use zoneguard_core::{GeoJsonDocument, ZoneService, ZoneStore};
///
/// let service = ZoneService::new(ZoneStore::in_memory());
/// let doc = GeoJsonDocument::parse(r#"{
///     "type": "Feature",
///     "properties": {"name": "Yard", "severity": "critical"},
///     "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}
/// }"#).expect("valid feature");
/// assert_eq!(service.import_zones(&doc).imported_count, 1);
/// assert_eq!(service.point_check(0.5, 0.5).len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ZoneService {
    store: RwLock<ZoneStore>,
    config: CheckConfig,
}

impl ZoneService {
    /// Wrap an existing store using default buffers.
    #[must_use]
    pub fn new(store: ZoneStore) -> Self {
        Self {
            store: RwLock::new(store),
            config: CheckConfig::default(),
        }
    }

    /// Open the store described by `config`.
    pub fn open(config: StoreConfig) -> Result<Self, PersistenceError> {
        ZoneStore::open(config).map(Self::new)
    }

    /// Replace the buffer configuration.
    #[must_use]
    pub fn with_check_config(mut self, config: CheckConfig) -> Self {
        self.config = config;
        self
    }

    /// Zones containing, or buffering, the point `(lon, lat)`.
    #[must_use]
    pub fn point_check(&self, lon: f64, lat: f64) -> Vec<HitResult> {
        let store = self.read();
        CheckEngine::new(store.zones(), self.config).check_point(Coord { x: lon, y: lat })
    }

    /// Zones touched by the polyline `coords`, given as `[lon, lat]` pairs.
    #[must_use]
    pub fn line_check(&self, coords: &[[f64; 2]]) -> Vec<HitResult> {
        let path: Vec<Coord<f64>> = coords.iter().map(|&[x, y]| Coord { x, y }).collect();
        let store = self.read();
        CheckEngine::new(store.zones(), self.config).check_line(&path)
    }

    /// Import polygons from a GeoJSON document.
    pub fn import_zones(&self, document: &GeoJsonDocument) -> ImportReport {
        self.import_features(document.features())
    }

    /// Import polygons from already decoded features.
    pub fn import_features(&self, features: &[Feature]) -> ImportReport {
        let mut store = self.write();
        let summary = store.import_features(features);
        info!(
            "imported {} zones ({} duplicates, {} rejected)",
            summary.imported, summary.duplicates, summary.rejected
        );
        ImportReport {
            imported_count: summary.imported,
            duplicates: summary.duplicates,
            rejected: summary.rejected,
            stats: store.stats(),
        }
    }

    /// Remove every zone, persist the empty store and drop the tile cache.
    pub fn clear_zones(&self) -> ZoneStats {
        let mut store = self.write();
        if let Err(err) = store.clear(true) {
            warn!("zone store cleared in memory only: {err}");
        }
        store.stats()
    }

    /// Snapshot of every zone with totals.
    #[must_use]
    pub fn list_zones(&self) -> ZoneListing {
        let store = self.read();
        ZoneListing {
            stats: store.stats(),
            zones: store.snapshot(),
        }
    }

    /// Current totals.
    #[must_use]
    pub fn stats(&self) -> ZoneStats {
        self.read().stats()
    }

    /// Block until pending writes reach disk.
    pub fn flush(&self) {
        self.read().flush();
    }

    fn read(&self) -> RwLockReadGuard<'_, ZoneStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ZoneStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{kremlin_document, square_feature};
    use rstest::{fixture, rstest};
    use std::sync::Arc;
    use std::thread;

    #[fixture]
    fn service() -> ZoneService {
        let service = ZoneService::new(ZoneStore::in_memory());
        service.import_zones(&kremlin_document());
        service
    }

    #[rstest]
    fn import_reports_totals() {
        let service = ZoneService::new(ZoneStore::in_memory());
        let report = service.import_zones(&square_feature("Yard", "prison", "restricted", 0.0));
        assert_eq!(report.imported_count, 1);
        assert_eq!(report.stats.total, 1);
        assert_eq!(report.stats.by_type.get("prison"), Some(&1));
    }

    #[rstest]
    fn borrowed_features_import_like_documents(service: ZoneService) {
        let document = kremlin_document();
        let repeat = service.import_features(document.features());
        assert_eq!(repeat.imported_count, 0);
        assert_eq!(repeat.duplicates, 1);

        let yard = square_feature("Yard", "prison", "restricted", 0.0);
        let report = service.import_features(yard.features());
        assert_eq!(report.imported_count, 1);
        assert_eq!(report.stats.total, 2);
    }

    #[rstest]
    fn list_zones_returns_snapshot(service: ZoneService) {
        let listing = service.list_zones();
        assert_eq!(listing.stats.total, 1);
        assert_eq!(listing.zones[0].name(), "Зона Кремль");
    }

    #[rstest]
    fn clear_zones_returns_empty_stats(service: ZoneService) {
        assert_eq!(service.clear_zones(), ZoneStats::default());
        assert!(service.point_check(37.618, 55.755).is_empty());
    }

    #[rstest]
    fn checks_run_concurrently(service: ZoneService) {
        let shared = Arc::new(service);
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&shared);
                thread::spawn(move || service.point_check(37.618, 55.755).len())
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().expect("worker"), 1);
        }
    }

    #[rstest]
    fn listing_serialises_for_callers(service: ZoneService) {
        let value = serde_json::to_value(service.list_zones()).expect("json");
        assert_eq!(value["stats"]["total"], 1);
        assert_eq!(value["zones"][0]["severity"], "critical");
    }
}
