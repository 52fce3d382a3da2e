//! Point and line checks against a zone collection.
//!
//! Each zone is first pruned by a bounding box grown by its severity buffer.
//! Survivors are ray-cast; points outside every ring but within the buffer
//! distance of an edge produce a buffer hit.

use std::collections::HashSet;

use geo::Coord;

use crate::geometry::{
    BoundingBox, distance_to_ring, path_crosses_ring, ring_contains,
};
use crate::zone::{HitResult, Severity, Zone};

/// Default buffer around critical zones, in degrees (about 2 km).
pub const CRITICAL_BUFFER_DEG: f64 = 0.018;
/// Default buffer around restricted zones, in degrees (about 1.5 km).
pub const RESTRICTED_BUFFER_DEG: f64 = 0.014;
/// Default buffer around warning zones, in degrees (about 0.5 km).
pub const WARNING_BUFFER_DEG: f64 = 0.005;
/// Flat conversion between degrees and kilometres.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Buffer widths and distance conversion used by [`CheckEngine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckConfig {
    /// Buffer for [`Severity::Critical`] zones, in degrees.
    pub critical_buffer_deg: f64,
    /// Buffer for [`Severity::Restricted`] zones, in degrees.
    pub restricted_buffer_deg: f64,
    /// Buffer for [`Severity::Warning`] zones, in degrees.
    pub warning_buffer_deg: f64,
    /// Kilometres per degree used when reporting distances.
    pub km_per_degree: f64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            critical_buffer_deg: CRITICAL_BUFFER_DEG,
            restricted_buffer_deg: RESTRICTED_BUFFER_DEG,
            warning_buffer_deg: WARNING_BUFFER_DEG,
            km_per_degree: KM_PER_DEGREE,
        }
    }
}

impl CheckConfig {
    /// Buffer width for `severity`, in degrees.
    #[must_use]
    pub const fn buffer_for(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical_buffer_deg,
            Severity::Restricted => self.restricted_buffer_deg,
            Severity::Warning => self.warning_buffer_deg,
        }
    }

    /// Override the buffer for one severity.
    #[must_use]
    pub const fn with_buffer(mut self, severity: Severity, degrees: f64) -> Self {
        match severity {
            Severity::Critical => self.critical_buffer_deg = degrees,
            Severity::Restricted => self.restricted_buffer_deg = degrees,
            Severity::Warning => self.warning_buffer_deg = degrees,
        }
        self
    }

    fn to_km(&self, degrees: f64) -> f64 {
        (degrees * self.km_per_degree * 100.0).round() / 100.0
    }
}

/// Check engine over a borrowed zone slice.
///
/// # Examples
///
/// ```
/// use geo::Coord;
/// use zoneguard_core::{CheckConfig, CheckEngine, Severity, Zone, geometry::close_ring};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ring = close_ring(vec![
///     Coord { x: 0.0, y: 0.0 },
///     Coord { x: 1.0, y: 0.0 },
///     Coord { x: 1.0, y: 1.0 },
///     Coord { x: 0.0, y: 1.0 },
/// ])?;
/// let zones = vec![Zone::new("Base", "military", Severity::Critical, vec![ring])?];
/// let engine = CheckEngine::new(&zones, CheckConfig::default());
/// let hits = engine.check_point(Coord { x: 0.5, y: 0.5 });
/// assert_eq!(hits.len(), 1);
/// assert!(!hits[0].in_buffer);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CheckEngine<'a> {
    zones: &'a [Zone],
    config: CheckConfig,
}

impl<'a> CheckEngine<'a> {
    /// Build an engine over `zones`.
    #[must_use]
    pub const fn new(zones: &'a [Zone], config: CheckConfig) -> Self {
        Self { zones, config }
    }

    /// Zones containing `point` or within their buffer of it.
    #[must_use]
    pub fn check_point(&self, point: Coord<f64>) -> Vec<HitResult> {
        self.zones
            .iter()
            .filter_map(|zone| self.point_hit(zone, point))
            .collect()
    }

    /// Zones touched by any vertex or crossed by any segment of `path`.
    ///
    /// Hits are unique by `name|type|severity`; the first one found wins.
    #[must_use]
    pub fn check_line(&self, path: &[Coord<f64>]) -> Vec<HitResult> {
        let mut seen = HashSet::new();
        let mut hits: Vec<HitResult> = path
            .iter()
            .flat_map(|vertex| self.check_point(*vertex))
            .filter(|hit| seen.insert(hit.dedup_key()))
            .collect();

        let Some(line_bbox) = BoundingBox::from_coords(path.iter().copied()) else {
            return hits;
        };
        for zone in self.zones {
            if seen.contains(&zone.dedup_key()) || !zone.bbox().intersects(&line_bbox) {
                continue;
            }
            if zone
                .polygons()
                .iter()
                .any(|ring| path_crosses_ring(path, ring))
                && seen.insert(zone.dedup_key())
            {
                hits.push(HitResult::inside(zone));
            }
        }
        hits
    }

    fn point_hit(&self, zone: &Zone, point: Coord<f64>) -> Option<HitResult> {
        let buffer = self.config.buffer_for(zone.severity());
        if !zone.bbox().expand(buffer).contains(point) {
            return None;
        }
        if zone.polygons().iter().any(|ring| ring_contains(ring, point)) {
            return Some(HitResult::inside(zone));
        }
        let distance = zone
            .polygons()
            .iter()
            .map(|ring| distance_to_ring(ring, point))
            .fold(f64::INFINITY, f64::min);
        (distance <= buffer).then(|| HitResult::buffered(zone, self.config.to_km(distance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::close_ring;
    use rstest::{fixture, rstest};

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn square_zone(name: &str, severity: Severity, x: f64, y: f64, size: f64) -> Zone {
        let ring = close_ring(vec![
            c(x, y),
            c(x + size, y),
            c(x + size, y + size),
            c(x, y + size),
        ])
        .expect("ring");
        Zone::new(name, "test", severity, vec![ring]).expect("zone")
    }

    #[fixture]
    fn zones() -> Vec<Zone> {
        vec![
            square_zone("crit", Severity::Critical, 0.0, 0.0, 0.1),
            square_zone("warn", Severity::Warning, 1.0, 1.0, 0.1),
        ]
    }

    #[rstest]
    fn inside_point_has_no_distance(zones: Vec<Zone>) {
        let engine = CheckEngine::new(&zones, CheckConfig::default());
        let hits = engine.check_point(c(0.05, 0.05));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].zone_name, "crit");
        assert!(!hits[0].in_buffer);
        assert_eq!(hits[0].buffer_distance_km, None);
    }

    #[rstest]
    #[case(0.11, Some(1.11))]
    #[case(0.117, Some(1.89))]
    #[case(0.119, None)]
    fn buffer_depends_on_distance(zones: Vec<Zone>, #[case] x: f64, #[case] km: Option<f64>) {
        let engine = CheckEngine::new(&zones, CheckConfig::default());
        let hits = engine.check_point(c(x, 0.05));
        assert_eq!(hits.first().and_then(|h| h.buffer_distance_km), km);
        assert!(hits.iter().all(|h| h.in_buffer));
    }

    #[rstest]
    fn warning_buffer_is_narrower(zones: Vec<Zone>) {
        let engine = CheckEngine::new(&zones, CheckConfig::default());
        // 0.008 degrees outside: inside a critical buffer but not a warning one.
        assert!(engine.check_point(c(1.108, 1.05)).is_empty());
        assert_eq!(engine.check_point(c(0.108, 0.05)).len(), 1);
    }

    #[rstest]
    fn custom_buffers_apply(zones: Vec<Zone>) {
        let config = CheckConfig::default().with_buffer(Severity::Warning, 0.01);
        let engine = CheckEngine::new(&zones, config);
        assert_eq!(engine.check_point(c(1.108, 1.05)).len(), 1);
    }

    #[rstest]
    fn far_points_yield_nothing(zones: Vec<Zone>) {
        let engine = CheckEngine::new(&zones, CheckConfig::default());
        assert!(engine.check_point(c(30.0, 50.0)).is_empty());
    }

    #[rstest]
    fn line_detects_cut_through_with_outside_vertices(zones: Vec<Zone>) {
        let engine = CheckEngine::new(&zones, CheckConfig::default());
        let hits = engine.check_line(&[c(-0.5, 0.05), c(0.6, 0.05)]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].zone_name, "crit");
        assert!(!hits[0].in_buffer);
    }

    #[rstest]
    fn line_deduplicates_vertex_hits(zones: Vec<Zone>) {
        let engine = CheckEngine::new(&zones, CheckConfig::default());
        let hits = engine.check_line(&[c(0.02, 0.02), c(0.05, 0.05), c(0.08, 0.08)]);
        assert_eq!(hits.len(), 1);
    }

    #[rstest]
    fn line_reports_each_zone_once(zones: Vec<Zone>) {
        let engine = CheckEngine::new(&zones, CheckConfig::default());
        let hits = engine.check_line(&[c(0.05, 0.05), c(1.05, 1.05)]);
        let names: Vec<_> = hits.iter().map(|h| h.zone_name.as_str()).collect();
        assert_eq!(names, ["crit", "warn"]);
    }

    #[rstest]
    fn empty_line_has_no_hits(zones: Vec<Zone>) {
        let engine = CheckEngine::new(&zones, CheckConfig::default());
        assert!(engine.check_line(&[]).is_empty());
    }

    #[rstest]
    fn non_finite_points_never_hit(zones: Vec<Zone>) {
        let engine = CheckEngine::new(&zones, CheckConfig::default());
        assert!(engine.check_point(c(f64::NAN, 0.05)).is_empty());
    }
}
