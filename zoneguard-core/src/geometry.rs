//! Planar geometry primitives shared by ingestion and the check engine.
//!
//! Coordinates are WGS84 degrees with `x = longitude` and `y = latitude`.
//! All maths is flat lon/lat; no geodesic correction is applied.

use std::fmt;

use geo::{Coord, LineString, Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance for coordinate equality when closing and stitching rings.
pub const COORD_EPSILON: f64 = 1.0e-7;

/// Denominators smaller than this mark two segments as parallel.
pub const PARALLEL_EPSILON: f64 = 1.0e-12;

/// A closed polygon boundary, first coordinate equal to the last.
pub type Ring = LineString<f64>;

/// Errors raised when constructing geometry from untrusted input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// A coordinate was NaN or infinite.
    #[error("coordinate ({lon}, {lat}) is not finite")]
    NonFinite {
        /// Longitude as supplied.
        lon: f64,
        /// Latitude as supplied.
        lat: f64,
    },
    /// Minimum exceeded maximum on one axis.
    #[error("bounding box minimum exceeds maximum on the {axis} axis")]
    InvertedBounds {
        /// Axis name, `longitude` or `latitude`.
        axis: &'static str,
    },
    /// The ring did not contain enough distinct vertices.
    #[error("ring has {distinct} distinct points; at least 3 are required")]
    TooFewPoints {
        /// Number of distinct vertices found.
        distinct: usize,
    },
}

/// Compare two coordinates using [`COORD_EPSILON`].
///
/// # Examples
/// ```
/// use geo::Coord;
/// use zoneguard_core::geometry::approx_eq_coord;
///
/// let a = Coord { x: 37.6, y: 55.7 };
/// let b = Coord { x: 37.600_000_01, y: 55.7 };
/// assert!(approx_eq_coord(a, b));
/// ```
#[must_use]
pub fn approx_eq_coord(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.x - b.x).hypot(a.y - b.y) < COORD_EPSILON
}

/// Return `true` when the coordinate is finite and inside WGS84 bounds.
#[must_use]
pub fn is_valid_lon_lat(coord: Coord<f64>) -> bool {
    coord.x.is_finite()
        && coord.y.is_finite()
        && (-180.0..=180.0).contains(&coord.x)
        && (-90.0..=90.0).contains(&coord.y)
}

/// Axis-aligned bounding box in lon/lat degrees.
///
/// Serialises as `[min_lon, min_lat, max_lon, max_lat]`; deserialisation
/// re-validates the `min <= max` invariant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl BoundingBox {
    /// Validate and construct a bounding box.
    ///
    /// # Examples
    /// ```
    /// use zoneguard_core::BoundingBox;
    ///
    /// let bbox = BoundingBox::new(37.0, 55.0, 38.0, 56.0).expect("valid bbox");
    /// assert_eq!(bbox.min_lon(), 37.0);
    /// assert!(BoundingBox::new(38.0, 55.0, 37.0, 56.0).is_err());
    /// ```
    pub fn new(
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<Self, GeometryError> {
        for (lon, lat) in [(min_lon, min_lat), (max_lon, max_lat)] {
            if !lon.is_finite() || !lat.is_finite() {
                return Err(GeometryError::NonFinite { lon, lat });
            }
        }
        if min_lon > max_lon {
            return Err(GeometryError::InvertedBounds { axis: "longitude" });
        }
        if min_lat > max_lat {
            return Err(GeometryError::InvertedBounds { axis: "latitude" });
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Smallest box covering every coordinate, or `None` for an empty input.
    pub fn from_coords<I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = Coord<f64>>,
    {
        coords.into_iter().fold(None, |acc, coord| {
            let point = Self {
                min_lon: coord.x,
                min_lat: coord.y,
                max_lon: coord.x,
                max_lat: coord.y,
            };
            Some(acc.map_or(point, |existing: Self| existing.union(&point)))
        })
    }

    /// Western edge.
    #[must_use]
    pub const fn min_lon(&self) -> f64 {
        self.min_lon
    }

    /// Southern edge.
    #[must_use]
    pub const fn min_lat(&self) -> f64 {
        self.min_lat
    }

    /// Eastern edge.
    #[must_use]
    pub const fn max_lon(&self) -> f64 {
        self.max_lon
    }

    /// Northern edge.
    #[must_use]
    pub const fn max_lat(&self) -> f64 {
        self.max_lat
    }

    /// Extent along the longitude axis.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Extent along the latitude axis.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Boundary-inclusive containment test.
    #[must_use]
    pub fn contains(&self, coord: Coord<f64>) -> bool {
        coord.x >= self.min_lon
            && coord.x <= self.max_lon
            && coord.y >= self.min_lat
            && coord.y <= self.max_lat
    }

    /// Boundary-inclusive overlap test.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    /// Grow the box by `margin` degrees on every side.
    #[must_use]
    pub fn expand(&self, margin: f64) -> Self {
        Self {
            min_lon: self.min_lon - margin,
            min_lat: self.min_lat - margin,
            max_lon: self.max_lon + margin,
            max_lat: self.max_lat + margin,
        }
    }

    /// Smallest box covering both inputs.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_lon: self.min_lon.min(other.min_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lon: self.max_lon.max(other.max_lon),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    /// Intersection of both boxes, or `None` when they do not overlap.
    #[must_use]
    pub fn clip(&self, other: &Self) -> Option<Self> {
        self.intersects(other).then(|| Self {
            min_lon: self.min_lon.max(other.min_lon),
            min_lat: self.min_lat.max(other.min_lat),
            max_lon: self.max_lon.min(other.max_lon),
            max_lat: self.max_lat.min(other.max_lat),
        })
    }

    /// Split into four equal quadrants: south-west, south-east, north-west,
    /// north-east.
    ///
    /// Neighbouring quadrants share their edges exactly, so the union
    /// reconstructs `self` without gaps.
    ///
    /// # Examples
    /// ```
    /// use zoneguard_core::BoundingBox;
    ///
    /// let bbox = BoundingBox::new(0.0, 0.0, 2.0, 2.0).expect("valid bbox");
    /// let [sw, _, _, ne] = bbox.split_quadrants();
    /// assert_eq!(sw, BoundingBox::new(0.0, 0.0, 1.0, 1.0).expect("valid bbox"));
    /// assert_eq!(ne, BoundingBox::new(1.0, 1.0, 2.0, 2.0).expect("valid bbox"));
    /// ```
    #[must_use]
    pub fn split_quadrants(&self) -> [Self; 4] {
        let mid_lon = self.min_lon + self.width() / 2.0;
        let mid_lat = self.min_lat + self.height() / 2.0;
        let quad = |min_lon, min_lat, max_lon, max_lat| Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        [
            quad(self.min_lon, self.min_lat, mid_lon, mid_lat),
            quad(mid_lon, self.min_lat, self.max_lon, mid_lat),
            quad(self.min_lon, mid_lat, mid_lon, self.max_lat),
            quad(mid_lon, mid_lat, self.max_lon, self.max_lat),
        ]
    }

    /// Return `true` when all four bounds differ by at most `tolerance`.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.min_lon - other.min_lon).abs() <= tolerance
            && (self.min_lat - other.min_lat).abs() <= tolerance
            && (self.max_lon - other.max_lon).abs() <= tolerance
            && (self.max_lat - other.max_lat).abs() <= tolerance
    }

    /// Stable textual key identifying the tile covered by this box.
    ///
    /// # Examples
    /// ```
    /// use zoneguard_core::BoundingBox;
    ///
    /// let bbox = BoundingBox::new(37.5, 55.5, 38.0, 56.0).expect("valid bbox");
    /// assert_eq!(bbox.tile_key(), "37.500000_55.500000_38.000000_56.000000");
    /// ```
    #[must_use]
    pub fn tile_key(&self) -> String {
        format!(
            "{:.6}_{:.6}_{:.6}_{:.6}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = GeometryError;

    fn try_from([min_lon, min_lat, max_lon, max_lat]: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(min_lon, min_lat, max_lon, max_lat)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat]
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        let (min, max) = (rect.min(), rect.max());
        Self {
            min_lon: min.x,
            min_lat: min.y,
            max_lon: max.x,
            max_lat: max.y,
        }
    }
}

impl From<BoundingBox> for Rect<f64> {
    fn from(bbox: BoundingBox) -> Self {
        Self::new(
            Coord {
                x: bbox.min_lon,
                y: bbox.min_lat,
            },
            Coord {
                x: bbox.max_lon,
                y: bbox.max_lat,
            },
        )
    }
}

/// Build a closed ring from a coordinate sequence.
///
/// The sequence is closed when its last point does not already match the
/// first. Consecutive duplicates are ignored when counting distinct points.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use zoneguard_core::geometry::close_ring;
///
/// let ring = close_ring(vec![
///     Coord { x: 0.0, y: 0.0 },
///     Coord { x: 1.0, y: 0.0 },
///     Coord { x: 1.0, y: 1.0 },
/// ])
/// .expect("three distinct points");
/// assert!(ring.is_closed());
/// assert_eq!(ring.0.len(), 4);
/// ```
pub fn close_ring(mut coords: Vec<Coord<f64>>) -> Result<Ring, GeometryError> {
    if let Some(bad) = coords
        .iter()
        .find(|coord| !coord.x.is_finite() || !coord.y.is_finite())
    {
        return Err(GeometryError::NonFinite {
            lon: bad.x,
            lat: bad.y,
        });
    }
    coords.dedup_by(|next, prev| approx_eq_coord(*next, *prev));
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied())
        && coords.len() > 1
        && approx_eq_coord(first, last)
    {
        coords.pop();
    }
    if coords.len() < 3 {
        return Err(GeometryError::TooFewPoints {
            distinct: coords.len(),
        });
    }
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    Ok(LineString::new(coords))
}

/// Ray-casting containment test: an odd number of edge crossings means inside.
///
/// Points exactly on an edge may fall either way; callers that need a
/// tolerance should combine this with [`distance_to_ring`].
#[must_use]
pub fn ring_contains(ring: &Ring, point: Coord<f64>) -> bool {
    ring.lines().fold(false, |inside, edge| {
        let (a, b) = (edge.start, edge.end);
        if (a.y > point.y) == (b.y > point.y) {
            return inside;
        }
        let crossing_x = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
        if point.x < crossing_x {
            !inside
        } else {
            inside
        }
    })
}

/// Shortest distance in degrees from `point` to the segment `a`–`b`.
#[must_use]
pub fn point_segment_distance(point: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return (point.x - a.x).hypot(point.y - a.y);
    }
    let t = (((point.x - a.x) * dx + (point.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    let nearest_x = a.x + t * dx;
    let nearest_y = a.y + t * dy;
    (point.x - nearest_x).hypot(point.y - nearest_y)
}

/// Minimum distance in degrees from `point` to any edge of `ring`.
///
/// Returns `f64::INFINITY` for a ring without edges.
#[must_use]
pub fn distance_to_ring(ring: &Ring, point: Coord<f64>) -> f64 {
    ring.lines()
        .map(|edge| point_segment_distance(point, edge.start, edge.end))
        .fold(f64::INFINITY, f64::min)
}

/// Parametric segment–segment intersection test.
///
/// Solves `p1 + t·(p2 − p1) = p3 + u·(p4 − p3)` and reports an intersection
/// when both `t` and `u` fall in `[0, 1]`. Near-parallel segments (including
/// collinear overlaps) are treated as non-intersecting.
#[must_use]
pub fn segments_intersect(
    p1: Coord<f64>,
    p2: Coord<f64>,
    p3: Coord<f64>,
    p4: Coord<f64>,
) -> bool {
    let r = (p2.x - p1.x, p2.y - p1.y);
    let s = (p4.x - p3.x, p4.y - p3.y);
    let denominator = r.0 * s.1 - r.1 * s.0;
    if denominator.abs() < PARALLEL_EPSILON {
        return false;
    }
    let qp = (p3.x - p1.x, p3.y - p1.y);
    let t = (qp.0 * s.1 - qp.1 * s.0) / denominator;
    let u = (qp.0 * r.1 - qp.1 * r.0) / denominator;
    (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)
}

/// Return `true` when any segment of `path` crosses any edge of `ring`.
#[must_use]
pub fn path_crosses_ring(path: &[Coord<f64>], ring: &Ring) -> bool {
    path.windows(2).any(|pair| match pair {
        [start, end] => ring
            .lines()
            .any(|edge| segments_intersect(*start, *end, edge.start, edge.end)),
        _ => false,
    })
}
