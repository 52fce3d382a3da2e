//! Built-in ingestion districts and their tile grids.

use geo::{Coord, Rect};
use thiserror::Error;
use zoneguard_core::BoundingBox;

/// Default edge length of a top-level tile in degrees.
pub const DEFAULT_TILE_SIZE: f64 = 0.5;

/// Selection keyword covering the whole catalogue.
pub const ALL_DISTRICTS: &str = "all";

/// Upper bound on the top-level tiles planned for one district.
pub const MAX_TILES_PER_DISTRICT: usize = 100_000;

/// Slack absorbing float error when counting grid columns and rows.
const GRID_EPSILON: f64 = 1.0e-9;

/// `(key, name, [min_lon, min_lat, max_lon, max_lat])`.
const CATALOGUE: &[(&str, &str, [f64; 4])] = &[
    ("moscow", "Москва и область", [36.8, 55.1, 38.0, 56.1]),
    ("spb", "Санкт-Петербург", [29.4, 59.6, 30.8, 60.3]),
    ("kaliningrad", "Калининградская область", [19.6, 54.3, 22.9, 55.3]),
    ("crimea", "Крым", [32.4, 44.3, 36.7, 46.3]),
    ("belgorod", "Белгородская область", [35.3, 49.8, 39.3, 51.5]),
];

/// Errors raised while selecting or tiling districts.
#[derive(Debug, Error, PartialEq)]
pub enum DistrictError {
    /// The selection named a district outside the catalogue.
    #[error("unknown district `{key}`; known districts: {known}")]
    Unknown {
        /// Requested key.
        key: String,
        /// Comma-separated catalogue keys.
        known: String,
    },
    /// The selection was empty.
    #[error("no districts selected")]
    Empty,
    /// Tile size was not a positive finite number.
    #[error("tile size must be a positive number of degrees, got {size}")]
    InvalidTileSize {
        /// Rejected size.
        size: f64,
    },
    /// Tile size would cut the district into more tiles than allowed.
    #[error("tile size {size} splits district {district} into more than {limit} tiles")]
    TooManyTiles {
        /// District key.
        district: String,
        /// Rejected size.
        size: f64,
        /// Tile limit per district.
        limit: usize,
    },
}

/// A named ingestion region.
#[derive(Debug, Clone, PartialEq)]
pub struct District {
    /// Short key used on the command line and in progress records.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Region bounds.
    pub bbox: BoundingBox,
}

impl District {
    /// District covering `bbox`.
    #[must_use]
    pub fn new(key: impl Into<String>, name: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            bbox,
        }
    }

    /// Grid of top-level tiles covering the district, row by row from the
    /// south-west corner. Edge tiles are clipped to the district bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use zoneguard_core::BoundingBox;
    /// use zoneguard_data::districts::District;
    ///
    /// let bbox = BoundingBox::new(0.0, 0.0, 1.2, 0.5).expect("valid bbox");
    /// let tiles = District::new("demo", "Demo", bbox).tiles(0.5).expect("valid size");
    /// assert_eq!(tiles.len(), 3);
    /// assert!((tiles[2].width() - 0.2).abs() < 1e-9);
    /// ```
    pub fn tiles(&self, tile_size: f64) -> Result<Vec<BoundingBox>, DistrictError> {
        let (columns, rows) = self.grid(tile_size)?;
        let mut tiles = Vec::with_capacity(columns * rows);
        for row in 0..rows {
            let min_lat = self.bbox.min_lat() + tile_size * row as f64;
            let max_lat = (min_lat + tile_size).min(self.bbox.max_lat());
            for column in 0..columns {
                let min_lon = self.bbox.min_lon() + tile_size * column as f64;
                let max_lon = (min_lon + tile_size).min(self.bbox.max_lon());
                tiles.push(bbox_from(min_lon, min_lat, max_lon, max_lat));
            }
        }
        Ok(tiles)
    }

    /// Number of top-level tiles [`District::tiles`] would plan.
    ///
    /// # Errors
    ///
    /// [`DistrictError::InvalidTileSize`] for non-positive or non-finite
    /// sizes and [`DistrictError::TooManyTiles`] past
    /// [`MAX_TILES_PER_DISTRICT`].
    pub fn tile_count(&self, tile_size: f64) -> Result<usize, DistrictError> {
        let (columns, rows) = self.grid(tile_size)?;
        Ok(columns * rows)
    }

    fn grid(&self, tile_size: f64) -> Result<(usize, usize), DistrictError> {
        if !tile_size.is_finite() || tile_size <= 0.0 {
            return Err(DistrictError::InvalidTileSize { size: tile_size });
        }
        grid_steps(self.bbox.width(), tile_size)
            .zip(grid_steps(self.bbox.height(), tile_size))
            .filter(|(columns, rows)| {
                columns
                    .checked_mul(*rows)
                    .is_some_and(|count| count <= MAX_TILES_PER_DISTRICT)
            })
            .ok_or_else(|| DistrictError::TooManyTiles {
                district: self.key.clone(),
                size: tile_size,
                limit: MAX_TILES_PER_DISTRICT,
            })
    }
}

/// Grid steps along one axis, `None` once a single axis exceeds the tile limit.
fn grid_steps(extent: f64, tile_size: f64) -> Option<usize> {
    let steps = ((extent / tile_size) - GRID_EPSILON).ceil().max(1.0);
    (steps <= MAX_TILES_PER_DISTRICT as f64).then(|| steps as usize)
}

fn bbox_from(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> BoundingBox {
    BoundingBox::from(Rect::new(
        Coord {
            x: min_lon,
            y: min_lat,
        },
        Coord {
            x: max_lon,
            y: max_lat,
        },
    ))
}

/// Every built-in district, in catalogue order.
#[must_use]
pub fn catalogue() -> Vec<District> {
    CATALOGUE
        .iter()
        .map(|(key, name, [min_lon, min_lat, max_lon, max_lat])| {
            District::new(*key, *name, bbox_from(*min_lon, *min_lat, *max_lon, *max_lat))
        })
        .collect()
}

/// Resolve a selection: `all`, one key, or a comma-separated list of keys.
///
/// Repeated keys are kept once, in first-mention order.
pub fn select_districts(selection: &str) -> Result<Vec<District>, DistrictError> {
    let known = catalogue();
    let selection = selection.trim();
    if selection.eq_ignore_ascii_case(ALL_DISTRICTS) {
        return Ok(known);
    }
    let mut chosen: Vec<District> = Vec::new();
    for key in selection.split(',').map(str::trim).filter(|key| !key.is_empty()) {
        if chosen.iter().any(|district| district.key == key) {
            continue;
        }
        let district = known
            .iter()
            .find(|district| district.key == key)
            .ok_or_else(|| DistrictError::Unknown {
                key: key.to_owned(),
                known: known
                    .iter()
                    .map(|district| district.key.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;
        chosen.push(district.clone());
    }
    if chosen.is_empty() {
        return Err(DistrictError::Empty);
    }
    Ok(chosen)
}
