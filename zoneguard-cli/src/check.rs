//! Check command implementation for the ZoneGuard CLI.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use geo::Coord;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use zoneguard_core::geometry::is_valid_lon_lat;
use zoneguard_core::{HitResult, StoreConfig, ZoneService};

use crate::ingest::DEFAULT_ZONES_FILE;
use crate::{ARG_LINE, ARG_POINT, ARG_ZONES_FILE, CliError, ENV_CHECK_POINT};

/// CLI arguments for the `check` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "check",
    long_about = "Load a persisted zone file and report every zone that \
                 contains or buffers a point, or that a polyline touches. \
                 Results are printed as pretty JSON.",
    about = "Check a point or line against stored zones"
)]
#[ortho_config(prefix = "ZONEGUARD")]
pub(crate) struct CheckArgs {
    /// Zone store file to check against (`zones.geojson`).
    #[arg(long = ARG_ZONES_FILE, value_name = "path")]
    #[serde(default)]
    pub(crate) zones_file: Option<Utf8PathBuf>,
    /// Point as `lon,lat`.
    #[arg(long = ARG_POINT, value_name = "lon,lat", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) point: Option<String>,
    /// Polyline as `lon,lat;lon,lat;...`.
    #[arg(long = ARG_LINE, value_name = "lon,lat;...", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) line: Option<String>,
}

impl CheckArgs {
    pub(crate) fn into_config(self) -> Result<CheckCommandConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        CheckCommandConfig::try_from(merged)
    }
}

/// Geometry to check.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CheckQuery {
    /// A single position.
    Point(Coord<f64>),
    /// A polyline with at least two vertices.
    Line(Vec<Coord<f64>>),
}

/// Resolved `check` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CheckCommandConfig {
    pub(crate) zones_file: Utf8PathBuf,
    pub(crate) query: CheckQuery,
}

impl CheckCommandConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        match zoneguard_fs::file_is_file(&self.zones_file) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CliError::SourcePathNotFile {
                field: ARG_ZONES_FILE,
                path: self.zones_file.clone(),
            }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(CliError::MissingSourceFile {
                    field: ARG_ZONES_FILE,
                    path: self.zones_file.clone(),
                })
            }
            Err(source) => Err(CliError::InspectSourcePath {
                field: ARG_ZONES_FILE,
                path: self.zones_file.clone(),
                source,
            }),
        }
    }
}

impl TryFrom<CheckArgs> for CheckCommandConfig {
    type Error = CliError;

    fn try_from(args: CheckArgs) -> Result<Self, Self::Error> {
        let query = match (args.point, args.line) {
            (Some(_), Some(_)) => {
                return Err(CliError::ConflictingArguments {
                    first: ARG_POINT,
                    second: ARG_LINE,
                });
            }
            (Some(point), None) => CheckQuery::Point(parse_position(ARG_POINT, &point, &point)?),
            (None, Some(line)) => CheckQuery::Line(parse_line(&line)?),
            (None, None) => {
                return Err(CliError::MissingArgument {
                    field: ARG_POINT,
                    env: ENV_CHECK_POINT,
                });
            }
        };
        Ok(Self {
            zones_file: args
                .zones_file
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_ZONES_FILE)),
            query,
        })
    }
}

fn parse_line(value: &str) -> Result<Vec<Coord<f64>>, CliError> {
    let path = value
        .split(';')
        .map(str::trim)
        .filter(|vertex| !vertex.is_empty())
        .map(|vertex| parse_position(ARG_LINE, value, vertex))
        .collect::<Result<Vec<_>, _>>()?;
    if path.len() < 2 {
        return Err(CliError::InvalidCoordinates {
            field: ARG_LINE,
            value: value.to_owned(),
            reason: "a line needs at least two vertices".to_owned(),
        });
    }
    Ok(path)
}

fn parse_position(field: &'static str, value: &str, vertex: &str) -> Result<Coord<f64>, CliError> {
    let invalid = |reason: String| CliError::InvalidCoordinates {
        field,
        value: value.to_owned(),
        reason,
    };
    let Some((lon, lat)) = vertex.split_once(',') else {
        return Err(invalid(format!("expected `lon,lat`, got `{vertex}`")));
    };
    let parse = |text: &str| {
        text.trim()
            .parse::<f64>()
            .map_err(|err| invalid(format!("`{}` is not a number: {err}", text.trim())))
    };
    let coord = Coord {
        x: parse(lon)?,
        y: parse(lat)?,
    };
    if is_valid_lon_lat(coord) {
        Ok(coord)
    } else {
        Err(invalid(format!("`{vertex}` is outside WGS84 bounds")))
    }
}

pub(super) fn run_check(args: CheckArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_check_with(args, &mut stdout)
}

pub(crate) fn run_check_with(args: CheckArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    let hits = execute_check(&config.zones_file, &config.query)?;
    write_hits(writer, &hits)
}

fn execute_check(zones_file: &Utf8Path, query: &CheckQuery) -> Result<Vec<HitResult>, CliError> {
    let service =
        ZoneService::open(StoreConfig::new(zones_file)).map_err(|source| CliError::OpenStore {
            path: zones_file.to_path_buf(),
            source,
        })?;
    Ok(match query {
        CheckQuery::Point(point) => service.point_check(point.x, point.y),
        CheckQuery::Line(path) => {
            let coords: Vec<[f64; 2]> = path.iter().map(|coord| [coord.x, coord.y]).collect();
            service.line_check(&coords)
        }
    })
}

fn write_hits(writer: &mut dyn Write, hits: &[HitResult]) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(hits).map_err(CliError::SerializeHits)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn check_config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<CheckCommandConfig, CliError> {
    let merged = CheckArgs::merge_from_layers(layers).map_err(CliError::from)?;
    CheckCommandConfig::try_from(merged)
}
