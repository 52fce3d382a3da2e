//! Command-line interface for ZoneGuard ingestion and operator checks.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod check;
mod error;
mod ingest;

pub use error::CliError;

use check::{CheckArgs, run_check};
use ingest::{IngestCommand, run_ingest};

pub(crate) const ARG_DISTRICT: &str = "district";
pub(crate) const ARG_ENDPOINT: &str = "endpoint";
pub(crate) const ARG_IMPORT_URL: &str = "import-url";
pub(crate) const ARG_CLEAR_URL: &str = "clear-url";
pub(crate) const ARG_ZONES_FILE: &str = "zones-file";
pub(crate) const ARG_CACHE_DIR: &str = "cache-dir";
pub(crate) const ARG_PROGRESS_FILE: &str = "progress-file";
pub(crate) const ARG_TILE_SIZE: &str = "tile-size";
pub(crate) const ARG_CONCURRENCY: &str = "concurrency";
pub(crate) const ARG_MAX_SPLIT_DEPTH: &str = "max-split-depth";
pub(crate) const ARG_REQUEST_DELAY_MS: &str = "request-delay-ms";
pub(crate) const ARG_POINT: &str = "point";
pub(crate) const ARG_LINE: &str = "line";
pub(crate) const ENV_CHECK_POINT: &str = "ZONEGUARD_CMDS_CHECK_POINT";

/// Run the ZoneGuard CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Ingest(command) => run_ingest(command),
        Command::Check(args) => run_check(args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "zoneguard",
    about = "Restricted-zone ingestion and lookup for the ZoneGuard engine",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Fetch restricted areas district by district and import them as zones.
    Ingest(IngestCommand),
    /// Check a point or a line against a persisted zone file.
    Check(CheckArgs),
}

#[cfg(test)]
mod tests;
