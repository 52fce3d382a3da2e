//! Shared test harness modules for the ZoneGuard CLI.

use super::*;

mod helpers;
mod ingest_steps;
