//! Test helpers for CLI workspaces and argument parsing.

use super::*;
use crate::ingest::{IngestCommand, IngestConfig};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

/// Temporary directory addressed through UTF-8 paths.
#[derive(Debug)]
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    /// Flags pointing every ingest artefact into the workspace.
    pub(super) fn ingest_flags(&self) -> Vec<String> {
        vec![
            "--zones-file".to_owned(),
            self.path("zones.geojson").into_string(),
            "--cache-dir".to_owned(),
            self.path("tiles").into_string(),
            "--progress-file".to_owned(),
            self.path("progress.json").into_string(),
        ]
    }
}

pub(super) fn write_utf8(path: &Utf8Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent directory");
    }
    fs::write(path, bytes).expect("write file");
}

/// Parse `zoneguard ingest <args>` without consulting files or environment.
pub(super) fn parse_ingest(args: &[String]) -> Result<(IngestCommand, IngestConfig), CliError> {
    let mut argv = vec!["zoneguard".to_owned(), "ingest".to_owned()];
    argv.extend(args.iter().cloned());
    let cli = Cli::try_parse_from(argv).map_err(CliError::from)?;
    match cli.command {
        Command::Ingest(command) => {
            let config = IngestConfig::try_from(command.settings.clone())?;
            Ok((command, config))
        }
        Command::Check(_) => panic!("expected ingest command"),
    }
}
