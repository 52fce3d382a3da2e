//! Background persistence for the zone store.
//!
//! A single writer thread owns the target file. Callers hand it the newest
//! snapshot and return immediately; snapshots that arrive while a write is
//! pending replace the older one, so only the latest state reaches disk.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{SecondsFormat, Utc};
use log::{debug, warn};
use thiserror::Error;

use crate::geojson::{CollectionMeta, FeatureCollection, GeoJsonDocument, GeoJsonError};
use crate::zone::Zone;

/// Errors raised while reading or writing the persisted zone file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem access failed.
    #[error("failed to access zone file {path}")]
    Io {
        /// File being accessed.
        path: Utf8PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// The snapshot could not be encoded as JSON.
    #[error("failed to encode zone snapshot")]
    Encode {
        /// Underlying encoder failure.
        #[source]
        source: serde_json::Error,
    },
    /// The persisted file was not a readable GeoJSON document.
    #[error("failed to decode zone file {path}")]
    Decode {
        /// File being read.
        path: Utf8PathBuf,
        /// Underlying decode failure.
        #[source]
        source: GeoJsonError,
    },
}

/// Serialise `zones` as a GeoJSON collection stamped with the save time.
pub fn encode_zones(zones: &[Zone]) -> Result<Vec<u8>, PersistenceError> {
    let collection = FeatureCollection::from_zones(zones).with_meta(CollectionMeta {
        saved_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        total_zones: zones.len(),
    });
    serde_json::to_vec_pretty(&collection).map_err(|source| PersistenceError::Encode { source })
}

/// Write `zones` to `path` atomically.
pub fn write_zones(path: &Utf8Path, zones: &[Zone]) -> Result<(), PersistenceError> {
    let bytes = encode_zones(zones)?;
    zoneguard_fs::write_atomic(path, &bytes).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read the persisted document at `path`, or `None` when the file is absent.
pub fn read_document(path: &Utf8Path) -> Result<Option<GeoJsonDocument>, PersistenceError> {
    let Some(text) =
        zoneguard_fs::read_optional_string(path).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?
    else {
        return Ok(None);
    };
    GeoJsonDocument::parse(&text)
        .map(Some)
        .map_err(|source| PersistenceError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

enum Command {
    Write,
    Flush(Sender<()>),
}

type Slot = Arc<Mutex<Option<Vec<Zone>>>>;

/// Fire-and-forget writer for zone snapshots.
pub struct ZonePersister {
    path: Utf8PathBuf,
    pending: Slot,
    sender: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ZonePersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZonePersister")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ZonePersister {
    /// Start the writer thread for `path`.
    pub fn spawn(path: Utf8PathBuf) -> Result<Self, PersistenceError> {
        let pending: Slot = Arc::new(Mutex::new(None));
        let (sender, receiver) = mpsc::channel();
        let worker = {
            let target = path.clone();
            let slot = Arc::clone(&pending);
            thread::Builder::new()
                .name("zone-persister".to_owned())
                .spawn(move || run_writer(&target, &slot, &receiver))
                .map_err(|source| PersistenceError::Io {
                    path: path.clone(),
                    source,
                })?
        };
        Ok(Self {
            path,
            pending,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Target file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Queue `zones` for writing, replacing any snapshot not yet written.
    pub fn persist(&self, zones: Vec<Zone>) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(zones);
        self.send(Command::Write);
    }

    /// Block until every queued snapshot has been written.
    pub fn flush(&self) {
        let (ack, done) = mpsc::channel();
        self.send(Command::Flush(ack));
        if done.recv().is_err() {
            warn!("zone persister stopped before acknowledging flush");
        }
    }

    fn send(&self, command: Command) {
        let delivered = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(command).is_ok());
        if !delivered {
            warn!("zone persister for {} is not running", self.path);
        }
    }
}

impl Drop for ZonePersister {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("zone persister thread panicked");
        }
    }
}

fn run_writer(path: &Utf8Path, pending: &Slot, commands: &Receiver<Command>) {
    for command in commands {
        write_pending(path, pending);
        if let Command::Flush(ack) = command {
            // The flusher may have given up waiting.
            let _ = ack.send(());
        }
    }
    write_pending(path, pending);
}

fn write_pending(path: &Utf8Path, pending: &Slot) {
    let Some(zones) = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    else {
        return;
    };
    match write_zones(path, &zones) {
        Ok(()) => debug!("persisted {} zones to {path}", zones.len()),
        Err(err) => warn!("failed to persist zones to {path}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;
    use crate::geometry::close_ring;
    use geo::Coord;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn target() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        (dir, root.join("zones.geojson"))
    }

    fn zone(name: &str) -> Zone {
        let ring = close_ring(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
        ])
        .expect("ring");
        Zone::new(name, "military", Severity::Critical, vec![ring]).expect("zone")
    }

    #[rstest]
    fn flush_writes_only_the_newest_snapshot(#[from(target)] (_dir, path): (TempDir, Utf8PathBuf)) {
        let persister = ZonePersister::spawn(path.clone()).expect("spawn");
        persister.persist(vec![zone("old")]);
        persister.persist(vec![zone("new"), zone("newer")]);
        persister.flush();

        let doc = read_document(&path).expect("read").expect("file written");
        let GeoJsonDocument::FeatureCollection(collection) = doc else {
            panic!("expected a feature collection");
        };
        assert_eq!(collection.features.len(), 2);
        assert_eq!(collection.meta.map(|m| m.total_zones), Some(2));
    }

    #[rstest]
    fn drop_drains_pending_writes(#[from(target)] (_dir, path): (TempDir, Utf8PathBuf)) {
        {
            let persister = ZonePersister::spawn(path.clone()).expect("spawn");
            persister.persist(vec![zone("only")]);
        }
        assert!(read_document(&path).expect("read").is_some());
    }

    #[rstest]
    fn missing_file_reads_as_none(#[from(target)] (_dir, path): (TempDir, Utf8PathBuf)) {
        assert!(read_document(&path).expect("read").is_none());
    }

    #[rstest]
    fn corrupt_file_is_a_decode_error(#[from(target)] (_dir, path): (TempDir, Utf8PathBuf)) {
        zoneguard_fs::write_atomic(&path, b"not json").expect("seed");
        let err = read_document(&path).expect_err("corrupt");
        assert!(matches!(err, PersistenceError::Decode { .. }));
    }

    #[rstest]
    fn write_failures_are_reported(#[from(target)] (_dir, path): (TempDir, Utf8PathBuf)) {
        // A directory squatting on the target path blocks the rename.
        zoneguard_fs::ensure_dir(&path).expect("mkdir");
        zoneguard_fs::write_atomic(&path.join("keep"), b"x").expect("populate");
        let err = write_zones(&path, &[zone("a")]).expect_err("target is a directory");
        assert!(matches!(err, PersistenceError::Io { .. }));
    }
}
