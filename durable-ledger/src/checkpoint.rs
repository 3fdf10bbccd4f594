//! Checkpoint store
//!
//! Persists the single LSN marking how many log bytes are reflected in the
//! snapshots. The store enforces no ordering; the orchestrator only writes
//! after the snapshots for that LSN are durable.

use crate::{
    storage,
    types::{CheckpointMarker, Lsn},
    Error, Result,
};
use std::io;
use std::path::{Path, PathBuf};

/// File-backed checkpoint marker
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create a store for the marker at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the committed LSN; 0 if no checkpoint was ever written
    pub fn read(&self) -> Result<Lsn> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        // Writes go through rename, so a bad marker is not a torn write.
        let marker: CheckpointMarker = serde_json::from_slice(&bytes).map_err(|e| {
            Error::Corruption(format!(
                "checkpoint {} is unreadable: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(marker.lsn)
    }

    /// Atomically replace the marker with `lsn`
    pub fn write(&self, lsn: Lsn) -> Result<()> {
        storage::ensure_parent(&self.path)?;

        let mut contents = serde_json::to_vec(&CheckpointMarker { lsn })?;
        contents.push(b'\n');
        storage::write_atomic(&self.path, &contents)?;

        tracing::debug!(lsn, path = %self.path.display(), "Checkpoint written");
        Ok(())
    }

    /// Path of the marker file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
