// Directory of snapshot files
// (c) 2024 NetTune contributors

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{ConfigSnapshot, SnapshotId};
use crate::apply::Confirmation;

/// Things that can go wrong in the [`SnapshotStore`]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No snapshot with that identifier
    #[error("snapshot '{0}' not found")]
    NotFound(String),
    /// The identifier cannot name a file in the store
    #[error("invalid snapshot identifier '{0}'")]
    InvalidId(String),
    /// Filesystem failure
    #[error("{}: {source}", path.display())]
    Io {
        /// The file or directory involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// The file is not a well-formed snapshot
    #[error("{}: not a valid snapshot: {source}", path.display())]
    Malformed {
        /// The offending file
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Snapshot files, one per snapshot, in a single directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Constructor. The directory is created on first save.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the snapshots
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &SnapshotId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Persists a snapshot, returning its identifier.
    ///
    /// The identifier is derived from the snapshot's own timestamp, or the current
    /// time if that can't be parsed. An existing snapshot with the same identifier
    /// is overwritten.
    pub fn save(
        &self,
        snapshot: &ConfigSnapshot,
        label: Option<&str>,
    ) -> Result<SnapshotId, StoreError> {
        let at = snapshot
            .captured_at()
            .unwrap_or_else(|| chrono::Local::now().naive_local());
        let id = SnapshotId::for_snapshot(&snapshot.metadata.os, at, label);
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.path_for(&id);
        let json = serde_json::to_string_pretty(snapshot).map_err(|e| StoreError::Malformed {
            path: path.clone(),
            source: e,
        })?;
        fs::write(&path, json).map_err(|e| StoreError::io(&path, e))?;
        info!("saved snapshot {id} to {}", path.display());
        Ok(id)
    }

    /// Identifiers of every stored snapshot, newest first.
    ///
    /// A missing directory is an empty store.
    pub fn list(&self) -> Result<Vec<SnapshotId>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist", self.dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Ok(id) = SnapshotId::parse(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    /// Reads a snapshot
    pub fn load(&self, id: &SnapshotId) -> Result<ConfigSnapshot, StoreError> {
        let path = self.path_for(id);
        let contents = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(id.to_string()),
            _ => StoreError::io(&path, e),
        })?;
        serde_json::from_str(&contents).map_err(|e| StoreError::Malformed { path, source: e })
    }

    /// Removes a snapshot
    pub fn delete(&self, id: &SnapshotId, _confirmation: Confirmation) -> Result<(), StoreError> {
        let path = self.path_for(id);
        fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(id.to_string()),
            _ => StoreError::io(&path, e),
        })?;
        info!("deleted snapshot {id}");
        Ok(())
    }
}
