// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// File Snapshot Store
//
// One pretty-printed JSON document per snapshot, named `{id}.json`, in a
// single directory. Writes go to a temporary sibling first and are renamed
// into place. Loading a directory that does not exist yields no snapshots;
// unreadable or malformed files are skipped with a warning.

use crate::domain::snapshot::{SnapshotError, StateSnapshot};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const SNAPSHOT_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    directory: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, id: &Uuid) -> PathBuf {
        self.directory.join(format!("{id}.{SNAPSHOT_EXTENSION}"))
    }

    pub fn save(&self, snapshot: &StateSnapshot) -> Result<PathBuf, SnapshotError> {
        std::fs::create_dir_all(&self.directory).map_err(|source| SnapshotError::Io {
            path: self.directory.clone(),
            source,
        })?;

        let path = self.path_for(&snapshot.id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&tmp, body).map_err(|source| SnapshotError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(snapshot_id = %snapshot.id, path = %path.display(), "Snapshot persisted");
        Ok(path)
    }

    pub fn load_all(&self) -> Result<Vec<StateSnapshot>, SnapshotError> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: self.directory.clone(),
                    source,
                })
            }
        };

        let mut snapshots = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            let parsed = std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| serde_json::from_slice::<StateSnapshot>(&bytes).map_err(|e| e.to_string()));
            match parsed {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(error) => warn!(path = %path.display(), error = %error, "Skipping unreadable snapshot file"),
            }
        }
        snapshots.sort_by_key(|s| s.timestamp);
        Ok(snapshots)
    }

    /// Returns `false` when no file existed for `id`.
    pub fn remove(&self, id: &Uuid) -> Result<bool, SnapshotError> {
        let path = self.path_for(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SnapshotError::Io { path, source }),
        }
    }
}
