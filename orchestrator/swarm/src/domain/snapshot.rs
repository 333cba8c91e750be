// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # State Snapshots
//!
//! Immutable, timestamped captures of files, lock grants and agent statuses.
//! The file map serialises as an explicit list of `{path, version}` entries so
//! persisted snapshots do not depend on map-key encoding.

use crate::domain::conflict::FileVersion;
use crate::domain::health::AgentStatus;
use crate::domain::lock::LockGrant;
use chrono::{DateTime, Utc};
use genesis_core::domain::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_by: AgentId,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Total content bytes across captured files.
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(with = "file_entries")]
    pub files: HashMap<String, FileVersion>,
    pub locks: Vec<LockGrant>,
    pub agents: Vec<AgentStatus>,
    pub metadata: SnapshotMetadata,
}

/// Shallow comparison of two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Paths present in both whose checksums differ.
    pub modified: Vec<String>,
    pub lock_count_changed: bool,
    pub agent_count_changed: bool,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && !self.lock_count_changed
            && !self.agent_count_changed
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot {0} not found")]
    UnknownSnapshot(Uuid),

    #[error("snapshot persistence is not configured")]
    PersistenceDisabled,

    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

mod file_entries {
    use super::FileVersion;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize)]
    struct FileEntry {
        path: String,
        version: FileVersion,
    }

    #[derive(Serialize)]
    struct FileEntryRef<'a> {
        path: &'a str,
        version: &'a FileVersion,
    }

    pub fn serialize<S: Serializer>(files: &HashMap<String, FileVersion>, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<FileEntryRef> = files
            .iter()
            .map(|(path, version)| FileEntryRef { path, version })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(b.path));
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HashMap<String, FileVersion>, D::Error> {
        let entries = Vec::<FileEntry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.path, e.version)).collect())
    }
}
