// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # File Conflicts
//!
//! Divergent versions of one logical file written by different agents.
//! Checksum equality is the only conflict signal.

use chrono::{DateTime, Utc};
use genesis_core::domain::agent::AgentId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Hex-encoded SHA-256 of `content`.
pub fn content_checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    pub content: String,
    pub author: AgentId,
    pub modified_at: DateTime<Utc>,
    pub checksum: String,
}

impl FileVersion {
    pub fn new(content: impl Into<String>, author: AgentId) -> Self {
        let content = content.into();
        Self {
            checksum: content_checksum(&content),
            content,
            author,
            modified_at: Utc::now(),
        }
    }

    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = modified_at;
        self
    }

    pub fn size_bytes(&self) -> u64 {
        self.content.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two or more agents wrote different content.
    ConcurrentModification,
    /// A base was recorded and every supplied version moved away from it.
    BaseDivergence,
}

/// Strategy tag recorded on a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Merge,
    Overwrite,
    Reject,
    Manual,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Merge => "merge",
            StrategyKind::Overwrite => "overwrite",
            StrategyKind::Reject => "reject",
            StrategyKind::Manual => "manual",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConflictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "merge" => Ok(StrategyKind::Merge),
            "overwrite" => Ok(StrategyKind::Overwrite),
            "reject" => Ok(StrategyKind::Reject),
            "manual" => Ok(StrategyKind::Manual),
            other => Err(ConflictError::UnknownStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Naive two-way merge; more than two versions fall back to the newest.
    Merge,
    /// Newest version wins wholesale.
    Overwrite,
    /// Restore the recorded base, or empty content.
    Reject,
    /// Caller-supplied content.
    Manual { content: String },
}

impl ResolutionStrategy {
    /// Build a strategy from its name. `manual` requires `content`.
    pub fn from_name(name: &str, content: Option<String>) -> Result<Self, ConflictError> {
        Ok(match name.parse::<StrategyKind>()? {
            StrategyKind::Merge => ResolutionStrategy::Merge,
            StrategyKind::Overwrite => ResolutionStrategy::Overwrite,
            StrategyKind::Reject => ResolutionStrategy::Reject,
            StrategyKind::Manual => ResolutionStrategy::Manual {
                content: content.ok_or(ConflictError::MissingManualContent)?,
            },
        })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            ResolutionStrategy::Merge => StrategyKind::Merge,
            ResolutionStrategy::Overwrite => StrategyKind::Overwrite,
            ResolutionStrategy::Reject => StrategyKind::Reject,
            ResolutionStrategy::Manual { .. } => StrategyKind::Manual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub strategy: StrategyKind,
    pub content: String,
    pub resolver: AgentId,
    pub resolved_at: DateTime<Utc>,
    /// Author whose version was accepted unchanged, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_version: Option<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConflict {
    pub id: Uuid,
    pub path: String,
    pub kind: ConflictKind,
    pub agents: Vec<AgentId>,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<FileVersion>,
    pub versions: BTreeMap<AgentId, FileVersion>,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ConflictResolution>,
}

impl FileConflict {
    /// Most recently modified version; the later author wins a timestamp tie.
    pub fn newest_version(&self) -> Option<&FileVersion> {
        self.versions.values().max_by_key(|v| v.modified_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("unknown conflict resolution strategy '{0}'")]
    UnknownStrategy(String),

    #[error("manual resolution requires content")]
    MissingManualContent,
}
