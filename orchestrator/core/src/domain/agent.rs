// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Identity
//!
//! Agents are addressed by human-readable string ids (`ca-main`, `gfa-3`)
//! rather than UUIDs: wait-for graphs, mailboxes and health records are all
//! keyed by these strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a worker agent participating in a coordinated build.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Role an agent (or a task) plays in the build.
///
/// Roles drive the planner's capacity table: only roles flagged
/// parallel-capable are batched into parallel groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Coordinator,
    Setup,
    Feature,
    Integration,
    Testing,
    Deployment,
}

impl AgentRole {
    pub const ALL: [AgentRole; 6] = [
        AgentRole::Coordinator,
        AgentRole::Setup,
        AgentRole::Feature,
        AgentRole::Integration,
        AgentRole::Testing,
        AgentRole::Deployment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Coordinator => "coordinator",
            AgentRole::Setup => "setup",
            AgentRole::Feature => "feature",
            AgentRole::Integration => "integration",
            AgentRole::Testing => "testing",
            AgentRole::Deployment => "deployment",
        }
    }

    /// Short prefix used when minting worker ids for this role (`gfa-1`).
    pub fn worker_prefix(&self) -> &'static str {
        match self {
            AgentRole::Coordinator => "ca",
            AgentRole::Setup => "gsa",
            AgentRole::Feature => "gfa",
            AgentRole::Integration => "gia",
            AgentRole::Testing => "gta",
            AgentRole::Deployment => "gda",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentRole::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown agent role '{}'", s))
    }
}
