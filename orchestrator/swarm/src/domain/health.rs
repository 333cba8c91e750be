// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Health
//!
//! Status records, health-check results and recovery decisions kept by the
//! health monitor.
//!
//! ## State Machine
//!
//! ```text
//! Healthy <-> Degraded          (health checks: error rate, task load)
//! any     --> Unhealthy         (stale heartbeat, error threshold)
//! Unhealthy --heartbeat--> Healthy
//! any     --report_crash--> Crashed   (terminal until re-registered)
//! ```

use chrono::{DateTime, Utc};
use genesis_core::domain::agent::{AgentId, AgentRole};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentHealth {
    Healthy,
    Degraded,
    Unhealthy,
    Crashed,
}

impl AgentHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentHealth::Healthy => "healthy",
            AgentHealth::Degraded => "degraded",
            AgentHealth::Unhealthy => "unhealthy",
            AgentHealth::Crashed => "crashed",
        }
    }
}

impl fmt::Display for AgentHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: AgentId,
    pub role: AgentRole,
    pub health: AgentHealth,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    pub tasks_in_progress: u32,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub error_count: u32,
}

impl AgentStatus {
    pub fn new(agent_id: AgentId, role: AgentRole) -> Self {
        let now = Utc::now();
        Self {
            agent_id,
            role,
            health: AgentHealth::Healthy,
            registered_at: now,
            last_heartbeat: now,
            current_task: None,
            tasks_in_progress: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            error_count: 0,
        }
    }

    /// Errors per completed task; an agent with no completions counts as one.
    pub fn error_rate(&self) -> f64 {
        self.error_count as f64 / self.tasks_completed.max(1) as f64
    }
}

/// Partial update merged into an [`AgentStatus`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub current_task: Option<String>,
    pub tasks_in_progress: Option<u32>,
    pub tasks_completed: Option<u32>,
    pub tasks_failed: Option<u32>,
    pub error_count: Option<u32>,
}

impl StatusUpdate {
    pub fn in_progress(mut self, count: u32) -> Self {
        self.tasks_in_progress = Some(count);
        self
    }

    pub fn completed(mut self, count: u32) -> Self {
        self.tasks_completed = Some(count);
        self
    }

    pub fn failed(mut self, count: u32) -> Self {
        self.tasks_failed = Some(count);
        self
    }

    pub fn errors(mut self, count: u32) -> Self {
        self.error_count = Some(count);
        self
    }

    pub fn task(mut self, task_id: impl Into<String>) -> Self {
        self.current_task = Some(task_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub agent_id: AgentId,
    pub checked_at: DateTime<Utc>,
    pub heartbeat_ok: bool,
    pub error_rate_ok: bool,
    pub load_ok: bool,
    pub error_rate: f64,
    pub status: AgentHealth,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl HealthCheck {
    pub fn passed(&self) -> bool {
        self.heartbeat_ok && self.error_rate_ok && self.load_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryKind {
    Restart,
    ReassignTasks,
    ReleaseLocks,
    Isolate,
    Terminate,
}

impl RecoveryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryKind::Restart => "restart",
            RecoveryKind::ReassignTasks => "reassign_tasks",
            RecoveryKind::ReleaseLocks => "release_locks",
            RecoveryKind::Isolate => "isolate",
            RecoveryKind::Terminate => "terminate",
        }
    }
}

impl fmt::Display for RecoveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recovery decision. Recorded as completed when chosen; carrying out the
/// remedy is up to whoever consumes the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub id: Uuid,
    pub agent_id: AgentId,
    pub kind: RecoveryKind,
    pub reason: String,
    pub triggered_at: DateTime<Utc>,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HealthError {
    #[error("agent {0} is not registered with the health monitor")]
    UnknownAgent(AgentId),
}
