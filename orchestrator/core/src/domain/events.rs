// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::agent::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flat observability record emitted by every coordination service.
///
/// `kind` is a tagged union per event type; `Custom` carries structured
/// data for event types this crate does not model yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Agent the event is about, when there is one.
    pub agent_id: Option<AgentId>,
    #[serde(flatten)]
    pub kind: CoordinationEventKind,
}

impl CoordinationEvent {
    pub fn new(agent_id: Option<AgentId>, kind: CoordinationEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            agent_id,
            kind,
        }
    }

    pub fn for_agent(agent_id: &AgentId, kind: CoordinationEventKind) -> Self {
        Self::new(Some(agent_id.clone()), kind)
    }

    pub fn system(kind: CoordinationEventKind) -> Self {
        Self::new(None, kind)
    }

    /// Stable type tag, identical to the serialized `type` field.
    pub fn event_type(&self) -> &'static str {
        self.kind.type_tag()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "snake_case")]
pub enum CoordinationEventKind {
    // Lock manager
    LockAcquired { resource_id: String, mode: String },
    LockReleased { resource_id: String },
    LockForceReleased { resource_id: String, previous_owners: Vec<AgentId> },
    LockExpired { resource_id: String },
    LockTimeout { resource_id: String, waited_ms: u64 },
    DeadlockDetected { cycle: Vec<AgentId> },

    // Message bus
    MessageSent { message_id: Uuid, message_type: String, recipients: usize },
    MessageEvicted { message_id: Uuid },
    MessagesExpired { count: usize },
    HandlerFailed { message_id: Uuid, error: String },

    // Conflict resolver
    ConflictDetected { path: String, agents: Vec<AgentId> },
    ConflictResolved { path: String, strategy: String },

    // Snapshot manager
    SnapshotCreated { snapshot_id: Uuid, size_bytes: u64 },
    SnapshotPruned { snapshot_id: Uuid },
    AutoSnapshotDue,

    // Health monitor
    AgentRegistered { role: String },
    AgentUnregistered,
    HealthChanged { from: String, to: String },
    HealthCheckFailed { issues: Vec<String> },
    RecoveryTriggered { action: String, reason: String },
    AgentCrashed { reason: String },

    // Coordination agent
    ProjectStarted { project: String },
    PhaseStarted { phase: usize, tasks: usize },
    PhaseCompleted { phase: usize, failed: usize },
    TaskStarted { task_id: String },
    TaskCompleted { task_id: String },
    TaskFailed { task_id: String, error: String },
    ProjectCompleted { project: String, success: bool },
    EmergencyStop { reason: String },

    Custom { name: String, data: serde_json::Value },
}

impl CoordinationEventKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            CoordinationEventKind::LockAcquired { .. } => "lock_acquired",
            CoordinationEventKind::LockReleased { .. } => "lock_released",
            CoordinationEventKind::LockForceReleased { .. } => "lock_force_released",
            CoordinationEventKind::LockExpired { .. } => "lock_expired",
            CoordinationEventKind::LockTimeout { .. } => "lock_timeout",
            CoordinationEventKind::DeadlockDetected { .. } => "deadlock_detected",
            CoordinationEventKind::MessageSent { .. } => "message_sent",
            CoordinationEventKind::MessageEvicted { .. } => "message_evicted",
            CoordinationEventKind::MessagesExpired { .. } => "messages_expired",
            CoordinationEventKind::HandlerFailed { .. } => "handler_failed",
            CoordinationEventKind::ConflictDetected { .. } => "conflict_detected",
            CoordinationEventKind::ConflictResolved { .. } => "conflict_resolved",
            CoordinationEventKind::SnapshotCreated { .. } => "snapshot_created",
            CoordinationEventKind::SnapshotPruned { .. } => "snapshot_pruned",
            CoordinationEventKind::AutoSnapshotDue => "auto_snapshot_due",
            CoordinationEventKind::AgentRegistered { .. } => "agent_registered",
            CoordinationEventKind::AgentUnregistered => "agent_unregistered",
            CoordinationEventKind::HealthChanged { .. } => "health_changed",
            CoordinationEventKind::HealthCheckFailed { .. } => "health_check_failed",
            CoordinationEventKind::RecoveryTriggered { .. } => "recovery_triggered",
            CoordinationEventKind::AgentCrashed { .. } => "agent_crashed",
            CoordinationEventKind::ProjectStarted { .. } => "project_started",
            CoordinationEventKind::PhaseStarted { .. } => "phase_started",
            CoordinationEventKind::PhaseCompleted { .. } => "phase_completed",
            CoordinationEventKind::TaskStarted { .. } => "task_started",
            CoordinationEventKind::TaskCompleted { .. } => "task_completed",
            CoordinationEventKind::TaskFailed { .. } => "task_failed",
            CoordinationEventKind::ProjectCompleted { .. } => "project_completed",
            CoordinationEventKind::EmergencyStop { .. } => "emergency_stop",
            CoordinationEventKind::Custom { .. } => "custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_flat_with_type_tag() {
        let event = CoordinationEvent::for_agent(
            &AgentId::new("gfa-1"),
            CoordinationEventKind::LockAcquired {
                resource_id: "src/app.ts".to_string(),
                mode: "write".to_string(),
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "lock_acquired");
        assert_eq!(value["agent_id"], "gfa-1");
        assert_eq!(value["details"]["resource_id"], "src/app.ts");
        assert_eq!(event.event_type(), "lock_acquired");
    }

    #[test]
    fn test_custom_event_roundtrip() {
        let event = CoordinationEvent::system(CoordinationEventKind::Custom {
            name: "quality_gate".to_string(),
            data: serde_json::json!({"score": 0.92}),
        });
        let json = serde_json::to_string(&event).unwrap();
        let parsed: CoordinationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.event_type(), "custom");
    }
}
