// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Messages
//!
//! Prioritised messages exchanged over the in-process message bus. Payloads
//! are a tagged union per message type with a `Custom` catch-all.

use chrono::{DateTime, Utc};
use genesis_core::domain::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Delivery priority; mailboxes are ordered critical > high > normal > low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessagePriority::Low => "low",
            MessagePriority::Normal => "normal",
            MessagePriority::High => "high",
            MessagePriority::Critical => "critical",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTarget {
    Agent(AgentId),
    Agents(Vec<AgentId>),
    /// Every registered mailbox except the sender's.
    Broadcast,
}

impl From<AgentId> for MessageTarget {
    fn from(agent: AgentId) -> Self {
        MessageTarget::Agent(agent)
    }
}

impl From<&AgentId> for MessageTarget {
    fn from(agent: &AgentId) -> Self {
        MessageTarget::Agent(agent.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum MessagePayload {
    TaskAssignment {
        task_id: String,
        title: String,
        #[serde(default)]
        details: serde_json::Value,
    },
    StatusUpdate {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f32>,
    },
    Query(serde_json::Value),
    Response(serde_json::Value),
    LockNotification {
        resource_id: String,
        released: bool,
    },
    ConflictAlert {
        path: String,
        agents: Vec<AgentId>,
    },
    Heartbeat,
    Custom {
        kind: String,
        data: serde_json::Value,
    },
}

impl MessagePayload {
    pub fn type_tag(&self) -> &str {
        match self {
            MessagePayload::TaskAssignment { .. } => "task_assignment",
            MessagePayload::StatusUpdate { .. } => "status_update",
            MessagePayload::Query(_) => "query",
            MessagePayload::Response(_) => "response",
            MessagePayload::LockNotification { .. } => "lock_notification",
            MessagePayload::ConflictAlert { .. } => "conflict_alert",
            MessagePayload::Heartbeat => "heartbeat",
            MessagePayload::Custom { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub from: AgentId,
    pub to: MessageTarget,
    pub payload: MessagePayload,
    pub priority: MessagePriority,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AgentMessage {
    pub fn new(from: AgentId, to: impl Into<MessageTarget>, payload: MessagePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to: to.into(),
            payload,
            priority: MessagePriority::Normal,
            timestamp: Utc::now(),
            correlation_id: None,
            expires_at: None,
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.expires_at = self.timestamp.checked_add_signed(ttl);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn is_response_to(&self, correlation_id: Uuid) -> bool {
        matches!(self.payload, MessagePayload::Response(_)) && self.correlation_id == Some(correlation_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("recipient {0} has no registered mailbox")]
    UnknownRecipient(AgentId),

    #[error("agent {0} has no registered mailbox")]
    UnknownAgent(AgentId),

    #[error("no response from {to} within {waited_ms}ms")]
    Timeout { to: AgentId, waited_ms: u64 },
}
