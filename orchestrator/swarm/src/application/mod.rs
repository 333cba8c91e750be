// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Stateful coordination services, the project-driving coordination agent
//! and the hub that composes them.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Use cases over the swarm domain

pub mod conflict_resolver;
pub mod coordination_agent;
pub mod health_monitor;
pub mod hub;
pub mod lock_manager;
pub mod message_bus;
pub mod snapshot_manager;

pub use conflict_resolver::{ConflictResolver, ConflictStats};
pub use coordination_agent::{CoordinationAgent, CoordinationError, ProjectOutcome, ProjectValidation, TaskResult};
pub use health_monitor::{HealthMonitor, HealthStats};
pub use hub::{CoordinationHub, EventCounts, HubHealth};
pub use lock_manager::{LockManager, LockStats};
pub use message_bus::{MessageBus, MessageBusStats, MessageHandler, SubscriptionId};
pub use snapshot_manager::{SnapshotManager, SnapshotStats};

use std::time::Duration;
use tokio::time::Instant;

/// Thirty years; stands in for a timeout too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + timeout`, saturating to a far-future instant on overflow.
pub(crate) fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}
