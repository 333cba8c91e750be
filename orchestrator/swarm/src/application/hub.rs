// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Coordination Hub
//!
//! Composition root for the five coordination services. The hub owns one
//! instance of each, gives each its own bounded event log, starts and stops
//! their background loops, and reports a combined health view.
//!
//! Lifecycle:
//! 1. `new` builds every service from a [`CoordinationConfig`]
//! 2. `initialize` loads persisted snapshots and starts the lock expiration
//!    sweep, the message expiry sweep, health monitoring and (if configured)
//!    the auto-snapshot trigger
//! 3. `shutdown` cancels the loops, waits for them and persists snapshots
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Service composition and lifecycle

use crate::application::conflict_resolver::{ConflictResolver, ConflictStats};
use crate::application::coordination_agent::CoordinationAgent;
use crate::application::health_monitor::{HealthMonitor, HealthStats};
use crate::application::lock_manager::{LockManager, LockStats};
use crate::application::message_bus::{MessageBus, MessageBusStats};
use crate::application::snapshot_manager::{SnapshotManager, SnapshotStats};
use crate::domain::conflict::FileVersion;
use crate::domain::executor::TaskExecutor;
use crate::domain::snapshot::{SnapshotError, StateSnapshot};
use chrono::{DateTime, Utc};
use genesis_core::domain::agent::AgentId;
use genesis_core::domain::config::CoordinationConfig;
use genesis_core::domain::events::CoordinationEvent;
use genesis_core::infrastructure::event_bus::EventBus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_COORDINATOR_ID: &str = "ca-main";

/// Events retained by each service's log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub locks: usize,
    pub messages: usize,
    pub conflicts: usize,
    pub snapshots: usize,
    pub health: usize,
    pub coordination: usize,
}

impl EventCounts {
    pub fn total(&self) -> usize {
        self.locks + self.messages + self.conflicts + self.snapshots + self.health + self.coordination
    }
}

/// Statistics of every service at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubHealth {
    pub coordinator: AgentId,
    pub initialized: bool,
    pub captured_at: DateTime<Utc>,
    pub events_recorded: EventCounts,
    pub locks: LockStats,
    pub messages: MessageBusStats,
    pub conflicts: ConflictStats,
    pub snapshots: SnapshotStats,
    pub health: HealthStats,
}

#[derive(Default)]
struct Runtime {
    shutdown: Option<CancellationToken>,
    loops: Vec<JoinHandle<()>>,
}

pub struct CoordinationHub {
    id: AgentId,
    config: CoordinationConfig,
    /// Log of the coordination agents built by this hub.
    coordination_events: EventBus,
    locks: Arc<LockManager>,
    messages: Arc<MessageBus>,
    conflicts: Arc<ConflictResolver>,
    snapshots: Arc<SnapshotManager>,
    health: Arc<HealthMonitor>,
    runtime: Mutex<Runtime>,
}

impl CoordinationHub {
    pub fn new(config: CoordinationConfig) -> Self {
        Self::with_id(AgentId::new(DEFAULT_COORDINATOR_ID), config)
    }

    pub fn with_id(id: AgentId, config: CoordinationConfig) -> Self {
        let capacity = config.events.capacity;
        Self {
            locks: Arc::new(LockManager::new(config.locks.clone(), EventBus::new(capacity))),
            messages: Arc::new(MessageBus::new(config.messaging.clone(), EventBus::new(capacity))),
            conflicts: Arc::new(ConflictResolver::new(EventBus::new(capacity))),
            snapshots: Arc::new(SnapshotManager::new(config.snapshots.clone(), EventBus::new(capacity))),
            health: Arc::new(HealthMonitor::new(config.health.clone(), EventBus::new(capacity))),
            coordination_events: EventBus::new(capacity),
            id,
            config,
            runtime: Mutex::new(Runtime::default()),
        }
    }

    /// Load persisted snapshots and start the background loops. Calling it
    /// again while initialized does nothing.
    pub fn initialize(&self) -> Result<(), SnapshotError> {
        if self.is_initialized() {
            return Ok(());
        }

        if self.snapshots.persistence_enabled() {
            let loaded = self.snapshots.load_from_disk()?;
            info!(loaded, "Restored persisted snapshots");
        }

        let shutdown = CancellationToken::new();
        let mut loops = vec![
            self.locks.clone().start_expiration_sweep(shutdown.child_token()),
            self.messages.clone().start_expiry_sweep(shutdown.child_token()),
            self.health.clone().start_monitoring(shutdown.child_token()),
        ];
        if let Some(handle) = self.snapshots.clone().start_auto_snapshot(shutdown.child_token()) {
            loops.push(handle);
        }

        info!(coordinator = %self.id, loops = loops.len(), "Coordination hub initialized");
        let mut runtime = self.runtime.lock();
        runtime.shutdown = Some(shutdown);
        runtime.loops = loops;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.lock().shutdown.is_some()
    }

    /// Stop the background loops and persist snapshots when a directory is
    /// configured. Safe to call when not initialized.
    pub async fn shutdown(&self) {
        let (token, loops) = {
            let mut runtime = self.runtime.lock();
            (runtime.shutdown.take(), std::mem::take(&mut runtime.loops))
        };
        let Some(token) = token else { return };

        info!(coordinator = %self.id, "Shutting down coordination hub");
        token.cancel();
        for handle in loops {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background loop ended abnormally");
            }
        }

        if self.snapshots.persistence_enabled() {
            match self.snapshots.persist_all() {
                Ok(count) => info!(count, "Snapshots persisted on shutdown"),
                Err(e) => warn!(error = %e, "Failed to persist snapshots on shutdown"),
            }
        }
    }

    /// A coordination agent using this hub's health monitor and message bus.
    /// Its runs stop when the hub shuts down.
    pub fn coordination_agent(&self, executor: Arc<dyn TaskExecutor>) -> CoordinationAgent {
        let shutdown = self
            .runtime
            .lock()
            .shutdown
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_else(CancellationToken::new);
        CoordinationAgent::new(
            self.id.clone(),
            self.config.coordination.clone(),
            self.config.planner.clone(),
            executor,
            self.coordination_events.clone(),
        )
        .with_health_monitor(self.health.clone())
        .with_message_bus(self.messages.clone())
        .with_shutdown(shutdown)
    }

    /// Snapshot `files` together with the live lock grants and agent statuses.
    pub fn capture_snapshot(
        &self,
        description: impl Into<String>,
        files: &HashMap<String, FileVersion>,
        tags: Vec<String>,
    ) -> Arc<StateSnapshot> {
        self.snapshots.create_snapshot(
            description,
            files,
            &self.locks.active_grants(),
            &self.health.all_statuses(),
            &self.id,
            tags,
        )
    }

    pub fn health_snapshot(&self) -> HubHealth {
        HubHealth {
            coordinator: self.id.clone(),
            initialized: self.is_initialized(),
            captured_at: Utc::now(),
            events_recorded: EventCounts {
                locks: self.locks.events().len(),
                messages: self.messages.events().len(),
                conflicts: self.conflicts.events().len(),
                snapshots: self.snapshots.events().len(),
                health: self.health.events().len(),
                coordination: self.coordination_events.len(),
            },
            locks: self.locks.stats(),
            messages: self.messages.stats(),
            conflicts: self.conflicts.stats(),
            snapshots: self.snapshots.stats(),
            health: self.health.stats(),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    pub fn coordination_events(&self) -> &EventBus {
        &self.coordination_events
    }

    /// The newest `limit` events across every service log, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<CoordinationEvent> {
        let mut merged: Vec<CoordinationEvent> = [
            self.locks.events(),
            self.messages.events(),
            self.conflicts.events(),
            self.snapshots.events(),
            self.health.events(),
            &self.coordination_events,
        ]
        .into_iter()
        .flat_map(|log| log.recent(limit))
        .collect();
        merged.sort_by_key(|e| e.timestamp);
        let skip = merged.len().saturating_sub(limit);
        merged.split_off(skip)
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn messages(&self) -> &Arc<MessageBus> {
        &self.messages
    }

    pub fn conflicts(&self) -> &Arc<ConflictResolver> {
        &self.conflicts
    }

    pub fn snapshots(&self) -> &Arc<SnapshotManager> {
        &self.snapshots
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }
}
