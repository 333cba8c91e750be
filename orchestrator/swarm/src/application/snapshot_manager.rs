// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Snapshot Manager
//!
//! Immutable captures of files, lock grants and agent statuses with bounded
//! retention, shallow comparison and optional on-disk persistence.
//!
//! The auto-snapshot timer never captures anything itself: each tick emits
//! an `auto_snapshot_due` event and a trigger on [`SnapshotManager::subscribe_triggers`].
//! Whoever owns the live state (normally the hub) reacts by calling
//! `create_snapshot`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Rollback-capable state capture

use crate::domain::conflict::FileVersion;
use crate::domain::health::AgentStatus;
use crate::domain::lock::LockGrant;
use crate::domain::snapshot::{SnapshotDiff, SnapshotError, SnapshotMetadata, StateSnapshot};
use crate::infrastructure::snapshot_store::FileSnapshotStore;
use chrono::{DateTime, Utc};
use genesis_core::domain::agent::AgentId;
use genesis_core::domain::config::SnapshotConfig;
use genesis_core::domain::events::CoordinationEventKind;
use genesis_core::infrastructure::event_bus::EventBus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const TRIGGER_CAPACITY: usize = 16;

#[derive(Default)]
struct SnapshotState {
    snapshots: HashMap<Uuid, Arc<StateSnapshot>>,
    created_total: u64,
    pruned_total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub snapshots: usize,
    pub max_snapshots: usize,
    pub total_bytes: u64,
    pub created_total: u64,
    pub pruned_total: u64,
    pub persistence_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<DateTime<Utc>>,
}

pub struct SnapshotManager {
    config: SnapshotConfig,
    store: Option<FileSnapshotStore>,
    state: Mutex<SnapshotState>,
    triggers: broadcast::Sender<DateTime<Utc>>,
    events: EventBus,
}

impl SnapshotManager {
    pub fn new(config: SnapshotConfig, events: EventBus) -> Self {
        let store = config.directory.clone().map(FileSnapshotStore::new);
        let (triggers, _) = broadcast::channel(TRIGGER_CAPACITY);
        Self {
            config,
            store,
            state: Mutex::new(SnapshotState::default()),
            triggers,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Capture copies of the given collections. Past `max_snapshots` the
    /// oldest snapshots are pruned, along with their files if persisted.
    pub fn create_snapshot(
        &self,
        description: impl Into<String>,
        files: &HashMap<String, FileVersion>,
        locks: &[LockGrant],
        agents: &[AgentStatus],
        created_by: &AgentId,
        tags: Vec<String>,
    ) -> Arc<StateSnapshot> {
        let size_bytes = files.values().map(FileVersion::size_bytes).sum();
        let snapshot = Arc::new(StateSnapshot {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            description: description.into(),
            files: files.clone(),
            locks: locks.to_vec(),
            agents: agents.to_vec(),
            metadata: SnapshotMetadata {
                created_by: created_by.clone(),
                tags,
                size_bytes,
            },
        });

        let pruned = {
            let mut state = self.state.lock();
            state.snapshots.insert(snapshot.id, snapshot.clone());
            state.created_total += 1;
            self.prune(&mut state)
        };

        info!(
            snapshot_id = %snapshot.id,
            files = snapshot.files.len(),
            locks = snapshot.locks.len(),
            agents = snapshot.agents.len(),
            size_bytes,
            "Snapshot created"
        );
        metrics::counter!("genesis_snapshots_created_total").increment(1);
        self.events.publish_agent_event(
            created_by,
            CoordinationEventKind::SnapshotCreated {
                snapshot_id: snapshot.id,
                size_bytes,
            },
        );
        self.after_prune(pruned);
        snapshot
    }

    fn prune(&self, state: &mut SnapshotState) -> Vec<Uuid> {
        let bound = self.config.max_snapshots.max(1);
        let mut pruned = Vec::new();
        while state.snapshots.len() > bound {
            let oldest = state
                .snapshots
                .values()
                .min_by_key(|s| (s.timestamp, s.id))
                .map(|s| s.id);
            let Some(oldest) = oldest else { break };
            state.snapshots.remove(&oldest);
            state.pruned_total += 1;
            pruned.push(oldest);
        }
        pruned
    }

    fn after_prune(&self, pruned: Vec<Uuid>) {
        for id in pruned {
            debug!(snapshot_id = %id, "Snapshot pruned");
            self.remove_file(&id);
            self.events
                .publish_system_event(CoordinationEventKind::SnapshotPruned { snapshot_id: id });
        }
    }

    fn remove_file(&self, id: &Uuid) {
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(id) {
                warn!(snapshot_id = %id, error = %e, "Failed to remove snapshot file");
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<StateSnapshot>> {
        self.state.lock().snapshots.get(id).cloned()
    }

    /// All retained snapshots, oldest first.
    pub fn list(&self) -> Vec<Arc<StateSnapshot>> {
        let mut all: Vec<Arc<StateSnapshot>> = self.state.lock().snapshots.values().cloned().collect();
        all.sort_by_key(|s| (s.timestamp, s.id));
        all
    }

    pub fn latest(&self) -> Option<Arc<StateSnapshot>> {
        self.state
            .lock()
            .snapshots
            .values()
            .max_by_key(|s| (s.timestamp, s.id))
            .cloned()
    }

    pub fn delete(&self, id: &Uuid) -> bool {
        let removed = self.state.lock().snapshots.remove(id).is_some();
        if removed {
            self.remove_file(id);
        }
        removed
    }

    /// Paths added/removed by set difference, modified by checksum, plus
    /// lock- and agent-count drift.
    pub fn compare_snapshots(&self, a: &Uuid, b: &Uuid) -> Result<SnapshotDiff, SnapshotError> {
        let first = self.get(a).ok_or(SnapshotError::UnknownSnapshot(*a))?;
        let second = self.get(b).ok_or(SnapshotError::UnknownSnapshot(*b))?;

        let before: BTreeSet<&String> = first.files.keys().collect();
        let after: BTreeSet<&String> = second.files.keys().collect();

        Ok(SnapshotDiff {
            added: after.difference(&before).map(|p| p.to_string()).collect(),
            removed: before.difference(&after).map(|p| p.to_string()).collect(),
            modified: before
                .intersection(&after)
                .filter(|p| first.files[p.as_str()].checksum != second.files[p.as_str()].checksum)
                .map(|p| p.to_string())
                .collect(),
            lock_count_changed: first.locks.len() != second.locks.len(),
            agent_count_changed: first.agents.len() != second.agents.len(),
        })
    }

    /// File contents captured by `id`, ready to be written back.
    pub fn restore_files(&self, id: &Uuid) -> Result<HashMap<String, FileVersion>, SnapshotError> {
        let snapshot = self.get(id).ok_or(SnapshotError::UnknownSnapshot(*id))?;
        info!(snapshot_id = %id, files = snapshot.files.len(), "Restoring files from snapshot");
        Ok(snapshot.files.clone())
    }

    pub fn persist(&self, id: &Uuid) -> Result<PathBuf, SnapshotError> {
        let store = self.store.as_ref().ok_or(SnapshotError::PersistenceDisabled)?;
        let snapshot = self.get(id).ok_or(SnapshotError::UnknownSnapshot(*id))?;
        store.save(&snapshot)
    }

    /// Write every retained snapshot; returns the number written.
    pub fn persist_all(&self) -> Result<usize, SnapshotError> {
        let store = self.store.as_ref().ok_or(SnapshotError::PersistenceDisabled)?;
        let snapshots = self.list();
        for snapshot in &snapshots {
            store.save(snapshot)?;
        }
        info!(count = snapshots.len(), directory = %store.directory().display(), "Snapshots persisted");
        Ok(snapshots.len())
    }

    /// Merge snapshots found on disk into memory, then apply retention.
    /// Returns the number of snapshots that were not already loaded.
    pub fn load_from_disk(&self) -> Result<usize, SnapshotError> {
        let store = self.store.as_ref().ok_or(SnapshotError::PersistenceDisabled)?;
        let loaded = store.load_all()?;

        let (added, pruned) = {
            let mut state = self.state.lock();
            let mut added = 0;
            for snapshot in loaded {
                if !state.snapshots.contains_key(&snapshot.id) {
                    state.snapshots.insert(snapshot.id, Arc::new(snapshot));
                    added += 1;
                }
            }
            (added, self.prune(&mut state))
        };

        info!(loaded = added, directory = %store.directory().display(), "Snapshots loaded from disk");
        self.after_prune(pruned);
        Ok(added)
    }

    pub fn persistence_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn subscribe_triggers(&self) -> broadcast::Receiver<DateTime<Utc>> {
        self.triggers.subscribe()
    }

    /// Start the auto-snapshot trigger; `None` when no interval is configured.
    pub fn start_auto_snapshot(self: Arc<Self>, shutdown: CancellationToken) -> Option<tokio::task::JoinHandle<()>> {
        let interval = self.config.auto_snapshot_interval()?;
        Some(tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Starting auto-snapshot trigger");
            let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        debug!("Auto-snapshot due");
                        self.events.publish_system_event(CoordinationEventKind::AutoSnapshotDue);
                        // No receivers is fine
                        let _ = self.triggers.send(Utc::now());
                    }
                    _ = shutdown.cancelled() => {
                        info!("Auto-snapshot trigger shutting down");
                        break;
                    }
                }
            }
        }))
    }

    pub fn stats(&self) -> SnapshotStats {
        let state = self.state.lock();
        SnapshotStats {
            snapshots: state.snapshots.len(),
            max_snapshots: self.config.max_snapshots,
            total_bytes: state.snapshots.values().map(|s| s.metadata.size_bytes).sum(),
            created_total: state.created_total,
            pruned_total: state.pruned_total,
            persistence_enabled: self.store.is_some(),
            latest: state.snapshots.values().map(|s| s.timestamp).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lock::LockMode;
    use genesis_core::domain::agent::AgentRole;
    use std::time::Duration;

    fn manager(config: SnapshotConfig) -> Arc<SnapshotManager> {
        Arc::new(SnapshotManager::new(config, EventBus::new(100)))
    }

    fn files(entries: &[(&str, &str)]) -> HashMap<String, FileVersion> {
        entries
            .iter()
            .map(|(path, content)| (path.to_string(), FileVersion::new(*content, AgentId::new("gfa-1"))))
            .collect()
    }

    #[test]
    fn test_snapshot_copies_inputs_and_sizes() {
        let manager = manager(SnapshotConfig::default());
        let ca = AgentId::new("ca");
        let mut live = files(&[("a.ts", "1234"), ("b.ts", "56")]);
        let locks = vec![LockGrant::new("a.ts", LockMode::Write, ca.clone(), Duration::from_secs(60))];
        let agents = vec![AgentStatus::new(ca.clone(), AgentRole::Coordinator)];

        let snapshot = manager.create_snapshot("baseline", &live, &locks, &agents, &ca, vec!["setup".into()]);
        live.insert("c.ts".to_string(), FileVersion::new("x", ca.clone()));

        assert_eq!(snapshot.files.len(), 2);
        assert_eq!(snapshot.metadata.size_bytes, 6);
        assert_eq!(snapshot.locks.len(), 1);
        assert_eq!(manager.latest().unwrap().id, snapshot.id);
        assert_eq!(manager.restore_files(&snapshot.id).unwrap().len(), 2);
    }

    #[test]
    fn test_retention_prunes_oldest_first() {
        let manager = manager(SnapshotConfig {
            max_snapshots: 2,
            ..SnapshotConfig::default()
        });
        let ca = AgentId::new("ca");
        let empty = HashMap::new();
        let first = manager.create_snapshot("one", &empty, &[], &[], &ca, vec![]);
        std::thread::sleep(Duration::from_millis(2));
        let second = manager.create_snapshot("two", &empty, &[], &[], &ca, vec![]);
        std::thread::sleep(Duration::from_millis(2));
        let third = manager.create_snapshot("three", &empty, &[], &[], &ca, vec![]);

        let ids: Vec<Uuid> = manager.list().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second.id, third.id]);
        assert!(manager.get(&first.id).is_none());
        assert_eq!(manager.stats().pruned_total, 1);
    }

    #[test]
    fn test_compare_snapshots() {
        let manager = manager(SnapshotConfig::default());
        let ca = AgentId::new("ca");
        let lock = LockGrant::new("a.ts", LockMode::Write, ca.clone(), Duration::from_secs(60));

        let before = manager.create_snapshot("before", &files(&[("a.ts", "1"), ("b.ts", "2")]), &[], &[], &ca, vec![]);
        let after = manager.create_snapshot(
            "after",
            &files(&[("a.ts", "1"), ("b.ts", "22"), ("c.ts", "3")]),
            &[lock],
            &[],
            &ca,
            vec![],
        );

        let diff = manager.compare_snapshots(&before.id, &after.id).unwrap();
        assert_eq!(diff.added, vec!["c.ts".to_string()]);
        assert!(diff.removed.is_empty());
        assert_eq!(diff.modified, vec!["b.ts".to_string()]);
        assert!(diff.lock_count_changed);
        assert!(!diff.agent_count_changed);
        assert!(manager.compare_snapshots(&before.id, &before.id).unwrap().is_empty());

        let missing = Uuid::new_v4();
        assert!(matches!(
            manager.compare_snapshots(&before.id, &missing),
            Err(SnapshotError::UnknownSnapshot(id)) if id == missing
        ));
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = SnapshotConfig {
            directory: Some(dir.path().join("snapshots")),
            ..SnapshotConfig::default()
        };
        let ca = AgentId::new("ca");

        let writer = manager(config.clone());
        let snapshot = writer.create_snapshot("persisted", &files(&[("a.ts", "1")]), &[], &[], &ca, vec![]);
        writer.persist(&snapshot.id).unwrap();
        writer.create_snapshot("second", &HashMap::new(), &[], &[], &ca, vec![]);
        assert_eq!(writer.persist_all().unwrap(), 2);

        let reader = manager(config);
        assert_eq!(reader.load_from_disk().unwrap(), 2);
        assert_eq!(*reader.get(&snapshot.id).unwrap(), *snapshot);
        assert_eq!(reader.load_from_disk().unwrap(), 0);

        assert!(reader.delete(&snapshot.id));
        assert!(!dir.path().join("snapshots").join(format!("{}.json", snapshot.id)).exists());
    }

    #[test]
    fn test_persistence_disabled() {
        let manager = manager(SnapshotConfig::default());
        assert!(matches!(manager.persist_all(), Err(SnapshotError::PersistenceDisabled)));
        assert!(matches!(manager.load_from_disk(), Err(SnapshotError::PersistenceDisabled)));
    }

    #[tokio::test]
    async fn test_auto_snapshot_only_triggers() {
        let manager = manager(SnapshotConfig {
            auto_snapshot_interval_secs: Some(1),
            ..SnapshotConfig::default()
        });
        let mut triggers = manager.subscribe_triggers();
        let token = CancellationToken::new();
        let handle = manager.clone().start_auto_snapshot(token.clone()).unwrap();

        tokio::time::timeout(Duration::from_secs(3), triggers.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manager.stats().snapshots, 0);
        assert!(manager
            .events()
            .recent(10)
            .iter()
            .any(|e| e.event_type() == "auto_snapshot_due"));

        token.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_no_interval_no_trigger_loop() {
        let manager = manager(SnapshotConfig::default());
        assert!(manager.start_auto_snapshot(CancellationToken::new()).is_none());
    }
}
