// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lock Manager
//!
//! Arbitrates read/write/exclusive access to named resources and detects
//! deadlocks over the wait-for graph.
//!
//! Acquisition:
//! - fails immediately with [`LockError::TooManyLocks`] when the requester
//!   already holds `max_locks_per_agent` grants
//! - expired grants on the resource are force-released first
//! - granted when the resource is free, or when both sides are `Read`
//! - otherwise the caller waits, woken on every release and at least every
//!   `wait_poll_ms`, until its timeout elapses
//!
//! Waiters are not queued: whichever waiter observes a free resource first
//! wins, so a busy resource can starve a waiter until its timeout.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Lock arbitration, expiry sweep, deadlock detection

use crate::domain::lock::{LockError, LockGrant, LockMode, LockRequest};
use genesis_core::domain::agent::AgentId;
use genesis_core::domain::config::LockConfig;
use genesis_core::domain::events::CoordinationEventKind;
use genesis_core::infrastructure::event_bus::EventBus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Default)]
struct LockState {
    grants: HashMap<String, Vec<LockGrant>>,
    pending: HashMap<Uuid, LockRequest>,
    acquired_total: u64,
    released_total: u64,
    expired_total: u64,
    timeouts_total: u64,
}

impl LockState {
    fn held_by(&self, agent: &AgentId) -> usize {
        self.grants.values().flatten().filter(|g| &g.owner == agent).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockStats {
    pub locked_resources: usize,
    pub active_grants: usize,
    pub pending_requests: usize,
    pub grants_by_mode: BTreeMap<LockMode, usize>,
    pub acquired_total: u64,
    pub released_total: u64,
    pub expired_total: u64,
    pub timeouts_total: u64,
}

pub struct LockManager {
    config: LockConfig,
    state: Mutex<LockState>,
    released: Notify,
    events: EventBus,
}

impl LockManager {
    pub fn new(config: LockConfig, events: EventBus) -> Self {
        Self {
            config,
            state: Mutex::new(LockState::default()),
            released: Notify::new(),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Acquire `mode` on `resource_id`, waiting at most `timeout`.
    ///
    /// The grant expires `lock_ttl_ms` after it is issued; `timeout` bounds
    /// only the wait.
    pub async fn request_lock(
        &self,
        resource_id: &str,
        mode: LockMode,
        requester: &AgentId,
        timeout: Duration,
        priority: u8,
    ) -> Result<LockGrant, LockError> {
        {
            let state = self.state.lock();
            let held = state.held_by(requester);
            if held >= self.config.max_locks_per_agent {
                warn!(agent_id = %requester, held, resource_id, "Lock request rejected: per-agent cap reached");
                return Err(LockError::TooManyLocks {
                    agent: requester.clone(),
                    held,
                    max: self.config.max_locks_per_agent,
                });
            }
        }

        let request = LockRequest::new(resource_id, mode, requester.clone(), timeout, priority);
        let started = Instant::now();
        let deadline = super::deadline_after(started, timeout);
        let mut waiting = false;

        loop {
            // Register interest before checking so a release between the
            // check and the await still wakes us.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(grant) = self.try_grant(&mut state, &request) {
                    if waiting {
                        state.pending.remove(&request.id);
                    }
                    return Ok(grant);
                }
                if !waiting {
                    debug!(agent_id = %requester, resource_id, mode = %mode, "Waiting for lock");
                    state.pending.insert(request.id, request.clone());
                    waiting = true;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let waited_ms = now.duration_since(started).as_millis() as u64;
                {
                    let mut state = self.state.lock();
                    state.pending.remove(&request.id);
                    state.timeouts_total += 1;
                }
                metrics::counter!("genesis_lock_timeouts_total").increment(1);
                warn!(agent_id = %requester, resource_id, waited_ms, "Lock request timed out");
                self.events.publish_agent_event(
                    requester,
                    CoordinationEventKind::LockTimeout {
                        resource_id: resource_id.to_string(),
                        waited_ms,
                    },
                );
                return Err(LockError::Timeout {
                    resource_id: resource_id.to_string(),
                    waited_ms,
                });
            }

            let wake_at = deadline.min(now + self.config.wait_poll());
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    fn try_grant(&self, state: &mut LockState, request: &LockRequest) -> Option<LockGrant> {
        let now = chrono::Utc::now();
        let grants = state.grants.entry(request.resource_id.clone()).or_default();

        let before = grants.len();
        grants.retain(|g| {
            let expired = g.is_expired_at(now);
            if expired {
                info!(agent_id = %g.owner, resource_id = %g.resource_id, "Force-releasing expired lock");
                self.events.publish_agent_event(
                    &g.owner,
                    CoordinationEventKind::LockExpired {
                        resource_id: g.resource_id.clone(),
                    },
                );
            }
            !expired
        });
        let expired = (before - grants.len()) as u64;

        let available = grants.iter().all(|g| g.mode.is_compatible_with(request.mode));
        let grant = available.then(|| {
            let grant = LockGrant::new(
                request.resource_id.clone(),
                request.mode,
                request.requester.clone(),
                self.config.lock_ttl(),
            );
            grants.push(grant.clone());
            grant
        });

        state.expired_total += expired;
        if expired > 0 {
            metrics::counter!("genesis_locks_expired_total").increment(expired);
        }
        if let Some(grant) = &grant {
            state.acquired_total += 1;
            metrics::counter!("genesis_locks_acquired_total", "mode" => grant.mode.as_str()).increment(1);
            debug!(agent_id = %grant.owner, resource_id = %grant.resource_id, mode = %grant.mode, "Lock granted");
            self.events.publish_agent_event(
                &grant.owner,
                CoordinationEventKind::LockAcquired {
                    resource_id: grant.resource_id.clone(),
                    mode: grant.mode.to_string(),
                },
            );
        }
        grant
    }

    /// Release the grant `owner` holds on `resource_id`.
    pub fn release_lock(&self, resource_id: &str, owner: &AgentId) -> Result<LockGrant, LockError> {
        let released = {
            let mut state = self.state.lock();
            let grants = state
                .grants
                .get_mut(resource_id)
                .filter(|g| !g.is_empty())
                .ok_or_else(|| LockError::UnknownResource(resource_id.to_string()))?;
            let position = grants
                .iter()
                .position(|g| &g.owner == owner)
                .ok_or_else(|| LockError::NotLockOwner {
                    resource_id: resource_id.to_string(),
                    agent: owner.clone(),
                })?;
            let grant = grants.remove(position);
            if grants.is_empty() {
                state.grants.remove(resource_id);
            }
            state.released_total += 1;
            grant
        };

        self.released.notify_waiters();
        debug!(agent_id = %owner, resource_id, "Lock released");
        self.events.publish_agent_event(
            owner,
            CoordinationEventKind::LockReleased {
                resource_id: resource_id.to_string(),
            },
        );
        Ok(released)
    }

    /// Drop every grant on `resource_id` regardless of owner.
    pub fn force_release(&self, resource_id: &str) -> Vec<LockGrant> {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.grants.remove(resource_id).unwrap_or_default();
            state.released_total += removed.len() as u64;
            removed
        };
        if removed.is_empty() {
            return removed;
        }

        self.released.notify_waiters();
        warn!(resource_id, grants = removed.len(), "Lock force-released");
        self.events.publish_system_event(CoordinationEventKind::LockForceReleased {
            resource_id: resource_id.to_string(),
            previous_owners: removed.iter().map(|g| g.owner.clone()).collect(),
        });
        removed
    }

    /// Release everything `agent` holds; used when recovering from a crash.
    pub fn release_all_for_agent(&self, agent: &AgentId) -> Vec<LockGrant> {
        let removed = {
            let mut state = self.state.lock();
            let mut removed = Vec::new();
            state.grants.retain(|_, grants| {
                let (mine, others): (Vec<LockGrant>, Vec<LockGrant>) =
                    std::mem::take(grants).into_iter().partition(|g| &g.owner == agent);
                removed.extend(mine);
                *grants = others;
                !grants.is_empty()
            });
            state.released_total += removed.len() as u64;
            removed
        };

        if !removed.is_empty() {
            self.released.notify_waiters();
            info!(agent_id = %agent, count = removed.len(), "Released all locks for agent");
            for grant in &removed {
                self.events.publish_agent_event(
                    agent,
                    CoordinationEventKind::LockReleased {
                        resource_id: grant.resource_id.clone(),
                    },
                );
            }
        }
        removed
    }

    /// Force-release every expired grant. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = chrono::Utc::now();
        let expired = {
            let mut state = self.state.lock();
            let mut expired = Vec::new();
            state.grants.retain(|_, grants| {
                let (gone, live): (Vec<LockGrant>, Vec<LockGrant>) =
                    std::mem::take(grants).into_iter().partition(|g| g.is_expired_at(now));
                expired.extend(gone);
                *grants = live;
                !grants.is_empty()
            });
            state.expired_total += expired.len() as u64;
            expired
        };

        if !expired.is_empty() {
            self.released.notify_waiters();
            metrics::counter!("genesis_locks_expired_total").increment(expired.len() as u64);
            for grant in &expired {
                info!(agent_id = %grant.owner, resource_id = %grant.resource_id, "Expired lock swept");
                self.events.publish_agent_event(
                    &grant.owner,
                    CoordinationEventKind::LockExpired {
                        resource_id: grant.resource_id.clone(),
                    },
                );
            }
        }
        expired.len()
    }

    /// Run [`Self::sweep_expired`] every `expiration_check_ms` until cancelled.
    pub fn start_expiration_sweep(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_ms = self.config.expiration_check_ms,
                "Starting lock expiration sweep"
            );
            let mut tick = tokio::time::interval(self.config.expiration_check());
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let swept = self.sweep_expired();
                        if swept > 0 {
                            debug!(swept, "Lock expiration sweep completed");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("Lock expiration sweep shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Wait-for graph: each waiting requester points at the owners of the
    /// incompatible grants blocking it.
    pub fn wait_for_graph(&self) -> BTreeMap<AgentId, BTreeSet<AgentId>> {
        let now = chrono::Utc::now();
        let state = self.state.lock();
        let mut graph: BTreeMap<AgentId, BTreeSet<AgentId>> = BTreeMap::new();
        for request in state.pending.values() {
            let Some(grants) = state.grants.get(&request.resource_id) else {
                continue;
            };
            let blockers = grants
                .iter()
                .filter(|g| !g.is_expired_at(now) && !g.mode.is_compatible_with(request.mode))
                .map(|g| g.owner.clone());
            graph.entry(request.requester.clone()).or_default().extend(blockers);
        }
        graph
    }

    /// Every distinct cycle in the wait-for graph, each rotated so its
    /// smallest agent id comes first.
    pub fn detect_deadlocks(&self) -> Vec<Vec<AgentId>> {
        let graph = self.wait_for_graph();
        let mut found: BTreeSet<Vec<AgentId>> = BTreeSet::new();

        for start in graph.keys() {
            let mut on_stack = HashSet::new();
            let mut path = Vec::new();
            collect_cycles(start, &graph, &mut on_stack, &mut path, &mut found);
        }

        let cycles: Vec<Vec<AgentId>> = found.into_iter().collect();
        for cycle in &cycles {
            warn!(
                cycle = %cycle.iter().map(AgentId::as_str).collect::<Vec<_>>().join(" -> "),
                "Deadlock detected"
            );
            metrics::counter!("genesis_deadlocks_detected_total").increment(1);
            self.events
                .publish_system_event(CoordinationEventKind::DeadlockDetected { cycle: cycle.clone() });
        }
        cycles
    }

    pub fn grants_for(&self, resource_id: &str) -> Vec<LockGrant> {
        self.state.lock().grants.get(resource_id).cloned().unwrap_or_default()
    }

    pub fn grants_held_by(&self, agent: &AgentId) -> Vec<LockGrant> {
        self.state
            .lock()
            .grants
            .values()
            .flatten()
            .filter(|g| &g.owner == agent)
            .cloned()
            .collect()
    }

    pub fn active_grants(&self) -> Vec<LockGrant> {
        let mut grants: Vec<LockGrant> = self.state.lock().grants.values().flatten().cloned().collect();
        grants.sort_by(|a, b| a.resource_id.cmp(&b.resource_id).then(a.granted_at.cmp(&b.granted_at)));
        grants
    }

    pub fn pending_requests(&self) -> Vec<LockRequest> {
        self.state.lock().pending.values().cloned().collect()
    }

    pub fn is_locked(&self, resource_id: &str) -> bool {
        self.state.lock().grants.get(resource_id).is_some_and(|g| !g.is_empty())
    }

    pub fn stats(&self) -> LockStats {
        let state = self.state.lock();
        let mut grants_by_mode = BTreeMap::new();
        for grant in state.grants.values().flatten() {
            *grants_by_mode.entry(grant.mode).or_insert(0) += 1;
        }
        let active_grants = grants_by_mode.values().sum();
        metrics::gauge!("genesis_locks_active").set(active_grants as f64);

        LockStats {
            locked_resources: state.grants.values().filter(|g| !g.is_empty()).count(),
            active_grants,
            pending_requests: state.pending.len(),
            grants_by_mode,
            acquired_total: state.acquired_total,
            released_total: state.released_total,
            expired_total: state.expired_total,
            timeouts_total: state.timeouts_total,
        }
    }
}

fn collect_cycles(
    node: &AgentId,
    graph: &BTreeMap<AgentId, BTreeSet<AgentId>>,
    on_stack: &mut HashSet<AgentId>,
    path: &mut Vec<AgentId>,
    found: &mut BTreeSet<Vec<AgentId>>,
) {
    on_stack.insert(node.clone());
    path.push(node.clone());

    for next in graph.get(node).into_iter().flatten() {
        if on_stack.contains(next) {
            if let Some(start) = path.iter().position(|a| a == next) {
                found.insert(normalize_cycle(&path[start..]));
            }
        } else {
            collect_cycles(next, graph, on_stack, path, found);
        }
    }

    path.pop();
    on_stack.remove(node);
}

fn normalize_cycle(cycle: &[AgentId]) -> Vec<AgentId> {
    let pivot = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    cycle[pivot..].iter().chain(cycle[..pivot].iter()).cloned().collect()
}
