// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Health Monitor
//!
//! Tracks agent liveness and load, classifies each agent as healthy,
//! degraded or unhealthy, and picks a recovery action for unhealthy agents.
//!
//! Classification (highest wins):
//! - **Unhealthy:** no heartbeat within `heartbeat_timeout_ms`, or the error
//!   counter reached `error_threshold`
//! - **Degraded:** error rate above 0.2, or more than five tasks in progress
//! - **Healthy:** otherwise
//!
//! Crashed agents keep their status until re-registered.
//!
//! Recovery actions are recorded as completed the moment they are chosen.
//! Applying them (reassigning work, restarting a worker) belongs to the
//! caller; see [`HealthMonitor::recovery_actions`].
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Agent supervision and recovery decisions

use crate::domain::health::{
    AgentHealth, AgentStatus, HealthCheck, HealthError, RecoveryAction, RecoveryKind, StatusUpdate,
};
use chrono::Utc;
use genesis_core::domain::agent::{AgentId, AgentRole};
use genesis_core::domain::config::HealthConfig;
use genesis_core::domain::events::CoordinationEventKind;
use genesis_core::infrastructure::event_bus::EventBus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_ERROR_RATE: f64 = 0.2;
const MAX_TASKS_IN_PROGRESS: u32 = 5;
const TERMINATE_ERROR_COUNT: u32 = 10;

#[derive(Default)]
struct HealthState {
    agents: HashMap<AgentId, AgentStatus>,
    history: HashMap<AgentId, VecDeque<HealthCheck>>,
    /// Most recent actions per agent, bounded like `history`.
    recoveries: HashMap<AgentId, VecDeque<RecoveryAction>>,
    recoveries_total: usize,
    recoveries_by_kind: BTreeMap<RecoveryKind, usize>,
    checks_total: u64,
    failed_checks_total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStats {
    pub agents: usize,
    pub by_health: BTreeMap<AgentHealth, usize>,
    pub checks_total: u64,
    pub failed_checks_total: u64,
    /// Every action ever chosen, including those no longer retained.
    pub recovery_actions: usize,
    pub recoveries_by_kind: BTreeMap<RecoveryKind, usize>,
    pub total_errors: u64,
    pub total_tasks_failed: u64,
    pub total_tasks_completed: u64,
}

pub struct HealthMonitor {
    config: HealthConfig,
    state: Mutex<HealthState>,
    events: EventBus,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig, events: EventBus) -> Self {
        Self {
            config,
            state: Mutex::new(HealthState::default()),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Start tracking `agent` as healthy with zeroed counters. Registering an
    /// existing agent resets it.
    pub fn register_agent(&self, agent: &AgentId, role: AgentRole) -> AgentStatus {
        let status = AgentStatus::new(agent.clone(), role);
        {
            let mut state = self.state.lock();
            state.agents.insert(agent.clone(), status.clone());
            state.history.remove(agent);
        }
        info!(agent_id = %agent, role = %role, "Agent registered with health monitor");
        self.events.publish_agent_event(
            agent,
            CoordinationEventKind::AgentRegistered {
                role: role.to_string(),
            },
        );
        status
    }

    pub fn unregister_agent(&self, agent: &AgentId) -> Option<AgentStatus> {
        let removed = {
            let mut state = self.state.lock();
            state.history.remove(agent);
            state.recoveries.remove(agent);
            state.agents.remove(agent)
        };
        if removed.is_some() {
            info!(agent_id = %agent, "Agent unregistered from health monitor");
            self.events
                .publish_agent_event(agent, CoordinationEventKind::AgentUnregistered);
        }
        removed
    }

    /// Record liveness. An unhealthy agent is immediately healthy again.
    pub fn heartbeat(&self, agent: &AgentId) -> Result<AgentHealth, HealthError> {
        let (before, after) = {
            let mut state = self.state.lock();
            let status = state
                .agents
                .get_mut(agent)
                .ok_or_else(|| HealthError::UnknownAgent(agent.clone()))?;
            status.last_heartbeat = Utc::now();
            let before = status.health;
            if before == AgentHealth::Unhealthy {
                status.health = AgentHealth::Healthy;
            }
            (before, status.health)
        };
        self.health_changed(agent, before, after);
        Ok(after)
    }

    /// Merge `update` into the agent's status. Reaching the error threshold
    /// forces the agent unhealthy.
    pub fn update_status(&self, agent: &AgentId, update: StatusUpdate) -> Result<AgentStatus, HealthError> {
        let (before, status) = {
            let mut state = self.state.lock();
            let status = state
                .agents
                .get_mut(agent)
                .ok_or_else(|| HealthError::UnknownAgent(agent.clone()))?;
            let before = status.health;

            if let Some(task) = update.current_task {
                status.current_task = Some(task);
            }
            if let Some(count) = update.tasks_in_progress {
                status.tasks_in_progress = count;
            }
            if let Some(count) = update.tasks_completed {
                status.tasks_completed = count;
            }
            if let Some(count) = update.tasks_failed {
                status.tasks_failed = count;
            }
            if let Some(count) = update.error_count {
                status.error_count = count;
            }

            if status.error_count >= self.config.error_threshold && status.health != AgentHealth::Crashed {
                status.health = AgentHealth::Unhealthy;
            }
            (before, status.clone())
        };
        self.health_changed(agent, before, status.health);
        Ok(status)
    }

    pub fn perform_health_check(&self, agent: &AgentId) -> Result<HealthCheck, HealthError> {
        let now = Utc::now();
        let (check, before) = {
            let mut state = self.state.lock();
            let status = state
                .agents
                .get_mut(agent)
                .ok_or_else(|| HealthError::UnknownAgent(agent.clone()))?;

            let silent_ms = (now - status.last_heartbeat).num_milliseconds().max(0) as u64;
            let heartbeat_ok = silent_ms <= self.config.heartbeat_timeout_ms;
            let error_rate = status.error_rate();
            let error_rate_ok = error_rate <= MAX_ERROR_RATE;
            let load_ok = status.tasks_in_progress <= MAX_TASKS_IN_PROGRESS;
            let threshold_reached = status.error_count >= self.config.error_threshold;

            let mut issues = Vec::new();
            let mut recommendations = Vec::new();
            if !heartbeat_ok {
                issues.push(format!("no heartbeat for {silent_ms}ms"));
                recommendations.push("restart the agent or check its connectivity".to_string());
            }
            if threshold_reached {
                issues.push(format!("error count {} reached threshold", status.error_count));
            }
            if !error_rate_ok {
                issues.push(format!("error rate {error_rate:.2} above {MAX_ERROR_RATE}"));
                recommendations.push("review recent failures before assigning more work".to_string());
            }
            if !load_ok {
                issues.push(format!("{} tasks in progress", status.tasks_in_progress));
                recommendations.push("reassign tasks to idle agents".to_string());
            }

            let before = status.health;
            let derived = if !heartbeat_ok || threshold_reached {
                AgentHealth::Unhealthy
            } else if !error_rate_ok || !load_ok {
                AgentHealth::Degraded
            } else {
                AgentHealth::Healthy
            };
            if before != AgentHealth::Crashed {
                status.health = derived;
            }

            let check = HealthCheck {
                agent_id: agent.clone(),
                checked_at: now,
                heartbeat_ok,
                error_rate_ok,
                load_ok,
                error_rate,
                status: status.health,
                issues,
                recommendations,
            };

            state.checks_total += 1;
            if !check.passed() {
                state.failed_checks_total += 1;
            }
            let history = state.history.entry(agent.clone()).or_default();
            history.push_back(check.clone());
            while history.len() > self.config.max_checks_per_agent.max(1) {
                history.pop_front();
            }
            (check, before)
        };

        metrics::counter!("genesis_health_checks_total", "status" => check.status.as_str()).increment(1);
        if !check.issues.is_empty() {
            warn!(agent_id = %agent, status = %check.status, issues = ?check.issues, "Health check found issues");
            self.events.publish_agent_event(
                agent,
                CoordinationEventKind::HealthCheckFailed {
                    issues: check.issues.clone(),
                },
            );
        } else {
            debug!(agent_id = %agent, "Health check passed");
        }
        self.health_changed(agent, before, check.status);
        Ok(check)
    }

    /// Check every registered agent, ordered by agent id.
    pub fn perform_all_health_checks(&self) -> Vec<HealthCheck> {
        let mut agents: Vec<AgentId> = self.state.lock().agents.keys().cloned().collect();
        agents.sort();
        agents
            .iter()
            .filter_map(|agent| self.perform_health_check(agent).ok())
            .collect()
    }

    /// Choose one recovery action for an unhealthy agent. Returns `None`
    /// when the agent is not unhealthy or auto-recovery is disabled.
    pub fn auto_recover(&self, agent: &AgentId) -> Result<Option<RecoveryAction>, HealthError> {
        let action = {
            let mut state = self.state.lock();
            let status = state
                .agents
                .get(agent)
                .ok_or_else(|| HealthError::UnknownAgent(agent.clone()))?;
            if !self.config.auto_recovery || status.health != AgentHealth::Unhealthy {
                return Ok(None);
            }

            let (kind, reason) = if status.tasks_in_progress > 0 {
                (
                    RecoveryKind::ReassignTasks,
                    format!("{} tasks in progress on an unhealthy agent", status.tasks_in_progress),
                )
            } else if status.error_count > TERMINATE_ERROR_COUNT {
                (RecoveryKind::Terminate, format!("{} errors recorded", status.error_count))
            } else {
                (RecoveryKind::Restart, "agent unhealthy".to_string())
            };

            let action = RecoveryAction {
                id: Uuid::new_v4(),
                agent_id: agent.clone(),
                kind,
                reason,
                triggered_at: Utc::now(),
                completed: true,
                result: Some(format!("{kind} scheduled")),
            };
            let retained = state.recoveries.entry(agent.clone()).or_default();
            retained.push_back(action.clone());
            while retained.len() > self.config.max_checks_per_agent.max(1) {
                retained.pop_front();
            }
            state.recoveries_total += 1;
            *state.recoveries_by_kind.entry(kind).or_insert(0) += 1;
            action
        };

        warn!(agent_id = %agent, action = %action.kind, reason = %action.reason, "Recovery action triggered");
        metrics::counter!("genesis_recovery_actions_total", "kind" => action.kind.as_str()).increment(1);
        self.events.publish_agent_event(
            agent,
            CoordinationEventKind::RecoveryTriggered {
                action: action.kind.to_string(),
                reason: action.reason.clone(),
            },
        );
        Ok(Some(action))
    }

    pub fn report_crash(&self, agent: &AgentId, reason: impl Into<String>) -> Result<(), HealthError> {
        let reason = reason.into();
        let before = {
            let mut state = self.state.lock();
            let status = state
                .agents
                .get_mut(agent)
                .ok_or_else(|| HealthError::UnknownAgent(agent.clone()))?;
            let before = status.health;
            status.health = AgentHealth::Crashed;
            before
        };
        error!(agent_id = %agent, reason = %reason, "Agent crashed");
        self.events
            .publish_agent_event(agent, CoordinationEventKind::AgentCrashed { reason });
        self.health_changed(agent, before, AgentHealth::Crashed);
        Ok(())
    }

    /// One monitoring pass: check everyone, then recover the unhealthy.
    pub fn run_cycle(&self) -> (Vec<HealthCheck>, Vec<RecoveryAction>) {
        let checks = self.perform_all_health_checks();
        let actions = checks
            .iter()
            .filter(|c| c.status == AgentHealth::Unhealthy)
            .filter_map(|c| self.auto_recover(&c.agent_id).ok().flatten())
            .collect();

        let unhealthy = self.unhealthy_agents().len();
        metrics::gauge!("genesis_agents_unhealthy").set(unhealthy as f64);
        (checks, actions)
    }

    pub fn start_monitoring(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_ms = self.config.check_interval_ms, "Starting health monitoring");
            let mut tick = tokio::time::interval(self.config.check_interval());
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let (checks, actions) = self.run_cycle();
                        debug!(checked = checks.len(), recoveries = actions.len(), "Health monitoring cycle complete");
                    }
                    _ = shutdown.cancelled() => {
                        info!("Health monitoring shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn health_changed(&self, agent: &AgentId, from: AgentHealth, to: AgentHealth) {
        if from == to {
            return;
        }
        info!(agent_id = %agent, from = %from, to = %to, "Agent health changed");
        self.events.publish_agent_event(
            agent,
            CoordinationEventKind::HealthChanged {
                from: from.to_string(),
                to: to.to_string(),
            },
        );
    }

    pub fn get_status(&self, agent: &AgentId) -> Option<AgentStatus> {
        self.state.lock().agents.get(agent).cloned()
    }

    /// Every status, ordered by agent id.
    pub fn all_statuses(&self) -> Vec<AgentStatus> {
        let mut statuses: Vec<AgentStatus> = self.state.lock().agents.values().cloned().collect();
        statuses.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        statuses
    }

    pub fn unhealthy_agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self
            .state
            .lock()
            .agents
            .values()
            .filter(|s| matches!(s.health, AgentHealth::Unhealthy | AgentHealth::Crashed))
            .map(|s| s.agent_id.clone())
            .collect();
        agents.sort();
        agents
    }

    /// Retained checks for `agent`, oldest first.
    pub fn health_history(&self, agent: &AgentId) -> Vec<HealthCheck> {
        self.state
            .lock()
            .history
            .get(agent)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Retained recovery actions, oldest first, for one agent or for all.
    pub fn recovery_actions(&self, agent: Option<&AgentId>) -> Vec<RecoveryAction> {
        let state = self.state.lock();
        let mut actions: Vec<RecoveryAction> = match agent {
            Some(id) => state.recoveries.get(id).into_iter().flatten().cloned().collect(),
            None => state.recoveries.values().flatten().cloned().collect(),
        };
        actions.sort_by_key(|a| a.triggered_at);
        actions
    }

    pub fn stats(&self) -> HealthStats {
        let state = self.state.lock();
        let mut by_health = BTreeMap::new();
        for status in state.agents.values() {
            *by_health.entry(status.health).or_insert(0) += 1;
        }
        HealthStats {
            agents: state.agents.len(),
            by_health,
            checks_total: state.checks_total,
            failed_checks_total: state.failed_checks_total,
            recovery_actions: state.recoveries_total,
            recoveries_by_kind: state.recoveries_by_kind.clone(),
            total_errors: state.agents.values().map(|s| u64::from(s.error_count)).sum(),
            total_tasks_failed: state.agents.values().map(|s| u64::from(s.tasks_failed)).sum(),
            total_tasks_completed: state.agents.values().map(|s| u64::from(s.tasks_completed)).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn monitor(config: HealthConfig) -> Arc<HealthMonitor> {
        Arc::new(HealthMonitor::new(config, EventBus::new(100)))
    }

    fn agent(id: &str) -> AgentId {
        AgentId::new(id)
    }

    #[test]
    fn test_registered_agent_is_healthy() {
        let monitor = monitor(HealthConfig::default());
        let status = monitor.register_agent(&agent("gfa-1"), AgentRole::Feature);
        assert_eq!(status.health, AgentHealth::Healthy);
        assert_eq!(status.error_count, 0);

        let check = monitor.perform_health_check(&agent("gfa-1")).unwrap();
        assert!(check.passed());
        assert_eq!(check.status, AgentHealth::Healthy);
        assert!(matches!(
            monitor.heartbeat(&agent("ghost")),
            Err(HealthError::UnknownAgent(_))
        ));
    }

    #[tokio::test]
    async fn test_stale_heartbeat_is_unhealthy_regardless_of_errors() {
        let monitor = monitor(HealthConfig {
            heartbeat_timeout_ms: 20,
            ..HealthConfig::default()
        });
        let id = agent("gfa-1");
        monitor.register_agent(&id, AgentRole::Feature);
        monitor
            .update_status(&id, StatusUpdate::default().completed(100))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let check = monitor.perform_health_check(&id).unwrap();
        assert!(!check.heartbeat_ok);
        assert!(check.error_rate_ok);
        assert_eq!(check.status, AgentHealth::Unhealthy);

        // A single heartbeat restores health
        assert_eq!(monitor.heartbeat(&id).unwrap(), AgentHealth::Healthy);
    }

    #[test]
    fn test_degraded_by_error_rate_or_load() {
        let monitor = monitor(HealthConfig::default());
        let (busy, flaky) = (agent("gfa-1"), agent("gfa-2"));
        monitor.register_agent(&busy, AgentRole::Feature);
        monitor.register_agent(&flaky, AgentRole::Feature);

        monitor.update_status(&busy, StatusUpdate::default().in_progress(6)).unwrap();
        monitor
            .update_status(&flaky, StatusUpdate::default().completed(4).errors(1))
            .unwrap();

        let busy_check = monitor.perform_health_check(&busy).unwrap();
        assert!(!busy_check.load_ok);
        assert_eq!(busy_check.status, AgentHealth::Degraded);

        let flaky_check = monitor.perform_health_check(&flaky).unwrap();
        assert!(!flaky_check.error_rate_ok);
        assert_eq!(flaky_check.status, AgentHealth::Degraded);
    }

    #[test]
    fn test_error_threshold_forces_unhealthy() {
        let monitor = monitor(HealthConfig::default());
        let id = agent("gfa-1");
        monitor.register_agent(&id, AgentRole::Feature);
        let status = monitor.update_status(&id, StatusUpdate::default().errors(5)).unwrap();
        assert_eq!(status.health, AgentHealth::Unhealthy);
        assert_eq!(monitor.unhealthy_agents(), vec![id]);
    }

    #[test]
    fn test_recovery_action_selection() {
        let monitor = monitor(HealthConfig::default());
        let (busy, noisy, idle) = (agent("gfa-1"), agent("gfa-2"), agent("gfa-3"));
        for id in [&busy, &noisy, &idle] {
            monitor.register_agent(id, AgentRole::Feature);
        }

        // Healthy agents are left alone
        assert!(monitor.auto_recover(&busy).unwrap().is_none());

        monitor
            .update_status(&busy, StatusUpdate::default().in_progress(2).errors(11))
            .unwrap();
        monitor.update_status(&noisy, StatusUpdate::default().errors(11)).unwrap();
        monitor.update_status(&idle, StatusUpdate::default().errors(5)).unwrap();

        let kinds: Vec<RecoveryKind> = [&busy, &noisy, &idle]
            .iter()
            .map(|id| monitor.auto_recover(id).unwrap().unwrap().kind)
            .collect();
        assert_eq!(
            kinds,
            vec![RecoveryKind::ReassignTasks, RecoveryKind::Terminate, RecoveryKind::Restart]
        );
        assert!(monitor.recovery_actions(Some(&noisy))[0].completed);

        let stats = monitor.stats();
        assert_eq!(stats.recovery_actions, 3);
        assert_eq!(stats.total_errors, 27);
        assert_eq!(stats.recoveries_by_kind.get(&RecoveryKind::Restart), Some(&1));
    }

    #[test]
    fn test_auto_recovery_disabled() {
        let monitor = monitor(HealthConfig {
            auto_recovery: false,
            ..HealthConfig::default()
        });
        let id = agent("gfa-1");
        monitor.register_agent(&id, AgentRole::Feature);
        monitor.update_status(&id, StatusUpdate::default().errors(9)).unwrap();
        assert!(monitor.auto_recover(&id).unwrap().is_none());
    }

    #[test]
    fn test_crashed_agent_stays_crashed() {
        let monitor = monitor(HealthConfig::default());
        let id = agent("gfa-1");
        monitor.register_agent(&id, AgentRole::Feature);
        monitor.report_crash(&id, "process exited").unwrap();

        assert_eq!(monitor.heartbeat(&id).unwrap(), AgentHealth::Crashed);
        assert_eq!(monitor.perform_health_check(&id).unwrap().status, AgentHealth::Crashed);
        assert!(monitor.auto_recover(&id).unwrap().is_none());

        // Re-registration resets
        monitor.register_agent(&id, AgentRole::Feature);
        assert_eq!(monitor.get_status(&id).unwrap().health, AgentHealth::Healthy);
    }

    #[test]
    fn test_history_is_bounded() {
        let monitor = monitor(HealthConfig {
            max_checks_per_agent: 3,
            ..HealthConfig::default()
        });
        let id = agent("gfa-1");
        monitor.register_agent(&id, AgentRole::Feature);
        for _ in 0..5 {
            monitor.perform_health_check(&id).unwrap();
        }
        assert_eq!(monitor.health_history(&id).len(), 3);
        assert_eq!(monitor.stats().checks_total, 5);
    }

    #[test]
    fn test_recovery_log_is_bounded() {
        let monitor = monitor(HealthConfig {
            max_checks_per_agent: 10,
            ..HealthConfig::default()
        });
        let id = agent("gsa-1");
        monitor.register_agent(&id, AgentRole::Setup);
        monitor.update_status(&id, StatusUpdate::default().errors(5)).unwrap();

        for _ in 0..500 {
            monitor.run_cycle();
        }
        assert_eq!(monitor.recovery_actions(Some(&id)).len(), 10);
        assert_eq!(monitor.recovery_actions(None).len(), 10);

        let stats = monitor.stats();
        assert_eq!(stats.recovery_actions, 500);
        assert_eq!(stats.recoveries_by_kind.get(&RecoveryKind::Restart), Some(&500));

        monitor.unregister_agent(&id);
        assert!(monitor.recovery_actions(None).is_empty());
        assert_eq!(monitor.stats().recovery_actions, 500);
    }

    #[tokio::test]
    async fn test_monitoring_loop_recovers_silent_agents() {
        let monitor = monitor(HealthConfig {
            heartbeat_timeout_ms: 20,
            check_interval_ms: 30,
            ..HealthConfig::default()
        });
        let id = agent("gfa-1");
        monitor.register_agent(&id, AgentRole::Feature);

        let token = CancellationToken::new();
        let handle = monitor.clone().start_monitoring(token.clone());
        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();
        handle.await.unwrap();

        let actions = monitor.recovery_actions(Some(&id));
        assert!(!actions.is_empty());
        assert_eq!(actions[0].kind, RecoveryKind::Restart);
    }
}
