// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Coordination Agent
//!
//! Drives one project end to end: decompose the project specification, plan phases,
//! run every phase through a [`TaskExecutor`] and fold the task results into
//! a [`ProjectOutcome`].
//!
//! Within a phase all parallel groups run concurrently (each bounded by its
//! `max_concurrency`) and are joined before the phase's sequential tasks run
//! one at a time. Phases run strictly in order.
//!
//! Each role is served by one worker id (`gfa-1`, `gia-1`, ...). When a
//! health monitor is attached, workers are registered and their load is
//! reported as tasks start and finish. When a message bus is attached,
//! workers receive a task assignment before each task and answer with a
//! status update.
//!
//! With `halt_on_failure`, the first phase containing a failed task stops
//! the run and every later task is reported as blocked. An emergency stop
//! does the same immediately, including tasks still waiting in the current
//! phase.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Project orchestration across phases and workers

use crate::application::health_monitor::HealthMonitor;
use crate::application::message_bus::MessageBus;
use crate::domain::executor::{TaskExecutor, TaskOutcome};
use crate::domain::health::StatusUpdate;
use crate::domain::message::{MessagePayload, MessagePriority};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use genesis_core::application::task_decomposer::{TaskDecomposer, SETUP_TASK_ID};
use genesis_core::application::ExecutionPlanner;
use genesis_core::domain::agent::{AgentId, AgentRole};
use genesis_core::domain::config::{ExecutionConfig, PlannerConfig};
use genesis_core::domain::events::CoordinationEventKind;
use genesis_core::domain::plan::{ExecutionPhase, ExecutionPlan, PlanningError};
use genesis_core::domain::project::ProjectSpec;
use genesis_core::domain::task::{ParallelTaskGroup, TaskNode, TaskStatus, TaskType};
use genesis_core::infrastructure::event_bus::EventBus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub title: String,
    pub task_type: TaskType,
    pub role: AgentRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TaskOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskResult {
    fn blocked(task: &TaskNode, reason: &str) -> Self {
        Self {
            task_id: task.id.clone(),
            title: task.title.clone(),
            task_type: task.task_type,
            role: task.role,
            agent_id: None,
            status: TaskStatus::Blocked,
            outcome: None,
            error: Some(reason.to_string()),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectValidation {
    /// The scaffolding task completed.
    pub project_created: bool,
    pub features_completed: usize,
    pub features_total: usize,
    pub all_succeeded: bool,
    pub failed_tasks: Vec<String>,
    pub blocked_tasks: Vec<String>,
}

impl ProjectValidation {
    fn from_results(results: &[TaskResult]) -> Self {
        let features: Vec<&TaskResult> = results.iter().filter(|r| r.task_type == TaskType::Feature).collect();
        Self {
            project_created: results.iter().any(|r| r.task_id == SETUP_TASK_ID && r.succeeded()),
            features_completed: features.iter().filter(|r| r.succeeded()).count(),
            features_total: features.len(),
            all_succeeded: !results.is_empty() && results.iter().all(TaskResult::succeeded),
            failed_tasks: results
                .iter()
                .filter(|r| r.status == TaskStatus::Failed)
                .map(|r| r.task_id.clone())
                .collect(),
            blocked_tasks: results
                .iter()
                .filter(|r| r.status == TaskStatus::Blocked)
                .map(|r| r.task_id.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectOutcome {
    pub project: String,
    pub success: bool,
    pub plan: ExecutionPlan,
    pub results: Vec<TaskResult>,
    pub validation: ProjectValidation,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Reason given to [`CoordinationAgent::emergency_stop`], if the run was stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped: Option<String>,
}

impl ProjectOutcome {
    pub fn result(&self, task_id: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.task_id == task_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("execution planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("a project is already running on coordinator {0}")]
    AlreadyRunning(AgentId),
}

#[derive(Debug, Clone, Copy, Default)]
struct WorkerLoad {
    in_progress: u32,
    completed: u32,
    failed: u32,
    errors: u32,
}

struct ActiveRun {
    token: CancellationToken,
    stop_reason: Option<String>,
}

pub struct CoordinationAgent {
    id: AgentId,
    config: ExecutionConfig,
    planner_config: PlannerConfig,
    decomposer: TaskDecomposer,
    executor: Arc<dyn TaskExecutor>,
    health: Option<Arc<HealthMonitor>>,
    messages: Option<Arc<MessageBus>>,
    shutdown: CancellationToken,
    run: Mutex<Option<ActiveRun>>,
    workers: Mutex<HashMap<AgentRole, WorkerLoad>>,
    events: EventBus,
}

impl CoordinationAgent {
    pub fn new(
        id: AgentId,
        config: ExecutionConfig,
        planner_config: PlannerConfig,
        executor: Arc<dyn TaskExecutor>,
        events: EventBus,
    ) -> Self {
        Self {
            id,
            config,
            planner_config,
            decomposer: TaskDecomposer::new(),
            executor,
            health: None,
            messages: None,
            shutdown: CancellationToken::new(),
            run: Mutex::new(None),
            workers: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn with_health_monitor(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_message_bus(mut self, messages: Arc<MessageBus>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Runs are stopped when `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_decomposer(mut self, decomposer: TaskDecomposer) -> Self {
        self.decomposer = decomposer;
        self
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Worker id serving `role`.
    pub fn worker_for(role: AgentRole) -> AgentId {
        AgentId::new(format!("{}-1", role.worker_prefix()))
    }

    /// Plan without executing.
    pub fn plan_project(&self, spec: &ProjectSpec) -> Result<ExecutionPlan, PlanningError> {
        let tree = self.decomposer.decompose_project(spec);
        let max_parallel = spec.constraints.max_parallel.min(self.config.max_parallel).max(1);
        ExecutionPlanner::new(self.planner_config.clone())
            .with_max_parallel(max_parallel)
            .plan_execution(&tree)
    }

    pub async fn coordinate_autonomous_project(&self, spec: &ProjectSpec) -> Result<ProjectOutcome, CoordinationError> {
        let started_at = Utc::now();
        let plan = self.plan_project(spec)?;
        let token = self.begin_run()?;

        info!(
            coordinator = %self.id,
            project = %spec.name,
            phases = plan.phases.len(),
            tasks = plan.total_tasks(),
            parallelism = plan.parallelism_degree,
            "Starting autonomous project"
        );
        self.events.publish_agent_event(
            &self.id,
            CoordinationEventKind::ProjectStarted {
                project: spec.name.clone(),
            },
        );
        self.prepare_workers(&plan);

        let mut results = Vec::with_capacity(plan.total_tasks());
        let mut halted: Option<String> = None;
        for phase in &plan.phases {
            if halted.is_none() && token.is_cancelled() {
                halted = Some("run stopped".to_string());
            }
            if let Some(reason) = &halted {
                results.extend(phase_tasks(phase).map(|t| TaskResult::blocked(t, reason)));
                continue;
            }

            self.events.publish_agent_event(
                &self.id,
                CoordinationEventKind::PhaseStarted {
                    phase: phase.number,
                    tasks: phase.task_count(),
                },
            );
            let phase_results = self.execute_phase(phase, &token).await;
            let failed = phase_results.iter().filter(|r| r.status == TaskStatus::Failed).count();
            info!(phase = phase.number, name = %phase.name, failed, "Phase finished");
            self.events.publish_agent_event(
                &self.id,
                CoordinationEventKind::PhaseCompleted {
                    phase: phase.number,
                    failed,
                },
            );
            self.drain_coordinator_mailbox();
            results.extend(phase_results);

            if failed > 0 && self.config.halt_on_failure {
                warn!(phase = phase.number, failed, "Halting project after failed phase");
                halted = Some(format!("phase {} failed", phase.number));
            }
        }

        let stopped = self.end_run();
        let validation = ProjectValidation::from_results(&results);
        let success = validation.all_succeeded && stopped.is_none();
        let finished_at = Utc::now();

        if success {
            info!(project = %spec.name, tasks = results.len(), "Project completed");
        } else {
            error!(
                project = %spec.name,
                failed = validation.failed_tasks.len(),
                blocked = validation.blocked_tasks.len(),
                "Project did not complete"
            );
        }
        self.events.publish_agent_event(
            &self.id,
            CoordinationEventKind::ProjectCompleted {
                project: spec.name.clone(),
                success,
            },
        );

        Ok(ProjectOutcome {
            project: spec.name.clone(),
            success,
            plan,
            results,
            validation,
            started_at,
            finished_at,
            stopped,
        })
    }

    /// Cancel the run in progress. Returns `false` when nothing is running.
    pub fn emergency_stop(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let mut run = self.run.lock();
        let Some(active) = run.as_mut() else {
            return false;
        };
        error!(coordinator = %self.id, reason = %reason, "Emergency stop");
        active.stop_reason = Some(reason.clone());
        active.token.cancel();
        drop(run);

        self.events
            .publish_agent_event(&self.id, CoordinationEventKind::EmergencyStop { reason });
        true
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    fn begin_run(&self) -> Result<CancellationToken, CoordinationError> {
        let mut run = self.run.lock();
        if run.is_some() {
            return Err(CoordinationError::AlreadyRunning(self.id.clone()));
        }
        let token = self.shutdown.child_token();
        *run = Some(ActiveRun {
            token: token.clone(),
            stop_reason: None,
        });
        Ok(token)
    }

    /// Clears the active run; returns the stop reason if it was stopped.
    fn end_run(&self) -> Option<String> {
        let active = self.run.lock().take()?;
        match active.stop_reason {
            Some(reason) => Some(reason),
            None if active.token.is_cancelled() => Some("shutdown".to_string()),
            None => None,
        }
    }

    fn prepare_workers(&self, plan: &ExecutionPlan) {
        let mut roles: Vec<AgentRole> = plan
            .phases
            .iter()
            .flat_map(phase_tasks)
            .map(|t| t.role)
            .collect();
        roles.sort();
        roles.dedup();

        {
            let mut workers = self.workers.lock();
            workers.clear();
            for role in &roles {
                workers.insert(*role, WorkerLoad::default());
            }
        }

        if let Some(health) = &self.health {
            for role in &roles {
                health.register_agent(&Self::worker_for(*role), *role);
            }
        }
        if let Some(messages) = &self.messages {
            messages.register_mailbox(&self.id);
            for role in &roles {
                messages.register_mailbox(&Self::worker_for(*role));
            }
        }
    }

    async fn execute_phase(&self, phase: &ExecutionPhase, token: &CancellationToken) -> Vec<TaskResult> {
        let groups = join_all(phase.parallel_groups.iter().map(|g| self.execute_group(g, token))).await;
        let mut results: Vec<TaskResult> = groups.into_iter().flatten().collect();

        for task in &phase.sequential_tasks {
            results.push(self.execute_task(task, token).await);
        }
        results
    }

    async fn execute_group(&self, group: &ParallelTaskGroup, token: &CancellationToken) -> Vec<TaskResult> {
        debug!(group = %group.id, tasks = group.tasks.len(), max_concurrency = group.max_concurrency, "Running parallel group");
        let permits = Semaphore::new(group.max_concurrency.max(1));
        join_all(group.tasks.iter().map(|task| {
            let permits = &permits;
            async move {
                let _permit = permits.acquire().await.ok();
                self.execute_task(task, token).await
            }
        }))
        .await
    }

    async fn execute_task(&self, task: &TaskNode, token: &CancellationToken) -> TaskResult {
        if token.is_cancelled() {
            return TaskResult::blocked(task, "run stopped");
        }

        let worker = Self::worker_for(task.role);
        let started_at = Utc::now();
        self.report_load(task.role, |load| load.in_progress += 1);
        self.assign(task, &worker);
        debug!(task_id = %task.id, agent_id = %worker, "Task started");
        self.events.publish_agent_event(
            &worker,
            CoordinationEventKind::TaskStarted {
                task_id: task.id.clone(),
            },
        );

        let executed = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.executor.execute(task, &worker) => Some(result),
        };

        let (status, outcome, error) = match executed {
            None => (TaskStatus::Blocked, None, Some("run stopped".to_string())),
            Some(Ok(outcome)) if outcome.success => (TaskStatus::Completed, Some(outcome), None),
            Some(Ok(outcome)) => (
                TaskStatus::Failed,
                Some(outcome),
                Some("executor reported failure".to_string()),
            ),
            Some(Err(e)) => (TaskStatus::Failed, None, Some(e.to_string())),
        };

        self.report_load(task.role, |load| {
            load.in_progress = load.in_progress.saturating_sub(1);
            match status {
                TaskStatus::Completed => load.completed += 1,
                TaskStatus::Failed => {
                    load.failed += 1;
                    load.errors += 1;
                }
                _ => {}
            }
        });
        metrics::counter!("genesis_tasks_total", "status" => task_status_label(status)).increment(1);

        match status {
            TaskStatus::Completed => {
                debug!(task_id = %task.id, agent_id = %worker, "Task completed");
                self.events.publish_agent_event(
                    &worker,
                    CoordinationEventKind::TaskCompleted {
                        task_id: task.id.clone(),
                    },
                );
            }
            TaskStatus::Failed => {
                let message = error.clone().unwrap_or_default();
                warn!(task_id = %task.id, agent_id = %worker, error = %message, "Task failed");
                self.events.publish_agent_event(
                    &worker,
                    CoordinationEventKind::TaskFailed {
                        task_id: task.id.clone(),
                        error: message,
                    },
                );
            }
            _ => {}
        }
        self.acknowledge(task, &worker, status);

        TaskResult {
            task_id: task.id.clone(),
            title: task.title.clone(),
            task_type: task.task_type,
            role: task.role,
            agent_id: Some(worker),
            status,
            outcome,
            error,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        }
    }

    fn report_load(&self, role: AgentRole, change: impl FnOnce(&mut WorkerLoad)) {
        let load = {
            let mut workers = self.workers.lock();
            let load = workers.entry(role).or_default();
            change(load);
            *load
        };

        let Some(health) = &self.health else { return };
        let worker = Self::worker_for(role);
        let update = StatusUpdate::default()
            .in_progress(load.in_progress)
            .completed(load.completed)
            .failed(load.failed)
            .errors(load.errors);
        let reported = health
            .heartbeat(&worker)
            .and_then(|_| health.update_status(&worker, update));
        if let Err(e) = reported {
            warn!(agent_id = %worker, error = %e, "Failed to report worker load");
        }
    }

    fn assign(&self, task: &TaskNode, worker: &AgentId) {
        let Some(messages) = &self.messages else { return };
        let payload = MessagePayload::TaskAssignment {
            task_id: task.id.clone(),
            title: task.title.clone(),
            details: serde_json::json!({
                "role": task.role,
                "estimated_minutes": task.estimated_minutes,
                "patterns": task.metadata.patterns,
            }),
        };
        if let Err(e) = messages.send(&self.id, worker, payload, MessagePriority::High, None) {
            warn!(task_id = %task.id, agent_id = %worker, error = %e, "Failed to send task assignment");
        }
    }

    fn acknowledge(&self, task: &TaskNode, worker: &AgentId, status: TaskStatus) {
        let Some(messages) = &self.messages else { return };
        let payload = MessagePayload::StatusUpdate {
            status: format!("{}:{}", task.id, task_status_label(status)),
            progress: Some(1.0),
        };
        if let Err(e) = messages.send(worker, &self.id, payload, MessagePriority::Normal, None) {
            warn!(task_id = %task.id, agent_id = %worker, error = %e, "Failed to send status update");
        }
    }

    fn drain_coordinator_mailbox(&self) {
        let Some(messages) = &self.messages else { return };
        match messages.receive(&self.id, None) {
            Ok(updates) => debug!(coordinator = %self.id, updates = updates.len(), "Drained worker updates"),
            Err(e) => warn!(coordinator = %self.id, error = %e, "Failed to drain coordinator mailbox"),
        }
    }
}

fn phase_tasks(phase: &ExecutionPhase) -> impl Iterator<Item = &TaskNode> {
    phase
        .parallel_groups
        .iter()
        .flat_map(|g| g.tasks.iter())
        .chain(phase.sequential_tasks.iter())
}

fn task_status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Ready => "ready",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Blocked => "blocked",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::executor::ExecutorError;
    use crate::domain::health::AgentHealth;
    use async_trait::async_trait;
    use genesis_core::domain::config::{HealthConfig, MessagingConfig};
    use genesis_core::domain::project::ProjectArchetype;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Succeeds unless the task id is listed in `failing`; tracks peak concurrency.
    struct ScriptedExecutor {
        failing: HashSet<String>,
        delay: Duration,
        running: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn new(failing: &[&str], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                delay,
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TaskExecutor for ScriptedExecutor {
        async fn execute(&self, task: &TaskNode, _agent: &AgentId) -> Result<TaskOutcome, ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&task.id) {
                return Err(ExecutorError::Failed {
                    task_id: task.id.clone(),
                    message: "build error".to_string(),
                });
            }
            Ok(TaskOutcome::succeeded(serde_json::json!({ "task": task.id })).with_quality("tests", 1.0))
        }
    }

    fn spec() -> ProjectSpec {
        ProjectSpec::new("acme", ProjectArchetype::SaasApp)
            .with_features(["user authentication", "user dashboard", "settings page", "billing"])
    }

    fn agent(executor: Arc<dyn TaskExecutor>) -> CoordinationAgent {
        CoordinationAgent::new(
            AgentId::new("ca-main"),
            ExecutionConfig::default(),
            PlannerConfig::default(),
            executor,
            EventBus::new(1000),
        )
    }

    #[tokio::test]
    async fn test_successful_project() {
        let executor = ScriptedExecutor::new(&[], Duration::from_millis(5));
        let health = Arc::new(HealthMonitor::new(HealthConfig::default(), EventBus::new(100)));
        let agent = agent(executor.clone()).with_health_monitor(health.clone());

        let outcome = agent.coordinate_autonomous_project(&spec()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.plan.phases.len(), 4);
        assert_eq!(outcome.results.len(), 7);
        assert!(outcome.validation.project_created);
        assert_eq!(outcome.validation.features_completed, 4);
        assert_eq!(outcome.validation.features_total, 4);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 7);
        // Feature capacity 3 and max_parallel 3 cap the group
        assert_eq!(executor.peak.load(Ordering::SeqCst), 3);

        let feature_worker = health.get_status(&AgentId::new("gfa-1")).unwrap();
        assert_eq!(feature_worker.tasks_completed, 4);
        assert_eq!(feature_worker.tasks_in_progress, 0);
        assert_eq!(feature_worker.health, AgentHealth::Healthy);
        assert!(!agent.is_running());
    }

    #[tokio::test]
    async fn test_spec_parallel_limit_applies() {
        let executor = ScriptedExecutor::new(&[], Duration::from_millis(5));
        let agent = agent(executor.clone());
        agent
            .coordinate_autonomous_project(&spec().with_max_parallel(1))
            .await
            .unwrap();
        assert_eq!(executor.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_halts_later_phases() {
        let executor = ScriptedExecutor::new(&["setup"], Duration::from_millis(1));
        let agent = agent(executor.clone());
        let outcome = agent.coordinate_autonomous_project(&spec()).await.unwrap();

        assert!(!outcome.success);
        assert!(!outcome.validation.project_created);
        assert_eq!(outcome.validation.failed_tasks, vec!["setup".to_string()]);
        assert_eq!(outcome.validation.blocked_tasks.len(), 6);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.result("deployment").unwrap().status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn test_failures_continue_without_halt() {
        let executor = ScriptedExecutor::new(&["setup"], Duration::from_millis(1));
        let agent = CoordinationAgent::new(
            AgentId::new("ca-main"),
            ExecutionConfig {
                halt_on_failure: false,
                ..ExecutionConfig::default()
            },
            PlannerConfig::default(),
            executor.clone(),
            EventBus::new(1000),
        );
        let outcome = agent.coordinate_autonomous_project(&spec()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 7);
        assert_eq!(outcome.validation.features_completed, 4);
    }

    #[tokio::test]
    async fn test_emergency_stop_blocks_remaining_tasks() {
        let executor = ScriptedExecutor::new(&[], Duration::from_millis(200));
        let agent = Arc::new(agent(executor));
        assert!(!agent.emergency_stop("idle"));

        let runner = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.coordinate_autonomous_project(&spec()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(agent.emergency_stop("operator request"));

        let outcome = runner.await.unwrap().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.stopped.as_deref(), Some("operator request"));
        assert_eq!(outcome.validation.blocked_tasks.len(), 7);
        assert!(agent
            .events
            .recent(1000)
            .iter()
            .any(|e| e.event_type() == "emergency_stop"));
    }

    #[tokio::test]
    async fn test_workers_exchange_messages() {
        let executor = ScriptedExecutor::new(&[], Duration::from_millis(1));
        let bus = Arc::new(MessageBus::new(MessagingConfig::default(), EventBus::new(1000)));
        let agent = agent(executor).with_message_bus(bus.clone());
        agent.coordinate_autonomous_project(&spec()).await.unwrap();

        let assignments = bus.receive(&AgentId::new("gfa-1"), None).unwrap();
        assert_eq!(assignments.len(), 4);
        assert!(assignments
            .iter()
            .all(|m| matches!(m.payload, MessagePayload::TaskAssignment { .. })));
        assert_eq!(bus.queue_len(&AgentId::new("ca-main")), 0);
    }

    #[tokio::test]
    async fn test_plan_without_executing() {
        let executor = ScriptedExecutor::new(&[], Duration::from_millis(1));
        let agent = agent(executor.clone()).with_decomposer(TaskDecomposer::new().with_default_feature_minutes(45));
        let plan = agent.plan_project(&spec()).unwrap();
        assert_eq!(plan.phases.len(), 4);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }
}
