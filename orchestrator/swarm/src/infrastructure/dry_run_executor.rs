// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Dry-Run Task Executor
//
// Stands in for real workers: every task "runs" for a scaled fraction of its
// estimate and succeeds, unless its id was marked to fail. Used by the CLI
// `run` command and by integration tests.

use crate::domain::executor::{ExecutorError, TaskExecutor, TaskOutcome};
use async_trait::async_trait;
use genesis_core::domain::agent::AgentId;
use genesis_core::domain::task::TaskNode;
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor {
    /// Simulated wall time per estimated minute.
    time_per_minute: Duration,
    failing: HashSet<String>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_per_minute(mut self, time_per_minute: Duration) -> Self {
        self.time_per_minute = time_per_minute;
        self
    }

    pub fn failing<I, S>(mut self, task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing.extend(task_ids.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl TaskExecutor for DryRunExecutor {
    async fn execute(&self, task: &TaskNode, agent: &AgentId) -> Result<TaskOutcome, ExecutorError> {
        let simulated = self.time_per_minute.saturating_mul(task.estimated_minutes.min(u32::MAX as u64) as u32);
        if !simulated.is_zero() {
            tokio::time::sleep(simulated).await;
        }

        if self.failing.contains(&task.id) {
            return Err(ExecutorError::Failed {
                task_id: task.id.clone(),
                message: "marked to fail in dry run".to_string(),
            });
        }

        info!(task_id = %task.id, agent_id = %agent, minutes = task.estimated_minutes, "Dry run: task executed");
        Ok(TaskOutcome::succeeded(serde_json::json!({
            "dry_run": true,
            "task_id": task.id,
            "agent_id": agent,
            "estimated_minutes": task.estimated_minutes,
            "patterns": task.metadata.patterns,
        }))
        .with_quality("completeness", 1.0))
    }
}
