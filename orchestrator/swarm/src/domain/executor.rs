// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Executor
//!
//! The seam between scheduling and real work. The coordination agent hands a
//! leaf [`TaskNode`] and the worker id it was assigned to; the executor
//! reports success, free-form output and named quality signals.

use async_trait::async_trait;
use genesis_core::domain::agent::AgentId;
use genesis_core::domain::task::TaskNode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    #[serde(default)]
    pub output: serde_json::Value,
    /// Named scores in `0.0..=1.0`, e.g. `test_coverage`.
    #[serde(default)]
    pub quality: BTreeMap<String, f64>,
}

impl TaskOutcome {
    pub fn succeeded(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            quality: BTreeMap::new(),
        }
    }

    pub fn failed(output: serde_json::Value) -> Self {
        Self {
            success: false,
            output,
            quality: BTreeMap::new(),
        }
    }

    pub fn with_quality(mut self, name: impl Into<String>, score: f64) -> Self {
        self.quality.insert(name.into(), score);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    #[error("task '{task_id}' failed: {message}")]
    Failed { task_id: String, message: String },
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskNode, agent: &AgentId) -> Result<TaskOutcome, ExecutorError>;
}
