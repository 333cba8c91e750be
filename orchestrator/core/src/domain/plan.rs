// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Plan
//!
//! Phased, parallelism-aware schedule produced by the execution planner and
//! consumed once by the coordination agent.

use crate::domain::agent::AgentRole;
use crate::domain::task::{ParallelTaskGroup, TaskNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One sweep of the planner: everything ready once earlier phases are done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPhase {
    /// 1-based phase number.
    pub number: usize,
    pub name: String,
    pub parallel_groups: Vec<ParallelTaskGroup>,
    /// Ready tasks not placed in a group; run one at a time after the groups join.
    pub sequential_tasks: Vec<TaskNode>,
    /// Numbers of the phases holding this phase's dependencies.
    pub depends_on: Vec<usize>,
    pub estimated_minutes: u64,
}

impl ExecutionPhase {
    pub fn task_ids(&self) -> Vec<&str> {
        self.parallel_groups
            .iter()
            .flat_map(|g| g.tasks.iter())
            .chain(self.sequential_tasks.iter())
            .map(|t| t.id.as_str())
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.parallel_groups.iter().map(|g| g.tasks.len()).sum::<usize>() + self.sequential_tasks.len()
    }

    /// Tasks that may be in flight at the same moment in this phase.
    pub fn concurrent_capacity(&self) -> usize {
        let grouped: usize = self
            .parallel_groups
            .iter()
            .map(|g| g.tasks.len().min(g.max_concurrency.max(1)))
            .sum();
        grouped + usize::from(!self.sequential_tasks.is_empty())
    }
}

/// Capacity units assigned to one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAllocation {
    pub task_ids: Vec<String>,
    /// CPU-equivalent: min(task count, role capacity).
    pub cpu_units: usize,
    pub memory_mb: u64,
    pub context_tokens: u64,
}

/// Linear per-role accounting; not a real scheduler.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub roles: BTreeMap<AgentRole, RoleAllocation>,
}

impl ResourceAllocation {
    pub fn total_cpu_units(&self) -> usize {
        self.roles.values().map(|r| r.cpu_units).sum()
    }

    pub fn total_memory_mb(&self) -> u64 {
        self.roles.values().map(|r| r.memory_mb).sum()
    }

    pub fn total_context_tokens(&self) -> u64 {
        self.roles.values().map(|r| r.context_tokens).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub phases: Vec<ExecutionPhase>,
    pub resource_allocation: ResourceAllocation,
    /// Average number of concurrently schedulable tasks per phase.
    pub parallelism_degree: f64,
    pub estimated_minutes: u64,
    /// Sum of every task's duration, i.e. a fully sequential run.
    pub sequential_minutes: u64,
}

impl ExecutionPlan {
    pub fn total_tasks(&self) -> usize {
        self.phases.iter().map(ExecutionPhase::task_count).sum()
    }

    /// Expected speedup over a sequential run.
    pub fn speedup(&self) -> f64 {
        if self.estimated_minutes == 0 {
            1.0
        } else {
            self.sequential_minutes as f64 / self.estimated_minutes as f64
        }
    }

    /// Phase number holding the task, if scheduled.
    pub fn phase_of(&self, task_id: &str) -> Option<usize> {
        self.phases
            .iter()
            .find(|p| p.task_ids().contains(&task_id))
            .map(|p| p.number)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanningError {
    #[error("task '{task_id}' depends on unknown task '{dependency}'")]
    UnknownDependency { task_id: String, dependency: String },

    #[error("task id '{0}' appears more than once in the tree")]
    DuplicateTaskId(String),

    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("{} task(s) could not be scheduled: {}", task_ids.len(), task_ids.join(", "))]
    Unschedulable { task_ids: Vec<String> },

    #[error("task tree contains no executable tasks")]
    EmptyTree,
}
