// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Tree
//!
//! Hierarchical, dependency-annotated decomposition of a project.
//!
//! ## Invariants
//!
//! - Dependency edges are plain id lists (string-keyed adjacency), never
//!   references between nodes.
//! - Tree edges plus dependency edges form a DAG; a cycle is rejected by the
//!   planner with `PlanningError::DependencyCycle`.

use crate::domain::agent::AgentRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    InProgress,
    Blocked,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Root of a decomposition.
    Project,
    /// Grouping node for one build phase.
    Phase,
    Setup,
    Feature,
    Integration,
    Testing,
    Deployment,
}

/// Bookkeeping carried by every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub checkpoints: Vec<String>,
    /// Genesis pattern ids this node implements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl Default for TaskMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            attempts: 0,
            errors: Vec::new(),
            checkpoints: Vec::new(),
            patterns: Vec::new(),
            labels: HashMap::new(),
        }
    }
}

/// One node of the task tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    pub title: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub role: AgentRole,
    /// Ids of nodes that must complete before this one may start.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Ordered children.
    #[serde(default)]
    pub subtasks: Vec<TaskNode>,
    /// Estimated duration in minutes.
    pub estimated_minutes: u64,
    /// Higher runs earlier when a caller needs a tie-break.
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, title: impl Into<String>, task_type: TaskType, role: AgentRole) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            task_type,
            status: TaskStatus::Pending,
            role,
            dependencies: Vec::new(),
            subtasks: Vec::new(),
            estimated_minutes: 0,
            priority: 0,
            metadata: TaskMetadata::default(),
        }
    }

    pub fn with_duration(mut self, minutes: u64) -> Self {
        self.estimated_minutes = minutes;
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_subtask(mut self, node: TaskNode) -> Self {
        self.subtasks.push(node);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.subtasks.is_empty()
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.subtasks.iter().map(TaskNode::node_count).sum::<usize>()
    }

    /// Pre-order traversal of this subtree.
    pub fn walk(&self) -> Vec<&TaskNode> {
        let mut out = Vec::with_capacity(self.node_count());
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.subtasks.iter().rev());
        }
        out
    }

    pub fn find(&self, id: &str) -> Option<&TaskNode> {
        self.walk().into_iter().find(|n| n.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut TaskNode> {
        if self.id == id {
            return Some(self);
        }
        self.subtasks.iter_mut().find_map(|child| child.find_mut(id))
    }

    /// Leaf descendants of this node (the node itself when it is a leaf).
    pub fn leaves(&self) -> Vec<&TaskNode> {
        self.walk().into_iter().filter(|n| n.is_leaf()).collect()
    }
}

/// How the members of a parallel group may be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStrategy {
    /// Independent siblings found in the tree; all may start together.
    Independent,
    /// Same-role ready tasks batched by the planner, bounded by role capacity.
    RoleBatch,
}

/// Tasks that can run concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelTaskGroup {
    pub id: String,
    pub name: String,
    pub tasks: Vec<TaskNode>,
    pub strategy: GroupStrategy,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub estimated_minutes: u64,
    pub max_concurrency: usize,
}

impl ParallelTaskGroup {
    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }
}

/// Output of the task decomposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTree {
    pub root: TaskNode,
    pub total_tasks: usize,
    /// Optimistic estimate: the longest subtree, assuming parallel execution.
    pub estimated_minutes: u64,
    pub critical_path: Vec<String>,
    pub parallel_groups: Vec<ParallelTaskGroup>,
}

impl TaskTree {
    pub fn find(&self, id: &str) -> Option<&TaskNode> {
        self.root.find(id)
    }

    pub fn nodes(&self) -> Vec<&TaskNode> {
        self.root.walk()
    }
}
