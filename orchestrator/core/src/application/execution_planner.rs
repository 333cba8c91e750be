// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution Planner
//!
//! Schedules the leaves of a [`TaskTree`] into ordered [`ExecutionPhase`]s.
//!
//! Each sweep collects the ready set (unscheduled leaves whose dependencies
//! were all placed in earlier phases) and emits one phase. Inside a phase,
//! ready tasks of a parallel-capable role are batched into a group when there
//! are at least two of them; everything else runs sequentially after the
//! groups join.
//!
//! Dependency resolution:
//! - a leaf inherits the declared dependencies of every ancestor
//! - a dependency on an interior node stands for all of its leaf descendants
//! - `Completed` leaves count as already placed; `Blocked` leaves are never
//!   ready, so they and their dependents end up in `Unschedulable`
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Topological phase scheduling, role batching, resource accounting

use crate::domain::agent::AgentRole;
use crate::domain::config::PlannerConfig;
use crate::domain::plan::{ExecutionPhase, ExecutionPlan, PlanningError, ResourceAllocation, RoleAllocation};
use crate::domain::task::{GroupStrategy, ParallelTaskGroup, TaskNode, TaskStatus, TaskTree};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// A schedulable leaf with its dependencies flattened to leaf ids.
struct ResolvedLeaf<'a> {
    node: &'a TaskNode,
    deps: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionPlanner {
    config: PlannerConfig,
    max_parallel: Option<usize>,
}

impl ExecutionPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            max_parallel: None,
        }
    }

    /// Global ceiling on group concurrency, applied on top of role capacity.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = Some(max_parallel.max(1));
        self
    }

    pub fn plan_execution(&self, tree: &TaskTree) -> Result<ExecutionPlan, PlanningError> {
        let index = index_nodes(&tree.root)?;
        check_dependencies(&tree.root, &index)?;

        let mut leaves = Vec::new();
        resolve_leaves(&tree.root, &[], &index, &mut leaves);

        let graph: BTreeMap<&str, Vec<&str>> = leaves
            .iter()
            .map(|l| (l.node.id.as_str(), l.deps.iter().map(String::as_str).collect()))
            .collect();
        if let Some(cycle) = find_cycle(&graph) {
            warn!(cycle = %cycle.join(" -> "), "Dependency cycle in task tree");
            return Err(PlanningError::DependencyCycle(cycle));
        }

        // Phase 0 marks work finished before planning.
        let mut placed: HashMap<String, usize> = leaves
            .iter()
            .filter(|l| l.node.status == TaskStatus::Completed)
            .map(|l| (l.node.id.clone(), 0))
            .collect();
        let mut pending: Vec<&ResolvedLeaf> = leaves
            .iter()
            .filter(|l| l.node.status != TaskStatus::Completed)
            .collect();
        if pending.is_empty() {
            return Err(PlanningError::EmptyTree);
        }

        let mut phases = Vec::new();
        while !pending.is_empty() {
            let number = phases.len() + 1;
            let (ready, rest): (Vec<&ResolvedLeaf>, Vec<&ResolvedLeaf>) = pending.into_iter().partition(|l| {
                l.node.status != TaskStatus::Blocked && l.deps.iter().all(|d| placed.contains_key(d))
            });
            pending = rest;
            if ready.is_empty() {
                break;
            }

            let phase = self.build_phase(number, &ready, &placed);
            debug!(
                phase = number,
                tasks = phase.task_count(),
                groups = phase.parallel_groups.len(),
                "Planned phase"
            );
            for leaf in &ready {
                placed.insert(leaf.node.id.clone(), number);
            }
            phases.push(phase);
        }

        if !pending.is_empty() {
            let mut task_ids: Vec<String> = pending.iter().map(|l| l.node.id.clone()).collect();
            task_ids.sort();
            warn!(count = task_ids.len(), "Tasks could not be scheduled");
            return Err(PlanningError::Unschedulable { task_ids });
        }

        let resource_allocation = self.allocate_resources(&phases);
        let parallelism_degree =
            phases.iter().map(ExecutionPhase::concurrent_capacity).sum::<usize>() as f64 / phases.len() as f64;
        let estimated_minutes = phases.iter().map(|p| p.estimated_minutes).sum();
        let sequential_minutes = phases
            .iter()
            .flat_map(|p| {
                p.parallel_groups
                    .iter()
                    .flat_map(|g| g.tasks.iter())
                    .chain(p.sequential_tasks.iter())
            })
            .map(|t| t.estimated_minutes)
            .sum();

        let plan = ExecutionPlan {
            phases,
            resource_allocation,
            parallelism_degree,
            estimated_minutes,
            sequential_minutes,
        };
        info!(
            phases = plan.phases.len(),
            tasks = plan.total_tasks(),
            estimated_minutes = plan.estimated_minutes,
            speedup = plan.speedup(),
            "Execution plan ready"
        );
        Ok(plan)
    }

    fn build_phase(&self, number: usize, ready: &[&ResolvedLeaf], placed: &HashMap<String, usize>) -> ExecutionPhase {
        let depends_on: BTreeSet<usize> = ready
            .iter()
            .flat_map(|l| l.deps.iter())
            .filter_map(|d| placed.get(d).copied())
            .filter(|phase| *phase > 0)
            .collect();

        // Partition by role, keeping first-seen order.
        let mut by_role: Vec<(AgentRole, Vec<&ResolvedLeaf>)> = Vec::new();
        for leaf in ready {
            match by_role.iter_mut().find(|(role, _)| *role == leaf.node.role) {
                Some((_, tasks)) => tasks.push(*leaf),
                None => by_role.push((leaf.node.role, vec![*leaf])),
            }
        }

        let mut parallel_groups = Vec::new();
        let mut sequential_tasks = Vec::new();
        for (role, tasks) in by_role {
            let capacity = self.config.capacity_for(role);
            if !capacity.parallel || tasks.len() < 2 {
                sequential_tasks.extend(tasks.iter().map(|l| scheduled(l)));
                continue;
            }

            let max_concurrency = capacity
                .capacity
                .min(self.max_parallel.unwrap_or(usize::MAX))
                .min(tasks.len())
                .max(1);
            let longest = tasks.iter().map(|l| l.node.estimated_minutes).max().unwrap_or(0);
            let dependencies: BTreeSet<String> = tasks.iter().flat_map(|l| l.deps.iter().cloned()).collect();

            parallel_groups.push(ParallelTaskGroup {
                id: format!("phase-{}-{}", number, role),
                name: format!("Parallel {} tasks", role),
                tasks: tasks.iter().map(|l| scheduled(l)).collect(),
                strategy: GroupStrategy::RoleBatch,
                dependencies: dependencies.into_iter().collect(),
                estimated_minutes: longest * tasks.len().div_ceil(max_concurrency) as u64,
                max_concurrency,
            });
        }

        let longest_group = parallel_groups.iter().map(|g| g.estimated_minutes).max().unwrap_or(0);
        let sequential: u64 = sequential_tasks.iter().map(|t: &TaskNode| t.estimated_minutes).sum();

        let mut roles: Vec<&'static str> = Vec::new();
        for task in parallel_groups.iter().flat_map(|g| g.tasks.iter()).chain(sequential_tasks.iter()) {
            if !roles.contains(&task.role.as_str()) {
                roles.push(task.role.as_str());
            }
        }

        ExecutionPhase {
            number,
            name: format!("Phase {}: {}", number, roles.join(", ")),
            parallel_groups,
            sequential_tasks,
            depends_on: depends_on.into_iter().collect(),
            estimated_minutes: longest_group + sequential,
        }
    }

    fn allocate_resources(&self, phases: &[ExecutionPhase]) -> ResourceAllocation {
        let mut assigned: BTreeMap<AgentRole, Vec<String>> = BTreeMap::new();
        for phase in phases {
            let tasks = phase
                .parallel_groups
                .iter()
                .flat_map(|g| g.tasks.iter())
                .chain(phase.sequential_tasks.iter());
            for task in tasks {
                assigned.entry(task.role).or_default().push(task.id.clone());
            }
        }

        let roles = assigned
            .into_iter()
            .map(|(role, task_ids)| {
                let count = task_ids.len();
                let allocation = RoleAllocation {
                    cpu_units: count.min(self.config.capacity_for(role).capacity),
                    memory_mb: count as u64 * self.config.memory_unit_mb,
                    context_tokens: count as u64 * self.config.context_unit_tokens,
                    task_ids,
                };
                (role, allocation)
            })
            .collect();

        ResourceAllocation { roles }
    }
}

fn scheduled(leaf: &ResolvedLeaf) -> TaskNode {
    let mut node = leaf.node.clone();
    node.dependencies = leaf.deps.clone();
    node.status = TaskStatus::Ready;
    node
}

fn index_nodes(root: &TaskNode) -> Result<HashMap<&str, &TaskNode>, PlanningError> {
    let mut index = HashMap::new();
    for node in root.walk() {
        if index.insert(node.id.as_str(), node).is_some() {
            return Err(PlanningError::DuplicateTaskId(node.id.clone()));
        }
    }
    Ok(index)
}

fn check_dependencies(root: &TaskNode, index: &HashMap<&str, &TaskNode>) -> Result<(), PlanningError> {
    for node in root.walk() {
        if let Some(missing) = node.dependencies.iter().find(|d| !index.contains_key(d.as_str())) {
            return Err(PlanningError::UnknownDependency {
                task_id: node.id.clone(),
                dependency: missing.clone(),
            });
        }
    }
    Ok(())
}

fn resolve_leaves<'a>(
    node: &'a TaskNode,
    inherited: &[String],
    index: &HashMap<&str, &'a TaskNode>,
    out: &mut Vec<ResolvedLeaf<'a>>,
) {
    let mut declared = inherited.to_vec();
    declared.extend(node.dependencies.iter().cloned());

    if !node.is_leaf() {
        for child in &node.subtasks {
            resolve_leaves(child, &declared, index, out);
        }
        return;
    }

    let deps: BTreeSet<String> = declared
        .iter()
        .filter_map(|d| index.get(d.as_str()))
        .flat_map(|target| target.leaves())
        .map(|leaf| leaf.id.clone())
        .collect();
    out.push(ResolvedLeaf {
        node,
        deps: deps.into_iter().collect(),
    });
}

/// Depth-first search with a recursion stack. Returns the first cycle found,
/// closed (first id repeated at the end).
fn find_cycle(graph: &BTreeMap<&str, Vec<&str>>) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut path = Vec::new();
    for &start in graph.keys() {
        if !visited.contains(start) {
            if let Some(cycle) = visit(start, graph, &mut visited, &mut on_stack, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    graph: &BTreeMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    on_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    on_stack.insert(node);
    path.push(node);

    for &dep in graph.get(node).map(Vec::as_slice).unwrap_or_default() {
        if on_stack.contains(dep) {
            let start = path.iter().position(|n| *n == dep).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(dep.to_string());
            return Some(cycle);
        }
        if !visited.contains(dep) {
            if let Some(cycle) = visit(dep, graph, visited, on_stack, path) {
                return Some(cycle);
            }
        }
    }

    on_stack.remove(node);
    path.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::task_decomposer::TaskDecomposer;
    use crate::domain::config::RoleCapacity;
    use crate::domain::project::{ProjectArchetype, ProjectSpec};
    use crate::domain::task::TaskType;

    fn leaf(id: &str, role: AgentRole, minutes: u64) -> TaskNode {
        TaskNode::new(id, id, TaskType::Feature, role).with_duration(minutes)
    }

    fn tree(children: Vec<TaskNode>) -> TaskTree {
        let mut root = TaskNode::new("root", "root", TaskType::Project, AgentRole::Coordinator);
        root.subtasks = children;
        TaskTree {
            total_tasks: root.node_count(),
            root,
            estimated_minutes: 0,
            critical_path: vec![],
            parallel_groups: vec![],
        }
    }

    #[test]
    fn test_decomposed_project_yields_four_chained_phases() {
        let spec = ProjectSpec::new("taskboard", ProjectArchetype::SaasApp)
            .with_features(["user authentication", "user dashboard", "settings page"]);
        let tree = TaskDecomposer::new().decompose_project(&spec);
        let plan = ExecutionPlanner::default().plan_execution(&tree).unwrap();

        assert_eq!(plan.phases.len(), 4);
        assert_eq!(plan.phases[0].task_ids(), vec!["setup"]);
        assert_eq!(plan.phases[2].task_ids(), vec!["integration"]);
        assert_eq!(plan.phases[3].task_ids(), vec!["deployment"]);
        for (i, phase) in plan.phases.iter().enumerate().skip(1) {
            assert_eq!(phase.depends_on, vec![i]);
        }

        let build = &plan.phases[1];
        assert_eq!(build.parallel_groups.len(), 1);
        assert!(build.sequential_tasks.is_empty());
        let group = &build.parallel_groups[0];
        assert_eq!(group.strategy, GroupStrategy::RoleBatch);
        assert_eq!(group.max_concurrency, 3);
        assert_eq!(group.estimated_minutes, 45);

        // Integration waits on every feature leaf, not the interior build node.
        let integration = &plan.phases[2].sequential_tasks[0];
        assert_eq!(integration.dependencies.len(), 3);
        assert!(integration.dependencies.iter().all(|d| d.starts_with("feature-")));
    }

    #[test]
    fn test_group_duration_scales_with_batches() {
        let t = tree(vec![
            leaf("a", AgentRole::Feature, 10),
            leaf("b", AgentRole::Feature, 20),
            leaf("c", AgentRole::Feature, 5),
            leaf("d", AgentRole::Feature, 5),
        ]);
        let plan = ExecutionPlanner::default().plan_execution(&t).unwrap();
        let group = &plan.phases[0].parallel_groups[0];
        assert_eq!(group.max_concurrency, 3);
        // ceil(4 / 3) rounds of the longest task
        assert_eq!(group.estimated_minutes, 40);
        assert_eq!(plan.estimated_minutes, 40);
        assert_eq!(plan.sequential_minutes, 40);
    }

    #[test]
    fn test_max_parallel_ceiling_applies() {
        let t = tree(vec![
            leaf("a", AgentRole::Feature, 10),
            leaf("b", AgentRole::Feature, 10),
            leaf("c", AgentRole::Feature, 10),
        ]);
        let plan = ExecutionPlanner::default().with_max_parallel(1).plan_execution(&t).unwrap();
        let group = &plan.phases[0].parallel_groups[0];
        assert_eq!(group.max_concurrency, 1);
        assert_eq!(group.estimated_minutes, 30);
    }

    #[test]
    fn test_single_or_sequential_role_tasks_run_sequentially() {
        let t = tree(vec![
            leaf("f", AgentRole::Feature, 10),
            leaf("i1", AgentRole::Integration, 5),
            leaf("i2", AgentRole::Integration, 7),
        ]);
        let plan = ExecutionPlanner::default().plan_execution(&t).unwrap();
        assert_eq!(plan.phases.len(), 1);
        let phase = &plan.phases[0];
        assert!(phase.parallel_groups.is_empty());
        assert_eq!(phase.task_ids(), vec!["f", "i1", "i2"]);
        assert_eq!(phase.estimated_minutes, 22);
        assert_eq!(phase.name, "Phase 1: feature, integration");
    }

    #[test]
    fn test_resource_allocation_is_linear() {
        let mut config = PlannerConfig::default();
        config.roles.insert(AgentRole::Feature, RoleCapacity { parallel: true, capacity: 2 });
        let t = tree(vec![
            leaf("a", AgentRole::Feature, 10),
            leaf("b", AgentRole::Feature, 10),
            leaf("c", AgentRole::Feature, 10),
            leaf("s", AgentRole::Setup, 10),
        ]);
        let plan = ExecutionPlanner::new(config).plan_execution(&t).unwrap();
        let feature = &plan.resource_allocation.roles[&AgentRole::Feature];
        assert_eq!(feature.cpu_units, 2);
        assert_eq!(feature.memory_mb, 3 * 512);
        assert_eq!(feature.context_tokens, 3 * 8_000);
        assert_eq!(plan.resource_allocation.roles[&AgentRole::Setup].cpu_units, 1);
        assert_eq!(plan.resource_allocation.total_cpu_units(), 3);
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let t = tree(vec![leaf("a", AgentRole::Feature, 1).with_dependencies(["ghost"])]);
        let err = ExecutionPlanner::default().plan_execution(&t).unwrap_err();
        assert_eq!(
            err,
            PlanningError::UnknownDependency {
                task_id: "a".to_string(),
                dependency: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_cycle_is_reported() {
        let t = tree(vec![
            leaf("a", AgentRole::Feature, 1).with_dependencies(["b"]),
            leaf("b", AgentRole::Feature, 1).with_dependencies(["a"]),
        ]);
        let err = ExecutionPlanner::default().plan_execution(&t).unwrap_err();
        assert_eq!(
            err,
            PlanningError::DependencyCycle(vec!["a".to_string(), "b".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_dependency_on_own_ancestor_is_a_cycle() {
        let phase = TaskNode::new("p", "p", TaskType::Phase, AgentRole::Feature)
            .with_subtask(leaf("x", AgentRole::Feature, 1).with_dependencies(["p"]));
        let err = ExecutionPlanner::default().plan_execution(&tree(vec![phase])).unwrap_err();
        assert!(matches!(err, PlanningError::DependencyCycle(_)));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let t = tree(vec![leaf("a", AgentRole::Feature, 1), leaf("a", AgentRole::Setup, 1)]);
        assert_eq!(
            ExecutionPlanner::default().plan_execution(&t).unwrap_err(),
            PlanningError::DuplicateTaskId("a".to_string())
        );
    }

    #[test]
    fn test_blocked_task_and_dependents_are_unschedulable() {
        let mut blocked = leaf("b", AgentRole::Setup, 1);
        blocked.status = TaskStatus::Blocked;
        let t = tree(vec![
            leaf("a", AgentRole::Setup, 1),
            blocked,
            leaf("c", AgentRole::Integration, 1).with_dependencies(["b"]),
        ]);
        let err = ExecutionPlanner::default().plan_execution(&t).unwrap_err();
        assert_eq!(
            err,
            PlanningError::Unschedulable {
                task_ids: vec!["b".to_string(), "c".to_string()]
            }
        );
    }

    #[test]
    fn test_completed_tasks_satisfy_dependencies() {
        let mut done = leaf("a", AgentRole::Setup, 1);
        done.status = TaskStatus::Completed;
        let t = tree(vec![done, leaf("b", AgentRole::Feature, 1).with_dependencies(["a"])]);
        let plan = ExecutionPlanner::default().plan_execution(&t).unwrap();
        assert_eq!(plan.phases.len(), 1);
        assert_eq!(plan.phases[0].task_ids(), vec!["b"]);
        assert!(plan.phases[0].depends_on.is_empty());
    }

    #[test]
    fn test_fully_completed_tree_is_empty() {
        let mut done = leaf("a", AgentRole::Setup, 1);
        done.status = TaskStatus::Completed;
        assert_eq!(
            ExecutionPlanner::default().plan_execution(&tree(vec![done])).unwrap_err(),
            PlanningError::EmptyTree
        );
    }
}
