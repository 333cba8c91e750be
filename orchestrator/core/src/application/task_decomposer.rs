// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task Decomposer
//!
//! Turns a [`ProjectSpec`] into a [`TaskTree`]: a root node with a strictly
//! chained sequence of phase nodes (setup, build, integration, deployment).
//! Feature leaves under the build phase are annotated with the Genesis
//! patterns whose keywords match the feature name.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Project decomposition, duration estimates, critical path and
//!   sibling parallel groups

use crate::domain::agent::AgentRole;
use crate::domain::project::{GenesisPatternLibrary, ProjectSpec};
use crate::domain::task::{GroupStrategy, ParallelTaskGroup, TaskNode, TaskTree, TaskType};
use std::collections::HashSet;
use tracing::{debug, info};

pub const ROOT_TASK_ID: &str = "project";
pub const SETUP_TASK_ID: &str = "setup";
pub const BUILD_PHASE_ID: &str = "build";
pub const INTEGRATION_TASK_ID: &str = "integration";
pub const DEPLOYMENT_TASK_ID: &str = "deployment";

const SETUP_MINUTES: u64 = 15;
const DEFAULT_FEATURE_MINUTES: u64 = 30;
const INTEGRATION_MINUTES: u64 = 20;
const DEPLOYMENT_MINUTES: u64 = 10;

#[derive(Debug, Clone)]
pub struct TaskDecomposer {
    default_feature_minutes: u64,
}

impl Default for TaskDecomposer {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskDecomposer {
    pub fn new() -> Self {
        Self {
            default_feature_minutes: DEFAULT_FEATURE_MINUTES,
        }
    }

    /// Duration used for features no pattern matches.
    pub fn with_default_feature_minutes(mut self, minutes: u64) -> Self {
        self.default_feature_minutes = minutes;
        self
    }

    pub fn decompose_project(&self, spec: &ProjectSpec) -> TaskTree {
        let archetype = spec.archetype.resolved();
        let features = spec.effective_features();
        info!(
            project = %spec.name,
            archetype = %archetype,
            features = features.len(),
            "Decomposing project"
        );

        let mut setup = TaskNode::new(
            SETUP_TASK_ID,
            format!("Scaffold {} from {}", spec.name, archetype.template_path()),
            TaskType::Setup,
            AgentRole::Setup,
        )
        .with_duration(SETUP_MINUTES)
        .with_priority(100);
        setup
            .metadata
            .labels
            .insert("template".to_string(), archetype.template_path().to_string());

        let mut build = TaskNode::new(BUILD_PHASE_ID, "Build features", TaskType::Phase, AgentRole::Feature)
            .with_dependencies([SETUP_TASK_ID])
            .with_priority(50);
        for (index, feature) in features.iter().enumerate() {
            build.subtasks.push(self.feature_node(spec, index, feature));
        }

        let integration = TaskNode::new(
            INTEGRATION_TASK_ID,
            "Integrate and verify features",
            TaskType::Integration,
            AgentRole::Integration,
        )
        .with_dependencies([BUILD_PHASE_ID])
        .with_duration(INTEGRATION_MINUTES)
        .with_priority(30);

        let deployment = TaskNode::new(
            DEPLOYMENT_TASK_ID,
            "Deploy project",
            TaskType::Deployment,
            AgentRole::Deployment,
        )
        .with_dependencies([INTEGRATION_TASK_ID])
        .with_duration(DEPLOYMENT_MINUTES)
        .with_priority(10);

        let mut root = TaskNode::new(ROOT_TASK_ID, spec.name.clone(), TaskType::Project, AgentRole::Coordinator)
            .with_subtask(setup)
            .with_subtask(build)
            .with_subtask(integration)
            .with_subtask(deployment);
        root.metadata
            .labels
            .insert("archetype".to_string(), archetype.to_string());

        let estimated_minutes = Self::estimate_duration(&mut root);
        let critical_path = Self::find_critical_path(&root);
        let parallel_groups = Self::identify_parallel_groups(&root, spec.constraints.max_parallel);
        let total_tasks = root.node_count();

        debug!(
            total_tasks,
            estimated_minutes,
            groups = parallel_groups.len(),
            "Decomposition complete"
        );

        TaskTree {
            root,
            total_tasks,
            estimated_minutes,
            critical_path,
            parallel_groups,
        }
    }

    fn feature_node(&self, spec: &ProjectSpec, index: usize, feature: &str) -> TaskNode {
        let patterns = GenesisPatternLibrary::matching(spec.archetype, feature);
        let minutes = patterns
            .iter()
            .map(|p| p.estimated_minutes)
            .max()
            .unwrap_or(self.default_feature_minutes);

        let mut node = TaskNode::new(
            format!("feature-{}-{}", index + 1, slugify(feature)),
            feature.to_string(),
            TaskType::Feature,
            AgentRole::Feature,
        )
        .with_duration(minutes)
        .with_priority(50);
        node.metadata.patterns = patterns.iter().map(|p| p.id.to_string()).collect();
        node
    }

    /// Fill interior durations bottom-up with the longest child and return the
    /// root's value. Optimistic: siblings are assumed to run concurrently.
    pub fn estimate_duration(node: &mut TaskNode) -> u64 {
        let longest_child = node
            .subtasks
            .iter_mut()
            .map(Self::estimate_duration)
            .max()
            .unwrap_or(0);
        node.estimated_minutes = node.estimated_minutes.max(longest_child);
        node.estimated_minutes
    }

    /// Follow the longest child at every level.
    pub fn find_critical_path(node: &TaskNode) -> Vec<String> {
        let mut path = vec![node.id.clone()];
        let mut current = node;
        // First maximum wins on ties so the path is stable.
        while let Some(next) = current
            .subtasks
            .iter()
            .reduce(|best, n| if n.estimated_minutes > best.estimated_minutes { n } else { best })
        {
            path.push(next.id.clone());
            current = next;
        }
        path
    }

    /// Sibling sets (two or more) where no member depends on another member
    /// become one independent group.
    pub fn identify_parallel_groups(root: &TaskNode, max_parallel: usize) -> Vec<ParallelTaskGroup> {
        let mut groups = Vec::new();
        for node in root.walk() {
            if node.subtasks.len() < 2 {
                continue;
            }
            let sibling_ids: HashSet<&str> = node.subtasks.iter().map(|s| s.id.as_str()).collect();
            let independent = node
                .subtasks
                .iter()
                .all(|s| s.dependencies.iter().all(|d| !sibling_ids.contains(d.as_str())));
            if !independent {
                continue;
            }

            groups.push(ParallelTaskGroup {
                id: format!("group-{}", node.id),
                name: format!("{} (parallel)", node.title),
                tasks: node.subtasks.clone(),
                strategy: GroupStrategy::Independent,
                dependencies: node.dependencies.clone(),
                estimated_minutes: node.subtasks.iter().map(|s| s.estimated_minutes).max().unwrap_or(0),
                max_concurrency: max_parallel.max(1).min(node.subtasks.len()),
            });
        }
        groups
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::ProjectArchetype;

    fn saas_spec() -> ProjectSpec {
        ProjectSpec::new("taskboard", ProjectArchetype::SaasApp).with_features([
            "User Authentication",
            "User Dashboard",
            "Kanban board",
        ])
    }

    #[test]
    fn test_phase_chain_shape() {
        let tree = TaskDecomposer::new().decompose_project(&saas_spec());
        let phases: Vec<&str> = tree.root.subtasks.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(phases, vec!["setup", "build", "integration", "deployment"]);

        let build = tree.find(BUILD_PHASE_ID).unwrap();
        assert_eq!(build.dependencies, vec!["setup"]);
        assert_eq!(build.subtasks.len(), 3);
        assert_eq!(tree.find(INTEGRATION_TASK_ID).unwrap().dependencies, vec!["build"]);
        assert_eq!(tree.find(DEPLOYMENT_TASK_ID).unwrap().dependencies, vec!["integration"]);

        // root + 4 phase nodes + 3 features
        assert_eq!(tree.total_tasks, 8);
    }

    #[test]
    fn test_feature_patterns_drive_duration() {
        let tree = TaskDecomposer::new().decompose_project(&saas_spec());
        let auth = tree.find("feature-1-user-authentication").unwrap();
        assert_eq!(auth.metadata.patterns, vec!["saas_authentication"]);
        assert_eq!(auth.estimated_minutes, 45);

        let kanban = tree.find("feature-3-kanban-board").unwrap();
        assert!(kanban.metadata.patterns.is_empty());
        assert_eq!(kanban.estimated_minutes, 30);

        let setup = tree.find(SETUP_TASK_ID).unwrap();
        assert_eq!(setup.metadata.labels["template"], "boilerplate/saas-app");
    }

    #[test]
    fn test_estimate_is_longest_subtree_not_sum() {
        let tree = TaskDecomposer::new().decompose_project(&saas_spec());
        assert_eq!(tree.estimated_minutes, 45);
        assert_eq!(tree.find(BUILD_PHASE_ID).unwrap().estimated_minutes, 45);
        assert_eq!(
            tree.critical_path,
            vec!["project", "build", "feature-1-user-authentication"]
        );
    }

    #[test]
    fn test_only_independent_siblings_are_grouped() {
        let tree = TaskDecomposer::new().decompose_project(&saas_spec().with_max_parallel(2));
        // Root children are chained; only the build phase's features qualify.
        assert_eq!(tree.parallel_groups.len(), 1);
        let group = &tree.parallel_groups[0];
        assert_eq!(group.id, "group-build");
        assert_eq!(group.strategy, GroupStrategy::Independent);
        assert_eq!(group.tasks.len(), 3);
        assert_eq!(group.max_concurrency, 2);
        assert_eq!(group.dependencies, vec!["setup"]);
    }

    #[test]
    fn test_landing_page_uses_suggested_features() {
        let spec = ProjectSpec::new("launch", ProjectArchetype::LandingPage);
        let tree = TaskDecomposer::new().decompose_project(&spec);
        let build = tree.find(BUILD_PHASE_ID).unwrap();
        assert_eq!(build.subtasks.len(), 4);
        assert_eq!(build.subtasks[0].metadata.patterns, vec!["lp_hero_section"]);
        assert_eq!(
            tree.find(SETUP_TASK_ID).unwrap().metadata.labels["template"],
            "boilerplate/landing-page"
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("User  Auth / SSO!"), "user-auth-sso");
        assert_eq!(slugify("API routes"), "api-routes");
    }
}
