// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests for project decomposition and phase planning.
//!
//! Covers:
//! - A strictly chained four-phase project yields exactly four phases in order
//! - No task is ever placed in a phase at or before any of its dependencies
//! - Speedup and parallelism metrics for a feature-heavy project

use genesis_core::application::{ExecutionPlanner, TaskDecomposer};
use genesis_core::domain::agent::AgentRole;
use genesis_core::domain::config::CoordinationConfigManifest;
use genesis_core::domain::plan::ExecutionPlan;
use genesis_core::domain::project::{ProjectArchetype, ProjectSpec};
use genesis_core::domain::task::{TaskNode, TaskTree, TaskType};

fn assert_dependencies_precede(plan: &ExecutionPlan) {
    for phase in &plan.phases {
        for group in &phase.parallel_groups {
            for task in &group.tasks {
                for dep in &task.dependencies {
                    let dep_phase = plan.phase_of(dep).expect("dependency scheduled");
                    assert!(dep_phase < phase.number, "{} placed with or before {}", task.id, dep);
                }
            }
        }
        for task in &phase.sequential_tasks {
            for dep in &task.dependencies {
                let dep_phase = plan.phase_of(dep).expect("dependency scheduled");
                assert!(dep_phase < phase.number, "{} placed with or before {}", task.id, dep);
            }
        }
    }
}

#[test]
fn test_four_phase_chain_is_planned_in_order() {
    let spec = ProjectSpec::new("crm", ProjectArchetype::SaasApp)
        .with_description("Customer tracking for a small agency")
        .with_features(["team management", "billing", "notifications", "api routes"]);

    let tree = TaskDecomposer::new().decompose_project(&spec);
    let plan = ExecutionPlanner::default().plan_execution(&tree).unwrap();

    assert_eq!(plan.phases.len(), 4);
    let numbers: Vec<usize> = plan.phases.iter().map(|p| p.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert!(plan.phases[0].depends_on.is_empty());
    for k in 1..4 {
        assert_eq!(plan.phases[k].depends_on, vec![k]);
    }

    assert_eq!(plan.phases[0].sequential_tasks[0].role, AgentRole::Setup);
    assert_eq!(plan.phases[1].parallel_groups[0].tasks.len(), 4);
    assert_eq!(plan.phases[2].sequential_tasks[0].role, AgentRole::Integration);
    assert_eq!(plan.phases[3].sequential_tasks[0].role, AgentRole::Deployment);
    assert_dependencies_precede(&plan);
}

#[test]
fn test_plan_metrics_reflect_parallel_build() {
    let spec = ProjectSpec::new("crm", ProjectArchetype::SaasApp)
        .with_features(["team management", "billing", "notifications"]);
    let tree = TaskDecomposer::new().decompose_project(&spec);
    let plan = ExecutionPlanner::default().plan_execution(&tree).unwrap();

    // setup 15 + longest feature 50 + integration 20 + deployment 10
    assert_eq!(plan.estimated_minutes, 95);
    // setup 15 + 40 + 50 + 30 + 20 + 10
    assert_eq!(plan.sequential_minutes, 165);
    assert!(plan.speedup() > 1.7);
    // phases: 1, 3, 1, 1 concurrent tasks
    assert!((plan.parallelism_degree - 1.5).abs() < f64::EPSILON);
    assert_eq!(plan.total_tasks(), 6);
}

#[test]
fn test_diamond_dependencies_respect_ordering() {
    let mut root = TaskNode::new("root", "Diamond", TaskType::Project, AgentRole::Coordinator);
    root.subtasks = vec![
        TaskNode::new("schema", "Schema", TaskType::Setup, AgentRole::Setup).with_duration(10),
        TaskNode::new("api", "API", TaskType::Feature, AgentRole::Feature)
            .with_dependencies(["schema"])
            .with_duration(20),
        TaskNode::new("ui", "UI", TaskType::Feature, AgentRole::Feature)
            .with_dependencies(["schema"])
            .with_duration(25),
        TaskNode::new("e2e", "E2E", TaskType::Testing, AgentRole::Testing)
            .with_dependencies(["api", "ui"])
            .with_duration(15),
        TaskNode::new("docs", "Docs", TaskType::Feature, AgentRole::Feature).with_duration(5),
    ];
    let tree = TaskTree {
        total_tasks: root.node_count(),
        root,
        estimated_minutes: 0,
        critical_path: vec![],
        parallel_groups: vec![],
    };

    let plan = ExecutionPlanner::default().plan_execution(&tree).unwrap();
    assert_eq!(plan.phases.len(), 3);
    assert_eq!(plan.phase_of("schema"), Some(1));
    assert_eq!(plan.phase_of("docs"), Some(1));
    assert_eq!(plan.phase_of("api"), Some(2));
    assert_eq!(plan.phase_of("ui"), Some(2));
    assert_eq!(plan.phase_of("e2e"), Some(3));
    assert_eq!(plan.phases[2].depends_on, vec![2]);
    assert_dependencies_precede(&plan);
}

#[test]
fn test_planner_uses_configured_capacities() {
    let yaml = r#"
apiVersion: genesis.dev/v1
kind: CoordinationConfig
metadata:
  name: narrow
spec:
  planner:
    roles:
      feature: { parallel: false, capacity: 1 }
"#;
    let manifest = CoordinationConfigManifest::from_yaml_str(yaml).unwrap();
    let spec = ProjectSpec::new("site", ProjectArchetype::LandingPage);
    let tree = TaskDecomposer::new().decompose_project(&spec);
    let plan = ExecutionPlanner::new(manifest.spec.planner).plan_execution(&tree).unwrap();

    let build = &plan.phases[1];
    assert!(build.parallel_groups.is_empty());
    assert_eq!(build.sequential_tasks.len(), 4);
}
