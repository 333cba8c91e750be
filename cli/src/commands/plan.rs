// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `genesis plan` - decompose a project and print its execution plan

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use genesis_core::domain::config::CoordinationConfigManifest;
use genesis_core::domain::plan::ExecutionPlan;
use genesis_core::domain::project::ProjectSpec;
use genesis_swarm::application::CoordinationHub;
use genesis_swarm::infrastructure::DryRunExecutor;
use std::sync::Arc;

#[derive(Args)]
pub struct PlanArgs {
    /// Project specification (YAML or JSON)
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: PlanArgs, config_override: Option<PathBuf>) -> Result<()> {
    let manifest = CoordinationConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let project = super::load_project_spec(&args.spec)?;

    let plan = build_plan(&project, &manifest)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&project, &plan);
    }
    Ok(())
}

pub(crate) fn build_plan(project: &ProjectSpec, manifest: &CoordinationConfigManifest) -> Result<ExecutionPlan> {
    // Planning needs no running services
    CoordinationHub::new(manifest.spec.clone())
        .coordination_agent(Arc::new(DryRunExecutor::new()))
        .plan_project(project)
        .with_context(|| format!("Failed to plan project '{}'", project.name))
}

fn print_plan(project: &ProjectSpec, plan: &ExecutionPlan) {
    println!(
        "{} {} ({})",
        "Execution plan for".bold(),
        project.name.bold(),
        project.archetype.resolved()
    );
    println!();

    for phase in &plan.phases {
        println!(
            "{} {} - {} [{} min]",
            "Phase".cyan(),
            phase.number,
            phase.name,
            phase.estimated_minutes
        );
        for group in &phase.parallel_groups {
            println!(
                "  {} {} (up to {} at once, {} min)",
                "parallel".green(),
                group.name,
                group.max_concurrency,
                group.estimated_minutes
            );
            for task in &group.tasks {
                println!("    - {} [{}, {} min]", task.id, task.role, task.estimated_minutes);
            }
        }
        for task in &phase.sequential_tasks {
            println!(
                "  {} {} [{}, {} min]",
                "sequential".yellow(),
                task.id,
                task.role,
                task.estimated_minutes
            );
        }
    }
    println!();

    println!("{}", "Resources:".bold());
    for (role, allocation) in &plan.resource_allocation.roles {
        println!(
            "  {:<12} {} task(s), {} cpu, {} MB, {} tokens",
            role.to_string(),
            allocation.task_ids.len(),
            allocation.cpu_units,
            allocation.memory_mb,
            allocation.context_tokens
        );
    }
    println!();

    println!(
        "Tasks: {}  Estimated: {} min  Sequential: {} min  Speedup: {:.2}x  Parallelism: {:.2}",
        plan.total_tasks(),
        plan.estimated_minutes,
        plan.sequential_minutes,
        plan.speedup(),
        plan.parallelism_degree
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_core::domain::project::ProjectArchetype;

    #[test]
    fn test_build_plan_respects_config_ceiling() {
        let mut manifest = CoordinationConfigManifest::default();
        manifest.spec.coordination.max_parallel = 1;
        let project = ProjectSpec::new("acme", ProjectArchetype::SaasApp).with_max_parallel(4);

        let plan = build_plan(&project, &manifest).unwrap();
        assert!(plan.total_tasks() > 0);
        assert!(plan
            .phases
            .iter()
            .flat_map(|p| p.parallel_groups.iter())
            .all(|g| g.max_concurrency <= 1));
    }
}
