// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `genesis run` - coordinate a project end to end with the dry-run executor
//!
//! Every service runs in-process: the hub is initialized, the coordination
//! agent drives the plan, and the hub is shut down (persisting snapshots when
//! a directory is configured) before the outcome is printed. Ctrl-C triggers
//! an emergency stop; remaining tasks are reported as blocked.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use genesis_core::domain::config::CoordinationConfigManifest;
use genesis_core::domain::task::TaskStatus;
use genesis_swarm::application::{CoordinationHub, HubHealth, ProjectOutcome};
use genesis_swarm::infrastructure::DryRunExecutor;

#[derive(Args)]
pub struct RunArgs {
    /// Project specification (YAML or JSON)
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,

    /// Simulated wall time per estimated task minute
    #[arg(long, default_value_t = 0, value_name = "MS")]
    pub time_per_minute_ms: u64,

    /// Task id the dry-run executor should fail (repeatable)
    #[arg(long = "fail", value_name = "TASK_ID")]
    pub fail: Vec<String>,

    /// Capture a snapshot tagged "final" after the run
    #[arg(long)]
    pub snapshot: bool,

    /// Print the outcome and hub health as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: RunArgs, config_override: Option<PathBuf>) -> Result<()> {
    let manifest = CoordinationConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let project = super::load_project_spec(&args.spec)?;

    let hub = CoordinationHub::new(manifest.spec.clone());
    hub.initialize().context("Failed to initialize coordination hub")?;

    let executor = DryRunExecutor::new()
        .with_time_per_minute(Duration::from_millis(args.time_per_minute_ms))
        .failing(args.fail.iter().cloned());
    let coordinator = hub.coordination_agent(Arc::new(executor));

    let run = coordinator.coordinate_autonomous_project(&project);
    tokio::pin!(run);
    let result = tokio::select! {
        outcome = &mut run => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping project");
            coordinator.emergency_stop("interrupted");
            run.await
        }
    };

    if args.snapshot {
        let tags = vec!["final".to_string(), project.name.clone()];
        let snapshot = hub.capture_snapshot(format!("after run of {}", project.name), &HashMap::new(), tags);
        println!("Snapshot captured: {}", snapshot.id);
    }
    let health = hub.health_snapshot();
    hub.shutdown().await;

    let outcome = result.with_context(|| format!("Failed to coordinate project '{}'", project.name))?;

    if args.json {
        let report = serde_json::json!({ "outcome": outcome, "hub": health });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_outcome(&outcome, &health);
    }

    if !outcome.success {
        anyhow::bail!("Project '{}' did not complete", outcome.project);
    }
    Ok(())
}

fn print_outcome(outcome: &ProjectOutcome, health: &HubHealth) {
    println!("{} {}", "Project".bold(), outcome.project.bold());
    println!();

    for result in &outcome.results {
        let status = match result.status {
            TaskStatus::Completed => "completed".green(),
            TaskStatus::Failed => "failed".red(),
            TaskStatus::Blocked => "blocked".yellow(),
            other => format!("{:?}", other).to_lowercase().normal(),
        };
        let agent = result.agent_id.as_ref().map(|a| a.to_string()).unwrap_or_else(|| "-".to_string());
        print!("  {:<10} {:<32} {:<8}", status, result.task_id, agent);
        match &result.error {
            Some(error) => println!(" {}", error.dimmed()),
            None => println!(),
        }
    }
    println!();

    let validation = &outcome.validation;
    println!("Project created: {}", validation.project_created);
    println!(
        "Features: {}/{} completed",
        validation.features_completed, validation.features_total
    );
    if let Some(reason) = &outcome.stopped {
        println!("Stopped: {}", reason.yellow());
    }
    let elapsed = outcome.finished_at - outcome.started_at;
    println!(
        "Planned: {} min (sequential {} min, {:.2}x)  Elapsed: {} ms",
        outcome.plan.estimated_minutes,
        outcome.plan.sequential_minutes,
        outcome.plan.speedup(),
        elapsed.num_milliseconds()
    );
    println!(
        "Hub: {} events, {} messages sent, {} agents, {} recovery action(s)",
        health.events_recorded.total(),
        health.messages.sent_total,
        health.health.agents,
        health.health.recovery_actions
    );
    println!();

    if outcome.success {
        println!("{}", "✓ Project completed".green());
    } else {
        println!("{}", "✗ Project did not complete".red());
    }
}
