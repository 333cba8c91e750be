// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use genesis_core::domain::config::CoordinationConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file holding every default
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./genesis-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(output),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let manifest = CoordinationConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. GENESIS_CONFIG_PATH: {}",
            std::env::var("GENESIS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./genesis-config.yaml");
        println!("  4. ~/.genesis/config.yaml");
        println!();
    }

    let spec = &manifest.spec;
    println!("{} {}", "Coordinator:".bold(), manifest.metadata.name);
    println!();

    println!("{}", "Locks:".bold());
    println!("  Max per agent: {}", spec.locks.max_locks_per_agent);
    println!("  TTL: {} ms", spec.locks.lock_ttl_ms);
    println!("  Expiration sweep: {} ms", spec.locks.expiration_check_ms);
    println!();

    println!("{}", "Messaging:".bold());
    println!("  Queue bound: {}", spec.messaging.max_queue_size);
    match spec.messaging.default_ttl_ms {
        Some(ttl) => println!("  Default TTL: {} ms", ttl),
        None => println!("  Default TTL: {}", "(none)".dimmed()),
    }
    println!();

    println!("{}", "Snapshots:".bold());
    println!("  Retained: {}", spec.snapshots.max_snapshots);
    match &spec.snapshots.directory {
        Some(dir) => println!("  Directory: {}", dir.display()),
        None => println!("  Directory: {}", "(in memory only)".dimmed()),
    }
    if let Some(secs) = spec.snapshots.auto_snapshot_interval_secs {
        println!("  Auto-snapshot every {} s", secs);
    }
    println!();

    println!("{}", "Health:".bold());
    println!("  Heartbeat timeout: {} ms", spec.health.heartbeat_timeout_ms);
    println!("  Check interval: {} ms", spec.health.check_interval_ms);
    println!("  Error threshold: {}", spec.health.error_threshold);
    println!("  Auto recovery: {}", spec.health.auto_recovery);
    println!();

    println!("{}", "Planner:".bold());
    for (role, capacity) in &spec.planner.roles {
        let mode = if capacity.parallel { "parallel" } else { "sequential" };
        println!("  {:<12} {} x{}", role.to_string(), mode, capacity.capacity);
    }
    println!();

    println!("{}", "Coordination:".bold());
    println!("  Max parallel: {}", spec.coordination.max_parallel);
    println!("  Halt on failure: {}", spec.coordination.halt_on_failure);

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    // load_or_default validates after applying environment overrides
    CoordinationConfigManifest::load_or_default(config_path).context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: PathBuf) -> Result<()> {
    let yaml = CoordinationConfigManifest::default()
        .to_yaml_string()
        .context("Failed to render default configuration")?;

    std::fs::write(&output, yaml).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis-config.yaml");
        generate(path.clone()).unwrap();

        let manifest = CoordinationConfigManifest::from_yaml_file(&path).unwrap();
        manifest.validate().unwrap();
        assert_eq!(manifest.spec.coordination.max_parallel, 3);
    }
}
