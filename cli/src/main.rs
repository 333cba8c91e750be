// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Genesis CLI
//!
//! The `genesis` binary drives the in-process swarm coordinator.
//!
//! ## Commands
//!
//! - `genesis config show|validate|generate` - Configuration management
//! - `genesis plan <SPEC>` - Print the execution plan for a project specification
//! - `genesis run <SPEC>` - Run a project end to end with the dry-run executor

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{ConfigCommand, PlanArgs, RunArgs};

/// Genesis swarm coordinator
#[derive(Parser)]
#[command(name = "genesis")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "GENESIS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "GENESIS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Log format (text or json)
    #[arg(long, global = true, env = "GENESIS_LOG_FORMAT", default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Decompose a project specification and print its execution plan
    #[command(name = "plan")]
    Plan(PlanArgs),

    /// Coordinate a project with the dry-run executor
    #[command(name = "run")]
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    genesis_core::infrastructure::init_logging(&cli.log_level, &cli.log_format)?;

    match cli.command {
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
        Commands::Plan(args) => commands::plan::execute(args, cli.config).await,
        Commands::Run(args) => commands::run::execute(args, cli.config).await,
    }
}
