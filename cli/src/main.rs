// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Overwatch Fleet Coordinator CLI
//!
//! The `overwatch` binary hosts the decision units of a drone fleet and the
//! sockets around them.
//!
//! ## Commands
//!
//! - `overwatch daemon` - Fan-in ingresses, fleet, security links and Decision API
//! - `overwatch fabric` - Command fabric (security server)
//! - `overwatch land` - Ask every connected agent to land
//! - `overwatch config show|validate|generate` - Configuration management

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use overwatch_cli::commands::{self, ConfigCommand, DaemonArgs, LandArgs};
use overwatch_cli::logging::{self, init_logging, LogFormat};

/// Overwatch - Detection confirmation and fleet decision coordinator
#[derive(Parser)]
#[command(name = "overwatch")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "OVERWATCH_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error) [default: from config, else info]
    #[arg(long, global = true, env = "OVERWATCH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format [default: from config, else compact]
    #[arg(long, global = true, env = "OVERWATCH_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fleet coordinator in the foreground
    #[command(name = "daemon")]
    Daemon(DaemonArgs),

    /// Run the command fabric
    #[command(name = "fabric")]
    Fabric,

    /// Broadcast a landing command to every agent
    #[command(name = "land")]
    Land(LandArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (level, format) = logging::resolve(cli.log_level, cli.log_format, cli.config.clone());
    init_logging(&level, format)?;

    match cli.command {
        Commands::Daemon(args) => commands::daemon::run(args, cli.config).await,
        Commands::Fabric => commands::fabric::run(cli.config).await,
        Commands::Land(args) => commands::land::run(args, cli.config).await,
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
    }
}
