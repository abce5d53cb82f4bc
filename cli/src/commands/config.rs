// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use overwatch_core::domain::node_config::FleetConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./overwatch-config.yaml)
        #[arg(short, long, default_value = "./overwatch-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = FleetConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. OVERWATCH_CONFIG_PATH: {}",
            std::env::var("OVERWATCH_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./overwatch-config.yaml");
        println!("  4. ~/.overwatch/config.yaml");
        println!("  5. /etc/overwatch/config.yaml");
        println!();
    }

    if as_yaml {
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        print!("{yaml}");
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Fleet:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Agents: {}", spec.fleet.agent_count);
    for (camera, position) in &spec.fleet.camera_positions {
        println!(
            "  Camera {}: ({}, {}, {})",
            camera, position.x, position.y, position.z
        );
    }
    println!();

    println!("{}", "Confirmation:".bold());
    println!("  Min detection time: {}s", spec.confirmation.min_detection_time);
    println!("  Max displacement: {}", spec.confirmation.max_displacement);
    println!("  Confidence gate: {}", spec.confirmation.confidence_gate);
    println!();

    println!("{}", "Decision:".bold());
    println!("  Human alert threshold: {}", spec.decision.human_alert_threshold);
    println!("  Target threshold: {}", spec.decision.target_threshold);
    println!("  Detection cooldown: {}s", spec.decision.detection_cooldown);
    println!("  Target timeout: {}s", spec.decision.target_timeout);
    println!("  Human detection timeout: {}s", spec.decision.human_detection_timeout);
    println!("  Explore cooldown: {}s", spec.decision.explore_cooldown);
    println!();

    println!("{}", "Network:".bold());
    println!("  Bind address: {}", spec.network.bind_address);
    println!("  Fabric port: {}", spec.network.fabric_port);
    println!("  Camera fan-in port: {}", spec.network.camera_port);
    println!("  Agent fan-in port: {}", spec.network.agent_port);
    println!("  Camera frame base port: {}", spec.network.frame_base_port);
    println!("  Agent frame base port: {}", spec.network.agent_frame_base_port);
    println!("  Decision API port: {}", spec.network.api_port);
    println!();

    println!("{}", "Security link:".bold());
    if spec.security_link.enabled {
        println!("  Fabric address: {}", spec.security_link.fabric_address);
        println!("  Reconnect delay: {}ms", spec.security_link.reconnect_delay_ms);
    } else {
        println!("  {}", "disabled".dimmed());
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = FleetConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
