// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `overwatch daemon`: run the fleet coordinator in the foreground.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use overwatch_core::domain::node_config::FleetConfigManifest;

use crate::daemon::start_daemon;

#[derive(Args, Debug, Default)]
pub struct DaemonArgs {
    /// Also host the command fabric in this process
    #[arg(long)]
    pub with_fabric: bool,
}

pub async fn run(args: DaemonArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_validated(config_path)?;

    if !config.spec.security_link.enabled {
        println!(
            "{}",
            "WARNING: Security links are disabled; LAND commands will not reach the agents."
                .yellow()
                .bold()
        );
    }

    start_daemon(config, args.with_fabric).await
}

/// Load the manifest through discovery and reject invalid settings.
pub(crate) fn load_validated(config_path: Option<PathBuf>) -> Result<FleetConfigManifest> {
    let config = FleetConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}
