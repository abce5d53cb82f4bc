// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `overwatch land`: connect to the fabric as a control client and send the
//! landing trigger.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use overwatch_core::domain::node_config::FleetConfigManifest;
use overwatch_core::infrastructure::control_client::ControlClient;

#[derive(Args, Debug, Default)]
pub struct LandArgs {
    /// Fabric address (default: security_link.fabric_address from config)
    #[arg(long, value_name = "HOST:PORT")]
    pub addr: Option<String>,

    /// Trigger phrase to send (default: first configured land phrase)
    #[arg(long)]
    pub phrase: Option<String>,

    /// Connect timeout in seconds
    #[arg(long, default_value = "5")]
    pub timeout: u64,
}

pub async fn run(args: LandArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = FleetConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let (addr, phrase) = resolve_target(&args, &config)?;

    let client = ControlClient::connect(addr.as_str(), Duration::from_secs(args.timeout))
        .await
        .with_context(|| format!("Failed to connect to command fabric at {addr}"))?;
    client
        .request_landing(&phrase)
        .await
        .context("Failed to send landing trigger")?;

    println!("{}", format!("✓ Landing requested via {addr}").green());
    Ok(())
}

fn resolve_target(args: &LandArgs, config: &FleetConfigManifest) -> Result<(String, String)> {
    let addr = args
        .addr
        .clone()
        .unwrap_or_else(|| config.spec.security_link.fabric_address.clone());

    let phrase = match &args.phrase {
        Some(phrase) => phrase.clone(),
        None => config
            .spec
            .fabric
            .land_phrases
            .iter()
            .find(|p| !p.trim().is_empty())
            .cloned()
            .context("No land phrase configured; pass --phrase")?,
    };

    Ok((addr, phrase))
}
