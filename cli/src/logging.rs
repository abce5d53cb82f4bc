// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tracing subscriber setup.
//!
//! Level and format come from the command line when given, else from the
//! `observability.logging` section of the config. `RUST_LOG` overrides both.

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;

use overwatch_core::domain::node_config::{FleetConfigManifest, LoggingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Parse the config file spelling; unknown values fall back to compact.
    pub fn from_config(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Effective logging settings after merging flags over the config file.
pub fn resolve(
    level: Option<String>,
    format: Option<LogFormat>,
    config_path: Option<PathBuf>,
) -> (String, LogFormat) {
    if let (Some(level), Some(format)) = (&level, format) {
        return (level.clone(), format);
    }

    // Logging is not up yet; a broken config is reported again by the command itself.
    let configured = FleetConfigManifest::load_or_default(config_path)
        .map(|config| config.spec.observability.logging)
        .unwrap_or_default();
    merge(level, format, &configured)
}

fn merge(level: Option<String>, format: Option<LogFormat>, configured: &LoggingConfig) -> (String, LogFormat) {
    (
        level.unwrap_or_else(|| configured.level.clone()),
        format.unwrap_or_else(|| LogFormat::from_config(&configured.format)),
    )
}

/// Initialize tracing subscriber for logging
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
