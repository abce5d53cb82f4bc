// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `overwatch fabric`: run the command fabric on its own.

use anyhow::Result;
use std::path::PathBuf;

use super::daemon::load_validated;
use crate::daemon::run_fabric;

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_validated(config_path)?;
    run_fabric(config).await
}
