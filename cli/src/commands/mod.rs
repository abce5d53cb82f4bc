// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Overwatch CLI

pub mod config;
pub mod daemon;
pub mod fabric;
pub mod land;

pub use self::config::ConfigCommand;
pub use self::daemon::DaemonArgs;
pub use self::land::LandArgs;
