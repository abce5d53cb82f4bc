// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Overwatch CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Subcommands, daemon wiring and logging setup for the `overwatch` binary

pub mod commands;
pub mod daemon;
pub mod logging;
