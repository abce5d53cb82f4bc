// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fleet Domain Layer
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`fleet`] | `Fleet`, `AgentSlot`, `FleetBuilder` |

pub mod fleet;

pub use fleet::*;
