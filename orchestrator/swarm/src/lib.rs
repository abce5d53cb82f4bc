// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `overwatch-swarm`: Fleet Coordination Crate
//!
//! Hosts one [`AgentDecisionUnit`](overwatch_core::domain::decision::AgentDecisionUnit)
//! per agent, fans validated detections out to all of them and runs the
//! per-request decision round for the Decision API.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Fleet`, `AgentSlot`, `FleetBuilder` |
//! | [`application`] | Application | `DetectionSink` and `DecisionService` for `Fleet` |
//!
//! ## Key Concepts
//!
//! - **Agent slot**: a decision unit behind its own mutex, the landing flag it
//!   shares with its security link, and the link itself when enabled.
//! - **Detection fan-out**: every report reaches every unit, in arrival order.
//! - **Decision round**: position samples are applied index by index and one
//!   decision is returned per sampled agent.

pub mod application;
pub mod domain;

pub use domain::*;
