// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Detection values, the confirmation engine, agent decision units and the
//! fabric wire protocol. Nothing in this layer touches a socket.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure detection and decision logic plus configuration types

pub mod clock;
pub mod command;
pub mod confirmation;
pub mod decision;
pub mod detection;
pub mod events;
pub mod frame;
pub mod node_config;
