// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Ports between the network adapters and whatever hosts the decision units,
//! plus the fixed-camera detection pipeline.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** `DetectionSink` and `DecisionService` seams, camera pipeline

pub mod camera_pipeline;

use crate::domain::clock::Timestamp;
use crate::domain::decision::Decision;
use crate::domain::detection::{DetectionReport, Position3};

pub use camera_pipeline::{CameraPipeline, Detector, DetectorBox};

/// Consumer of validated detection reports.
///
/// Fan-in ingresses call `deliver` once per datagram, in arrival order.
pub trait DetectionSink: Send + Sync {
    /// Hand `report` to every registered decision unit. Returns how many
    /// units changed their pursued target.
    fn deliver(&self, report: &DetectionReport, now: Timestamp) -> usize;
}

/// Driver-facing side of the fleet: one decision per agent per round.
pub trait DecisionService: Send + Sync {
    fn agent_count(&self) -> usize;

    /// Apply the position samples (index-aligned with agents; extras are
    /// ignored, missing ones keep the previous sample) and return one
    /// decision per sampled agent.
    fn decide(&self, positions: &[Position3], now: Timestamp) -> Vec<Decision>;
}
