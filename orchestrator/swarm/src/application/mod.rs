// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Binds the [`Fleet`] to the core ports: fan-in ingresses deliver through
//! [`DetectionSink`], the Decision API polls through [`DecisionService`].
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Detection fan-out and decision rounds

use overwatch_core::application::{DecisionService, DetectionSink};
use overwatch_core::domain::clock::Timestamp;
use overwatch_core::domain::decision::Decision;
use overwatch_core::domain::detection::{DetectionReport, Position3};
use overwatch_core::domain::events::FleetEvent;
use tracing::debug;

use crate::domain::Fleet;

impl DetectionSink for Fleet {
    fn deliver(&self, report: &DetectionReport, now: Timestamp) -> usize {
        let retargeted = self
            .slots()
            .filter(|slot| slot.with_unit(|unit| unit.process_detection(report, now)))
            .count();

        debug!(
            source = ?report.source,
            confidence = report.confidence,
            retargeted,
            "Detection fanned out"
        );
        if let Some(bus) = self.event_bus() {
            bus.publish(FleetEvent::detection_delivered(report, self.len(), retargeted));
        }
        retargeted
    }
}

impl DecisionService for Fleet {
    fn agent_count(&self) -> usize {
        self.len()
    }

    fn decide(&self, positions: &[Position3], now: Timestamp) -> Vec<Decision> {
        positions
            .iter()
            .zip(self.slots())
            .map(|(position, slot)| {
                let decision = slot.with_unit(|unit| {
                    unit.update_position(*position);
                    unit.make_decision(now)
                });

                metrics::counter!("overwatch_decisions_total", "decision" => decision.name()).increment(1);
                if let Some(bus) = self.event_bus() {
                    bus.publish_decision(slot.index(), decision);
                }
                decision
            })
            .collect()
    }
}
