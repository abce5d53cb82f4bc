// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fleet Aggregate
//!
//! - [`Fleet`]: the decision units hosted by one coordinator process.
//! - [`AgentSlot`]: one unit with its landing flag and optional security link.
//! - [`FleetBuilder`]: wires units, links, event bus and shutdown token from
//!   the `FleetConfig` manifest.
//!
//! # Invariants
//!
//! - Slot `i` always hosts the unit with `agent_index == i`.
//! - Each unit is guarded by its own mutex; no lock spans two units.

use std::collections::BTreeMap;
use std::sync::Arc;

use overwatch_core::domain::decision::{AgentDecisionUnit, AgentPhase, AgentState, AlertSink, LandingSignal};
use overwatch_core::domain::detection::{Position3, ProducerId};
use overwatch_core::domain::node_config::{DecisionConfig, FleetConfigSpec, SecurityLinkConfig};
use overwatch_core::infrastructure::event_bus::EventBus;
use overwatch_core::infrastructure::security_link::SecurityLinkClient;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct AgentSlot {
    index: usize,
    unit: Mutex<AgentDecisionUnit>,
    landing: LandingSignal,
    link: Option<Arc<SecurityLinkClient>>,
}

impl AgentSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Run `f` with exclusive access to this agent's unit.
    pub fn with_unit<R>(&self, f: impl FnOnce(&mut AgentDecisionUnit) -> R) -> R {
        f(&mut self.unit.lock())
    }

    pub fn state(&self) -> AgentState {
        self.unit.lock().state()
    }

    pub fn phase(&self) -> AgentPhase {
        self.unit.lock().phase()
    }

    pub fn landing_signal(&self) -> &LandingSignal {
        &self.landing
    }

    pub fn security_link(&self) -> Option<&Arc<SecurityLinkClient>> {
        self.link.as_ref()
    }
}

pub struct Fleet {
    slots: Vec<AgentSlot>,
    event_bus: Option<EventBus>,
}

impl Fleet {
    pub fn builder(spec: &FleetConfigSpec) -> FleetBuilder {
        FleetBuilder::new(
            spec.fleet.agent_count,
            spec.decision.clone(),
            spec.fleet.camera_positions.clone(),
        )
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<&AgentSlot> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> impl Iterator<Item = &AgentSlot> {
        self.slots.iter()
    }

    pub fn states(&self) -> Vec<AgentState> {
        self.slots.iter().map(AgentSlot::state).collect()
    }

    pub fn event_bus(&self) -> Option<&EventBus> {
        self.event_bus.as_ref()
    }

    /// Start every agent's security link. Agents without a link are skipped.
    pub fn spawn_security_links(&self) -> Vec<JoinHandle<()>> {
        let handles: Vec<_> = self
            .slots
            .iter()
            .filter_map(|slot| slot.link.as_ref())
            .map(|link| link.spawn())
            .collect();
        info!(links = handles.len(), "Security links started");
        handles
    }

    pub fn stop_security_links(&self) {
        for link in self.slots.iter().filter_map(|slot| slot.link.as_ref()) {
            link.stop();
        }
    }
}

pub struct FleetBuilder {
    agent_count: usize,
    decision: DecisionConfig,
    camera_positions: Arc<BTreeMap<ProducerId, Position3>>,
    security_link: Option<SecurityLinkConfig>,
    event_bus: Option<EventBus>,
    shutdown: Option<CancellationToken>,
}

impl FleetBuilder {
    pub fn new(
        agent_count: usize,
        decision: DecisionConfig,
        camera_positions: BTreeMap<ProducerId, Position3>,
    ) -> Self {
        Self {
            agent_count,
            decision,
            camera_positions: Arc::new(camera_positions),
            security_link: None,
            event_bus: None,
            shutdown: None,
        }
    }

    /// Give every agent a security link. Ignored when the config disables it.
    pub fn with_security_links(mut self, config: &SecurityLinkConfig) -> Self {
        self.security_link = config.enabled.then(|| config.clone());
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_shutdown(mut self, token: &CancellationToken) -> Self {
        self.shutdown = Some(token.clone());
        self
    }

    pub fn build(self) -> Fleet {
        let slots = (0..self.agent_count)
            .map(|index| {
                let landing = LandingSignal::new();
                let link = self.security_link.as_ref().map(|config| {
                    let link = SecurityLinkClient::new(index, config, landing.clone());
                    let link = match &self.shutdown {
                        Some(token) => link.with_shutdown(token),
                        None => link,
                    };
                    Arc::new(link)
                });

                let mut unit = AgentDecisionUnit::new(index, self.decision.clone(), Arc::clone(&self.camera_positions))
                    .with_landing_signal(landing.clone());
                if let Some(link) = &link {
                    unit = unit.with_alert_sink(Arc::clone(link) as Arc<dyn AlertSink>);
                }

                AgentSlot {
                    index,
                    unit: Mutex::new(unit),
                    landing,
                    link,
                }
            })
            .collect();

        Fleet {
            slots,
            event_bus: self.event_bus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_indexes_units_and_shares_landing_flags() {
        let spec = FleetConfigSpec::default();
        let fleet = FleetBuilder::new(3, spec.decision.clone(), spec.fleet.camera_positions.clone()).build();

        assert_eq!(fleet.len(), 3);
        for (i, slot) in fleet.slots().enumerate() {
            assert_eq!(slot.index(), i);
            assert_eq!(slot.with_unit(|unit| unit.agent_index()), i);
            assert!(slot.security_link().is_none());
        }

        fleet.slot(1).unwrap().landing_signal().command();
        assert!(fleet.slot(1).unwrap().with_unit(|unit| unit.landing_signal().is_pending()));
        assert!(!fleet.slot(0).unwrap().landing_signal().is_pending());
    }

    #[test]
    fn test_security_links_follow_config() {
        let mut spec = FleetConfigSpec::default();
        spec.fleet.agent_count = 2;

        let fleet = Fleet::builder(&spec).with_security_links(&spec.security_link).build();
        assert!(fleet.slots().all(|slot| slot.security_link().is_some()));
        let link = fleet.slot(1).unwrap().security_link().unwrap();
        assert_eq!(link.agent_index(), 1);

        spec.security_link.enabled = false;
        let fleet = Fleet::builder(&spec).with_security_links(&spec.security_link).build();
        assert!(fleet.slots().all(|slot| slot.security_link().is_none()));
    }
}
