// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Agent Decision Unit
//!
//! Per-agent state machine that merges human-detection alerts, camera-cued
//! targets, the external landing command and default exploration into exactly
//! one [`Decision`] per call.
//!
//! ```text
//! Init ──► Flying (exploring | pursuing target | watching human) ──► Landing ──► Landed
//! ```
//!
//! `Landing` is only entered through [`LandingSignal::command`]; `Landed` is
//! terminal. Detections still update bookkeeping after landing, but every
//! later decision is [`Decision::DoNothingLanding`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::domain::clock::{elapsed_since, Timestamp};
use crate::domain::command::format_alert;
use crate::domain::detection::{DetectionReport, DetectionSource, Position3, ProducerId};
use crate::domain::node_config::DecisionConfig;

/// Out-of-band channel to the security authority.
///
/// Implementations must not block: the alert is best-effort and a failure
/// only schedules a reconnection of the channel.
pub trait AlertSink: Send + Sync {
    fn forward_alert(&self, message: &str);
}

/// Discards alerts. Used for units without a security link.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {
    fn forward_alert(&self, _message: &str) {}
}

/// Edge-triggered landing flag shared between a decision unit and the task
/// that receives broadcast commands for it.
#[derive(Debug, Clone, Default)]
pub struct LandingSignal(Arc<AtomicBool>);

impl LandingSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a landing on the next decision.
    pub fn command(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Consume a pending command.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One decision per agent per polling cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Takeoff,
    Land,
    DoNothingLanding,
    /// Hold at the agent's own position while a human is in view.
    MoveToTargetHuman(Position3),
    MoveToTarget(Position3),
    Explore,
    Continue,
}

impl Decision {
    /// Wire name of the decision.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Takeoff => "takeoff",
            Self::Land => "land",
            Self::DoNothingLanding => "do_nothing_landing",
            Self::MoveToTargetHuman(_) => "move_to_target_human",
            Self::MoveToTarget(_) => "move_to_target",
            Self::Explore => "explore",
            Self::Continue => "continue",
        }
    }

    pub fn target(&self) -> Option<Position3> {
        match self {
            Self::MoveToTargetHuman(p) | Self::MoveToTarget(p) => Some(*p),
            _ => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Decision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Decision", 2)?;
        state.serialize_field("decision", self.name())?;
        state.serialize_field("target", &self.target())?;
        state.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Init,
    Flying,
    Landed,
}

/// Snapshot of a unit's bookkeeping. Timestamps never stamped are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentState {
    pub position: Position3,
    pub current_target: Option<Position3>,
    pub last_target_time: Option<Timestamp>,
    pub last_detection_time: Option<Timestamp>,
    pub wait_because_see_human: bool,
    pub last_human_detection_time: Option<Timestamp>,
    pub exploring: bool,
    pub last_explore_time: Option<Timestamp>,
    pub landing_commanded: bool,
    pub landing_executed: bool,
    pub starting: bool,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            position: Position3::default(),
            current_target: None,
            last_target_time: None,
            last_detection_time: None,
            wait_because_see_human: false,
            last_human_detection_time: None,
            exploring: false,
            last_explore_time: None,
            landing_commanded: false,
            landing_executed: false,
            starting: true,
        }
    }
}

pub struct AgentDecisionUnit {
    agent_index: usize,
    config: DecisionConfig,
    camera_positions: Arc<BTreeMap<ProducerId, Position3>>,
    state: AgentState,
    landing: LandingSignal,
    alerts: Arc<dyn AlertSink>,
}

impl std::fmt::Debug for AgentDecisionUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDecisionUnit")
            .field("agent_index", &self.agent_index)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl AgentDecisionUnit {
    pub fn new(
        agent_index: usize,
        config: DecisionConfig,
        camera_positions: Arc<BTreeMap<ProducerId, Position3>>,
    ) -> Self {
        Self {
            agent_index,
            config,
            camera_positions,
            state: AgentState::default(),
            landing: LandingSignal::new(),
            alerts: Arc::new(NoopAlertSink),
        }
    }

    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_landing_signal(mut self, landing: LandingSignal) -> Self {
        self.landing = landing;
        self
    }

    pub fn agent_index(&self) -> usize {
        self.agent_index
    }

    /// Handle shared with whatever receives LAND for this agent.
    pub fn landing_signal(&self) -> LandingSignal {
        self.landing.clone()
    }

    pub fn update_position(&mut self, position: Position3) {
        self.state.position = position;
    }

    /// Feed one detection. Returns whether it changed the pursued target.
    pub fn process_detection(&mut self, detection: &DetectionReport, now: Timestamp) -> bool {
        if elapsed_since(now, self.state.last_detection_time) < self.config.detection_cooldown {
            return false;
        }

        if detection.is_person() && detection.confidence > self.config.human_alert_threshold {
            info!(
                agent = self.agent_index,
                confidence = detection.confidence,
                "Human detected, alerting security"
            );
            self.alerts
                .forward_alert(&format_alert(detection.confidence));
        }

        if detection.confidence <= self.config.target_threshold {
            return false;
        }

        let target = self.resolve_target(detection);
        self.state.current_target = Some(target);
        self.state.last_target_time = Some(now);
        self.state.last_detection_time = Some(now);
        self.state.exploring = false;

        if detection.is_person() {
            self.state.wait_because_see_human = true;
            self.state.last_human_detection_time = Some(now);
        }

        debug!(
            agent = self.agent_index,
            source = ?detection.source,
            x = target.x,
            y = target.y,
            z = target.z,
            "New target"
        );
        true
    }

    /// Evaluate the priority cascade. Exactly one branch fires per call.
    pub fn make_decision(&mut self, now: Timestamp) -> Decision {
        if self.state.starting {
            self.state.starting = false;
            return Decision::Takeoff;
        }

        if self.landing.take() {
            self.state.landing_executed = true;
            info!(agent = self.agent_index, "Landing commanded");
            return Decision::Land;
        }

        if self.state.landing_executed {
            return Decision::DoNothingLanding;
        }

        if self.state.wait_because_see_human {
            if elapsed_since(now, self.state.last_human_detection_time)
                >= self.config.human_detection_timeout
            {
                self.state.wait_because_see_human = false;
            } else {
                return Decision::MoveToTargetHuman(self.state.position);
            }
        }

        if let Some(target) = self.state.current_target {
            if elapsed_since(now, self.state.last_target_time) < self.config.target_timeout {
                self.state.exploring = false;
                return Decision::MoveToTarget(target);
            }
        }

        self.state.current_target = None;
        if !self.state.exploring
            || elapsed_since(now, self.state.last_explore_time) >= self.config.explore_cooldown
        {
            self.state.exploring = true;
            self.state.last_explore_time = Some(now);
            return Decision::Explore;
        }

        Decision::Continue
    }

    pub fn state(&self) -> AgentState {
        AgentState {
            landing_commanded: self.landing.is_pending(),
            ..self.state.clone()
        }
    }

    pub fn phase(&self) -> AgentPhase {
        if self.state.landing_executed {
            AgentPhase::Landed
        } else if self.state.starting {
            AgentPhase::Init
        } else {
            AgentPhase::Flying
        }
    }

    fn resolve_target(&self, detection: &DetectionReport) -> Position3 {
        match detection.source {
            DetectionSource::Camera(camera) => self
                .camera_positions
                .get(&camera)
                .copied()
                .unwrap_or_else(|| detection.position.into()),
            DetectionSource::Agent(_) => detection.position.into(),
        }
    }
}
