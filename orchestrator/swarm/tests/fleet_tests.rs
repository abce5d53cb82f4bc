// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Fleet-level behaviour: detection fan-out, decision rounds and the path
//! from a confirmed camera track to a retargeted agent.

use overwatch_core::application::{DecisionService, DetectionSink};
use overwatch_core::domain::confirmation::DetectionConfirmationEngine;
use overwatch_core::domain::decision::{AgentPhase, Decision};
use overwatch_core::domain::detection::{
    DetectionClass, DetectionReport, DetectionSource, Position2, Position3, RawDetection,
};
use overwatch_core::domain::events::FleetEvent;
use overwatch_core::domain::node_config::{ConfirmationConfig, FleetConfigSpec};
use overwatch_core::infrastructure::event_bus::EventBus;
use overwatch_swarm::{Fleet, FleetBuilder};

fn fleet(agents: usize) -> Fleet {
    let spec = FleetConfigSpec::default();
    FleetBuilder::new(agents, spec.decision, spec.fleet.camera_positions).build()
}

fn human(agent: i64, confidence: f64) -> DetectionReport {
    DetectionReport {
        source: DetectionSource::Agent(agent),
        track_id: None,
        position: Position2::new(0.4, 0.6),
        confidence,
        class: DetectionClass::Person,
        timestamp: None,
    }
}

fn origin(index: usize) -> Position3 {
    Position3::new(index as f64, 10.0, 0.0)
}

#[test]
fn test_first_round_takes_off_every_sampled_agent() {
    let fleet = fleet(3);

    let decisions = fleet.decide(&[origin(0), origin(1)], 0.0);
    assert_eq!(decisions, vec![Decision::Takeoff, Decision::Takeoff]);

    // The unsampled agent has not started yet.
    assert_eq!(fleet.slot(2).unwrap().phase(), AgentPhase::Init);
    assert_eq!(fleet.slot(1).unwrap().state().position, origin(1));
}

#[test]
fn test_extra_position_samples_are_ignored() {
    let fleet = fleet(1);
    let decisions = fleet.decide(&[origin(0), origin(1), origin(2)], 0.0);
    assert_eq!(decisions.len(), 1);
}

#[test]
fn test_detection_reaches_every_unit() {
    let fleet = fleet(2);
    fleet.decide(&[origin(0), origin(1)], 0.0);

    assert_eq!(fleet.deliver(&human(0, 0.95), 1.0), 2);

    // Humans in view hold each agent at its own position.
    let decisions = fleet.decide(&[origin(0), origin(1)], 2.0);
    assert_eq!(
        decisions,
        vec![
            Decision::MoveToTargetHuman(origin(0)),
            Decision::MoveToTargetHuman(origin(1)),
        ]
    );

    // Weak sightings never retarget.
    assert_eq!(fleet.deliver(&human(1, 0.5), 10.0), 0);
}

#[test]
fn test_landing_one_agent_leaves_the_others_flying() {
    let fleet = fleet(2);
    fleet.decide(&[origin(0), origin(1)], 0.0);

    fleet.slot(0).unwrap().landing_signal().command();
    assert_eq!(
        fleet.decide(&[origin(0), origin(1)], 1.0),
        vec![Decision::Land, Decision::Explore]
    );
    assert_eq!(
        fleet.decide(&[origin(0), origin(1)], 2.0),
        vec![Decision::DoNothingLanding, Decision::Continue]
    );
    assert_eq!(fleet.slot(0).unwrap().phase(), AgentPhase::Landed);
}

#[test]
fn test_confirmed_camera_track_retargets_the_fleet() {
    let engine = DetectionConfirmationEngine::new(ConfirmationConfig::default());
    let fleet = fleet(1);
    assert_eq!(fleet.decide(&[origin(0)], 0.0), vec![Decision::Takeoff]);

    let samples = [
        (0.0, Position2::new(0.50, 0.50)),
        (0.2, Position2::new(0.51, 0.50)),
        (0.4, Position2::new(0.52, 0.51)),
    ];
    let confirmed: Vec<_> = samples
        .iter()
        .map(|&(t, position)| {
            engine.confirm(&RawDetection {
                producer_id: 2,
                track_id: 7,
                position,
                confidence: 0.9,
                class: DetectionClass::Person,
                timestamp: t,
            })
        })
        .collect();
    assert!(confirmed[0].is_none());
    assert!(confirmed[1].is_none());
    let detection = confirmed[2].clone().expect("track confirmed after dwell");

    let report = DetectionReport::from_confirmed(&detection);
    assert_eq!(fleet.deliver(&report, 0.4), 1);

    let camera = Position3::new(36.0, 2.0, -35.0);
    assert_eq!(fleet.decide(&[origin(0)], 1.0), vec![Decision::MoveToTarget(camera)]);
    assert_eq!(fleet.decide(&[origin(0)], 10.3), vec![Decision::MoveToTarget(camera)]);
    assert_eq!(fleet.decide(&[origin(0)], 10.5), vec![Decision::Explore]);
}

#[tokio::test]
async fn test_fleet_publishes_delivery_and_decision_events() {
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let spec = FleetConfigSpec::default();
    let fleet = Fleet::builder(&spec).with_event_bus(bus).build();

    fleet.decide(&[origin(0)], 0.0);
    fleet.deliver(&human(0, 0.95), 1.0);

    match events.recv().await.unwrap() {
        FleetEvent::DecisionIssued { agent_index, decision, .. } => {
            assert_eq!(agent_index, 0);
            assert_eq!(decision, Decision::Takeoff);
        }
        other => panic!("unexpected event {other:?}"),
    }
    match events.recv().await.unwrap() {
        FleetEvent::DetectionDelivered { units, retargeted, person, .. } => {
            assert_eq!((units, retargeted), (1, 1));
            assert!(person);
        }
        other => panic!("unexpected event {other:?}"),
    }
}
