// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use overwatch_core::application::DecisionService;
use overwatch_core::domain::clock::{MonotonicClock, Timestamp};
use overwatch_core::domain::decision::Decision;
use overwatch_core::domain::detection::Position3;
use overwatch_core::infrastructure::event_bus::EventBus;
use overwatch_core::presentation::api::app;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Takes off until it has seen a sample, then heads for the origin.
#[derive(Default)]
struct ScriptedFleet {
    seen: Mutex<Vec<Position3>>,
}

impl DecisionService for ScriptedFleet {
    fn agent_count(&self) -> usize {
        2
    }

    fn decide(&self, positions: &[Position3], _now: Timestamp) -> Vec<Decision> {
        let mut seen = self.seen.lock();
        seen.extend_from_slice(positions);
        positions
            .iter()
            .take(self.agent_count())
            .enumerate()
            .map(|(index, _)| {
                if index == 0 {
                    Decision::Takeoff
                } else {
                    Decision::MoveToTargetHuman(Position3::new(0.5, 0.5, 0.0))
                }
            })
            .collect()
    }
}

async fn post_decisions(fleet: Arc<ScriptedFleet>, body: String) -> (StatusCode, Value) {
    let router = app(fleet, EventBus::new(16), MonotonicClock::new());
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/get_decisions")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_get_decisions_returns_one_decision_per_agent() {
    let fleet = Arc::new(ScriptedFleet::default());
    let body = json!({
        "agentStates": [
            { "state": { "position": { "x": 1.0, "y": 2.0, "z": 3.0 } } },
            { "state": { "position": { "x": 4.0, "y": 5.0, "z": 6.0 } } },
            { "state": { "position": { "x": 7.0, "y": 8.0, "z": 9.0 } } }
        ]
    });

    let (status, value) = post_decisions(fleet.clone(), body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        value,
        json!({
            "decisions": [
                { "decision": "takeoff", "target": null },
                { "decision": "move_to_target_human", "target": { "x": 0.5, "y": 0.5, "z": 0.0 } }
            ]
        })
    );
    assert_eq!(fleet.seen.lock()[1], Position3::new(4.0, 5.0, 6.0));
}

#[tokio::test]
async fn test_get_decisions_rejects_malformed_body() {
    let fleet = Arc::new(ScriptedFleet::default());

    let (status, value) = post_decisions(fleet.clone(), "{\"agentStates\": 3}".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(value["error"].is_string());

    let (status, _) = post_decisions(fleet.clone(), "not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(fleet.seen.lock().is_empty());
}

#[tokio::test]
async fn test_health_reports_fleet_size() {
    let router = app(
        Arc::new(ScriptedFleet::default()),
        EventBus::new(16),
        MonotonicClock::new(),
    );
    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["status"], "healthy");
    assert_eq!(value["agents"], 2);
}
