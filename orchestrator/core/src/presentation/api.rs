// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::application::DecisionService;
use crate::domain::clock::MonotonicClock;
use crate::domain::decision::Decision;
use crate::domain::detection::Position3;
use crate::domain::events::FleetEvent;
use crate::infrastructure::event_bus::{AgentEventReceiver, EventBus, EventBusError, EventReceiver};

pub struct AppState {
    pub decisions: Arc<dyn DecisionService>,
    pub event_bus: EventBus,
    pub clock: MonotonicClock,
    pub started_at: Instant,
}

pub fn app(decisions: Arc<dyn DecisionService>, event_bus: EventBus, clock: MonotonicClock) -> Router {
    let state = Arc::new(AppState {
        decisions,
        event_bus,
        clock,
        started_at: Instant::now(),
    });

    Router::new()
        .route("/get_decisions", post(get_decisions))
        .route("/health", get(health))
        .route("/events", get(stream_events))
        .with_state(state)
}

/// World snapshot posted by the simulation client once per polling cycle.
#[derive(Debug, Deserialize)]
pub struct WorldState {
    #[serde(rename = "agentStates")]
    pub agent_states: Vec<AgentStateEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AgentStateEntry {
    pub state: AgentSample,
}

#[derive(Debug, Deserialize)]
pub struct AgentSample {
    pub position: Position3,
}

#[derive(Debug, Serialize)]
pub struct DecisionsResponse {
    pub decisions: Vec<Decision>,
}

async fn get_decisions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WorldState>, JsonRejection>,
) -> impl IntoResponse {
    let world = match payload {
        Ok(Json(world)) => world,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Invalid decision request");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    let positions: Vec<Position3> = world
        .agent_states
        .iter()
        .map(|entry| entry.state.position)
        .collect();

    let decisions = state.decisions.decide(&positions, state.clock.now());
    debug!(count = decisions.len(), "Decisions issued");

    Json(DecisionsResponse { decisions }).into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "agents": state.decisions.agent_count(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only stream decisions for this agent
    pub agent: Option<usize>,
}

enum Subscription {
    All(EventReceiver),
    Agent(AgentEventReceiver),
}

impl Subscription {
    async fn recv(&mut self) -> Result<FleetEvent, EventBusError> {
        match self {
            Self::All(receiver) => receiver.recv().await,
            Self::Agent(receiver) => receiver.recv().await,
        }
    }
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = match query.agent {
        Some(agent) => Subscription::Agent(state.event_bus.subscribe_agent(agent)),
        None => Subscription::All(state.event_bus.subscribe()),
    };

    let events = stream::unfold(subscription, |mut subscription| async move {
        loop {
            match subscription.recv().await {
                Ok(event) => {
                    let sse = Event::default().event(event.kind()).json_data(&event);
                    return Some((sse, subscription));
                }
                // Lagging subscribers skip ahead.
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
