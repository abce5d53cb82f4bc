// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Fleet Events
//
// In-memory event streaming over a tokio broadcast channel. Feeds the SSE
// endpoint and any in-process observer. Events are not persisted; slow
// subscribers lose the oldest events.

use crate::domain::decision::Decision;
use crate::domain::events::FleetEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to fleet events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<FleetEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a fleet event to all subscribers. Never blocks or fails.
    pub fn publish(&self, event: FleetEvent) {
        debug!(kind = event.kind(), "Publishing event");

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn publish_decision(&self, agent_index: usize, decision: Decision) {
        self.publish(FleetEvent::decision_issued(agent_index, decision));
    }

    /// Subscribe to all fleet events
    pub fn subscribe(&self) -> EventReceiver {
        let receiver = self.sender.subscribe();
        EventReceiver { receiver }
    }

    /// Subscribe to the decisions of a single agent
    pub fn subscribe_agent(&self, agent_index: usize) -> AgentEventReceiver {
        let receiver = self.sender.subscribe();
        AgentEventReceiver {
            receiver,
            agent_index,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all fleet events
pub struct EventReceiver {
    receiver: broadcast::Receiver<FleetEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<FleetEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<FleetEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for one agent's decisions (filtered)
pub struct AgentEventReceiver {
    receiver: broadcast::Receiver<FleetEvent>,
    agent_index: usize,
}

impl AgentEventReceiver {
    /// Receive the next event concerning this agent
    pub async fn recv(&mut self) -> Result<FleetEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let FleetEvent::DecisionIssued { agent_index, .. } = &event {
                if *agent_index == self.agent_index {
                    return Ok(event);
                }
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
