// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::command::ClientRole;
use crate::domain::decision::Decision;
use crate::domain::detection::{ConfirmedDetection, DetectionReport, DetectionSource, Position2, ProducerId, TrackId};

/// Fleet-wide events published on the in-process event bus and streamed to
/// API subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    DetectionConfirmed {
        producer_id: ProducerId,
        track_id: TrackId,
        position: Position2,
        confidence: f64,
        tracking_duration: f64,
        confirmed_at: DateTime<Utc>,
    },
    DetectionDelivered {
        source: DetectionSource,
        confidence: f64,
        person: bool,
        /// Units that received the report
        units: usize,
        /// Units whose pursued target changed
        retargeted: usize,
        delivered_at: DateTime<Utc>,
    },
    SecurityAlert {
        connection_id: String,
        detail: String,
        raised_at: DateTime<Utc>,
    },
    LandBroadcast {
        delivered: usize,
        pruned: usize,
        broadcast_at: DateTime<Utc>,
    },
    DecisionIssued {
        agent_index: usize,
        decision: Decision,
        issued_at: DateTime<Utc>,
    },
    ConnectionClassified {
        connection_id: String,
        role: ClientRole,
        peer: String,
        classified_at: DateTime<Utc>,
    },
}

impl FleetEvent {
    pub fn detection_confirmed(detection: &ConfirmedDetection) -> Self {
        Self::DetectionConfirmed {
            producer_id: detection.producer_id,
            track_id: detection.track_id,
            position: detection.position,
            confidence: detection.confidence,
            tracking_duration: detection.tracking_duration,
            confirmed_at: Utc::now(),
        }
    }

    pub fn detection_delivered(report: &DetectionReport, units: usize, retargeted: usize) -> Self {
        Self::DetectionDelivered {
            source: report.source,
            confidence: report.confidence,
            person: report.is_person(),
            units,
            retargeted,
            delivered_at: Utc::now(),
        }
    }

    pub fn decision_issued(agent_index: usize, decision: Decision) -> Self {
        Self::DecisionIssued {
            agent_index,
            decision,
            issued_at: Utc::now(),
        }
    }

    /// Short name for logs and SSE event types.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DetectionConfirmed { .. } => "detection_confirmed",
            Self::DetectionDelivered { .. } => "detection_delivered",
            Self::SecurityAlert { .. } => "security_alert",
            Self::LandBroadcast { .. } => "land_broadcast",
            Self::DecisionIssued { .. } => "decision_issued",
            Self::ConnectionClassified { .. } => "connection_classified",
        }
    }
}
