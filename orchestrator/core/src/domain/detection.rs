// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Detection Value Types
//!
//! Typed detections flowing from producers (fixed cameras, peer agents) to the
//! agent decision units:
//!
//! - [`RawDetection`]: one detector box for one frame, before confirmation.
//! - [`ConfirmedDetection`]: a sighting the confirmation engine trusts.
//! - [`DetectionReport`]: the validated form of an inbound fan-in datagram.
//! - [`DetectionMessage`]: the JSON wire shape shared by publishers and ingress.
//!
//! Inbound JSON is loosely shaped; it becomes a [`DetectionReport`] only after
//! [`DetectionReport::from_json`] has checked the required fields.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::clock::Timestamp;

/// Camera id or agent id, depending on the producer class.
pub type ProducerId = i64;

/// Detector-assigned identity of one subject across frames.
pub type TrackId = i64;

/// Normalized image-plane position, both components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position2 {
    pub x: f64,
    pub y: f64,
}

impl Position2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Position2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// World-space position of an agent or a fixed camera.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position3 {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<Position2> for Position3 {
    fn from(p: Position2) -> Self {
        Self { x: p.x, y: p.y, z: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionClass {
    Person,
    Other,
}

impl DetectionClass {
    /// Wire `type` field: only `"human"` denotes a person.
    fn from_wire(kind: Option<&str>) -> Self {
        match kind {
            Some(k) if k.eq_ignore_ascii_case("human") => Self::Person,
            _ => Self::Other,
        }
    }
}

/// Producer class, one fan-in channel each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    Camera,
    Agent,
}

impl std::fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Camera => write!(f, "camera"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// Which producer emitted a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionSource {
    Camera(ProducerId),
    Agent(ProducerId),
}

impl DetectionSource {
    pub fn kind(&self) -> ProducerKind {
        match self {
            Self::Camera(_) => ProducerKind::Camera,
            Self::Agent(_) => ProducerKind::Agent,
        }
    }

    pub fn producer_id(&self) -> ProducerId {
        match self {
            Self::Camera(id) | Self::Agent(id) => *id,
        }
    }
}

/// One detector box for one frame, before temporal confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub producer_id: ProducerId,
    pub track_id: TrackId,
    pub position: Position2,
    pub confidence: f64,
    pub class: DetectionClass,
    pub timestamp: Timestamp,
}

/// A sighting whose track has been continuously observed for the minimum dwell time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedDetection {
    pub producer_id: ProducerId,
    pub track_id: TrackId,
    pub position: Position2,
    pub confidence: f64,
    /// Seconds since the current sighting streak began.
    pub tracking_duration: f64,
}

/// Validated inbound detection, as delivered to decision units.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionReport {
    pub source: DetectionSource,
    pub track_id: Option<TrackId>,
    pub position: Position2,
    pub confidence: f64,
    pub class: DetectionClass,
    pub timestamp: Option<Timestamp>,
}

impl DetectionReport {
    /// Decode and validate one fan-in datagram.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ReportError> {
        let message: DetectionMessage = serde_json::from_slice(bytes)?;
        Self::try_from(message)
    }

    /// A fixed-camera report for a locally confirmed detection.
    pub fn from_confirmed(detection: &ConfirmedDetection) -> Self {
        Self {
            source: DetectionSource::Camera(detection.producer_id),
            track_id: Some(detection.track_id),
            position: detection.position,
            confidence: detection.confidence,
            class: DetectionClass::Other,
            timestamp: None,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class == DetectionClass::Person
    }
}

impl TryFrom<DetectionMessage> for DetectionReport {
    type Error = ReportError;

    fn try_from(message: DetectionMessage) -> Result<Self, Self::Error> {
        let source = match (message.camera_id, message.agent_id) {
            (Some(camera), None) => DetectionSource::Camera(camera),
            (None, Some(agent)) => DetectionSource::Agent(agent),
            (None, None) => return Err(ReportError::MissingProducer),
            (Some(_), Some(_)) => return Err(ReportError::AmbiguousProducer),
        };

        let confidence = message
            .confidence
            .ok_or(ReportError::MissingField("confidence"))?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ReportError::ConfidenceOutOfRange(confidence));
        }

        let position = message.position.ok_or(ReportError::MissingField("position"))?;
        if !position.is_finite() {
            return Err(ReportError::NonFinitePosition);
        }

        Ok(Self {
            source,
            track_id: message.track_id,
            position,
            confidence,
            class: DetectionClass::from_wire(message.kind.as_deref()),
            timestamp: message.timestamp,
        })
    }
}

/// JSON shape of a detection datagram.
///
/// Fixed cameras send `camera_id`, `track_id`, `position`, `confidence` and
/// `tracking_time`; agents send `type`, `agent_id`, `confidence`, `position`
/// and `timestamp`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<ProducerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<ProducerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<TrackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl DetectionMessage {
    /// Fixed-camera wire form of a confirmed detection.
    pub fn from_confirmed(detection: &ConfirmedDetection) -> Self {
        Self {
            camera_id: Some(detection.producer_id),
            track_id: Some(detection.track_id),
            position: Some(detection.position),
            confidence: Some(detection.confidence),
            tracking_time: Some(detection.tracking_duration),
            ..Self::default()
        }
    }

    /// Agent-onboard wire form of a person sighting.
    pub fn human_sighting(agent_id: ProducerId, position: Position2, confidence: f64, timestamp: Timestamp) -> Self {
        Self {
            agent_id: Some(agent_id),
            position: Some(position),
            confidence: Some(confidence),
            kind: Some("human".to_string()),
            timestamp: Some(timestamp),
            ..Self::default()
        }
    }
}

/// Reasons an inbound datagram is rejected at the ingress boundary.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("malformed detection JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("detection has neither camera_id nor agent_id")]
    MissingProducer,

    #[error("detection has both camera_id and agent_id")]
    AmbiguousProducer,

    #[error("detection is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("position has non-finite components")]
    NonFinitePosition,

    #[error("{found} report received on the {expected} channel")]
    ChannelMismatch {
        expected: ProducerKind,
        found: ProducerKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_report_parses_without_type() {
        let json = br#"{"camera_id": 2, "track_id": 7, "position": {"x": 0.5, "y": 0.4},
                        "confidence": 0.91, "tracking_time": 0.6}"#;
        let report = DetectionReport::from_json(json).unwrap();

        assert_eq!(report.source, DetectionSource::Camera(2));
        assert_eq!(report.track_id, Some(7));
        assert_eq!(report.class, DetectionClass::Other);
        assert_eq!(report.position, Position2::new(0.5, 0.4));
    }

    #[test]
    fn test_agent_human_report() {
        let json = br#"{"type": "human", "agent_id": 0, "confidence": 0.95,
                        "position": {"x": 0.1, "y": 0.2}, "timestamp": 1712.5}"#;
        let report = DetectionReport::from_json(json).unwrap();

        assert_eq!(report.source, DetectionSource::Agent(0));
        assert!(report.is_person());
        assert_eq!(report.timestamp, Some(1712.5));
    }

    #[test]
    fn test_rejects_missing_and_ambiguous_producer() {
        let missing = br#"{"confidence": 0.9, "position": {"x": 0.1, "y": 0.2}}"#;
        assert!(matches!(
            DetectionReport::from_json(missing),
            Err(ReportError::MissingProducer)
        ));

        let both = br#"{"camera_id": 1, "agent_id": 1, "confidence": 0.9, "position": {"x": 0.1, "y": 0.2}}"#;
        assert!(matches!(
            DetectionReport::from_json(both),
            Err(ReportError::AmbiguousProducer)
        ));
    }

    #[test]
    fn test_rejects_bad_confidence_and_garbage() {
        let high = br#"{"camera_id": 1, "confidence": 1.5, "position": {"x": 0.1, "y": 0.2}}"#;
        assert!(matches!(
            DetectionReport::from_json(high),
            Err(ReportError::ConfidenceOutOfRange(_))
        ));

        let no_position = br#"{"camera_id": 1, "confidence": 0.5}"#;
        assert!(matches!(
            DetectionReport::from_json(no_position),
            Err(ReportError::MissingField("position"))
        ));

        assert!(matches!(
            DetectionReport::from_json(b"not json"),
            Err(ReportError::Json(_))
        ));
    }

    #[test]
    fn test_confirmed_detection_wire_form() {
        let confirmed = ConfirmedDetection {
            producer_id: 3,
            track_id: 11,
            position: Position2::new(0.25, 0.75),
            confidence: 0.88,
            tracking_duration: 1.2,
        };
        let value = serde_json::to_value(DetectionMessage::from_confirmed(&confirmed)).unwrap();

        assert_eq!(value["camera_id"], 3);
        assert_eq!(value["tracking_time"], 1.2);
        assert!(value.get("type").is_none());
        assert!(value.get("agent_id").is_none());
    }

    #[test]
    fn test_position_distance() {
        let a = Position2::new(0.0, 0.0);
        let b = Position2::new(0.3, 0.4);
        assert!((a.distance(&b) - 0.5).abs() < 1e-12);
    }
}
