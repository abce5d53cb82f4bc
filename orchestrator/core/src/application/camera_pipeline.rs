// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Frame detection pipeline: detector output → confidence gate → person
//! filter → normalized centre.
//!
//! Fixed-camera frames then pass through the confirmation engine. Frames from
//! an agent's onboard camera are reported as sightings straight away.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::domain::clock::Timestamp;
use crate::domain::confirmation::DetectionConfirmationEngine;
use crate::domain::detection::{
    ConfirmedDetection, DetectionClass, Position2, ProducerId, RawDetection, TrackId,
};

/// One bounding box from the detector, in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub class: DetectionClass,
    pub confidence: f64,
    pub track_id: Option<TrackId>,
}

impl DetectorBox {
    /// Box centre normalized to `[0, 1]`; `None` for a degenerate frame size.
    pub fn normalized_center(&self) -> Option<Position2> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return None;
        }
        let x = (self.x1 + self.x2) / (2.0 * self.frame_width as f64);
        let y = (self.y1 + self.y2) / (2.0 * self.frame_height as f64);
        Some(Position2::new(x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)))
    }
}

/// Black-box object detector with tracking.
pub trait Detector: Send + Sync {
    fn detect(&self, producer_id: ProducerId, frame: &[u8]) -> anyhow::Result<Vec<DetectorBox>>;
}

pub struct CameraPipeline {
    detector: Arc<dyn Detector>,
    engine: Arc<DetectionConfirmationEngine>,
    confidence_gate: f64,
}

impl CameraPipeline {
    pub fn new(detector: Arc<dyn Detector>, engine: Arc<DetectionConfirmationEngine>) -> Self {
        let confidence_gate = engine.config().confidence_gate;
        Self {
            detector,
            engine,
            confidence_gate,
        }
    }

    pub fn engine(&self) -> &Arc<DetectionConfirmationEngine> {
        &self.engine
    }

    /// Run the detector on one fixed-camera frame and return the confirmed sightings.
    ///
    /// A detector failure yields no detections for that frame.
    pub fn process_frame(&self, producer_id: ProducerId, frame: &[u8], now: Timestamp) -> Vec<ConfirmedDetection> {
        self.person_detections(producer_id, frame, now, |confidence| confidence > self.confidence_gate)
            .iter()
            .filter_map(|raw| self.engine.confirm(raw))
            .collect()
    }

    /// Run the detector on one onboard frame and return every person box at
    /// or above the gate, unconfirmed.
    pub fn onboard_sightings(&self, producer_id: ProducerId, frame: &[u8], now: Timestamp) -> Vec<RawDetection> {
        self.person_detections(producer_id, frame, now, |confidence| confidence >= self.confidence_gate)
    }

    fn person_detections(
        &self,
        producer_id: ProducerId,
        frame: &[u8],
        now: Timestamp,
        passes_gate: impl Fn(f64) -> bool,
    ) -> Vec<RawDetection> {
        let boxes = match self.detector.detect(producer_id, frame) {
            Ok(boxes) => boxes,
            Err(e) => {
                warn!(producer_id, error = %e, "Detector failed on frame");
                return Vec::new();
            }
        };

        boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.class == DetectionClass::Person && passes_gate(b.confidence))
            .filter_map(|(index, b)| {
                let Some(position) = b.normalized_center() else {
                    trace!(producer_id, index, "Skipping box with empty frame size");
                    return None;
                };
                Some(RawDetection {
                    producer_id,
                    track_id: b.track_id.unwrap_or(index as TrackId),
                    position,
                    confidence: b.confidence,
                    class: b.class,
                    timestamp: now,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node_config::ConfirmationConfig;
    use parking_lot::Mutex;

    struct ScriptedDetector {
        frames: Mutex<Vec<anyhow::Result<Vec<DetectorBox>>>>,
    }

    impl ScriptedDetector {
        fn new(mut frames: Vec<anyhow::Result<Vec<DetectorBox>>>) -> Self {
            frames.reverse();
            Self {
                frames: Mutex::new(frames),
            }
        }
    }

    impl Detector for ScriptedDetector {
        fn detect(&self, _producer_id: ProducerId, _frame: &[u8]) -> anyhow::Result<Vec<DetectorBox>> {
            self.frames.lock().pop().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn person(cx: f64, confidence: f64, track_id: Option<TrackId>) -> DetectorBox {
        DetectorBox {
            x1: cx - 10.0,
            y1: 200.0,
            x2: cx + 10.0,
            y2: 280.0,
            frame_width: 640,
            frame_height: 480,
            class: DetectionClass::Person,
            confidence,
            track_id,
        }
    }

    fn pipeline(frames: Vec<anyhow::Result<Vec<DetectorBox>>>) -> CameraPipeline {
        CameraPipeline::new(
            Arc::new(ScriptedDetector::new(frames)),
            Arc::new(DetectionConfirmationEngine::new(ConfirmationConfig::default())),
        )
    }

    #[test]
    fn test_normalized_center() {
        let b = person(320.0, 0.9, None);
        assert_eq!(b.normalized_center(), Some(Position2::new(0.5, 0.5)));

        let degenerate = DetectorBox { frame_width: 0, ..b };
        assert_eq!(degenerate.normalized_center(), None);
    }

    #[test]
    fn test_confirms_after_dwell() {
        let frame = || Ok(vec![person(320.0, 0.9, Some(4))]);
        let pipeline = pipeline(vec![frame(), frame(), frame()]);

        assert!(pipeline.process_frame(1, b"f", 0.0).is_empty());
        assert!(pipeline.process_frame(1, b"f", 0.2).is_empty());
        let confirmed = pipeline.process_frame(1, b"f", 0.4);
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].track_id, 4);
        assert_eq!(confirmed[0].producer_id, 1);
    }

    #[test]
    fn test_gate_and_class_filter() {
        let other = DetectorBox {
            class: DetectionClass::Other,
            ..person(100.0, 0.95, Some(1))
        };
        let frame = || Ok(vec![person(320.0, 0.5, Some(2)), other.clone()]);
        let pipeline = pipeline(vec![frame(), frame()]);

        pipeline.process_frame(0, b"f", 0.0);
        pipeline.process_frame(0, b"f", 1.0);
        assert_eq!(pipeline.engine().track_count(), 0);
    }

    #[test]
    fn test_index_is_fallback_track_id() {
        let frame = || Ok(vec![person(100.0, 0.3, None), person(500.0, 0.9, None)]);
        let pipeline = pipeline(vec![frame(), frame()]);

        pipeline.process_frame(0, b"f", 0.0);
        let confirmed = pipeline.process_frame(0, b"f", 0.5);
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].track_id, 1);
    }

    #[test]
    fn test_onboard_sightings_skip_confirmation() {
        let frame = || Ok(vec![person(320.0, 0.5, Some(3)), person(100.0, 0.49, Some(4))]);
        let pipeline = pipeline(vec![frame()]);

        let sightings = pipeline.onboard_sightings(2, b"f", 7.0);
        assert_eq!(sightings.len(), 1);
        assert_eq!(sightings[0].track_id, 3);
        assert_eq!(sightings[0].producer_id, 2);
        assert_eq!(sightings[0].position, Position2::new(0.5, 0.5));
        assert_eq!(pipeline.engine().track_count(), 0);
    }

    #[test]
    fn test_detector_failure_yields_nothing() {
        let pipeline = pipeline(vec![Err(anyhow::anyhow!("model not loaded"))]);
        assert!(pipeline.process_frame(0, b"f", 0.0).is_empty());
    }
}
