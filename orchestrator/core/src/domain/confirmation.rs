// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Detection Confirmation Engine
//!
//! Temporal debouncer between the black-box detector and the rest of the
//! fleet. A track is trusted only after it has been re-sighted continuously for
//! `min_detection_time` seconds without jumping more than `max_displacement`
//! between consecutive sightings.
//!
//! ## Track lifecycle
//!
//! ```text
//! first sighting ──► Unconfirmed ──(dwell elapsed)──► Confirmed
//!                        ▲                               │
//!                        └──────(position jump)──────────┘
//! ```
//!
//! Stale tracks (unseen for longer than `min_detection_time`) are dropped by a
//! sweep that runs at most once per `cleanup_interval`, piggybacked on
//! [`DetectionConfirmationEngine::observe`].

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::clock::Timestamp;
use crate::domain::detection::{ConfirmedDetection, Position2, ProducerId, RawDetection, TrackId};
use crate::domain::node_config::ConfirmationConfig;

type TrackKey = (ProducerId, TrackId);

#[derive(Debug, Clone)]
struct TrackHistory {
    first_seen: Timestamp,
    last_seen: Timestamp,
    positions: VecDeque<Position2>,
    confirmed: bool,
}

impl TrackHistory {
    fn start(position: Position2, now: Timestamp, capacity: usize) -> Self {
        let mut positions = VecDeque::with_capacity(capacity);
        positions.push_back(position);
        Self {
            first_seen: now,
            last_seen: now,
            positions,
            confirmed: false,
        }
    }

    fn restart(&mut self, position: Position2, now: Timestamp) {
        self.positions.clear();
        self.positions.push_back(position);
        self.first_seen = now;
        self.confirmed = false;
    }
}

#[derive(Debug, Default)]
struct EngineState {
    tracks: HashMap<TrackKey, TrackHistory>,
    last_cleanup: Option<Timestamp>,
}

/// Stateful debouncer turning per-frame detections into confirmed sightings.
///
/// All state lives behind one mutex so read-modify-write of a track and the
/// cleanup sweep never interleave, regardless of how many ingress tasks share
/// the engine.
#[derive(Debug)]
pub struct DetectionConfirmationEngine {
    config: ConfirmationConfig,
    state: Mutex<EngineState>,
}

impl DetectionConfirmationEngine {
    pub fn new(config: ConfirmationConfig) -> Self {
        Self {
            config,
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn config(&self) -> &ConfirmationConfig {
        &self.config
    }

    /// Record one sighting and report whether the track is confirmed.
    ///
    /// A first sighting is never confirmed. A jump larger than the
    /// displacement threshold restarts the streak. Once confirmed, a track
    /// stays confirmed until it is reset or swept.
    pub fn observe(&self, producer_id: ProducerId, track_id: TrackId, position: Position2, now: Timestamp) -> bool {
        let mut state = self.state.lock();
        self.maybe_cleanup(&mut state, now);
        self.observe_locked(&mut state, (producer_id, track_id), position, now)
            .is_some()
    }

    /// Observe a raw detection and build the confirmed event when it passes.
    pub fn confirm(&self, raw: &RawDetection) -> Option<ConfirmedDetection> {
        let mut state = self.state.lock();
        self.maybe_cleanup(&mut state, raw.timestamp);

        let first_seen = self.observe_locked(
            &mut state,
            (raw.producer_id, raw.track_id),
            raw.position,
            raw.timestamp,
        )?;

        Some(ConfirmedDetection {
            producer_id: raw.producer_id,
            track_id: raw.track_id,
            position: raw.position,
            confidence: raw.confidence,
            tracking_duration: raw.timestamp - first_seen,
        })
    }

    /// Drop every track unseen for longer than the continuity threshold.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let mut state = self.state.lock();
        self.sweep_locked(&mut state, now)
    }

    pub fn track_count(&self) -> usize {
        self.state.lock().tracks.len()
    }

    /// Seconds the current streak of a track has lasted as of its last sighting.
    pub fn tracking_duration(&self, producer_id: ProducerId, track_id: TrackId) -> Option<f64> {
        self.state
            .lock()
            .tracks
            .get(&(producer_id, track_id))
            .map(|history| history.last_seen - history.first_seen)
    }

    /// Returns the streak start when the sighting is confirmed.
    fn observe_locked(
        &self,
        state: &mut EngineState,
        key: TrackKey,
        position: Position2,
        now: Timestamp,
    ) -> Option<Timestamp> {
        let capacity = self.config.history_capacity.max(1);

        let Some(history) = state.tracks.get_mut(&key) else {
            trace!(producer_id = key.0, track_id = key.1, "New track");
            state
                .tracks
                .insert(key, TrackHistory::start(position, now, capacity));
            return None;
        };

        history.last_seen = now;

        if let Some(previous) = history.positions.back() {
            let displacement = position.distance(previous);
            if displacement > self.config.max_displacement {
                debug!(
                    producer_id = key.0,
                    track_id = key.1,
                    displacement,
                    "Track jumped, restarting confirmation"
                );
                history.restart(position, now);
                return None;
            }
        }

        history.positions.push_back(position);
        while history.positions.len() > capacity {
            history.positions.pop_front();
        }

        if history.confirmed {
            return Some(history.first_seen);
        }

        if now - history.first_seen >= self.config.min_detection_time {
            history.confirmed = true;
            metrics::counter!("overwatch_detections_confirmed_total").increment(1);
            debug!(
                producer_id = key.0,
                track_id = key.1,
                dwell = now - history.first_seen,
                "Track confirmed"
            );
            return Some(history.first_seen);
        }

        None
    }

    fn maybe_cleanup(&self, state: &mut EngineState, now: Timestamp) {
        match state.last_cleanup {
            None => state.last_cleanup = Some(now),
            Some(at) if now - at >= self.config.cleanup_interval => {
                self.sweep_locked(state, now);
            }
            Some(_) => {}
        }
    }

    fn sweep_locked(&self, state: &mut EngineState, now: Timestamp) -> usize {
        let threshold = self.config.min_detection_time;
        let before = state.tracks.len();
        state
            .tracks
            .retain(|_, history| now - history.last_seen <= threshold);
        state.last_cleanup = Some(now);

        let removed = before - state.tracks.len();
        if removed > 0 {
            debug!(removed, remaining = state.tracks.len(), "Swept stale tracks");
        }
        removed
    }
}

impl Default for DetectionConfirmationEngine {
    fn default() -> Self {
        Self::new(ConfirmationConfig::default())
    }
}
