// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Monotonic time source.
//!
//! Every timestamp in the detection and decision path is a monotonic float
//! (seconds since the clock was created). Components never read the clock
//! themselves: callers pass `now` explicitly, which keeps the confirmation
//! engine and the decision cascade deterministic under test.

use std::time::Instant;

/// Seconds on a [`MonotonicClock`].
pub type Timestamp = f64;

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Seconds elapsed since this clock was created.
    pub fn now(&self) -> Timestamp {
        self.origin.elapsed().as_secs_f64()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Time elapsed since `stamp`, treating a never-stamped event as infinitely old.
pub fn elapsed_since(now: Timestamp, stamp: Option<Timestamp>) -> f64 {
    match stamp {
        Some(at) => now - at,
        None => f64::INFINITY,
    }
}
