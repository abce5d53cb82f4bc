// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`overwatch-core`)
//!
//! HTTP surface that translates the simulation client's polling requests into
//! decision rounds. **No decision logic lives here**: every request is
//! delegated to the [`DecisionService`](crate::application::DecisionService).
//!
//! | Route | Method | Description |
//! |-------|--------|-------------|
//! | `/get_decisions` | POST | Position samples in, one decision per agent out |
//! | `/health` | GET | Liveness, fleet size and uptime |
//! | `/events` | GET | Server-Sent Events stream of fleet events (`?agent=N` filters decisions) |

pub mod api;
