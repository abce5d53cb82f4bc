// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command fabric wire protocol.
//!
//! Line-oriented UTF-8 over TCP. The first line of every connection is a
//! classification token; afterwards control clients send trigger phrases and
//! agents send free-text alerts. The fabric only ever sends `LAND` downstream.

use serde::{Deserialize, Serialize};

/// Handshake token identifying an agent connection.
pub const AGENT_TOKEN: &str = "DRONE_AGENT";

/// Token sent by the bundled control client. Any non-agent token classifies as control.
pub const CONTROL_TOKEN: &str = "CONTROL_CLIENT";

pub const LAND_COMMAND: &str = "LAND";

pub const ALERT_PREFIX: &str = "HUMAN_DETECTED:";

pub const DEFAULT_LAND_PHRASES: [&str; 2] = ["aterriza dron", "land drones"];

/// Pool a connection belongs to after its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    Control,
    Agent,
}

impl ClientRole {
    pub fn classify(token: &str) -> Self {
        if token.trim() == AGENT_TOKEN {
            Self::Agent
        } else {
            Self::Control
        }
    }
}

impl std::fmt::Display for ClientRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Control => write!(f, "control"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// What a control client asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Land,
    Unrecognized(String),
}

/// Match a control line against the configured trigger phrases, ignoring case
/// and surrounding whitespace.
pub fn parse_control<S: AsRef<str>>(line: &str, land_phrases: &[S]) -> ControlCommand {
    let normalized = line.trim().to_lowercase();
    if land_phrases
        .iter()
        .any(|phrase| phrase.as_ref().trim().to_lowercase() == normalized)
    {
        ControlCommand::Land
    } else {
        ControlCommand::Unrecognized(line.trim().to_string())
    }
}

/// Upstream message from an agent connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentMessage {
    /// Security alarm; carries the text after the prefix.
    HumanDetected(String),
    Other(String),
}

impl AgentMessage {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.strip_prefix(ALERT_PREFIX) {
            Some(detail) => Self::HumanDetected(detail.to_string()),
            None => Self::Other(line.to_string()),
        }
    }
}

/// Downstream command received by an agent's security link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastCommand {
    Land,
    Unknown(String),
}

impl BroadcastCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line == LAND_COMMAND {
            Self::Land
        } else {
            Self::Unknown(line.to_string())
        }
    }
}

pub fn format_alert(confidence: f64) -> String {
    format!("{ALERT_PREFIX}confidence={confidence}")
}
