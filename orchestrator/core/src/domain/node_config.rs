// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fleet Configuration Types
//
// Defines the configuration schema for an Overwatch coordinator process:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Fleet size and fixed camera placement
// - Confirmation and decision thresholds, cooldowns and timeouts
// - Network ports, security link and command fabric settings
// - Logging and metrics settings

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::domain::detection::{Position3, ProducerId};

pub const API_VERSION: &str = "overwatch/v1";
pub const KIND: &str = "FleetConfig";

/// Top-level Kubernetes-style fleet configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfigManifest {
    /// API version (must be "overwatch/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "FleetConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: FleetConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable coordinator name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Fleet configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfigSpec {
    #[serde(default)]
    pub fleet: FleetSection,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    #[serde(default)]
    pub decision: DecisionConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub security_link: SecurityLinkConfig,

    #[serde(default)]
    pub fabric: FabricConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSection {
    /// Number of agent decision units hosted by this process
    #[serde(default = "default_agent_count")]
    pub agent_count: usize,

    /// World position of each fixed camera, keyed by camera id.
    /// Camera-cued targets resolve to these positions.
    #[serde(default = "default_camera_positions")]
    pub camera_positions: BTreeMap<ProducerId, Position3>,
}

/// Temporal confirmation of per-frame detections. Durations in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Minimum continuous dwell before a track is trusted; also the
    /// continuity threshold used by cleanup
    #[serde(default = "default_min_detection_time")]
    pub min_detection_time: f64,

    /// Largest jump (normalized units) between consecutive sightings that
    /// still counts as the same streak
    #[serde(default = "default_max_displacement")]
    pub max_displacement: f64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: f64,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Detector boxes below this confidence never reach the engine
    #[serde(default = "default_confidence_gate")]
    pub confidence_gate: f64,
}

/// Agent decision thresholds. Durations in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    #[serde(default = "default_human_alert_threshold")]
    pub human_alert_threshold: f64,

    #[serde(default = "default_target_threshold")]
    pub target_threshold: f64,

    #[serde(default = "default_detection_cooldown")]
    pub detection_cooldown: f64,

    #[serde(default = "default_target_timeout")]
    pub target_timeout: f64,

    #[serde(default = "default_human_detection_timeout")]
    pub human_detection_timeout: f64,

    #[serde(default = "default_explore_cooldown")]
    pub explore_cooldown: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Command fabric TCP port
    #[serde(default = "default_fabric_port")]
    pub fabric_port: u16,

    /// Fixed-camera detection ingress (UDP)
    #[serde(default = "default_camera_port")]
    pub camera_port: u16,

    /// Peer-agent detection ingress (UDP)
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    /// Raw frames for camera N arrive on frame_base_port + N
    #[serde(default = "default_frame_base_port")]
    pub frame_base_port: u16,

    /// Onboard frames for agent N arrive on agent_frame_base_port + N
    #[serde(default = "default_agent_frame_base_port")]
    pub agent_frame_base_port: u16,

    /// Decision API HTTP port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_bind_retries")]
    pub bind_retries: u32,

    #[serde(default = "default_bind_retry_delay")]
    pub bind_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLinkConfig {
    /// Start one security link per agent
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Command fabric address ("host:port")
    #[serde(default = "default_fabric_address")]
    pub fabric_address: String,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,

    /// Alerts waiting for the link; overflow is dropped
    #[serde(default = "default_alert_queue")]
    pub alert_queue: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Connections without a classification token within this window are closed
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    /// Per-member send bound during broadcast
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,

    /// Control-client phrases that trigger a LAND broadcast (case-insensitive)
    #[serde(default = "default_land_phrases")]
    pub land_phrases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("compact" or "json")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus exposition
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_agent_count() -> usize {
    1
}

fn default_camera_positions() -> BTreeMap<ProducerId, Position3> {
    BTreeMap::from([
        (0, Position3::new(-2.833347, 2.0, 16.74295)),
        (1, Position3::new(-37.0, 4.0, 51.0)),
        (2, Position3::new(36.0, 2.0, -35.0)),
        (3, Position3::new(28.24, 4.0, -104.0)),
    ])
}

fn default_min_detection_time() -> f64 {
    0.4
}

fn default_max_displacement() -> f64 {
    0.2
}

fn default_cleanup_interval() -> f64 {
    5.0
}

fn default_history_capacity() -> usize {
    10
}

fn default_confidence_gate() -> f64 {
    0.5
}

fn default_human_alert_threshold() -> f64 {
    0.9
}

fn default_target_threshold() -> f64 {
    0.8
}

fn default_detection_cooldown() -> f64 {
    3.0
}

fn default_target_timeout() -> f64 {
    10.0
}

fn default_human_detection_timeout() -> f64 {
    5.0
}

fn default_explore_cooldown() -> f64 {
    10.0
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_fabric_port() -> u16 {
    5782
}

fn default_camera_port() -> u16 {
    5556
}

fn default_agent_port() -> u16 {
    5557
}

fn default_frame_base_port() -> u16 {
    5124
}

fn default_agent_frame_base_port() -> u16 {
    5123
}

fn default_api_port() -> u16 {
    5000
}

fn default_bind_retries() -> u32 {
    5
}

fn default_bind_retry_delay() -> u64 {
    1000
}

fn default_fabric_address() -> String {
    "127.0.0.1:5782".to_string()
}

fn default_reconnect_delay() -> u64 {
    5000
}

fn default_receive_timeout() -> u64 {
    1000
}

fn default_alert_queue() -> usize {
    16
}

fn default_handshake_timeout() -> u64 {
    5000
}

fn default_send_timeout() -> u64 {
    1000
}

fn default_land_phrases() -> Vec<String> {
    vec!["aterriza dron".to_string(), "land drones".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            agent_count: default_agent_count(),
            camera_positions: default_camera_positions(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            min_detection_time: default_min_detection_time(),
            max_displacement: default_max_displacement(),
            cleanup_interval: default_cleanup_interval(),
            history_capacity: default_history_capacity(),
            confidence_gate: default_confidence_gate(),
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            human_alert_threshold: default_human_alert_threshold(),
            target_threshold: default_target_threshold(),
            detection_cooldown: default_detection_cooldown(),
            target_timeout: default_target_timeout(),
            human_detection_timeout: default_human_detection_timeout(),
            explore_cooldown: default_explore_cooldown(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            fabric_port: default_fabric_port(),
            camera_port: default_camera_port(),
            agent_port: default_agent_port(),
            frame_base_port: default_frame_base_port(),
            agent_frame_base_port: default_agent_frame_base_port(),
            api_port: default_api_port(),
            bind_retries: default_bind_retries(),
            bind_retry_delay_ms: default_bind_retry_delay(),
        }
    }
}

impl Default for SecurityLinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fabric_address: default_fabric_address(),
            reconnect_delay_ms: default_reconnect_delay(),
            receive_timeout_ms: default_receive_timeout(),
            alert_queue: default_alert_queue(),
        }
    }
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout(),
            send_timeout_ms: default_send_timeout(),
            receive_timeout_ms: default_receive_timeout(),
            land_phrases: default_land_phrases(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for FleetConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "overwatch".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: FleetConfigSpec::default(),
        }
    }
}

impl FleetConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. OVERWATCH_CONFIG_PATH environment variable
    /// 2. ./overwatch-config.yaml (working directory)
    /// 3. ~/.overwatch/config.yaml (user home)
    /// 4. /etc/overwatch/config.yaml (system, Unix) or C:\ProgramData\Overwatch\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("OVERWATCH_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./overwatch-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".overwatch").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/overwatch/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Overwatch\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must load
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("OVERWATCH_AGENT_COUNT") {
            match val.parse::<usize>() {
                Ok(count) => {
                    tracing::info!("Environment override: OVERWATCH_AGENT_COUNT={}", count);
                    self.spec.fleet.agent_count = count;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for OVERWATCH_AGENT_COUNT: '{}'. Expected an integer. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("OVERWATCH_FABRIC_ADDR") {
            if val.trim().is_empty() {
                tracing::warn!("Empty OVERWATCH_FABRIC_ADDR. Ignoring.");
            } else {
                tracing::info!("Environment override: OVERWATCH_FABRIC_ADDR={}", val);
                self.spec.security_link.fabric_address = val;
            }
        }

        if let Ok(val) = std::env::var("OVERWATCH_API_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: OVERWATCH_API_PORT={}", port);
                    self.spec.network.api_port = port;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for OVERWATCH_API_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.fleet.agent_count == 0 {
            anyhow::bail!("spec.fleet.agent_count must be at least 1");
        }

        let confirmation = &self.spec.confirmation;
        check_unit_interval("spec.confirmation.confidence_gate", confirmation.confidence_gate)?;
        check_positive("spec.confirmation.min_detection_time", confirmation.min_detection_time)?;
        check_positive("spec.confirmation.max_displacement", confirmation.max_displacement)?;
        check_positive("spec.confirmation.cleanup_interval", confirmation.cleanup_interval)?;
        if confirmation.history_capacity == 0 {
            anyhow::bail!("spec.confirmation.history_capacity must be at least 1");
        }

        let decision = &self.spec.decision;
        check_unit_interval("spec.decision.human_alert_threshold", decision.human_alert_threshold)?;
        check_unit_interval("spec.decision.target_threshold", decision.target_threshold)?;
        check_positive("spec.decision.detection_cooldown", decision.detection_cooldown)?;
        check_positive("spec.decision.target_timeout", decision.target_timeout)?;
        check_positive("spec.decision.human_detection_timeout", decision.human_detection_timeout)?;
        check_positive("spec.decision.explore_cooldown", decision.explore_cooldown)?;

        let link = &self.spec.security_link;
        if link.fabric_address.is_empty() {
            anyhow::bail!("spec.security_link.fabric_address cannot be empty");
        }
        if link.reconnect_delay_ms == 0 || link.receive_timeout_ms == 0 {
            anyhow::bail!("spec.security_link timeouts must be positive");
        }
        if link.alert_queue == 0 {
            anyhow::bail!("spec.security_link.alert_queue must be at least 1");
        }

        let fabric = &self.spec.fabric;
        if fabric.handshake_timeout_ms == 0
            || fabric.send_timeout_ms == 0
            || fabric.receive_timeout_ms == 0
        {
            anyhow::bail!("spec.fabric timeouts must be positive");
        }
        if fabric.land_phrases.iter().all(|p| p.trim().is_empty()) {
            anyhow::bail!("spec.fabric.land_phrases must contain at least one phrase");
        }

        let network = &self.spec.network;
        let mut ports = vec![
            ("fabric_port", network.fabric_port),
            ("camera_port", network.camera_port),
            ("agent_port", network.agent_port),
            ("api_port", network.api_port),
        ];
        if self.spec.observability.metrics.enabled {
            ports.push(("metrics.port", self.spec.observability.metrics.port));
        }
        let mut seen = HashSet::new();
        for (name, port) in ports {
            if port != 0 && !seen.insert(port) {
                anyhow::bail!("Port {} ({}) is assigned more than once", port, name);
            }
        }

        Ok(())
    }

    /// Number of agent decision units to host.
    pub fn agent_count(&self) -> usize {
        self.spec.fleet.agent_count
    }
}

fn check_unit_interval(field: &str, value: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        anyhow::bail!("{} must be within [0, 1], got {}", field, value);
    }
    Ok(())
}

fn check_positive(field: &str, value: f64) -> anyhow::Result<()> {
    if !(value.is_finite() && value > 0.0) {
        anyhow::bail!("{} must be positive, got {}", field, value);
    }
    Ok(())
}
