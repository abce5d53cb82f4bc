// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Process-wide shutdown token driven by Ctrl+C / SIGTERM
//! - Optional Prometheus exporter
//! - Wiring of fleet, ingresses, security links, fabric and Decision API

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use overwatch_core::domain::node_config::{MetricsConfig, NetworkConfig};
use overwatch_core::infrastructure::net::socket_addr;

pub mod server;

pub use server::{run_fabric, start_daemon};

/// Install the Prometheus exporter when metrics are enabled.
pub fn init_metrics(config: &MetricsConfig, network: &NetworkConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr = socket_addr(&network.bind_address, config.port)
        .context("Invalid metrics listen address")?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
        _ = token.cancelled() => {
            return;
        },
    }

    token.cancel();
}
