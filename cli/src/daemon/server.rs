// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Process wiring for `overwatch daemon` and `overwatch fabric`.

use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use overwatch_core::domain::clock::MonotonicClock;
use overwatch_core::domain::detection::ProducerKind;
use overwatch_core::domain::node_config::FleetConfigManifest;
use overwatch_core::infrastructure::command_fabric::CommandFabric;
use overwatch_core::infrastructure::event_bus::EventBus;
use overwatch_core::infrastructure::fan_in::DetectionIngress;
use overwatch_core::infrastructure::net::{bind_tcp, socket_addr, BindPolicy};
use overwatch_core::presentation::api;
use overwatch_swarm::Fleet;

use super::{init_metrics, shutdown_signal};

/// How long in-flight API requests and background tasks get to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run the fleet coordinator until Ctrl+C / SIGTERM.
///
/// Starts the camera and agent fan-in ingresses, one decision unit and
/// security link per agent, and the Decision API. With `with_fabric` the
/// command fabric is hosted in the same process.
pub async fn start_daemon(config: FleetConfigManifest, with_fabric: bool) -> Result<()> {
    let spec = &config.spec;
    let network = &spec.network;
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    init_metrics(&spec.observability.metrics, network)?;

    let clock = MonotonicClock::new();
    let event_bus = EventBus::with_default_capacity();
    let policy = BindPolicy::from_config(network);

    info!(
        name = %config.metadata.name,
        agents = spec.fleet.agent_count,
        "Overwatch daemon starting"
    );

    let fabric = if with_fabric {
        Some(start_fabric(&config, event_bus.clone(), &shutdown).await?)
    } else {
        None
    };

    let fleet = Arc::new(
        Fleet::builder(spec)
            .with_security_links(&spec.security_link)
            .with_event_bus(event_bus.clone())
            .with_shutdown(&shutdown)
            .build(),
    );
    let mut tasks = fleet.spawn_security_links();

    for (kind, port) in [
        (ProducerKind::Camera, network.camera_port),
        (ProducerKind::Agent, network.agent_port),
    ] {
        let addr = socket_addr(&network.bind_address, port)?;
        let ingress = DetectionIngress::bind(kind, addr, policy, fleet.clone(), clock)
            .await
            .with_context(|| format!("Failed to start {kind} fan-in on {addr}"))?
            .with_shutdown(&shutdown);
        tasks.push(ingress.spawn());
    }

    let api_addr = socket_addr(&network.bind_address, network.api_port)?;
    let listener = bind_tcp(api_addr, policy)
        .await
        .context("Failed to start Decision API")?;
    info!(addr = %api_addr, "Decision API listening");

    let app = api::app(fleet.clone(), event_bus, clock);
    let graceful = shutdown.clone();
    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { graceful.cancelled().await })
            .into_future(),
    );

    tokio::select! {
        result = &mut server => {
            shutdown.cancel();
            result
                .context("Decision API task panicked")?
                .context("Decision API failed")?;
        }
        _ = shutdown.cancelled() => {
            // Open event streams never finish on their own.
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
                warn!("Decision API did not drain in time");
                server.abort();
            }
        }
    }

    info!("Daemon shutting down");
    fleet.stop_security_links();
    if let Some(fabric) = fabric {
        fabric.stop().await;
    }
    join_all(tasks).await;

    info!("Daemon stopped");
    Ok(())
}

/// Run only the command fabric until Ctrl+C / SIGTERM.
pub async fn run_fabric(config: FleetConfigManifest) -> Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    init_metrics(&config.spec.observability.metrics, &config.spec.network)?;

    let fabric = start_fabric(&config, EventBus::with_default_capacity(), &shutdown).await?;
    shutdown.cancelled().await;

    fabric.stop().await;
    info!("Command fabric stopped");
    Ok(())
}

async fn start_fabric(
    config: &FleetConfigManifest,
    event_bus: EventBus,
    shutdown: &CancellationToken,
) -> Result<Arc<CommandFabric>> {
    let network = &config.spec.network;
    let addr = socket_addr(&network.bind_address, network.fabric_port)?;

    let fabric = Arc::new(
        CommandFabric::new(config.spec.fabric.clone())
            .with_event_bus(event_bus)
            .with_shutdown(shutdown),
    );
    let bound = fabric
        .start(addr, BindPolicy::from_config(network))
        .await
        .context("Failed to start command fabric")?;

    info!(addr = %bound, "Command fabric listening");
    Ok(fabric)
}

async fn join_all(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Background task failed"),
            Err(_) => warn!("Background task did not stop in time"),
        }
    }
}
