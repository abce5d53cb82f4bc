// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the command fabric over real loopback sockets.
//!
//! Covers handshake classification, the handshake timeout, LAND broadcast
//! from a control phrase, pruning of dead agents and security alarms.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use overwatch_core::domain::events::FleetEvent;
use overwatch_core::domain::node_config::FabricConfig;
use overwatch_core::infrastructure::command_fabric::{BroadcastReport, CommandFabric, FabricError, PoolSizes};
use overwatch_core::infrastructure::control_client::ControlClient;
use overwatch_core::infrastructure::event_bus::EventBus;
use overwatch_core::infrastructure::net::BindPolicy;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const WAIT: Duration = Duration::from_secs(3);

fn test_config() -> FabricConfig {
    FabricConfig {
        handshake_timeout_ms: 200,
        send_timeout_ms: 200,
        receive_timeout_ms: 50,
        ..FabricConfig::default()
    }
}

async fn start_fabric(event_bus: EventBus) -> (Arc<CommandFabric>, SocketAddr) {
    let fabric = Arc::new(CommandFabric::new(test_config()).with_event_bus(event_bus));
    let addr = fabric
        .start("127.0.0.1:0".parse().unwrap(), BindPolicy::once())
        .await
        .unwrap();
    (fabric, addr)
}

async fn wait_for_pools(fabric: &CommandFabric, expected: PoolSizes) {
    tokio::time::timeout(WAIT, async {
        while fabric.pool_sizes().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("pools never reached {:?}", expected));
}

struct TestPeer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestPeer {
    async fn connect(addr: SocketAddr, token: Option<&str>) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        let mut peer = Self {
            reader: BufReader::new(read_half),
            writer,
        };
        if let Some(token) = token {
            peer.send(token).await;
        }
        peer
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    /// Next line, or `None` on EOF or timeout.
    async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match tokio::time::timeout(WAIT, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => None,
            Ok(Ok(_)) => Some(line.trim_end().to_string()),
        }
    }
}

#[tokio::test]
async fn test_control_phrase_broadcasts_land_to_every_agent() {
    let event_bus = EventBus::new(64);
    let mut events = event_bus.subscribe();
    let (fabric, addr) = start_fabric(event_bus).await;

    let mut agents = Vec::new();
    for _ in 0..3 {
        agents.push(TestPeer::connect(addr, Some("DRONE_AGENT")).await);
    }
    wait_for_pools(&fabric, PoolSizes { control: 0, agent: 3 }).await;

    let control = ControlClient::connect(addr, WAIT).await.unwrap();
    control.request_landing("  Aterriza Dron ").await.unwrap();

    for agent in &mut agents {
        assert_eq!(agent.read_line().await.as_deref(), Some("LAND"));
    }

    let report = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(FleetEvent::LandBroadcast { delivered, pruned, .. }) = events.recv().await {
                return (delivered, pruned);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(report, (3, 0));

    fabric.stop().await;
}

#[tokio::test]
async fn test_dead_agent_is_pruned_and_survivors_still_receive() {
    let (fabric, addr) = start_fabric(EventBus::new(16)).await;

    let mut first = TestPeer::connect(addr, Some("DRONE_AGENT")).await;
    let dead = TestPeer::connect(addr, Some("DRONE_AGENT")).await;
    let mut third = TestPeer::connect(addr, Some("DRONE_AGENT")).await;
    wait_for_pools(&fabric, PoolSizes { control: 0, agent: 3 }).await;

    drop(dead);
    wait_for_pools(&fabric, PoolSizes { control: 0, agent: 2 }).await;

    let report = fabric.broadcast("LAND").await;
    assert_eq!(report, BroadcastReport { delivered: 2, pruned: 0 });
    assert_eq!(first.read_line().await.as_deref(), Some("LAND"));
    assert_eq!(third.read_line().await.as_deref(), Some("LAND"));

    fabric.stop().await;
}

#[tokio::test]
async fn test_connection_without_token_is_closed_and_never_pooled() {
    let (fabric, addr) = start_fabric(EventBus::new(16)).await;

    let mut silent = TestPeer::connect(addr, None).await;
    assert_eq!(silent.read_line().await, None);
    assert_eq!(fabric.pool_sizes().await, PoolSizes::default());

    fabric.stop().await;
}

#[tokio::test]
async fn test_any_other_token_joins_control_pool() {
    let (fabric, addr) = start_fabric(EventBus::new(16)).await;

    let mut unity = TestPeer::connect(addr, Some("UNITY_CLIENT")).await;
    let mut agent = TestPeer::connect(addr, Some("DRONE_AGENT")).await;
    wait_for_pools(&fabric, PoolSizes { control: 1, agent: 1 }).await;

    // Unrecognized control text is ignored; the phrase match ignores case.
    unity.send("hello there").await;
    unity.send("LAND DRONES").await;

    assert_eq!(agent.read_line().await.as_deref(), Some("LAND"));
    assert_eq!(fabric.pool_sizes().await, PoolSizes { control: 1, agent: 1 });

    fabric.stop().await;
}

#[tokio::test]
async fn test_agent_alert_raises_security_alarm() {
    let event_bus = EventBus::new(64);
    let mut events = event_bus.subscribe();
    let (fabric, addr) = start_fabric(event_bus).await;

    let mut agent = TestPeer::connect(addr, Some("DRONE_AGENT")).await;
    agent.send("HUMAN_DETECTED:confidence=0.95").await;

    let detail = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(FleetEvent::SecurityAlert { detail, .. }) = events.recv().await {
                return detail;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(detail, "confidence=0.95");

    fabric.stop().await;
}

#[tokio::test]
async fn test_stop_closes_pooled_connections() {
    let (fabric, addr) = start_fabric(EventBus::new(16)).await;
    assert!(fabric.is_running());
    assert_eq!(fabric.local_addr(), Some(addr));

    let mut agent = TestPeer::connect(addr, Some("DRONE_AGENT")).await;
    wait_for_pools(&fabric, PoolSizes { control: 0, agent: 1 }).await;

    fabric.stop().await;
    assert_eq!(agent.read_line().await, None);
    assert_eq!(fabric.pool_sizes().await, PoolSizes::default());
}

#[tokio::test]
async fn test_stopped_fabric_refuses_to_start_again() {
    let (fabric, _) = start_fabric(EventBus::new(16)).await;
    fabric.stop().await;

    let restart = fabric
        .start("127.0.0.1:0".parse().unwrap(), BindPolicy::once())
        .await;
    assert!(matches!(restart, Err(FabricError::Stopped)));
    assert!(!fabric.is_running());
}
