// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Command Fabric
//!
//! TCP broadcast service between the security authority and the agents.
//!
//! ## Connection lifecycle
//!
//! 1. Accept; read the first line within the handshake timeout.
//!    `DRONE_AGENT` joins the agent pool, anything else the control pool.
//!    No token in time closes the connection without pooling it.
//! 2. One task per connection reads lines with a 1 s receive timeout so the
//!    shutdown token is observed promptly.
//!    - Control: a land trigger phrase runs [`CommandFabric::broadcast`] with
//!      `LAND` from this task.
//!    - Agent: `HUMAN_DETECTED:` lines raise a security alarm.
//! 3. EOF or a read error removes the connection from its pool.
//!
//! Broadcast is best-effort and at-most-once per live member: a member whose
//! send fails or times out is removed and closed, with no retry.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::command::{parse_control, AgentMessage, ClientRole, ControlCommand, LAND_COMMAND};
use crate::domain::events::FleetEvent;
use crate::domain::node_config::FabricConfig;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::net::{bind_tcp, read_line_with_timeout, BindPolicy, LineRead, NetError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Write side of a pooled connection.
#[async_trait]
pub trait CommandSink: Send + Sync + 'static {
    async fn send_line(&mut self, line: &str) -> io::Result<()>;
    async fn close(&mut self);
}

#[async_trait]
impl CommandSink for OwnedWriteHalf {
    async fn send_line(&mut self, line: &str) -> io::Result<()> {
        let mut framed = String::with_capacity(line.len() + 1);
        framed.push_str(line);
        framed.push('\n');
        self.write_all(framed.as_bytes()).await?;
        self.flush().await
    }

    async fn close(&mut self) {
        let _ = self.shutdown().await;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolSizes {
    pub control: usize,
    pub agent: usize,
}

struct PoolEntry<S> {
    sink: S,
    /// Cancelled when the fabric drops the member, stopping its reader.
    closed: CancellationToken,
}

/// Live connections of one role. Membership is the only record of liveness.
pub struct ConnectionPool<S> {
    role: ClientRole,
    members: tokio::sync::Mutex<HashMap<ConnectionId, PoolEntry<S>>>,
}

impl<S: CommandSink> ConnectionPool<S> {
    pub fn new(role: ClientRole) -> Self {
        Self {
            role,
            members: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn role(&self) -> ClientRole {
        self.role
    }

    /// Add a member. The returned token fires if the pool drops it.
    pub async fn insert(&self, id: ConnectionId, sink: S) -> CancellationToken {
        let closed = CancellationToken::new();
        self.members.lock().await.insert(
            id,
            PoolEntry {
                sink,
                closed: closed.clone(),
            },
        );
        closed
    }

    /// Remove and close a member. Returns whether it was still pooled.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let entry = self.members.lock().await.remove(&id);
        match entry {
            Some(mut entry) => {
                entry.closed.cancel();
                entry.sink.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.members.lock().await.contains_key(&id)
    }

    /// Send `line` to every member; members whose send fails are pruned.
    pub async fn broadcast(&self, line: &str, send_timeout: Duration) -> BroadcastReport {
        let mut members = self.members.lock().await;
        let mut failed = Vec::new();
        let mut delivered = 0;

        for (id, entry) in members.iter_mut() {
            match tokio::time::timeout(send_timeout, entry.sink.send_line(line)).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    debug!(connection_id = %id, role = %self.role, error = %e, "Send failed");
                    failed.push(*id);
                }
                Err(_) => {
                    debug!(connection_id = %id, role = %self.role, "Send timed out");
                    failed.push(*id);
                }
            }
        }

        for id in &failed {
            if let Some(mut entry) = members.remove(id) {
                entry.closed.cancel();
                entry.sink.close().await;
                info!(connection_id = %id, role = %self.role, "Pruned dead connection");
            }
        }

        if !failed.is_empty() {
            metrics::counter!("overwatch_connections_pruned_total").increment(failed.len() as u64);
        }

        BroadcastReport {
            delivered,
            pruned: failed.len(),
        }
    }

    /// Close and drop every member.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.members.lock().await.drain().collect();
        for (_, mut entry) in drained {
            entry.closed.cancel();
            entry.sink.close().await;
        }
    }
}

#[derive(Debug, Error)]
pub enum FabricError {
    #[error(transparent)]
    Bind(#[from] NetError),

    #[error("command fabric is already running")]
    AlreadyRunning,

    #[error("command fabric has been stopped")]
    Stopped,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub struct CommandFabric {
    config: FabricConfig,
    agents: ConnectionPool<OwnedWriteHalf>,
    controls: ConnectionPool<OwnedWriteHalf>,
    event_bus: Option<EventBus>,
    shutdown: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    server_handle: Mutex<Option<AbortHandle>>,
}

impl CommandFabric {
    pub fn new(config: FabricConfig) -> Self {
        Self {
            config,
            agents: ConnectionPool::new(ClientRole::Agent),
            controls: ConnectionPool::new(ClientRole::Control),
            event_bus: None,
            shutdown: CancellationToken::new(),
            local_addr: Mutex::new(None),
            server_handle: Mutex::new(None),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Tie the fabric's lifetime to a process-wide token.
    pub fn with_shutdown(mut self, parent: &CancellationToken) -> Self {
        self.shutdown = parent.child_token();
        self
    }

    /// Bind and start accepting connections. Returns the bound address.
    ///
    /// A stopped fabric cannot be restarted; build a new one.
    pub async fn start(self: &Arc<Self>, addr: SocketAddr, policy: BindPolicy) -> Result<SocketAddr, FabricError> {
        if self.shutdown.is_cancelled() {
            return Err(FabricError::Stopped);
        }
        if self.is_running() {
            return Err(FabricError::AlreadyRunning);
        }

        let listener = bind_tcp(addr, policy).await?;
        let bound = listener.local_addr()?;
        *self.local_addr.lock() = Some(bound);
        info!(addr = %bound, "Command fabric listening");

        let fabric = Arc::clone(self);
        let handle = tokio::spawn(async move {
            fabric.accept_loop(listener).await;
        });
        *self.server_handle.lock() = Some(handle.abort_handle());

        Ok(bound)
    }

    /// Stop accepting, close every pooled connection and signal handlers.
    pub async fn stop(&self) {
        info!("Stopping command fabric");
        self.shutdown.cancel();
        if let Some(handle) = self.server_handle.lock().take() {
            handle.abort();
        }
        self.agents.close_all().await;
        self.controls.close_all().await;
    }

    pub fn is_running(&self) -> bool {
        self.server_handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub async fn pool_sizes(&self) -> PoolSizes {
        PoolSizes {
            control: self.controls.len().await,
            agent: self.agents.len().await,
        }
    }

    /// Send `command` to every agent connection.
    pub async fn broadcast(&self, command: &str) -> BroadcastReport {
        let timeout = Duration::from_millis(self.config.send_timeout_ms);
        let report = self.agents.broadcast(command, timeout).await;

        info!(
            command,
            delivered = report.delivered,
            pruned = report.pruned,
            "Broadcast to agents"
        );

        if command == LAND_COMMAND {
            metrics::counter!("overwatch_land_broadcasts_total").increment(1);
            self.publish(FleetEvent::LandBroadcast {
                delivered: report.delivered,
                pruned: report.pruned,
                broadcast_at: Utc::now(),
            });
        }

        report
    }

    fn pool(&self, role: ClientRole) -> &ConnectionPool<OwnedWriteHalf> {
        match role {
            ClientRole::Agent => &self.agents,
            ClientRole::Control => &self.controls,
        }
    }

    fn publish(&self, event: FleetEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let fabric = Arc::clone(&self);
                        tokio::spawn(async move {
                            fabric.handle_connection(stream, peer).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
            }
        }
        debug!("Command fabric accept loop stopped");
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut buf = Vec::new();

        let handshake = Duration::from_millis(self.config.handshake_timeout_ms);
        let token = match read_line_with_timeout(&mut reader, &mut buf, handshake).await {
            Ok(LineRead::Line(token)) => token,
            Ok(LineRead::Idle) => {
                warn!(%peer, "No classification token before timeout, closing");
                return;
            }
            Ok(LineRead::Closed) => {
                debug!(%peer, "Connection closed before handshake");
                return;
            }
            Err(e) => {
                debug!(%peer, error = %e, "Handshake read failed");
                return;
            }
        };

        let role = ClientRole::classify(&token);
        let id = ConnectionId::new();
        let closed = self.pool(role).insert(id, write_half).await;
        info!(%peer, connection_id = %id, %role, "Connection classified");
        self.publish(FleetEvent::ConnectionClassified {
            connection_id: id.to_string(),
            role,
            peer: peer.to_string(),
            classified_at: Utc::now(),
        });

        let receive_timeout = Duration::from_millis(self.config.receive_timeout_ms);
        loop {
            if self.shutdown.is_cancelled() || closed.is_cancelled() {
                break;
            }

            match read_line_with_timeout(&mut reader, &mut buf, receive_timeout).await {
                Ok(LineRead::Idle) => continue,
                Ok(LineRead::Closed) => {
                    debug!(connection_id = %id, %role, "Peer closed connection");
                    break;
                }
                Err(e) => {
                    debug!(connection_id = %id, %role, error = %e, "Read failed");
                    break;
                }
                Ok(LineRead::Line(line)) if line.trim().is_empty() => continue,
                Ok(LineRead::Line(line)) => match role {
                    ClientRole::Control => self.handle_control_line(id, &line).await,
                    ClientRole::Agent => self.handle_agent_line(id, &line),
                },
            }
        }

        if self.pool(role).remove(id).await {
            info!(connection_id = %id, %role, "Connection removed");
        }
    }

    async fn handle_control_line(&self, id: ConnectionId, line: &str) {
        match parse_control(line, &self.config.land_phrases) {
            ControlCommand::Land => {
                info!(connection_id = %id, "Land trigger received from control client");
                self.broadcast(LAND_COMMAND).await;
            }
            ControlCommand::Unrecognized(text) => {
                debug!(connection_id = %id, message = %text, "Unrecognized control message");
            }
        }
    }

    fn handle_agent_line(&self, id: ConnectionId, line: &str) {
        match AgentMessage::parse(line) {
            AgentMessage::HumanDetected(detail) => {
                warn!(connection_id = %id, %detail, "SECURITY ALARM: human detected by agent");
                metrics::counter!("overwatch_security_alerts_total").increment(1);
                self.publish(FleetEvent::SecurityAlert {
                    connection_id: id.to_string(),
                    detail,
                    raised_at: Utc::now(),
                });
            }
            AgentMessage::Other(text) => {
                debug!(connection_id = %id, message = %text, "Agent message");
            }
        }
    }
}
