// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-agent resilient client of the command fabric.
//!
//! The client keeps one TCP session open, identifying itself with
//! `DRONE_AGENT`. Alerts go upstream through a small bounded queue and are
//! dropped (never buffered across sessions) when the link is down or the
//! queue is full. A `LAND` line from the fabric raises the agent's
//! [`LandingSignal`].
//!
//! Session end handling:
//!
//! | Cause | Next attempt |
//! |-------|--------------|
//! | write failure / forced reset | immediately |
//! | read failure, EOF, connect failure | after `reconnect_delay` |
//! | shutdown token | never |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::command::{BroadcastCommand, AGENT_TOKEN};
use crate::domain::decision::{AlertSink, LandingSignal};
use crate::domain::node_config::SecurityLinkConfig;
use crate::infrastructure::command_fabric::CommandSink;
use crate::infrastructure::net::{read_line_with_timeout, LineRead};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Reconnect right away.
    Reset,
    /// Reconnect after the fixed delay.
    Lost,
    Shutdown,
}

pub struct SecurityLinkClient {
    agent_index: usize,
    fabric_address: String,
    reconnect_delay: Duration,
    receive_timeout: Duration,
    landing: LandingSignal,
    alerts_tx: mpsc::Sender<String>,
    alerts_rx: Mutex<Option<mpsc::Receiver<String>>>,
    reset: Notify,
    connected: AtomicBool,
    shutdown: CancellationToken,
    task: Mutex<Option<AbortHandle>>,
}

impl SecurityLinkClient {
    pub fn new(agent_index: usize, config: &SecurityLinkConfig, landing: LandingSignal) -> Self {
        let (alerts_tx, alerts_rx) = mpsc::channel(config.alert_queue.max(1));
        Self {
            agent_index,
            fabric_address: config.fabric_address.clone(),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            receive_timeout: Duration::from_millis(config.receive_timeout_ms),
            landing,
            alerts_tx,
            alerts_rx: Mutex::new(Some(alerts_rx)),
            reset: Notify::new(),
            connected: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Tie the link's lifetime to a process-wide token.
    pub fn with_shutdown(mut self, parent: &CancellationToken) -> Self {
        self.shutdown = parent.child_token();
        self
    }

    pub fn agent_index(&self) -> usize {
        self.agent_index
    }

    pub fn landing_signal(&self) -> LandingSignal {
        self.landing.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Run the link on a background task.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let link = Arc::clone(self);
        let handle = tokio::spawn(link.run());
        *self.task.lock() = Some(handle.abort_handle());
        handle
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Connect, serve, reconnect until shutdown.
    pub async fn run(self: Arc<Self>) {
        let receiver = self.alerts_rx.lock().take();
        let Some(mut alerts) = receiver else {
            warn!(agent = self.agent_index, "Security link already running");
            return;
        };

        info!(agent = self.agent_index, fabric = %self.fabric_address, "Security link starting");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let end = tokio::select! {
                _ = self.shutdown.cancelled() => SessionEnd::Shutdown,
                connected = TcpStream::connect(self.fabric_address.as_str()) => match connected {
                    Ok(stream) => self.session(stream, &mut alerts).await,
                    Err(e) => {
                        warn!(agent = self.agent_index, error = %e, "Could not reach command fabric");
                        SessionEnd::Lost
                    }
                },
            };
            self.connected.store(false, Ordering::SeqCst);

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Reset => continue,
                SessionEnd::Lost => {
                    debug!(
                        agent = self.agent_index,
                        delay_ms = self.reconnect_delay.as_millis() as u64,
                        "Reconnecting after delay"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                }
            }
        }

        info!(agent = self.agent_index, "Security link stopped");
    }

    async fn session(&self, stream: TcpStream, alerts: &mut mpsc::Receiver<String>) -> SessionEnd {
        let (read_half, mut write_half) = stream.into_split();

        if let Err(e) = write_half.send_line(AGENT_TOKEN).await {
            warn!(agent = self.agent_index, error = %e, "Handshake failed");
            return SessionEnd::Lost;
        }

        // Alerts raised while disconnected are not replayed.
        while alerts.try_recv().is_ok() {}

        self.connected.store(true, Ordering::SeqCst);
        info!(agent = self.agent_index, "Connected to command fabric");

        let mut reader = BufReader::new(read_half);
        let mut buf = Vec::new();

        loop {
            if self.shutdown.is_cancelled() {
                write_half.close().await;
                return SessionEnd::Shutdown;
            }

            tokio::select! {
                read = read_line_with_timeout(&mut reader, &mut buf, self.receive_timeout) => match read {
                    Ok(LineRead::Idle) => {}
                    Ok(LineRead::Line(line)) => self.handle_command(&line),
                    Ok(LineRead::Closed) => {
                        warn!(agent = self.agent_index, "Command fabric closed the connection");
                        return SessionEnd::Lost;
                    }
                    Err(e) => {
                        warn!(agent = self.agent_index, error = %e, "Receive failed");
                        return SessionEnd::Lost;
                    }
                },
                Some(alert) = alerts.recv() => {
                    if let Err(e) = write_half.send_line(&alert).await {
                        warn!(agent = self.agent_index, error = %e, "Alert send failed, reconnecting");
                        return SessionEnd::Reset;
                    }
                    debug!(agent = self.agent_index, %alert, "Alert sent");
                }
                _ = self.reset.notified() => {
                    info!(agent = self.agent_index, "Resetting security link");
                    write_half.close().await;
                    return SessionEnd::Reset;
                }
                _ = self.shutdown.cancelled() => {
                    write_half.close().await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    fn handle_command(&self, line: &str) {
        match BroadcastCommand::parse(line) {
            BroadcastCommand::Land => {
                info!(agent = self.agent_index, "LAND received from command fabric");
                self.landing.command();
            }
            BroadcastCommand::Unknown(text) if text.is_empty() => {}
            BroadcastCommand::Unknown(text) => {
                debug!(agent = self.agent_index, command = %text, "Ignoring unknown command");
            }
        }
    }
}

impl AlertSink for SecurityLinkClient {
    fn forward_alert(&self, message: &str) {
        if !self.is_connected() {
            debug!(agent = self.agent_index, "Security link down, alert dropped");
            return;
        }

        if let Err(e) = self.alerts_tx.try_send(message.to_string()) {
            warn!(agent = self.agent_index, error = %e, "Alert dropped, resetting security link");
            // Stores a permit if the session is mid-write and not polling `notified()`.
            self.reset.notify_one();
        }
    }
}
