// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! UDP detection fan-in.
//!
//! One ingress per producer class. Each datagram is one JSON detection; it is
//! validated into a [`DetectionReport`] and handed to the [`DetectionSink`]
//! before the next datagram is read, so delivery follows arrival order.
//! Invalid datagrams are logged and dropped.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::DetectionSink;
use crate::domain::clock::MonotonicClock;
use crate::domain::detection::{DetectionReport, ProducerKind, ReportError};
use crate::infrastructure::net::{bind_udp, BindPolicy, NetError};

const MAX_DATAGRAM: usize = 65_536;

pub struct DetectionIngress {
    kind: ProducerKind,
    socket: UdpSocket,
    sink: Arc<dyn DetectionSink>,
    clock: MonotonicClock,
    receive_timeout: Duration,
    shutdown: CancellationToken,
}

impl DetectionIngress {
    pub async fn bind(
        kind: ProducerKind,
        addr: SocketAddr,
        policy: BindPolicy,
        sink: Arc<dyn DetectionSink>,
        clock: MonotonicClock,
    ) -> Result<Self, NetError> {
        let socket = bind_udp(addr, policy).await?;
        Ok(Self {
            kind,
            socket,
            sink,
            clock,
            receive_timeout: Duration::from_secs(1),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_shutdown(mut self, parent: &CancellationToken) -> Self {
        self.shutdown = parent.child_token();
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn kind(&self) -> ProducerKind {
        self.kind
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        if let Ok(addr) = self.local_addr() {
            info!(kind = %self.kind, %addr, "Detection ingress listening");
        }

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let received = match tokio::time::timeout(self.receive_timeout, self.socket.recv_from(&mut buf)).await {
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!(kind = %self.kind, error = %e, "Receive failed");
                    continue;
                }
                Ok(Ok(received)) => received,
            };

            let (len, peer) = received;
            match self.handle_datagram(&buf[..len]) {
                Ok(retargeted) => {
                    debug!(kind = %self.kind, %peer, retargeted, "Detection delivered");
                }
                Err(e) => {
                    metrics::counter!("overwatch_reports_dropped_total").increment(1);
                    warn!(kind = %self.kind, %peer, error = %e, "Dropping detection");
                }
            }
        }

        info!(kind = %self.kind, "Detection ingress stopped");
    }

    /// Validate one datagram and deliver it. Returns how many units retargeted.
    pub fn handle_datagram(&self, bytes: &[u8]) -> Result<usize, ReportError> {
        let report = DetectionReport::from_json(bytes)?;

        let found = report.source.kind();
        if found != self.kind {
            return Err(ReportError::ChannelMismatch {
                expected: self.kind,
                found,
            });
        }

        Ok(self.sink.deliver(&report, self.clock.now()))
    }
}
