// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Raw-frame ingress for fixed cameras and agent onboard cameras.
//!
//! One UDP socket per producer at `base_port + producer_id`, with a separate
//! base port per producer class. Each datagram is a whole frame behind a
//! 4-byte little-endian producer prefix. Frames go through the
//! [`CameraPipeline`]:
//!
//! - camera frames are confirmed first; confirmed detections are published to
//!   the camera fan-in and announced on the event bus.
//! - agent frames publish every person sighting to the agent fan-in as a
//!   `human` report.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::CameraPipeline;
use crate::domain::clock::MonotonicClock;
use crate::domain::detection::{DetectionMessage, ProducerId, ProducerKind};
use crate::domain::events::FleetEvent;
use crate::domain::frame::{split_frame_for, FrameError};
use crate::domain::node_config::NetworkConfig;
use crate::infrastructure::detection_publisher::DetectionPublisher;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::net::{bind_udp, socket_addr, BindPolicy, NetError};

const MAX_DATAGRAM: usize = 65_536;

/// Port a producer's frames arrive on.
pub fn frame_port(base_port: u16, producer_id: ProducerId) -> Option<u16> {
    u16::try_from(producer_id)
        .ok()
        .and_then(|offset| base_port.checked_add(offset))
}

/// Configured frame address for one producer.
pub fn frame_addr(network: &NetworkConfig, kind: ProducerKind, producer_id: ProducerId) -> Result<SocketAddr, NetError> {
    let base_port = match kind {
        ProducerKind::Camera => network.frame_base_port,
        ProducerKind::Agent => network.agent_frame_base_port,
    };
    let port = frame_port(base_port, producer_id).ok_or_else(|| {
        NetError::InvalidAddress(format!("{}:{base_port}+{producer_id}", network.bind_address))
    })?;
    socket_addr(&network.bind_address, port)
}

pub struct FrameIngress {
    kind: ProducerKind,
    producer_id: ProducerId,
    socket: UdpSocket,
    pipeline: Arc<CameraPipeline>,
    publisher: Option<Arc<DetectionPublisher>>,
    event_bus: Option<EventBus>,
    clock: MonotonicClock,
    receive_timeout: Duration,
    shutdown: CancellationToken,
}

impl FrameIngress {
    pub async fn bind(
        kind: ProducerKind,
        producer_id: ProducerId,
        addr: SocketAddr,
        policy: BindPolicy,
        pipeline: Arc<CameraPipeline>,
        clock: MonotonicClock,
    ) -> Result<Self, NetError> {
        let socket = bind_udp(addr, policy).await?;
        Ok(Self {
            kind,
            producer_id,
            socket,
            pipeline,
            publisher: None,
            event_bus: None,
            clock,
            receive_timeout: Duration::from_secs(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// Bind on the producer's configured frame port.
    pub async fn bind_configured(
        kind: ProducerKind,
        producer_id: ProducerId,
        network: &NetworkConfig,
        pipeline: Arc<CameraPipeline>,
        clock: MonotonicClock,
    ) -> Result<Self, NetError> {
        let addr = frame_addr(network, kind, producer_id)?;
        Self::bind(kind, producer_id, addr, BindPolicy::from_config(network), pipeline, clock).await
    }

    pub fn with_publisher(mut self, publisher: Arc<DetectionPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
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
        info!(kind = %self.kind, producer_id = self.producer_id, "Frame ingress listening");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let len = match tokio::time::timeout(self.receive_timeout, self.socket.recv_from(&mut buf)).await {
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!(producer_id = self.producer_id, error = %e, "Frame receive failed");
                    continue;
                }
                Ok(Ok((len, _))) => len,
            };

            match self.handle_datagram(&buf[..len]).await {
                Ok(published) if !published.is_empty() => {
                    debug!(producer_id = self.producer_id, count = published.len(), "Detections published");
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(producer_id = self.producer_id, error = %e, "Dropping frame");
                }
            }
        }

        info!(producer_id = self.producer_id, "Frame ingress stopped");
    }

    /// Process one frame datagram and return the detection messages it produced.
    pub async fn handle_datagram(&self, datagram: &[u8]) -> Result<Vec<DetectionMessage>, FrameError> {
        let frame = split_frame_for(self.producer_id, datagram)?;
        let now = self.clock.now();

        let messages: Vec<DetectionMessage> = match self.kind {
            ProducerKind::Camera => {
                let confirmed = self.pipeline.process_frame(self.producer_id, frame, now);
                if let Some(bus) = &self.event_bus {
                    for detection in &confirmed {
                        bus.publish(FleetEvent::detection_confirmed(detection));
                    }
                }
                confirmed.iter().map(DetectionMessage::from_confirmed).collect()
            }
            ProducerKind::Agent => self
                .pipeline
                .onboard_sightings(self.producer_id, frame, now)
                .into_iter()
                .map(|sighting| {
                    info!(agent = self.producer_id, confidence = sighting.confidence, "Human sighted onboard");
                    DetectionMessage::human_sighting(self.producer_id, sighting.position, sighting.confidence, now)
                })
                .collect(),
        };

        if let Some(publisher) = &self.publisher {
            for message in &messages {
                publisher.publish_message(message).await;
            }
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_port() {
        assert_eq!(frame_port(5124, 3), Some(5127));
        assert_eq!(frame_port(5124, -1), None);
        assert_eq!(frame_port(u16::MAX, 1), None);
    }

    #[test]
    fn test_frame_addr_uses_base_per_kind() {
        let network = NetworkConfig::default();
        assert_eq!(frame_addr(&network, ProducerKind::Camera, 2).unwrap().port(), 5126);
        assert_eq!(frame_addr(&network, ProducerKind::Agent, 2).unwrap().port(), 5125);
        assert!(frame_addr(&network, ProducerKind::Agent, -1).is_err());
    }
}
