// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sends detections to a fan-in ingress as JSON datagrams.
//! Send failures are logged and swallowed.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{trace, warn};

use crate::domain::detection::DetectionMessage;

pub struct DetectionPublisher {
    socket: UdpSocket,
    target: SocketAddr,
}

impl DetectionPublisher {
    /// Bind an ephemeral local socket that sends to `target`.
    pub async fn connect(target: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub async fn publish_message(&self, message: &DetectionMessage) -> bool {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Could not serialize detection");
                return false;
            }
        };

        match self.socket.send_to(&payload, self.target).await {
            Ok(_) => {
                trace!(target = %self.target, bytes = payload.len(), "Detection published");
                true
            }
            Err(e) => {
                warn!(target = %self.target, error = %e, "Detection send failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection::{ConfirmedDetection, DetectionReport, DetectionSource, Position2};

    #[tokio::test]
    async fn test_published_detection_parses_at_ingress() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let publisher = DetectionPublisher::connect(receiver.local_addr().unwrap())
            .await
            .unwrap();

        let confirmed = ConfirmedDetection {
            producer_id: 2,
            track_id: 7,
            position: Position2::new(0.52, 0.51),
            confidence: 0.9,
            tracking_duration: 0.4,
        };
        let sent = publisher
            .publish_message(&DetectionMessage::from_confirmed(&confirmed))
            .await;
        assert!(sent);

        let mut buf = [0u8; 1024];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        let report = DetectionReport::from_json(&buf[..len]).unwrap();
        assert_eq!(report.source, DetectionSource::Camera(2));
        assert_eq!(report.track_id, Some(7));
        assert!(!report.is_person());
    }
}
