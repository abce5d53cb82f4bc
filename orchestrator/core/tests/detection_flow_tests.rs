// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end frame flows: frame datagram → detector → (confirmation for
//! fixed cameras) → published detection → fan-in → sink.

use std::sync::Arc;
use std::time::Duration;

use overwatch_core::application::{CameraPipeline, DetectionSink, Detector, DetectorBox};
use overwatch_core::domain::clock::{MonotonicClock, Timestamp};
use overwatch_core::domain::confirmation::DetectionConfirmationEngine;
use overwatch_core::domain::detection::{
    DetectionClass, DetectionReport, DetectionSource, ProducerId, ProducerKind,
};
use overwatch_core::domain::events::FleetEvent;
use overwatch_core::domain::frame::{encode_frame, FrameError};
use overwatch_core::domain::node_config::{ConfirmationConfig, NetworkConfig};
use overwatch_core::infrastructure::detection_publisher::DetectionPublisher;
use overwatch_core::infrastructure::event_bus::EventBus;
use overwatch_core::infrastructure::fan_in::DetectionIngress;
use overwatch_core::infrastructure::frame_ingress::FrameIngress;
use overwatch_core::infrastructure::net::BindPolicy;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// Always sees one steady person in the middle of a 640x480 frame.
struct SteadyPersonDetector;

impl Detector for SteadyPersonDetector {
    fn detect(&self, _producer_id: ProducerId, frame: &[u8]) -> anyhow::Result<Vec<DetectorBox>> {
        if frame.is_empty() {
            anyhow::bail!("empty frame");
        }
        Ok(vec![DetectorBox {
            x1: 300.0,
            y1: 220.0,
            x2: 340.0,
            y2: 260.0,
            frame_width: 640,
            frame_height: 480,
            class: DetectionClass::Person,
            confidence: 0.92,
            track_id: Some(11),
        }])
    }
}

#[derive(Default)]
struct CollectingSink(Mutex<Vec<DetectionReport>>);

impl DetectionSink for CollectingSink {
    fn deliver(&self, report: &DetectionReport, _now: Timestamp) -> usize {
        self.0.lock().push(report.clone());
        0
    }
}

fn pipeline() -> Arc<CameraPipeline> {
    let config = ConfirmationConfig {
        min_detection_time: 0.2,
        ..ConfirmationConfig::default()
    };
    Arc::new(CameraPipeline::new(
        Arc::new(SteadyPersonDetector),
        Arc::new(DetectionConfirmationEngine::new(config)),
    ))
}

#[tokio::test]
async fn test_steady_person_reaches_camera_fan_in() {
    let shutdown = CancellationToken::new();
    let clock = MonotonicClock::new();
    let event_bus = EventBus::new(64);
    let mut events = event_bus.subscribe();

    let sink = Arc::new(CollectingSink::default());
    let fan_in = DetectionIngress::bind(
        ProducerKind::Camera,
        "127.0.0.1:0".parse().unwrap(),
        BindPolicy::once(),
        sink.clone(),
        clock,
    )
    .await
    .unwrap()
    .with_shutdown(&shutdown)
    .with_receive_timeout(Duration::from_millis(50));
    let fan_in_addr = fan_in.local_addr().unwrap();
    let fan_in_task = fan_in.spawn();

    let publisher = Arc::new(DetectionPublisher::connect(fan_in_addr).await.unwrap());
    let frames = FrameIngress::bind(
        ProducerKind::Camera,
        2,
        "127.0.0.1:0".parse().unwrap(),
        BindPolicy::once(),
        pipeline(),
        clock,
    )
        .await
        .unwrap()
        .with_publisher(publisher)
        .with_event_bus(event_bus)
        .with_shutdown(&shutdown)
        .with_receive_timeout(Duration::from_millis(50));
    let frames_addr = frames.local_addr().unwrap();
    let frames_task = frames.spawn();

    let camera = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let frame = encode_frame(2, b"jpeg-bytes");

    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.0.lock().is_empty() {
            camera.send_to(&frame, frames_addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("no detection reached the fan-in");

    let report = sink.0.lock()[0].clone();
    assert_eq!(report.source, DetectionSource::Camera(2));
    assert_eq!(report.track_id, Some(11));
    assert!((report.position.x - 0.5).abs() < 1e-9);
    assert!((report.position.y - 0.5).abs() < 1e-9);

    let confirmed = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Ok(FleetEvent::DetectionConfirmed { producer_id, .. }) = events.recv().await {
                return producer_id;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(confirmed, 2);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), fan_in_task).await.unwrap().unwrap();
    tokio::time::timeout(Duration::from_secs(1), frames_task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_frames_for_another_camera_are_dropped() {
    let ingress = FrameIngress::bind(
        ProducerKind::Camera,
        1,
        "127.0.0.1:0".parse().unwrap(),
        BindPolicy::once(),
        pipeline(),
        MonotonicClock::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        ingress.handle_datagram(&encode_frame(3, b"frame")).await,
        Err(FrameError::WrongProducer { expected: 1, found: 3 })
    );
    assert_eq!(
        ingress.handle_datagram(&[1, 0]).await,
        Err(FrameError::TooShort(2))
    );
    // A first sighting never confirms.
    assert!(ingress.handle_datagram(&encode_frame(1, b"frame")).await.unwrap().is_empty());
    // Detector failures yield nothing.
    assert!(ingress.handle_datagram(&encode_frame(1, b"")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_onboard_sighting_reaches_agent_fan_in_unconfirmed() {
    let shutdown = CancellationToken::new();
    let clock = MonotonicClock::new();
    let event_bus = EventBus::new(64);
    let mut events = event_bus.subscribe();

    let sink = Arc::new(CollectingSink::default());
    let fan_in = DetectionIngress::bind(
        ProducerKind::Agent,
        "127.0.0.1:0".parse().unwrap(),
        BindPolicy::once(),
        sink.clone(),
        clock,
    )
    .await
    .unwrap()
    .with_shutdown(&shutdown)
    .with_receive_timeout(Duration::from_millis(50));
    let fan_in_addr = fan_in.local_addr().unwrap();
    let fan_in_task = fan_in.spawn();

    // Free a port to serve as the agent frame base; agent 0 listens right on it.
    let reserved = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let base_port = reserved.local_addr().unwrap().port();
    drop(reserved);
    let network = NetworkConfig {
        bind_address: "127.0.0.1".to_string(),
        agent_frame_base_port: base_port,
        bind_retries: 1,
        ..NetworkConfig::default()
    };

    let pipeline = pipeline();
    let publisher = Arc::new(DetectionPublisher::connect(fan_in_addr).await.unwrap());
    let frames = FrameIngress::bind_configured(ProducerKind::Agent, 0, &network, pipeline.clone(), clock)
        .await
        .unwrap()
        .with_publisher(publisher)
        .with_event_bus(event_bus)
        .with_shutdown(&shutdown)
        .with_receive_timeout(Duration::from_millis(50));
    let frames_addr = frames.local_addr().unwrap();
    assert_eq!(frames_addr.port(), base_port);
    let frames_task = frames.spawn();

    let agent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    agent.send_to(&encode_frame(0, b"jpeg-bytes"), frames_addr).await.unwrap();

    // The very first frame is reported; onboard sightings need no dwell.
    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.0.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no sighting reached the agent fan-in");

    let report = sink.0.lock()[0].clone();
    assert_eq!(report.source, DetectionSource::Agent(0));
    assert!(report.is_person());
    assert_eq!(report.track_id, None);
    assert!((report.confidence - 0.92).abs() < 1e-9);
    assert!(report.timestamp.is_some());
    assert_eq!(pipeline.engine().track_count(), 0);
    assert!(events.try_recv().is_err());

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), fan_in_task).await.unwrap().unwrap();
    tokio::time::timeout(Duration::from_secs(1), frames_task).await.unwrap().unwrap();
}
