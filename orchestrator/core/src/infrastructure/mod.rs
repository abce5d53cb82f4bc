// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod net;
pub mod event_bus;
pub mod command_fabric;
pub mod security_link;
pub mod control_client;
pub mod fan_in;
pub mod frame_ingress;
pub mod detection_publisher;

pub use command_fabric::{BroadcastReport, CommandFabric, FabricError, PoolSizes};
pub use event_bus::{EventBus, EventBusError};
pub use fan_in::DetectionIngress;
pub use net::{BindPolicy, NetError};
pub use security_link::SecurityLinkClient;
