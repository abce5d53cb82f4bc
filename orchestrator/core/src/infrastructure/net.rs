// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Socket helpers shared by the fabric, the ingresses and the security link.
//!
//! - Bounded bind retries: an address in use is retried a fixed number of
//!   times with a fixed delay, then reported as [`NetError::BindExhausted`].
//! - Timeout-bounded line reads so every loop can observe its
//!   cancellation token at least once per receive timeout.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::{TcpListener, ToSocketAddrs, UdpSocket};
use tracing::warn;

use crate::domain::node_config::NetworkConfig;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to bind {addr} after {attempts} attempts: {source}")]
    BindExhausted {
        addr: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("invalid address '{0}'")]
    InvalidAddress(String),
}

/// How hard to try before giving up on a bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl BindPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Single attempt, for tests and ephemeral ports.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn from_config(network: &NetworkConfig) -> Self {
        Self::new(
            network.bind_retries,
            Duration::from_millis(network.bind_retry_delay_ms),
        )
    }
}

impl Default for BindPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

async fn bind_with_retry<T, F, Fut>(label: &str, policy: BindPolicy, mut bind: F) -> Result<T, NetError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = io::Result<T>>,
{
    let mut attempt = 1;
    loop {
        match bind().await {
            Ok(bound) => return Ok(bound),
            Err(e) if attempt >= policy.attempts => {
                return Err(NetError::BindExhausted {
                    addr: label.to_string(),
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                warn!(
                    addr = label,
                    attempt,
                    max_attempts = policy.attempts,
                    error = %e,
                    "Bind failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

pub async fn bind_tcp<A>(addr: A, policy: BindPolicy) -> Result<TcpListener, NetError>
where
    A: ToSocketAddrs + std::fmt::Display + Clone,
{
    let label = addr.to_string();
    bind_with_retry(&label, policy, || TcpListener::bind(addr.clone())).await
}

pub async fn bind_udp<A>(addr: A, policy: BindPolicy) -> Result<UdpSocket, NetError>
where
    A: ToSocketAddrs + std::fmt::Display + Clone,
{
    let label = addr.to_string();
    bind_with_retry(&label, policy, || UdpSocket::bind(addr.clone())).await
}

/// `host:port` from a bind address and port, rejecting unparsable results.
pub fn socket_addr(host: &str, port: u16) -> Result<SocketAddr, NetError> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|_| NetError::InvalidAddress(candidate))
}

/// Outcome of one timeout-bounded line read.
#[derive(Debug, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, without its terminator.
    Line(String),
    /// Nothing arrived within the timeout; partial data stays buffered.
    Idle,
    /// Peer closed the stream.
    Closed,
}

/// Read one `\n`-terminated line within `timeout`.
///
/// `buf` persists across calls: `read_until` is cancel-safe, so bytes read
/// before a timeout are kept and completed on the next call.
pub async fn read_line_with_timeout<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    timeout: Duration,
) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    match tokio::time::timeout(timeout, reader.read_until(b'\n', buf)).await {
        Err(_) => Ok(LineRead::Idle),
        Ok(Err(e)) => Err(e),
        Ok(Ok(0)) if buf.is_empty() => Ok(LineRead::Closed),
        Ok(Ok(_)) => {
            let line = String::from_utf8_lossy(buf)
                .trim_end_matches(['\r', '\n'])
                .to_string();
            buf.clear();
            Ok(LineRead::Line(line))
        }
    }
}
