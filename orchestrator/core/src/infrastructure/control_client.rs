// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Administrative client of the command fabric.

use std::io;
use std::time::Duration;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::info;

use crate::domain::command::CONTROL_TOKEN;
use crate::infrastructure::command_fabric::CommandSink;

pub struct ControlClient {
    writer: OwnedWriteHalf,
}

impl ControlClient {
    /// Connect and identify as a control client.
    pub async fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> io::Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        let (_, mut writer) = stream.into_split();
        writer.send_line(CONTROL_TOKEN).await?;
        Ok(Self { writer })
    }

    pub async fn send(&mut self, message: &str) -> io::Result<()> {
        self.writer.send_line(message).await
    }

    /// Send the land trigger phrase and close the connection.
    pub async fn request_landing(mut self, phrase: &str) -> io::Result<()> {
        self.send(phrase).await?;
        info!(phrase, "Land trigger sent");
        self.writer.close().await;
        Ok(())
    }
}
