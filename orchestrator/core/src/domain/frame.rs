// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Raw-frame datagram framing: `[i32 little-endian producer id][frame bytes]`.

use thiserror::Error;

use crate::domain::detection::ProducerId;

pub const PREFIX_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("datagram of {0} bytes is shorter than the producer prefix")]
    TooShort(usize),

    #[error("frame for producer {found} arrived on the socket for producer {expected}")]
    WrongProducer { expected: ProducerId, found: ProducerId },
}

/// Split a datagram into its producer id and frame payload.
pub fn split_frame(datagram: &[u8]) -> Result<(ProducerId, &[u8]), FrameError> {
    let Some((prefix, payload)) = datagram.split_first_chunk::<PREFIX_LEN>() else {
        return Err(FrameError::TooShort(datagram.len()));
    };
    Ok((i32::from_le_bytes(*prefix) as ProducerId, payload))
}

/// Split and check that the prefix names the expected producer.
pub fn split_frame_for(expected: ProducerId, datagram: &[u8]) -> Result<&[u8], FrameError> {
    let (found, payload) = split_frame(datagram)?;
    if found != expected {
        return Err(FrameError::WrongProducer { expected, found });
    }
    Ok(payload)
}

pub fn encode_frame(producer_id: i32, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(PREFIX_LEN + payload.len());
    datagram.extend_from_slice(&producer_id.to_le_bytes());
    datagram.extend_from_slice(payload);
    datagram
}
