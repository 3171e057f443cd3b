// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SCP request encoding and response decoding.
//!
//! An SCP frame follows the SDP header: command (u16), sequence (u16), three
//! u32 arguments, then up to 256 payload bytes. Responses replace the command
//! with a result code and omit the arguments; their payload starts right
//! after the sequence.

use crate::config::UDP_MESSAGE_MAX_SIZE;
use crate::error::{Error, Result};
use crate::protocol::constants::{ScpCommand, ScpResult};
use crate::protocol::sdp::{SdpHeader, SDP_HEADER_BYTES, SDP_PAD_BYTES};
use crate::protocol::CoreAddr;

/// Offset of the SCP command/result word within a frame (pad included).
const SCP_RESULT_OFFSET: usize = SDP_PAD_BYTES + SDP_HEADER_BYTES;

/// Offset of the sequence word.
const SCP_SEQUENCE_OFFSET: usize = SCP_RESULT_OFFSET + 2;

/// Offset of a response payload.
const SCP_RESPONSE_PAYLOAD_OFFSET: usize = SCP_SEQUENCE_OFFSET + 2;

/// Encoded size of a request with an empty payload.
pub const SCP_REQUEST_HEADER_BYTES: usize = SCP_RESPONSE_PAYLOAD_OFFSET + 12;

/// One SCP request, ready for the pipeline to stamp with a sequence number.
#[derive(Debug, Clone)]
pub struct ScpRequest {
    /// SDP addressing for the request.
    pub sdp: SdpHeader,
    /// Command to execute.
    pub command: ScpCommand,
    /// First argument.
    pub arg1: u32,
    /// Second argument.
    pub arg2: u32,
    /// Third argument.
    pub arg3: u32,
    /// Payload, at most 256 bytes.
    pub payload: Vec<u8>,
}

impl ScpRequest {
    /// Destination core, for diagnostics.
    #[must_use]
    pub fn destination(&self) -> CoreAddr {
        CoreAddr::new(
            self.sdp.destination_chip.x,
            self.sdp.destination_chip.y,
            self.sdp.destination_cpu,
        )
    }

    /// Validate field bounds that the constructors cannot enforce by type.
    pub fn validate(&self) -> Result<()> {
        self.sdp.validate()?;
        if self.payload.len() > UDP_MESSAGE_MAX_SIZE {
            return Err(Error::InvalidParameter {
                field: "payload",
                value: self.payload.len().to_string(),
                reason: "SCP payloads carry at most 256 bytes",
            });
        }
        Ok(())
    }

    /// Encode the full frame (pad bytes included) with `sequence` stamped in.
    #[must_use]
    pub fn encode(&self, sequence: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SCP_REQUEST_HEADER_BYTES + self.payload.len());
        buf.extend_from_slice(&[0u8; SDP_PAD_BYTES]);
        self.sdp.write_into(&mut buf);
        buf.extend_from_slice(&self.command.value().to_le_bytes());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&self.arg1.to_le_bytes());
        buf.extend_from_slice(&self.arg2.to_le_bytes());
        buf.extend_from_slice(&self.arg3.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// A decoded SCP response owning its datagram.
///
/// The payload is exposed as a borrowed view into the datagram; nothing is
/// copied out of the receive buffer.
#[derive(Debug)]
pub struct ScpResponse {
    result: ScpResult,
    sequence: u16,
    data: Vec<u8>,
}

impl ScpResponse {
    /// Read the result code and sequence without taking ownership.
    ///
    /// Used by the pipeline to match a datagram to a pending request before
    /// deciding whether the frame is worth keeping.
    pub fn peek(data: &[u8]) -> Result<(ScpResult, u16)> {
        if data.len() < SCP_RESPONSE_PAYLOAD_OFFSET {
            return Err(Error::MalformedPacket(format!(
                "SCP response needs at least {} bytes, got {}",
                SCP_RESPONSE_PAYLOAD_OFFSET,
                data.len()
            )));
        }
        let result = ScpResult::from_u16(u16::from_le_bytes([
            data[SCP_RESULT_OFFSET],
            data[SCP_RESULT_OFFSET + 1],
        ]));
        let sequence = u16::from_le_bytes([
            data[SCP_SEQUENCE_OFFSET],
            data[SCP_SEQUENCE_OFFSET + 1],
        ]);
        Ok((result, sequence))
    }

    /// Take ownership of a received datagram as a response.
    pub fn from_datagram(data: Vec<u8>) -> Result<Self> {
        let (result, sequence) = Self::peek(&data)?;
        Ok(ScpResponse {
            result,
            sequence,
            data,
        })
    }

    /// Result code of the response.
    #[must_use]
    pub fn result(&self) -> ScpResult {
        self.result
    }

    /// Sequence number echoed by the monitor.
    #[must_use]
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// SDP header of the response.
    pub fn sdp_header(&self) -> Result<SdpHeader> {
        SdpHeader::read_from(&self.data[SDP_PAD_BYTES..])
    }

    /// Payload view, starting right after the sequence word.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[SCP_RESPONSE_PAYLOAD_OFFSET..]
    }

    /// Read a little-endian u32 at `offset` within the payload.
    pub fn payload_u32(&self, offset: usize) -> Result<u32> {
        let payload = self.payload();
        let end = offset.checked_add(4).ok_or_else(|| {
            Error::MalformedPacket("payload offset overflow".to_string())
        })?;
        if payload.len() < end {
            return Err(Error::MalformedPacket(format!(
                "payload has {} bytes, wanted a word at {}",
                payload.len(),
                offset
            )));
        }
        Ok(u32::from_le_bytes([
            payload[offset],
            payload[offset + 1],
            payload[offset + 2],
            payload[offset + 3],
        ]))
    }
}
