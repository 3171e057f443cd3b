// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Software version records decoded from a Version response.

use crate::error::{Error, Result};
use crate::protocol::{CoreAddr, ScpResponse};

/// Version information reported by SCAMP or a BMP.
///
/// The Version payload is three words then an ASCII identifier:
/// word 0 packs `(p2p << 16) | (physical_cpu << 8) | virtual_cpu`, word 1
/// packs `(version_number << 16) | buffer_size` with the version scaled by
/// 100, word 2 is the build date; the identifier is `"name/hardware\0"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Software name, e.g. `SC&MP`.
    pub name: String,
    /// Hardware name, e.g. `SpiNNaker`.
    pub hardware: String,
    /// Major and minor version.
    pub version: (u8, u8),
    /// Core that answered.
    pub core: CoreAddr,
    /// Physical core behind the answering virtual core.
    pub physical_cpu: u8,
    /// Build date as a Unix timestamp, zero when unset.
    pub build_date: u32,
    /// SDP buffer size of the monitor.
    pub buffer_size: u16,
}

impl VersionInfo {
    /// Decode a Version response.
    pub fn decode(response: &ScpResponse) -> Result<Self> {
        let word0 = response.payload_u32(0)?;
        let word1 = response.payload_u32(4)?;
        let build_date = response.payload_u32(8)?;
        let identifier = &response.payload()[12..];

        let nul = identifier.iter().position(|&b| b == 0).unwrap_or(identifier.len());
        let identifier = std::str::from_utf8(&identifier[..nul])
            .map_err(|_| Error::MalformedPacket("version identifier not ASCII".to_string()))?;
        let (name, hardware) = match identifier.split_once('/') {
            Some((name, hardware)) => (name.to_string(), hardware.to_string()),
            None => (identifier.to_string(), String::new()),
        };

        let p2p = (word0 >> 16) as u16;
        let core = CoreAddr::new((p2p >> 8) as u8, (p2p & 0xFF) as u8, (word0 & 0xFF) as u8);
        let version_number = (word1 >> 16) as u16;

        Ok(VersionInfo {
            name,
            hardware,
            version: ((version_number / 100) as u8, (version_number % 100) as u8),
            core,
            physical_cpu: ((word0 >> 8) & 0xFF) as u8,
            build_date,
            buffer_size: (word1 & 0xFFFF) as u16,
        })
    }

    /// Encode a Version payload. Test fixtures use this to script monitors.
    #[must_use]
    pub fn encode_payload(&self) -> Vec<u8> {
        let p2p = (u32::from(self.core.x) << 8) | u32::from(self.core.y);
        let word0 = (p2p << 16) | (u32::from(self.physical_cpu) << 8) | u32::from(self.core.p);
        let version_number = u32::from(self.version.0) * 100 + u32::from(self.version.1);
        let word1 = (version_number << 16) | u32::from(self.buffer_size);

        let mut payload = Vec::new();
        payload.extend_from_slice(&word0.to_le_bytes());
        payload.extend_from_slice(&word1.to_le_bytes());
        payload.extend_from_slice(&self.build_date.to_le_bytes());
        payload.extend_from_slice(self.name.as_bytes());
        payload.push(b'/');
        payload.extend_from_slice(self.hardware.as_bytes());
        payload.push(0);
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::ScpResult;
    use crate::protocol::sdp::SdpHeader;
    use crate::protocol::ChipCoord;

    fn response_with_payload(payload: &[u8]) -> ScpResponse {
        let header = SdpHeader::scp_request(ChipCoord::new(0, 0), 0);
        let mut frame = vec![0u8; 2];
        header.write_into(&mut frame);
        frame.extend_from_slice(&ScpResult::Ok.value().to_le_bytes());
        frame.extend_from_slice(&0u16.to_le_bytes());
        frame.extend_from_slice(payload);
        ScpResponse::from_datagram(frame).expect("valid frame")
    }

    #[test]
    fn test_round_trip() {
        let info = VersionInfo {
            name: "SC&MP".to_string(),
            hardware: "SpiNNaker".to_string(),
            version: (1, 33),
            core: CoreAddr::new(0, 0, 0),
            physical_cpu: 15,
            build_date: 1_400_000_000,
            buffer_size: 256,
        };
        let decoded =
            VersionInfo::decode(&response_with_payload(&info.encode_payload())).expect("valid");
        assert_eq!(decoded, info);
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        assert!(VersionInfo::decode(&response_with_payload(&[0u8; 8])).is_err());
    }
}
