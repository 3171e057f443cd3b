// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IP tag records.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::protocol::{CoreAddr, ScpResponse};

/// An IP tag to install: chip traffic tagged with `tag` is forwarded to
/// `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpTag {
    /// Board address the tag lives on; `None` installs it everywhere.
    pub board_address: Option<Ipv4Addr>,
    /// Tag id.
    pub tag: u8,
    /// Host the traffic is forwarded to.
    pub ip_address: Ipv4Addr,
    /// UDP port the traffic is forwarded to.
    pub port: u16,
    /// Whether SCAMP strips the SDP header before forwarding.
    pub strip_sdp: bool,
}

/// A reverse IP tag: host traffic arriving on `port` is delivered to a core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseIpTag {
    /// Board address the tag lives on; `None` installs it everywhere.
    pub board_address: Option<Ipv4Addr>,
    /// Tag id.
    pub tag: u8,
    /// UDP port the host sends to.
    pub port: u16,
    /// Core the traffic is delivered to.
    pub destination: CoreAddr,
    /// SDP port stamped on delivered messages.
    pub sdp_port: u8,
}

/// Flag bit marking a tag slot as in use.
const TAG_IN_USE: u16 = 0x8000;

/// A tag descriptor as reported by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpTagDescriptor {
    /// Tag id the descriptor was read from.
    pub tag: u8,
    /// Forwarding IP address.
    pub ip_address: Ipv4Addr,
    /// MAC address of the forwarding host.
    pub mac_address: [u8; 6],
    /// Forwarding UDP port.
    pub port: u16,
    /// Tag timeout code.
    pub timeout: u16,
    /// Raw flag word.
    pub flags: u16,
    /// Packets sent through the tag.
    pub count: u32,
    /// Receive port of a reverse tag.
    pub rx_port: u16,
    /// Core a reverse tag delivers to.
    pub spin_core: CoreAddr,
    /// SDP port a reverse tag delivers on.
    pub spin_port: u8,
}

impl IpTagDescriptor {
    /// Whether the tag slot is in use.
    #[must_use]
    pub fn in_use(&self) -> bool {
        self.flags & TAG_IN_USE != 0
    }

    /// Decode the payload of an IpTag-get response.
    ///
    /// Layout: ip(4), mac(6), port(u16), timeout(u16), flags(u16),
    /// count(u32), rx_port(u16), spin y, spin x, spin port, spin cpu.
    pub fn decode(tag: u8, response: &ScpResponse) -> Result<Self> {
        let payload = response.payload();
        if payload.len() < 24 {
            return Err(Error::MalformedPacket(format!(
                "IP tag descriptor needs 24 bytes, got {}",
                payload.len()
            )));
        }
        let ip_address = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
        let mut mac_address = [0u8; 6];
        mac_address.copy_from_slice(&payload[4..10]);
        let port = u16::from_le_bytes([payload[10], payload[11]]);
        let timeout = u16::from_le_bytes([payload[12], payload[13]]);
        let flags = u16::from_le_bytes([payload[14], payload[15]]);
        let count = u32::from_le_bytes([payload[16], payload[17], payload[18], payload[19]]);
        let rx_port = u16::from_le_bytes([payload[20], payload[21]]);
        let spin_y = payload[22];
        let spin_x = payload[23];
        let (spin_port, spin_cpu) = match payload.get(24) {
            Some(&packed) => (packed >> 5, packed & 0x1F),
            None => (0, 0),
        };
        Ok(IpTagDescriptor {
            tag,
            ip_address,
            mac_address,
            port,
            timeout,
            flags,
            count,
            rx_port,
            spin_core: CoreAddr::new(spin_x, spin_y, spin_cpu),
            spin_port,
        })
    }
}
