// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast routes, diagnostic filters and router diagnostics.

use crate::config::{ROUTER_ENTRY_BYTES, ROUTER_ENTRY_UNUSED_ROUTE};
use crate::error::{Error, Result};

/// One multicast routing entry.
///
/// `route` is a bit mask: bits 0..=5 select links, bits 6..=23 select
/// processors (bit 6 is processor 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticastRoute {
    /// Key the router matches after masking.
    pub key: u32,
    /// Mask applied to incoming keys.
    pub mask: u32,
    /// Output links and processors.
    pub route: u32,
}

impl MulticastRoute {
    /// Route sending to the given links and processors.
    #[must_use]
    pub fn new(key: u32, mask: u32, links: &[u8], processors: &[u8]) -> Self {
        let mut route = 0u32;
        for &link in links {
            route |= 1 << link;
        }
        for &p in processors {
            route |= 1 << (6 + u32::from(p));
        }
        MulticastRoute { key, mask, route }
    }

    /// Links this route sends down.
    #[must_use]
    pub fn link_ids(&self) -> Vec<u8> {
        (0..6).filter(|&l| self.route & (1 << l) != 0).collect()
    }

    /// Processors this route delivers to.
    #[must_use]
    pub fn processor_ids(&self) -> Vec<u8> {
        (0..18)
            .filter(|&p| self.route & (1 << (6 + u32::from(p))) != 0)
            .collect()
    }

    /// Serialize one table record: index, pad, route, key, mask.
    pub fn write_record(&self, index: u16, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&index.to_le_bytes());
        buf.extend_from_slice(&[0u8; 2]);
        buf.extend_from_slice(&self.route.to_le_bytes());
        buf.extend_from_slice(&self.key.to_le_bytes());
        buf.extend_from_slice(&self.mask.to_le_bytes());
    }

    /// Decode one entry of the monitor's table copy.
    ///
    /// The copy reuses the 16-byte record shape but carries the owning
    /// application id in byte 3; unused entries come back as `None`.
    pub fn read_table_entry(data: &[u8]) -> Result<Option<(u8, Self)>> {
        let app_id = match data.get(3) {
            Some(&app_id) => app_id,
            None => 0,
        };
        Ok(Self::read_record(data)?.map(|route| (app_id, route)))
    }

    /// Decode one table record; unused entries come back as `None`.
    pub fn read_record(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < ROUTER_ENTRY_BYTES as usize {
            return Err(Error::MalformedPacket(format!(
                "route record needs {} bytes, got {}",
                ROUTER_ENTRY_BYTES,
                data.len()
            )));
        }
        let route = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if route >= ROUTER_ENTRY_UNUSED_ROUTE {
            return Ok(None);
        }
        let key = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let mask = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
        Ok(Some(MulticastRoute { key, mask, route }))
    }
}

/// Serialize a route table image: every record plus the terminator.
#[must_use]
pub fn serialize_routes(routes: &[MulticastRoute]) -> Vec<u8> {
    let mut buf = Vec::with_capacity((routes.len() + 1) * ROUTER_ENTRY_BYTES as usize);
    for (index, route) in routes.iter().enumerate() {
        route.write_record(index as u16, &mut buf);
    }
    // Four all-ones words close the image.
    buf.extend_from_slice(&[0xFF; ROUTER_ENTRY_BYTES as usize]);
    buf
}

// =======================================================================
// Diagnostic filters
// =======================================================================

/// Packet classes a diagnostic filter can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FilterPacketType {
    /// Multicast packets.
    Multicast = 0,
    /// Point-to-point packets.
    PointToPoint = 1,
    /// Nearest-neighbour packets.
    NearestNeighbour = 2,
    /// Fixed-route packets.
    FixedRoute = 3,
}

/// Destinations a diagnostic filter can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FilterDestination {
    /// Packet was dumped.
    Dump = 0,
    /// Packet went to a local core.
    Local = 1,
    /// Packet went to the local monitor.
    LocalMonitor = 2,
    /// Packet left on link 0.
    Link0 = 3,
    /// Packet left on link 1.
    Link1 = 4,
    /// Packet left on link 2.
    Link2 = 5,
    /// Packet left on link 3.
    Link3 = 6,
    /// Packet left on link 4.
    Link4 = 7,
    /// Packet left on link 5.
    Link5 = 8,
}

const FILTER_PACKET_TYPE_SHIFT: u32 = 0;
const FILTER_PAYLOAD_SHIFT: u32 = 4;
const FILTER_SOURCE_SHIFT: u32 = 6;
const FILTER_DEFAULT_ROUTING_SHIFT: u32 = 8;
const FILTER_DESTINATION_SHIFT: u32 = 14;
const FILTER_ENABLE_INTERRUPT_BIT: u32 = 1 << 30;

/// One router diagnostic filter, as a typed view over its 32-bit word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticFilter {
    /// Packet classes counted.
    pub packet_types: Vec<FilterPacketType>,
    /// Count packets with a payload.
    pub with_payload: bool,
    /// Count packets without a payload.
    pub without_payload: bool,
    /// Count locally sourced packets.
    pub local_source: bool,
    /// Count packets from other chips.
    pub non_local_source: bool,
    /// Count default-routed packets.
    pub default_routed: bool,
    /// Count non-default-routed packets.
    pub non_default_routed: bool,
    /// Destinations counted.
    pub destinations: Vec<FilterDestination>,
    /// Raise an interrupt when the counter changes.
    pub enable_interrupt: bool,
}

impl DiagnosticFilter {
    /// Pack the filter into its register word.
    #[must_use]
    pub fn to_word(&self) -> u32 {
        let mut word = 0u32;
        for &t in &self.packet_types {
            word |= 1 << (FILTER_PACKET_TYPE_SHIFT + t as u32);
        }
        if self.with_payload {
            word |= 1 << FILTER_PAYLOAD_SHIFT;
        }
        if self.without_payload {
            word |= 1 << (FILTER_PAYLOAD_SHIFT + 1);
        }
        if self.local_source {
            word |= 1 << FILTER_SOURCE_SHIFT;
        }
        if self.non_local_source {
            word |= 1 << (FILTER_SOURCE_SHIFT + 1);
        }
        if self.default_routed {
            word |= 1 << FILTER_DEFAULT_ROUTING_SHIFT;
        }
        if self.non_default_routed {
            word |= 1 << (FILTER_DEFAULT_ROUTING_SHIFT + 1);
        }
        for &d in &self.destinations {
            word |= 1 << (FILTER_DESTINATION_SHIFT + d as u32);
        }
        if self.enable_interrupt {
            word |= FILTER_ENABLE_INTERRUPT_BIT;
        }
        word
    }

    /// Unpack a register word.
    #[must_use]
    pub fn from_word(word: u32) -> Self {
        let packet_types = [
            FilterPacketType::Multicast,
            FilterPacketType::PointToPoint,
            FilterPacketType::NearestNeighbour,
            FilterPacketType::FixedRoute,
        ]
        .into_iter()
        .filter(|&t| word & (1 << (FILTER_PACKET_TYPE_SHIFT + t as u32)) != 0)
        .collect();
        let destinations = [
            FilterDestination::Dump,
            FilterDestination::Local,
            FilterDestination::LocalMonitor,
            FilterDestination::Link0,
            FilterDestination::Link1,
            FilterDestination::Link2,
            FilterDestination::Link3,
            FilterDestination::Link4,
            FilterDestination::Link5,
        ]
        .into_iter()
        .filter(|&d| word & (1 << (FILTER_DESTINATION_SHIFT + d as u32)) != 0)
        .collect();
        DiagnosticFilter {
            packet_types,
            with_payload: word & (1 << FILTER_PAYLOAD_SHIFT) != 0,
            without_payload: word & (1 << (FILTER_PAYLOAD_SHIFT + 1)) != 0,
            local_source: word & (1 << FILTER_SOURCE_SHIFT) != 0,
            non_local_source: word & (1 << (FILTER_SOURCE_SHIFT + 1)) != 0,
            default_routed: word & (1 << FILTER_DEFAULT_ROUTING_SHIFT) != 0,
            non_default_routed: word & (1 << (FILTER_DEFAULT_ROUTING_SHIFT + 1)) != 0,
            destinations,
            enable_interrupt: word & FILTER_ENABLE_INTERRUPT_BIT != 0,
        }
    }
}

// =======================================================================
// Router diagnostics
// =======================================================================

/// Snapshot of a router's error status and 16 diagnostic counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterDiagnostics {
    /// Router error status register.
    pub error_status: u32,
    /// The 16 diagnostic counters.
    pub counters: [u32; 16],
}

impl RouterDiagnostics {
    /// Counter 0: local multicast packets.
    #[must_use]
    pub fn n_local_multicast_packets(&self) -> u32 {
        self.counters[0]
    }

    /// Counter 1: external multicast packets.
    #[must_use]
    pub fn n_external_multicast_packets(&self) -> u32 {
        self.counters[1]
    }

    /// Counter 2: dropped multicast packets.
    #[must_use]
    pub fn n_dropped_multicast_packets(&self) -> u32 {
        self.counters[2]
    }

    /// Counter 3: local point-to-point packets.
    #[must_use]
    pub fn n_local_peer_to_peer_packets(&self) -> u32 {
        self.counters[3]
    }

    /// Counter 4: external point-to-point packets.
    #[must_use]
    pub fn n_external_peer_to_peer_packets(&self) -> u32 {
        self.counters[4]
    }

    /// Counter 5: dropped point-to-point packets.
    #[must_use]
    pub fn n_dropped_peer_to_peer_packets(&self) -> u32 {
        self.counters[5]
    }
}
