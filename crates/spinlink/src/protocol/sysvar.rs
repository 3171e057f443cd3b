// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! System-variable block layout.
//!
//! Every chip exposes a block of system variables at
//! [`crate::config::SYSTEM_VARIABLE_BASE_ADDRESS`]; discovery reads the first
//! 128 bytes of it, over point-to-point for the local chip and over a raw
//! link for a neighbour that has no route yet. Offsets below are the contract
//! between this crate and its test fixtures.

use crate::config::SYSTEM_VARIABLE_BYTES;
use crate::error::{Error, Result};
use crate::protocol::ChipCoord;

/// `u16`: `(x << 8) | y` of this chip.
pub const OFF_P2P_ADDR: usize = 0;
/// `u16`: `(width << 8) | height` of the machine.
pub const OFF_P2P_DIMS: usize = 2;
/// `u16`: `(x << 8) | y` of the nearest ethernet chip.
pub const OFF_ETH_ADDR: usize = 8;
/// `u8`: hardware version.
pub const OFF_HW_VER: usize = 10;
/// `u8`: non-zero when this chip's ethernet is up.
pub const OFF_ETH_UP: usize = 11;
/// `u8`: bit mask of working links, bits 0..=5.
pub const OFF_LINKS_AVAILABLE: usize = 32;
/// `u8`: number of working cores, monitor included.
pub const OFF_N_WORKING_CORES: usize = 33;
/// `u16`: first free multicast routing entry.
pub const OFF_FIRST_FREE_ROUTER_ENTRY: usize = 34;
/// `u32`: CPU clock in MHz.
pub const OFF_CPU_CLOCK_MHZ: usize = 36;
/// `u32`: base of the SDRAM heap.
pub const OFF_SDRAM_HEAP_ADDRESS: usize = 40;
/// `u32`: size of one core's IOBUF buffer.
pub const OFF_IOBUF_SIZE: usize = 44;
/// `u32`: base of the per-core CPU information blocks.
pub const OFF_CPU_INFO_BASE: usize = 48;
/// `u32`: base of the system RAM heap.
pub const OFF_SYSRAM_HEAP_ADDRESS: usize = 52;
/// `[u8; 4]`: IP address of this chip's ethernet, zero when absent.
pub const OFF_ETH_IP_ADDRESS: usize = 56;
/// `[u8; 32]`: physical core id per virtual core, 0xFF for unused slots.
pub const OFF_VIRTUAL_CORE_MAP: usize = 64;

/// Decoded system-variable block of one chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemVariables {
    /// This chip's coordinates.
    pub chip: ChipCoord,
    /// Machine width and height.
    pub dims: (u8, u8),
    /// Nearest ethernet-connected chip.
    pub nearest_ethernet: ChipCoord,
    /// Hardware version.
    pub hw_version: u8,
    /// Whether this chip's own ethernet is up.
    pub ethernet_up: bool,
    /// Bit mask of working links.
    pub links_available: u8,
    /// Number of working cores, monitor included.
    pub n_working_cores: u8,
    /// First free multicast routing entry.
    pub first_free_router_entry: u16,
    /// CPU clock in MHz.
    pub cpu_clock_mhz: u32,
    /// SDRAM heap base.
    pub sdram_heap_address: u32,
    /// IOBUF buffer size for each core.
    pub iobuf_size: u32,
    /// Base of the per-core CPU information blocks.
    pub cpu_info_base: u32,
    /// System RAM heap base.
    pub sysram_heap_address: u32,
    /// Ethernet IP address, zero when this chip has none.
    pub ethernet_ip: [u8; 4],
    /// Physical core id per virtual core, 0xFF for unused slots.
    pub virtual_core_map: [u8; 32],
}

impl SystemVariables {
    /// Decode a block read from a chip.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < SYSTEM_VARIABLE_BYTES as usize {
            return Err(Error::MalformedPacket(format!(
                "system-variable block needs {} bytes, got {}",
                SYSTEM_VARIABLE_BYTES,
                data.len()
            )));
        }
        let u16_at = |off: usize| u16::from_le_bytes([data[off], data[off + 1]]);
        let u32_at =
            |off: usize| u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]]);

        let p2p = u16_at(OFF_P2P_ADDR);
        let dims = u16_at(OFF_P2P_DIMS);
        let eth = u16_at(OFF_ETH_ADDR);
        let mut ethernet_ip = [0u8; 4];
        ethernet_ip.copy_from_slice(&data[OFF_ETH_IP_ADDRESS..OFF_ETH_IP_ADDRESS + 4]);
        let mut virtual_core_map = [0u8; 32];
        virtual_core_map.copy_from_slice(&data[OFF_VIRTUAL_CORE_MAP..OFF_VIRTUAL_CORE_MAP + 32]);

        Ok(SystemVariables {
            chip: ChipCoord::new((p2p >> 8) as u8, (p2p & 0xFF) as u8),
            dims: ((dims >> 8) as u8, (dims & 0xFF) as u8),
            nearest_ethernet: ChipCoord::new((eth >> 8) as u8, (eth & 0xFF) as u8),
            hw_version: data[OFF_HW_VER],
            ethernet_up: data[OFF_ETH_UP] != 0,
            links_available: data[OFF_LINKS_AVAILABLE] & 0x3F,
            n_working_cores: data[OFF_N_WORKING_CORES],
            first_free_router_entry: u16_at(OFF_FIRST_FREE_ROUTER_ENTRY),
            cpu_clock_mhz: u32_at(OFF_CPU_CLOCK_MHZ),
            sdram_heap_address: u32_at(OFF_SDRAM_HEAP_ADDRESS),
            iobuf_size: u32_at(OFF_IOBUF_SIZE),
            cpu_info_base: u32_at(OFF_CPU_INFO_BASE),
            sysram_heap_address: u32_at(OFF_SYSRAM_HEAP_ADDRESS),
            ethernet_ip,
            virtual_core_map,
        })
    }

    /// Encode a block. Test fixtures use this to script a mock machine.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut data = vec![0u8; SYSTEM_VARIABLE_BYTES as usize];
        let p2p = (u16::from(self.chip.x) << 8) | u16::from(self.chip.y);
        data[OFF_P2P_ADDR..OFF_P2P_ADDR + 2].copy_from_slice(&p2p.to_le_bytes());
        let dims = (u16::from(self.dims.0) << 8) | u16::from(self.dims.1);
        data[OFF_P2P_DIMS..OFF_P2P_DIMS + 2].copy_from_slice(&dims.to_le_bytes());
        let eth = (u16::from(self.nearest_ethernet.x) << 8) | u16::from(self.nearest_ethernet.y);
        data[OFF_ETH_ADDR..OFF_ETH_ADDR + 2].copy_from_slice(&eth.to_le_bytes());
        data[OFF_HW_VER] = self.hw_version;
        data[OFF_ETH_UP] = u8::from(self.ethernet_up);
        data[OFF_LINKS_AVAILABLE] = self.links_available & 0x3F;
        data[OFF_N_WORKING_CORES] = self.n_working_cores;
        data[OFF_FIRST_FREE_ROUTER_ENTRY..OFF_FIRST_FREE_ROUTER_ENTRY + 2]
            .copy_from_slice(&self.first_free_router_entry.to_le_bytes());
        data[OFF_CPU_CLOCK_MHZ..OFF_CPU_CLOCK_MHZ + 4]
            .copy_from_slice(&self.cpu_clock_mhz.to_le_bytes());
        data[OFF_SDRAM_HEAP_ADDRESS..OFF_SDRAM_HEAP_ADDRESS + 4]
            .copy_from_slice(&self.sdram_heap_address.to_le_bytes());
        data[OFF_IOBUF_SIZE..OFF_IOBUF_SIZE + 4].copy_from_slice(&self.iobuf_size.to_le_bytes());
        data[OFF_CPU_INFO_BASE..OFF_CPU_INFO_BASE + 4]
            .copy_from_slice(&self.cpu_info_base.to_le_bytes());
        data[OFF_SYSRAM_HEAP_ADDRESS..OFF_SYSRAM_HEAP_ADDRESS + 4]
            .copy_from_slice(&self.sysram_heap_address.to_le_bytes());
        data[OFF_ETH_IP_ADDRESS..OFF_ETH_IP_ADDRESS + 4].copy_from_slice(&self.ethernet_ip);
        data[OFF_VIRTUAL_CORE_MAP..OFF_VIRTUAL_CORE_MAP + 32]
            .copy_from_slice(&self.virtual_core_map);
        data
    }

    /// Virtual core ids with a physical core behind them.
    pub fn working_virtual_cores(&self) -> impl Iterator<Item = u8> + '_ {
        self.virtual_core_map
            .iter()
            .enumerate()
            .filter(|(_, &phys)| phys != 0xFF)
            .map(|(virt, _)| virt as u8)
    }
}

impl Default for SystemVariables {
    fn default() -> Self {
        SystemVariables {
            chip: ChipCoord::new(0, 0),
            dims: (0, 0),
            nearest_ethernet: ChipCoord::new(0, 0),
            hw_version: 5,
            ethernet_up: false,
            links_available: 0x3F,
            n_working_cores: 18,
            first_free_router_entry: 1,
            cpu_clock_mhz: 200,
            sdram_heap_address: 0x6040_0000,
            iobuf_size: 16384,
            cpu_info_base: 0xE500_7000,
            sysram_heap_address: 0xE500_0100,
            ethernet_ip: [0; 4],
            virtual_core_map: {
                let mut map = [0xFFu8; 32];
                for (virt, slot) in map.iter_mut().take(18).enumerate() {
                    *slot = virt as u8;
                }
                map
            },
        }
    }
}
