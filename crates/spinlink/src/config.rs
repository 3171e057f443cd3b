// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Spinlink global configuration - single source of truth.
//!
//! This module centralizes the UDP ports, on-chip addresses and pipeline
//! defaults used throughout the crate. **Never hardcode these elsewhere!**

use std::time::Duration;

// =======================================================================
// UDP ports
// =======================================================================

/// UDP port on which SCAMP services SCP requests.
pub const SCP_SCAMP_PORT: u16 = 17893;

/// UDP port on which an unbooted board listens for boot frames.
pub const UDP_BOOT_PORT: u16 = 54321;

/// UDP port on which a BMP services its SCP-shaped commands.
///
/// BMPs answer on the SCAMP port number; they are distinguished by address,
/// not by port.
pub const SCP_BMP_PORT: u16 = SCP_SCAMP_PORT;

// =======================================================================
// SCP framing limits
// =======================================================================

/// Maximum SCP payload carried in one UDP message.
pub const UDP_MESSAGE_MAX_SIZE: usize = 256;

/// Sequence numbers are 16 bits; they wrap at this value.
pub const MAX_SEQUENCE: u32 = 65536;

// =======================================================================
// On-chip addresses
// =======================================================================

/// Base address of the system-variable block on every chip.
pub const SYSTEM_VARIABLE_BASE_ADDRESS: u32 = 0xF500_7F00;

/// Number of system-variable bytes read during discovery.
pub const SYSTEM_VARIABLE_BYTES: u32 = 128;

/// SDRAM address at which executables and router-table images are staged.
pub const EXECUTABLE_START_ADDRESS: u32 = 0x6780_0000;

/// Size of one per-core CPU information (vcpu) block.
pub const CPU_INFO_BYTES: u32 = 128;

/// Base of the memory-mapped router register region.
pub const ROUTER_REGISTER_BASE_ADDRESS: u32 = 0xE100_0000;

/// Offset of the diagnostic filter control words within the router region.
pub const ROUTER_FILTER_CONTROLS_OFFSET: u32 = 0x200;

/// Offset of the 16 diagnostic counters within the router region.
pub const ROUTER_DIAGNOSTIC_COUNTER_OFFSET: u32 = 0x300;

/// Offset of the router error status register within the router region.
pub const ROUTER_ERROR_STATUS_OFFSET: u32 = 0x14;

/// System-controller register that clears/enables the diagnostic counters.
pub const ROUTER_DIAGNOSTIC_CLEAR_ADDRESS: u32 = 0xF100_002C;

/// Number of diagnostic filter positions on a router.
pub const NO_ROUTER_DIAGNOSTIC_FILTERS: u32 = 16;

/// Filter positions at or below this index hold SCAMP defaults.
pub const ROUTER_DEFAULT_FILTERS_MAX_POSITION: u32 = 11;

/// Number of multicast routing entries in a router.
pub const ROUTER_TABLE_ENTRIES: u32 = 1024;

/// Size of one serialized multicast route record.
pub const ROUTER_ENTRY_BYTES: u32 = 16;

/// Routes at or above this value mark unused routing entries.
pub const ROUTER_ENTRY_UNUSED_ROUTE: u32 = 0xFF00_0000;

/// SDRAM address of the monitor's copy of the routing table.
pub const ROUTER_TABLE_COPY_ADDRESS: u32 = 0x6780_4000;

// =======================================================================
// Pipeline defaults
// =======================================================================

/// Default number of retries applied to a request by the pipeline.
pub const DEFAULT_N_RETRIES: u32 = 3;

/// Retry count used by the facade for user-visible single commands.
pub const FACADE_N_RETRIES: u32 = 10;

/// Default elapsed time after which a sent packet counts as timed out.
pub const DEFAULT_PACKET_TIMEOUT: Duration = Duration::from_millis(500);

/// Receive budget for one drain step taken inside a full-window submit.
pub const SUBMIT_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Window size floor applied when a pipeline auto-calibrates.
pub const MIN_CALIBRATED_CHANNELS: usize = 12;

/// Outstanding-count margin used when deriving the drain threshold.
pub const CHANNEL_WAIT_MARGIN: usize = 8;

// =======================================================================
// Machine constants
// =======================================================================

/// Highest processor id on a chip.
pub const MAX_CORE_ID: u8 = 31;

/// Number of inter-chip links on a router.
pub const ROUTER_LINKS: u8 = 6;

/// Nearest-neighbour flood-fill ids wrap at this modulus.
pub const NN_ID_MODULUS: u8 = 127;

/// First nearest-neighbour id handed out by a transceiver.
pub const NN_ID_FIRST: u8 = 2;

/// Name reported by a healthy SCAMP monitor.
pub const SCAMP_NAME: &str = "SC&MP";

/// SCAMP major version this library speaks.
pub const SCAMP_VERSION: u8 = 1;

// =======================================================================
// Listener defaults
// =======================================================================

/// Poll timeout of the inbound listener loop.
pub const LISTENER_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Number of callback workers serving one listener.
pub const LISTENER_WORKERS: usize = 4;

/// Depth of the bounded queue feeding the listener workers.
pub const LISTENER_QUEUE_DEPTH: usize = 64;

/// Receive buffer size requested for SCP sockets.
pub const SOCKET_RECEIVE_BUFFER_BYTES: usize = 1024 * 1024;
