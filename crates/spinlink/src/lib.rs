// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Spinlink - host-side SCP client for SpiNNaker machines
//!
//! A SpiNNaker machine is a mesh of chips driven from the host by small,
//! tightly framed SCP command packets over UDP, answered by the on-chip
//! SCAMP monitor. This crate boots a machine, discovers its topology,
//! reads and writes chip memory, flood-fills executables, manages routing
//! tables and IP tags, and drains per-core IOBUF logs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spinlink::{Transceiver, Result};
//!
//! fn main() -> Result<()> {
//!     let txrx = Transceiver::open("192.168.240.1".parse().expect("address"))?;
//!     let version = txrx.ensure_ready(5, (8, 8), 1)?;
//!     println!("machine runs {} {}.{}", version.name, version.version.0, version.version.1);
//!
//!     let machine = txrx.discover_machine()?;
//!     println!("{} chips", machine.n_chips());
//!
//!     txrx.write_memory(0, 0, 0x7000_0000, b"hello")?;
//!     let read_back = txrx.read_memory(0, 0, 0x7000_0000, 5)?.concat();
//!     assert_eq!(read_back, b"hello");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------------------------------+
//! |                        Transceiver facade                        |
//! |  boot | discovery | memory | flood fill | iobuf | routes | tags  |
//! +------------------------------------------------------------------+
//! |   Connection selector  ->  Request pipeline (windowed, retrying) |
//! +------------------------------------------------------------------+
//! |            UDP endpoints  |  boot sender  |  listeners           |
//! +------------------------------------------------------------------+
//! ```
//!
//! Every SCP request flows through a [`pipeline::RequestPipeline`]: a
//! windowed engine that keeps a bounded number of requests outstanding,
//! matches responses by a process-wide 16-bit sequence, and retries on
//! timeouts and transient response codes. Bulk operations submit many
//! requests at once and await them all; no cross-request ordering is
//! promised, and where ordering matters (flood fill) the facade awaits the
//! earlier command before submitting the next batch.

/// Crate-wide constants: ports, addresses, pipeline defaults.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Inbound callback dispatch for IP-tagged traffic.
pub mod listener;
/// Machine topology and per-core models.
pub mod model;
/// The windowed request pipeline, sequence allocation, link selection.
pub mod pipeline;
/// SDP/SCP framing and the command set.
pub mod protocol;
/// The public facade.
pub mod transceiver;
/// UDP endpoints and the boot sender.
pub mod transport;

pub use error::{Error, Result};
pub use model::{
    Chip, CoreSubset, CoreSubsets, CpuInfo, DiagnosticFilter, IoBuffer, IpTag, IpTagDescriptor,
    Machine, MulticastRoute, ReverseIpTag, RouterDiagnostics, VersionInfo,
};
pub use protocol::constants::{CpuState, LedAction, PowerCommand, ScpCommand, ScpResult, Signal};
pub use protocol::{ChipCoord, CoreAddr};
pub use transceiver::{BmpCoords, MemoryChunks, Transceiver, TransceiverBuilder};

/// Spinlink version string.
pub const VERSION: &str = "0.3.2";
