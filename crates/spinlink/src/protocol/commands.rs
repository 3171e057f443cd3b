// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Builders for the SCP command set.
//!
//! One constructor per command, each returning a ready-to-submit
//! [`ScpRequest`]. All argument packings live here as named constants;
//! response payload layouts live with the model types that decode them.

use crate::config::UDP_MESSAGE_MAX_SIZE;
use crate::error::{Error, Result};
use crate::protocol::constants::{
    AllocOperation, BmpInfoType, IpTagCommand, LedAction, PowerCommand, RouterOperation,
    ScpCommand, Signal, SignalType,
};
use crate::protocol::scp::ScpRequest;
use crate::protocol::sdp::SdpHeader;
use crate::protocol::{ChipCoord, CoreAddr};

// =======================================================================
// Packing constants
// =======================================================================

/// Memory access granularity for Read/Write, picked from alignment.
const TYPE_BYTE: u32 = 0;
const TYPE_HALF_WORD: u32 = 1;
const TYPE_WORD: u32 = 2;

/// Nearest-neighbour forward/retry word shared by the flood-fill commands.
const NNP_FORWARD_RETRY: u32 = (0x3F << 24) | (0x18 << 16);
/// Nearest-neighbour sub-command: flood-fill start.
const NNP_FLOOD_FILL_START: u32 = 6;
/// Nearest-neighbour sub-command: flood-fill end.
const NNP_FLOOD_FILL_END: u32 = 15;
/// "Run now" bit in the flood-fill-end and application-run data words.
const APP_RUN_IMMEDIATELY: u32 = 1 << 18;

/// Reverse bit of the IpTag command word.
const IPTAG_REVERSE: u32 = 1 << 29;
/// Strip-SDP bit of the IpTag command word.
const IPTAG_STRIP_SDP: u32 = 1 << 28;

/// Count-state operation and mode tokens (Signal argument 2).
const COUNT_OPERATION_COUNT: u32 = 1 << 22;
const COUNT_MODE_EQUAL: u32 = 2 << 20;
/// Application-id mask meaning "this exact id".
const APP_ID_MASK_ALL_BITS: u32 = 0xFF << 8;
/// Link mask addressing every link of every chip.
const SIGNAL_ALL_LINKS: u32 = 0xFFFF;

/// Read flag of the fixed-route sub-command.
const FIXED_ROUTE_READ: u32 = 1 << 31;

fn check_mem_bounds(size: u32) -> Result<()> {
    if size < 1 || size as usize > UDP_MESSAGE_MAX_SIZE {
        return Err(Error::InvalidParameter {
            field: "size",
            value: size.to_string(),
            reason: "memory accesses carry 1..=256 bytes",
        });
    }
    Ok(())
}

fn mem_access_type(base: u32, size: u32) -> u32 {
    if base % 4 == 0 && size % 4 == 0 {
        TYPE_WORD
    } else if base % 2 == 0 && size % 2 == 0 {
        TYPE_HALF_WORD
    } else {
        TYPE_BYTE
    }
}

fn processor_mask(processors: &[u8]) -> u32 {
    processors.iter().fold(0u32, |mask, p| mask | (1 << p))
}

impl ScpRequest {
    // ===================================================================
    // SCAMP commands
    // ===================================================================

    /// Read the software version running on a core.
    #[must_use]
    pub fn version(core: CoreAddr) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(core.chip(), core.p),
            command: ScpCommand::Version,
            arg1: 0,
            arg2: 0,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    /// Read up to 256 bytes of chip memory.
    pub fn read_memory(chip: ChipCoord, base: u32, size: u32) -> Result<ScpRequest> {
        check_mem_bounds(size)?;
        Ok(ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::Read,
            arg1: base,
            arg2: size,
            arg3: mem_access_type(base, size),
            payload: Vec::new(),
        })
    }

    /// Write up to 256 bytes of chip memory.
    pub fn write_memory(chip: ChipCoord, base: u32, data: Vec<u8>) -> Result<ScpRequest> {
        let size = data.len() as u32;
        check_mem_bounds(size)?;
        Ok(ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::Write,
            arg1: base,
            arg2: size,
            arg3: mem_access_type(base, size),
            payload: data,
        })
    }

    /// Read chip memory through a link, bypassing point-to-point routing.
    pub fn read_link(chip: ChipCoord, link: u8, base: u32, size: u32) -> Result<ScpRequest> {
        check_mem_bounds(size)?;
        if link > 5 {
            return Err(Error::InvalidParameter {
                field: "link",
                value: link.to_string(),
                reason: "link ids are 0..=5",
            });
        }
        Ok(ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::LinkRead,
            arg1: base,
            arg2: size,
            arg3: u32::from(link),
            payload: Vec::new(),
        })
    }

    /// Write chip memory through a link.
    pub fn write_link(chip: ChipCoord, link: u8, base: u32, data: Vec<u8>) -> Result<ScpRequest> {
        let size = data.len() as u32;
        check_mem_bounds(size)?;
        if link > 5 {
            return Err(Error::InvalidParameter {
                field: "link",
                value: link.to_string(),
                reason: "link ids are 0..=5",
            });
        }
        Ok(ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::LinkWrite,
            arg1: base,
            arg2: size,
            arg3: u32::from(link),
            payload: data,
        })
    }

    /// Fill a memory region with a repeated 32-bit value.
    #[must_use]
    pub fn fill(chip: ChipCoord, base: u32, value: u32, size: u32) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::Fill,
            arg1: base,
            arg2: value,
            arg3: size,
            payload: Vec::new(),
        }
    }

    /// Open a flood-fill transaction.
    #[must_use]
    pub fn flood_fill_start(nn_id: u8, n_blocks: u32, chip: Option<ChipCoord>) -> ScpRequest {
        let key =
            (NNP_FLOOD_FILL_START << 24) | (u32::from(nn_id) << 16) | ((n_blocks & 0xFF) << 8);
        // Unconstrained fills target every chip; a constrained fill names a
        // region and the chip's position inside it.
        let data = match chip {
            None => 0xFFFF,
            Some(c) => {
                let m = (u32::from(c.y & 3) * 4) + u32::from(c.x & 3);
                (u32::from(c.x & 0xFC) << 24)
                    | (u32::from(c.y & 0xFC) << 16)
                    | (3 << 16)
                    | (1 << m)
            }
        };
        ScpRequest {
            sdp: SdpHeader::scp_request(ChipCoord::new(0, 0), 0),
            command: ScpCommand::NearestNeighbourPacket,
            arg1: key,
            arg2: data,
            arg3: NNP_FORWARD_RETRY,
            payload: Vec::new(),
        }
    }

    /// Send one flood-fill data block. `data` must be whole words.
    pub fn flood_fill_data(
        nn_id: u8,
        block_no: u32,
        base: u32,
        data: Vec<u8>,
    ) -> Result<ScpRequest> {
        if data.is_empty() || data.len() > UDP_MESSAGE_MAX_SIZE || data.len() % 4 != 0 {
            return Err(Error::InvalidParameter {
                field: "data",
                value: data.len().to_string(),
                reason: "flood-fill blocks carry 4..=256 bytes of whole words",
            });
        }
        let n_words = (data.len() / 4) as u32;
        ScpRequest {
            sdp: SdpHeader::scp_request(ChipCoord::new(0, 0), 0),
            command: ScpCommand::FloodFillData,
            arg1: NNP_FORWARD_RETRY | u32::from(nn_id),
            arg2: ((block_no & 0xFF) << 16) | ((n_words - 1) << 8),
            arg3: base,
            payload: data,
        }
        .validated()
    }

    /// Close a flood-fill transaction and optionally start the image.
    #[must_use]
    pub fn flood_fill_end(nn_id: u8, app_id: u8, processors: &[u8], wait: bool) -> ScpRequest {
        let mut data = (u32::from(app_id) << 24) | processor_mask(processors);
        if !wait {
            data |= APP_RUN_IMMEDIATELY;
        }
        ScpRequest {
            sdp: SdpHeader::scp_request(ChipCoord::new(0, 0), 0),
            command: ScpCommand::NearestNeighbourPacket,
            arg1: (NNP_FLOOD_FILL_END << 24) | u32::from(nn_id),
            arg2: data,
            arg3: NNP_FORWARD_RETRY,
            payload: Vec::new(),
        }
    }

    /// Start the staged executable on a set of processors.
    #[must_use]
    pub fn application_run(
        chip: ChipCoord,
        app_id: u8,
        processors: &[u8],
        wait: bool,
    ) -> ScpRequest {
        let mut arg1 = (u32::from(app_id) << 24) | processor_mask(processors);
        if !wait {
            arg1 |= APP_RUN_IMMEDIATELY;
        }
        ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::ApplicationRun,
            arg1,
            arg2: 0,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    /// Send a signal to every core running `app_id`.
    #[must_use]
    pub fn signal(app_id: u8, signal: Signal) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(ChipCoord::new(0, 0), 0),
            command: ScpCommand::Signal,
            arg1: signal.signal_type().value(),
            arg2: (signal.value() << 16) | APP_ID_MASK_ALL_BITS | u32::from(app_id),
            arg3: SIGNAL_ALL_LINKS,
            payload: Vec::new(),
        }
    }

    /// Count cores of `app_id` currently in `state`.
    #[must_use]
    pub fn count_state(app_id: u8, state: u8) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(ChipCoord::new(0, 0), 0),
            command: ScpCommand::Signal,
            arg1: SignalType::PointToPoint.value(),
            arg2: COUNT_OPERATION_COUNT
                | COUNT_MODE_EQUAL
                | (u32::from(state) << 16)
                | APP_ID_MASK_ALL_BITS
                | u32::from(app_id),
            arg3: SIGNAL_ALL_LINKS,
            payload: Vec::new(),
        }
    }

    /// Allocate router entries; the response carries the base entry index.
    #[must_use]
    pub fn router_alloc(chip: ChipCoord, app_id: u8, n_entries: u32) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::Alloc,
            arg1: (u32::from(app_id) << 8) | AllocOperation::AllocRouting as u32,
            arg2: n_entries,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    /// Load a router table image previously staged in SDRAM.
    #[must_use]
    pub fn router_init(
        chip: ChipCoord,
        n_entries: u32,
        table_address: u32,
        base_address: u32,
        app_id: u8,
    ) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::Router,
            arg1: ((n_entries & 0xFFFF) << 16)
                | (u32::from(app_id) << 8)
                | RouterOperation::Load as u32,
            arg2: table_address,
            arg3: base_address,
            payload: Vec::new(),
        }
    }

    /// Clear every multicast routing entry on a chip.
    #[must_use]
    pub fn router_clear(chip: ChipCoord) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::Router,
            arg1: RouterOperation::Clear as u32,
            arg2: 0,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    /// Read the fixed-route entry of a chip.
    #[must_use]
    pub fn fixed_route_read(chip: ChipCoord, app_id: u8) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::Router,
            arg1: (u32::from(app_id) << 8) | RouterOperation::FixedRoute as u32,
            arg2: FIXED_ROUTE_READ,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    /// Set chip LEDs. Each entry is `(led, action)` with leds 0..=7.
    #[must_use]
    pub fn set_led(core: CoreAddr, leds: &[(u8, LedAction)]) -> ScpRequest {
        let arg1 = leds
            .iter()
            .fold(0u32, |acc, &(led, action)| acc | ((action as u32) << (led * 2)));
        ScpRequest {
            sdp: SdpHeader::scp_request(core.chip(), core.p),
            command: ScpCommand::Led,
            arg1,
            arg2: 0,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    /// Install an IP tag forwarding chip traffic to `host:port`.
    #[must_use]
    pub fn iptag_set(
        chip: ChipCoord,
        tag: u8,
        host: [u8; 4],
        port: u16,
        strip_sdp: bool,
    ) -> ScpRequest {
        let mut arg1 = ((IpTagCommand::Set as u32) << 16) | u32::from(tag);
        if strip_sdp {
            arg1 |= IPTAG_STRIP_SDP;
        }
        ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::IpTag,
            arg1,
            arg2: u32::from(port),
            arg3: u32::from_le_bytes(host),
            payload: Vec::new(),
        }
    }

    /// Install a reverse IP tag delivering host traffic to a core.
    #[must_use]
    pub fn reverse_iptag_set(
        chip: ChipCoord,
        tag: u8,
        port: u16,
        destination: CoreAddr,
        sdp_port: u8,
    ) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::IpTag,
            arg1: IPTAG_REVERSE | ((IpTagCommand::Set as u32) << 16) | u32::from(tag),
            arg2: (u32::from(sdp_port & 0x7) << 29)
                | (u32::from(destination.p & 0x1F) << 24)
                | u32::from(port),
            arg3: (u32::from(destination.x) << 24) | (u32::from(destination.y) << 16),
            payload: Vec::new(),
        }
    }

    /// Fetch one IP tag descriptor.
    #[must_use]
    pub fn iptag_get(chip: ChipCoord, tag: u8) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::IpTag,
            arg1: ((IpTagCommand::Get as u32) << 16) | u32::from(tag),
            arg2: 1,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    /// Remove an IP tag.
    #[must_use]
    pub fn iptag_clear(chip: ChipCoord, tag: u8) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(chip, 0),
            command: ScpCommand::IpTag,
            arg1: ((IpTagCommand::Clear as u32) << 16) | u32::from(tag),
            arg2: 0,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    // ===================================================================
    // BMP commands
    // ===================================================================

    /// Power boards on or off. `boards` is a bit mask within the frame.
    #[must_use]
    pub fn bmp_power(command: PowerCommand, board_mask: u32, delay_ms: u32) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(ChipCoord::new(0, 0), lowest_board(board_mask)),
            command: ScpCommand::Power,
            arg1: (delay_ms << 16) | command as u32,
            arg2: board_mask,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    /// Read the software version of a BMP.
    #[must_use]
    pub fn bmp_version(board: u8) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(ChipCoord::new(0, 0), board),
            command: ScpCommand::Version,
            arg1: 0,
            arg2: 0,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    /// Read a 32-bit FPGA (SPI) register.
    #[must_use]
    pub fn fpga_register_read(board: u8, fpga: u8, register: u32) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(ChipCoord::new(0, 0), board),
            command: ScpCommand::LinkRead,
            arg1: register & !0x3,
            arg2: 4,
            arg3: u32::from(fpga),
            payload: Vec::new(),
        }
    }

    /// Write a 32-bit FPGA (SPI) register.
    #[must_use]
    pub fn fpga_register_write(board: u8, fpga: u8, register: u32, value: u32) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(ChipCoord::new(0, 0), board),
            command: ScpCommand::LinkWrite,
            arg1: register & !0x3,
            arg2: 4,
            arg3: u32::from(fpga),
            payload: value.to_le_bytes().to_vec(),
        }
    }

    /// Read the ADC (voltage and temperature) data of a board.
    #[must_use]
    pub fn bmp_adc_read(board: u8) -> ScpRequest {
        ScpRequest {
            sdp: SdpHeader::scp_request(ChipCoord::new(0, 0), board),
            command: ScpCommand::BmpInfo,
            arg1: BmpInfoType::Adc as u32,
            arg2: 0,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    /// Set BMP-controlled LEDs on a set of boards.
    #[must_use]
    pub fn bmp_set_led(board_mask: u32, leds: &[u8], action: LedAction) -> ScpRequest {
        let arg1 = leds
            .iter()
            .fold(0u32, |acc, &led| acc | ((action as u32) << (led * 2)));
        ScpRequest {
            sdp: SdpHeader::scp_request(ChipCoord::new(0, 0), lowest_board(board_mask)),
            command: ScpCommand::Led,
            arg1,
            arg2: board_mask,
            arg3: 0,
            payload: Vec::new(),
        }
    }

    fn validated(self) -> Result<ScpRequest> {
        self.validate()?;
        Ok(self)
    }
}

/// BMP requests address the lowest board in the mask as the SDP cpu.
fn lowest_board(board_mask: u32) -> u8 {
    if board_mask == 0 {
        0
    } else {
        board_mask.trailing_zeros() as u8
    }
}
