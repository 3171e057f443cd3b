// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SCP command, result and signal vocabularies.
//!
//! Opcode and result-code values are the SCAMP/BMP constants; they appear
//! nowhere else in the crate.

// =======================================================================
// Commands
// =======================================================================

/// SCP command opcodes understood by SCAMP and the BMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ScpCommand {
    /// Read software version (SCAMP and BMP).
    Version = 0,
    /// Run code at an address.
    Run = 1,
    /// Read memory.
    Read = 2,
    /// Write memory.
    Write = 3,
    /// Load and start an APLX image.
    Aplx = 4,
    /// Fill memory with a repeated word.
    Fill = 5,
    /// Remap a faulty core.
    Remap = 16,
    /// Read memory via an inter-chip link (FPGA register read on a BMP).
    LinkRead = 17,
    /// Write memory via an inter-chip link (FPGA register write on a BMP).
    LinkWrite = 18,
    /// Start an application on a set of cores.
    ApplicationRun = 19,
    /// Nearest-neighbour packet (flood-fill start/end).
    NearestNeighbourPacket = 20,
    /// Configure point-to-point routing.
    P2pConfigure = 21,
    /// Send a signal to applications, or count cores in a state.
    Signal = 22,
    /// Flood-fill data block.
    FloodFillData = 23,
    /// Stop an application and clean up its resources.
    AppStop = 24,
    /// Control the LEDs of a chip.
    Led = 25,
    /// Set, get or clear an IP tag.
    IpTag = 26,
    /// Access the serial ROM.
    Srom = 27,
    /// Allocate SDRAM or router entries.
    Alloc = 28,
    /// Initialize, clear or load the router.
    Router = 29,
    /// Router diagnostic (DPRI) control.
    Dpri = 30,
    /// Chip summary information.
    Info = 31,
    /// BMP board information (serial, CAN status, ADC).
    BmpInfo = 48,
    /// Copy between flash buffers (BMP).
    FlashCopy = 49,
    /// Erase flash (BMP).
    FlashErase = 50,
    /// Write flash (BMP).
    FlashWrite = 51,
    /// Reset boards (BMP).
    Reset = 55,
    /// Power boards on or off (BMP).
    Power = 57,
    /// Tube (host console) output.
    Tube = 64,
}

impl ScpCommand {
    /// Wire value of the opcode.
    #[must_use]
    pub fn value(self) -> u16 {
        self as u16
    }
}

// =======================================================================
// Result codes
// =======================================================================

/// SCP response result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScpResult {
    /// Command completed.
    Ok,
    /// Bad packet length.
    Len,
    /// Bad checksum.
    Sum,
    /// Bad or unsupported command.
    Cmd,
    /// Invalid arguments.
    Arg,
    /// Bad port number.
    Port,
    /// Monitor timeout talking to the target core.
    Timeout,
    /// No route to the destination.
    Route,
    /// Bad CPU number.
    Cpu,
    /// Target core is dead.
    Dead,
    /// No free packet buffers.
    Buf,
    /// No reply to an open point-to-point request.
    P2pNoReply,
    /// Point-to-point request rejected by the target monitor.
    P2pReject,
    /// Target monitor is busy.
    P2pBusy,
    /// Point-to-point delivery timed out.
    P2pTimeout,
    /// Packet transmission failed.
    PktTx,
    /// A code this library does not know.
    Unrecognised(u16),
}

impl ScpResult {
    /// Decode a result code from its wire value.
    #[must_use]
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x80 => ScpResult::Ok,
            0x81 => ScpResult::Len,
            0x82 => ScpResult::Sum,
            0x83 => ScpResult::Cmd,
            0x84 => ScpResult::Arg,
            0x85 => ScpResult::Port,
            0x86 => ScpResult::Timeout,
            0x87 => ScpResult::Route,
            0x88 => ScpResult::Cpu,
            0x89 => ScpResult::Dead,
            0x8A => ScpResult::Buf,
            0x8B => ScpResult::P2pNoReply,
            0x8C => ScpResult::P2pReject,
            0x8D => ScpResult::P2pBusy,
            0x8E => ScpResult::P2pTimeout,
            0x8F => ScpResult::PktTx,
            other => ScpResult::Unrecognised(other),
        }
    }

    /// Wire value of the result code.
    #[must_use]
    pub fn value(self) -> u16 {
        match self {
            ScpResult::Ok => 0x80,
            ScpResult::Len => 0x81,
            ScpResult::Sum => 0x82,
            ScpResult::Cmd => 0x83,
            ScpResult::Arg => 0x84,
            ScpResult::Port => 0x85,
            ScpResult::Timeout => 0x86,
            ScpResult::Route => 0x87,
            ScpResult::Cpu => 0x88,
            ScpResult::Dead => 0x89,
            ScpResult::Buf => 0x8A,
            ScpResult::P2pNoReply => 0x8B,
            ScpResult::P2pReject => 0x8C,
            ScpResult::P2pBusy => 0x8D,
            ScpResult::P2pTimeout => 0x8E,
            ScpResult::PktTx => 0x8F,
            ScpResult::Unrecognised(v) => v,
        }
    }

    /// Canonical RC_* name, used in retry-reason histories.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ScpResult::Ok => "RC_OK",
            ScpResult::Len => "RC_LEN",
            ScpResult::Sum => "RC_SUM",
            ScpResult::Cmd => "RC_CMD",
            ScpResult::Arg => "RC_ARG",
            ScpResult::Port => "RC_PORT",
            ScpResult::Timeout => "RC_TIMEOUT",
            ScpResult::Route => "RC_ROUTE",
            ScpResult::Cpu => "RC_CPU",
            ScpResult::Dead => "RC_DEAD",
            ScpResult::Buf => "RC_BUF",
            ScpResult::P2pNoReply => "RC_P2P_NOREPLY",
            ScpResult::P2pReject => "RC_P2P_REJECT",
            ScpResult::P2pBusy => "RC_P2P_BUSY",
            ScpResult::P2pTimeout => "RC_P2P_TIMEOUT",
            ScpResult::PktTx => "RC_PKT_TX",
            ScpResult::Unrecognised(_) => "RC_UNRECOGNISED",
        }
    }
}

/// Response codes retried by default: the transient delivery failures.
pub const DEFAULT_RETRY_CODES: &[ScpResult] = &[
    ScpResult::Timeout,
    ScpResult::P2pTimeout,
    ScpResult::Len,
    ScpResult::P2pNoReply,
];

// =======================================================================
// SDP flags
// =======================================================================

/// SDP flag byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SdpFlag {
    /// No reply is expected to this message.
    ReplyNotExpected = 0x07,
    /// A reply is expected to this message.
    ReplyExpected = 0x87,
}

impl SdpFlag {
    /// Decode a flag byte; anything without the reply bit is "no reply".
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        if value & 0x80 != 0 {
            SdpFlag::ReplyExpected
        } else {
            SdpFlag::ReplyNotExpected
        }
    }
}

// =======================================================================
// Signals
// =======================================================================

/// How a signal propagates across the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// Delivered over the multicast fabric.
    Multicast,
    /// Delivered point-to-point to each monitor.
    PointToPoint,
    /// Delivered by nearest-neighbour broadcast.
    NearestNeighbour,
}

impl SignalType {
    /// Wire value carried in argument 1 of a Signal request.
    #[must_use]
    pub fn value(self) -> u32 {
        match self {
            SignalType::Multicast => 0,
            SignalType::PointToPoint => 1,
            SignalType::NearestNeighbour => 2,
        }
    }
}

/// Signals that can be sent to an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Signal {
    /// Re-initialise the application.
    Initialise = 0,
    /// Power down the cores.
    PowerDown = 1,
    /// Stop the application dead.
    Stop = 2,
    /// Start the application.
    Start = 3,
    /// Synchronisation barrier 0.
    Sync0 = 4,
    /// Synchronisation barrier 1.
    Sync1 = 5,
    /// Pause execution.
    Pause = 6,
    /// Continue after a pause.
    Continue = 7,
    /// Ask the application to exit.
    Exit = 8,
    /// Timer tick.
    Timer = 9,
    /// Application-defined signal 0.
    User0 = 10,
    /// Application-defined signal 1.
    User1 = 11,
    /// Application-defined signal 2.
    User2 = 12,
    /// Application-defined signal 3.
    User3 = 13,
}

impl Signal {
    /// Wire value of the signal.
    #[must_use]
    pub fn value(self) -> u32 {
        self as u32
    }

    /// Propagation type SCAMP requires for this signal.
    #[must_use]
    pub fn signal_type(self) -> SignalType {
        match self {
            Signal::Initialise | Signal::PowerDown | Signal::Stop | Signal::Exit => {
                SignalType::NearestNeighbour
            }
            _ => SignalType::Multicast,
        }
    }
}

// =======================================================================
// Core states
// =======================================================================

/// States a core can report in its vcpu block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CpuState {
    /// Core is dead.
    Dead = 0,
    /// Core is powered down.
    PoweredDown = 1,
    /// Core hit a runtime exception.
    RunTimeException = 2,
    /// Core was reset by the watchdog.
    Watchdog = 3,
    /// Core is initialising.
    Initialising = 4,
    /// Core is ready to run.
    Ready = 5,
    /// Core is in its C main.
    CMain = 6,
    /// Core is running an application.
    Running = 7,
    /// Core is waiting at barrier 0.
    Sync0 = 8,
    /// Core is waiting at barrier 1.
    Sync1 = 9,
    /// Core is paused.
    Paused = 10,
    /// Core finished its application.
    Finished = 11,
    /// Reserved state 12.
    CpuState12 = 12,
    /// Reserved state 13.
    CpuState13 = 13,
    /// Reserved state 14.
    CpuState14 = 14,
    /// Core is idle (SARK only).
    Idle = 15,
}

impl CpuState {
    /// Decode a state byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CpuState::Dead),
            1 => Some(CpuState::PoweredDown),
            2 => Some(CpuState::RunTimeException),
            3 => Some(CpuState::Watchdog),
            4 => Some(CpuState::Initialising),
            5 => Some(CpuState::Ready),
            6 => Some(CpuState::CMain),
            7 => Some(CpuState::Running),
            8 => Some(CpuState::Sync0),
            9 => Some(CpuState::Sync1),
            10 => Some(CpuState::Paused),
            11 => Some(CpuState::Finished),
            12 => Some(CpuState::CpuState12),
            13 => Some(CpuState::CpuState13),
            14 => Some(CpuState::CpuState14),
            15 => Some(CpuState::Idle),
            _ => None,
        }
    }

    /// Wire value of the state.
    #[must_use]
    pub fn value(self) -> u8 {
        self as u8
    }
}

// =======================================================================
// BMP vocabularies
// =======================================================================

/// Power commands accepted by a BMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PowerCommand {
    /// Power the boards off.
    PowerOff = 0,
    /// Power the boards on.
    PowerOn = 1,
}

/// LED actions for chip and BMP LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LedAction {
    /// Flip the LED state.
    Toggle = 1,
    /// Turn the LED off.
    Off = 2,
    /// Turn the LED on.
    On = 3,
}

/// BMP information categories (argument 1 of BmpInfo).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BmpInfoType {
    /// Board serial number.
    Serial = 0,
    /// CAN bus status.
    CanStatus = 2,
    /// ADC (voltage/temperature) readings.
    Adc = 3,
    /// Board IP address.
    IpAddress = 4,
}

/// Sub-operations of the IpTag command (bits 16..18 of argument 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IpTagCommand {
    /// Allocate a new transient tag.
    New = 0,
    /// Set a tag.
    Set = 1,
    /// Get a tag descriptor.
    Get = 2,
    /// Clear a tag.
    Clear = 3,
    /// Set the tag timeout.
    Timeout = 4,
}

/// Sub-operations of the Alloc command (low byte of argument 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AllocOperation {
    /// Allocate SDRAM.
    AllocSdram = 0,
    /// Free SDRAM by pointer.
    FreeSdramByPointer = 1,
    /// Free SDRAM by application id.
    FreeSdramByAppId = 2,
    /// Allocate router entries.
    AllocRouting = 3,
    /// Free router entries by position.
    FreeRoutingByPosition = 4,
    /// Free router entries by application id.
    FreeRoutingByAppId = 5,
}

/// Sub-operations of the Router command (low byte of argument 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RouterOperation {
    /// Initialize the router.
    Init = 0,
    /// Clear all entries.
    Clear = 1,
    /// Load a table image staged in SDRAM.
    Load = 2,
    /// Set a fixed route.
    FixedRoute = 3,
}
