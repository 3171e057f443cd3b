// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A scriptable mock SCAMP monitor on a local UDP socket.
//!
//! Tests point a transceiver or a bare pipeline at the mock's address and
//! script its behaviour per received request. A behaviour can answer
//! immediately, answer with a failure code, answer late, or drop the
//! request on the floor.

#![allow(dead_code)] // Each integration test binary uses a subset of this.

use std::collections::{BTreeMap, HashMap};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use spinlink::config::{SYSTEM_VARIABLE_BASE_ADDRESS, UDP_MESSAGE_MAX_SIZE};
use spinlink::protocol::sysvar::SystemVariables;
use spinlink::{ChipCoord, CoreAddr, ScpCommand, VersionInfo};

/// One request as the mock saw it on the wire.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub command: u16,
    pub sequence: u16,
    pub arg1: u32,
    pub arg2: u32,
    pub arg3: u32,
    pub payload: Vec<u8>,
    pub dest_x: u8,
    pub dest_y: u8,
    pub dest_cpu: u8,
}

/// What the mock does with one request.
pub enum Reply {
    /// RC_OK with a payload.
    Ok(Vec<u8>),
    /// A specific result code with a payload.
    Code(u16, Vec<u8>),
    /// RC_OK with a payload, sent after a delay.
    Late(Duration, Vec<u8>),
    /// RC_OK now, then the identical frame again after a delay.
    OkAndLateDuplicate(Vec<u8>, Duration),
    /// No reply at all.
    Drop,
}

pub type Behaviour = Arc<dyn Fn(&SeenRequest) -> Reply + Send + Sync>;

/// RC_OK wire value.
pub const RC_OK: u16 = 0x80;
/// RC_TIMEOUT wire value.
pub const RC_TIMEOUT: u16 = 0x86;

pub struct MockScamp {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockScamp {
    /// Start a mock with the given behaviour.
    pub fn start(behaviour: Behaviour) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind mock");
        socket
            .set_read_timeout(Some(Duration::from_millis(50)))
            .expect("timeout");
        let addr = socket.local_addr().expect("mock addr");
        let seen: Arc<Mutex<Vec<SeenRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let seen = Arc::clone(&seen);
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || {
                let mut buf = [0u8; 512];
                while !shutdown.load(Ordering::Acquire) {
                    let (len, source) = match socket.recv_from(&mut buf) {
                        Ok(received) => received,
                        Err(_) => continue,
                    };
                    let Some(request) = parse_request(&buf[..len]) else {
                        continue;
                    };
                    seen.lock().push(request.clone());
                    match behaviour(&request) {
                        Reply::Ok(payload) => {
                            let frame = reply_frame(request.sequence, RC_OK, &payload);
                            let _ = socket.send_to(&frame, source);
                        }
                        Reply::Code(code, payload) => {
                            let frame = reply_frame(request.sequence, code, &payload);
                            let _ = socket.send_to(&frame, source);
                        }
                        Reply::Late(delay, payload) => {
                            let socket = socket.try_clone().expect("clone mock socket");
                            let sequence = request.sequence;
                            std::thread::spawn(move || {
                                std::thread::sleep(delay);
                                let frame = reply_frame(sequence, RC_OK, &payload);
                                let _ = socket.send_to(&frame, source);
                            });
                        }
                        Reply::OkAndLateDuplicate(payload, delay) => {
                            let frame = reply_frame(request.sequence, RC_OK, &payload);
                            let _ = socket.send_to(&frame, source);
                            let socket = socket.try_clone().expect("clone mock socket");
                            std::thread::spawn(move || {
                                std::thread::sleep(delay);
                                let _ = socket.send_to(&frame, source);
                            });
                        }
                        Reply::Drop => {}
                    }
                }
            })
        };

        MockScamp {
            addr,
            seen,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Requests seen so far.
    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }

    /// Requests seen so far with the given command.
    pub fn seen_command(&self, command: ScpCommand) -> Vec<SeenRequest> {
        self.seen()
            .into_iter()
            .filter(|r| r.command == command.value())
            .collect()
    }
}

impl Drop for MockScamp {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn parse_request(frame: &[u8]) -> Option<SeenRequest> {
    if frame.len() < 26 {
        return None;
    }
    let u16_at = |off: usize| u16::from_le_bytes([frame[off], frame[off + 1]]);
    let u32_at =
        |off: usize| u32::from_le_bytes([frame[off], frame[off + 1], frame[off + 2], frame[off + 3]]);
    Some(SeenRequest {
        command: u16_at(10),
        sequence: u16_at(12),
        arg1: u32_at(14),
        arg2: u32_at(18),
        arg3: u32_at(22),
        payload: frame[26..].to_vec(),
        dest_x: frame[7],
        dest_y: frame[6],
        dest_cpu: frame[4] & 0x1F,
    })
}

/// Frame a response: pad bytes, SDP header, result, sequence, payload.
pub fn reply_frame(sequence: u16, result: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; 10];
    frame[2] = 0x07; // flags: no reply expected
    frame.extend_from_slice(&result.to_le_bytes());
    frame.extend_from_slice(&sequence.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

// =======================================================================
// A mock board with per-chip memory and a link map
// =======================================================================

/// Per-chip address spaces plus the inter-chip link graph.
#[derive(Default)]
pub struct MockBoard {
    memory: Mutex<HashMap<(u8, u8), BTreeMap<u32, u8>>>,
    links: Mutex<HashMap<(u8, u8, u8), (u8, u8)>>,
}

impl MockBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(MockBoard::default())
    }

    /// Write bytes into a chip's address space.
    pub fn seed_bytes(&self, chip: (u8, u8), base: u32, data: &[u8]) {
        let mut memory = self.memory.lock();
        let space = memory.entry(chip).or_default();
        for (i, &byte) in data.iter().enumerate() {
            space.insert(base + i as u32, byte);
        }
    }

    /// Install a chip's system-variable block at the standard address.
    pub fn seed_sysvar(&self, vars: &SystemVariables) {
        self.seed_bytes(
            (vars.chip.x, vars.chip.y),
            SYSTEM_VARIABLE_BASE_ADDRESS,
            &vars.encode(),
        );
    }

    /// Declare a working link between two chips (one direction).
    pub fn seed_link(&self, from: (u8, u8), link: u8, to: (u8, u8)) {
        self.links.lock().insert((from.0, from.1, link), to);
    }

    /// Read bytes out of a chip's address space (zero-filled gaps).
    pub fn read_bytes(&self, chip: (u8, u8), base: u32, len: u32) -> Vec<u8> {
        let memory = self.memory.lock();
        let space = memory.get(&chip);
        (0..len)
            .map(|i| {
                space
                    .and_then(|s| s.get(&(base + i)).copied())
                    .unwrap_or(0)
            })
            .collect()
    }

    /// The standard behaviour: Version, Read, Write and LinkRead served
    /// from the seeded state; everything else answers RC_OK empty.
    pub fn behaviour(self: &Arc<Self>) -> Behaviour {
        let board = Arc::clone(self);
        Arc::new(move |request| {
            let chip = (request.dest_x, request.dest_y);
            match request.command {
                c if c == ScpCommand::Version.value() => {
                    let info = VersionInfo {
                        name: "SC&MP".to_string(),
                        hardware: "SpiNNaker".to_string(),
                        version: (1, 33),
                        core: CoreAddr::new(request.dest_x, request.dest_y, request.dest_cpu),
                        physical_cpu: 0,
                        build_date: 0,
                        buffer_size: UDP_MESSAGE_MAX_SIZE as u16,
                    };
                    Reply::Ok(info.encode_payload())
                }
                c if c == ScpCommand::Read.value() => {
                    Reply::Ok(board.read_bytes(chip, request.arg1, request.arg2))
                }
                c if c == ScpCommand::Write.value() => {
                    board.seed_bytes(chip, request.arg1, &request.payload);
                    Reply::Ok(Vec::new())
                }
                c if c == ScpCommand::LinkRead.value() => {
                    let link = request.arg3 as u8;
                    let target = board.links.lock().get(&(chip.0, chip.1, link)).copied();
                    match target {
                        Some(neighbour) => {
                            Reply::Ok(board.read_bytes(neighbour, request.arg1, request.arg2))
                        }
                        None => Reply::Drop,
                    }
                }
                _ => Reply::Ok(Vec::new()),
            }
        })
    }
}

/// System variables for one chip of a `width` x `height` mock machine.
pub fn sysvar_for(chip: ChipCoord, dims: (u8, u8), links_available: u8) -> SystemVariables {
    let mut vars = SystemVariables::default();
    vars.chip = chip;
    vars.dims = dims;
    vars.nearest_ethernet = ChipCoord::new(0, 0);
    vars.links_available = links_available;
    vars
}
