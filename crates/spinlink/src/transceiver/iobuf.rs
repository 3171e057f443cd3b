// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IOBUF retrieval.
//!
//! Each core's IOBUF is a linked list of buffers in chip SDRAM. A buffer
//! starts with a 16-byte header: next-buffer address (u32), eight bytes of
//! timing fields, bytes-to-read (u32); the ASCII payload follows. The first
//! read of a buffer covers the header plus as much payload as fits; what it
//! learns queues follow-up reads (`extra_reads`) and the read of the next
//! buffer (`next_reads`). Rounds run until both queues are empty.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::UDP_MESSAGE_MAX_SIZE;
use crate::error::{Error, Result};
use crate::model::{CoreSubsets, IoBuffer};
use crate::pipeline::{ResponseCallback, SubmitOptions};
use crate::protocol::{ChipCoord, CoreAddr, ScpRequest};
use crate::transceiver::{ErrorSink, Transceiver};

/// Bytes of header before the ASCII payload of each buffer.
const IOBUF_HEADER_BYTES: usize = 16;

/// Offset of the next-buffer address in the header.
const OFF_NEXT_ADDRESS: usize = 0;

/// Offset of the bytes-to-read field in the header.
const OFF_BYTES_TO_READ: usize = 12;

/// A follow-up read filling part of an already-sized buffer.
struct ExtraRead {
    core: CoreAddr,
    buffer_index: u32,
    address: u32,
    size: u32,
    offset: usize,
}

/// The first read of a buffer in the chain.
struct NextRead {
    core: CoreAddr,
    buffer_index: u32,
    address: u32,
    first_read_size: u32,
}

#[derive(Default)]
struct IobufState {
    buffers: HashMap<CoreAddr, BTreeMap<u32, Vec<u8>>>,
    extra_reads: Vec<ExtraRead>,
    next_reads: Vec<NextRead>,
    malformed: Option<String>,
}

impl IobufState {
    /// Digest the first read of a buffer: size it, start filling it, and
    /// queue whatever else is needed.
    fn handle_first_read(&mut self, read: &NextRead, payload: &[u8]) {
        if payload.len() < IOBUF_HEADER_BYTES {
            self.malformed = Some(format!(
                "IOBUF header needs {} bytes, got {}",
                IOBUF_HEADER_BYTES,
                payload.len()
            ));
            return;
        }
        let word = |off: usize| {
            u32::from_le_bytes([
                payload[off],
                payload[off + 1],
                payload[off + 2],
                payload[off + 3],
            ])
        };
        let next_address = word(OFF_NEXT_ADDRESS);
        let bytes_to_read = word(OFF_BYTES_TO_READ) as usize;

        let mut buffer = vec![0u8; bytes_to_read];
        let carried = (payload.len() - IOBUF_HEADER_BYTES).min(bytes_to_read);
        buffer[..carried].copy_from_slice(&payload[IOBUF_HEADER_BYTES..IOBUF_HEADER_BYTES + carried]);
        self.buffers
            .entry(read.core)
            .or_default()
            .insert(read.buffer_index, buffer);

        // Queue reads for the part of this buffer the first packet missed.
        let mut remaining = bytes_to_read - carried;
        let mut address = read.address + (IOBUF_HEADER_BYTES + carried) as u32;
        let mut offset = carried;
        while remaining > 0 {
            let size = remaining.min(UDP_MESSAGE_MAX_SIZE);
            self.extra_reads.push(ExtraRead {
                core: read.core,
                buffer_index: read.buffer_index,
                address,
                size: size as u32,
                offset,
            });
            address += size as u32;
            offset += size;
            remaining -= size;
        }

        if next_address != 0 {
            self.next_reads.push(NextRead {
                core: read.core,
                buffer_index: read.buffer_index + 1,
                address: next_address,
                first_read_size: read.first_read_size,
            });
        }
    }

    fn handle_extra_read(&mut self, read: &ExtraRead, payload: &[u8]) {
        let Some(buffer) = self
            .buffers
            .get_mut(&read.core)
            .and_then(|chain| chain.get_mut(&read.buffer_index))
        else {
            return;
        };
        let end = (read.offset + payload.len()).min(buffer.len());
        if read.offset < end {
            buffer[read.offset..end].copy_from_slice(&payload[..end - read.offset]);
        }
    }
}

impl Transceiver {
    /// Read the IOBUF contents of the given cores.
    ///
    /// `None` reads every discovered core. Output order is arbitrary across
    /// cores; each core's buffers are concatenated in chain order.
    pub fn get_iobuf(&self, core_subsets: Option<&CoreSubsets>) -> Result<Vec<IoBuffer>> {
        self.ensure_open()?;
        let machine = self.machine().ok_or_else(|| {
            Error::UnsupportedOperation("IOBUF retrieval before machine discovery".to_string())
        })?;
        let subsets = match core_subsets {
            Some(subsets) => subsets.clone(),
            None => machine.all_cores(),
        };

        let state = Arc::new(Mutex::new(IobufState::default()));

        // Kick-start the chain walk from each core's vcpu block.
        for info in self.get_cpu_information(Some(&subsets))? {
            if info.iobuf_address == 0 {
                continue;
            }
            let chip = machine.chip(info.core.chip()).ok_or_else(|| {
                Error::UnsupportedOperation(format!("chip {} not discovered", info.core.chip()))
            })?;
            let first_read_size =
                (chip.iobuf_size as usize + IOBUF_HEADER_BYTES).min(UDP_MESSAGE_MAX_SIZE) as u32;
            state.lock().next_reads.push(NextRead {
                core: info.core,
                buffer_index: 0,
                address: info.iobuf_address,
                first_read_size,
            });
        }

        let errors = ErrorSink::new();
        loop {
            let (extra, next) = {
                let mut state = state.lock();
                (
                    std::mem::take(&mut state.extra_reads),
                    std::mem::take(&mut state.next_reads),
                )
            };
            if extra.is_empty() && next.is_empty() {
                break;
            }

            for read in extra {
                let core = read.core;
                let chip = ChipCoord::new(core.x, core.y);
                let link = self.link_for(chip)?;
                let request = ScpRequest::read_memory(chip, read.address, read.size)?;
                let shared = Arc::clone(&state);
                let on_success: ResponseCallback = Box::new(move |response| {
                    shared.lock().handle_extra_read(&read, response.payload());
                });
                link.pipeline().submit(
                    request,
                    SubmitOptions::named("ReadMemory"),
                    Some(on_success),
                    errors.callback(core),
                )?;
            }
            for read in next {
                let core = read.core;
                let chip = ChipCoord::new(core.x, core.y);
                let link = self.link_for(chip)?;
                let request =
                    ScpRequest::read_memory(chip, read.address, read.first_read_size)?;
                let shared = Arc::clone(&state);
                let on_success: ResponseCallback = Box::new(move |response| {
                    shared.lock().handle_first_read(&read, response.payload());
                });
                link.pipeline().submit(
                    request,
                    SubmitOptions::named("ReadMemory"),
                    Some(on_success),
                    errors.callback(core),
                )?;
            }

            for link in self.links_snapshot() {
                link.pipeline().finish()?;
            }
        }
        errors.check()?;

        let mut state = state.lock();
        if let Some(reason) = state.malformed.take() {
            return Err(Error::MalformedPacket(reason));
        }

        let mut output = Vec::new();
        for core in subsets.cores() {
            let chains = state.buffers.remove(&core).unwrap_or_default();
            let mut contents = String::new();
            for (_, buffer) in chains {
                contents.push_str(&String::from_utf8_lossy(&buffer));
            }
            output.push(IoBuffer::new(core, contents));
        }
        Ok(output)
    }
}
