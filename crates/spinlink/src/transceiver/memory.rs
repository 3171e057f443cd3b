// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chunked memory reads and writes.
//!
//! Transfers split into 256-byte SCP messages at 256-byte boundaries; all
//! chunks of one call are in flight together and the call returns once every
//! response has arrived. Addresses advance monotonically, so the chunks of a
//! single call never overlap.

use std::collections::{BTreeMap, VecDeque};
use std::io::Read;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::UDP_MESSAGE_MAX_SIZE;
use crate::error::{Error, Result};
use crate::pipeline::{ResponseCallback, SubmitOptions};
use crate::protocol::{ChipCoord, CoreAddr, ScpRequest};
use crate::transceiver::{ErrorSink, Transceiver};

/// The chunks of a completed memory read, in address order.
#[derive(Debug, Default)]
pub struct MemoryChunks {
    chunks: VecDeque<Vec<u8>>,
}

impl MemoryChunks {
    fn new(chunks: Vec<Vec<u8>>) -> Self {
        MemoryChunks {
            chunks: chunks.into(),
        }
    }

    /// Total number of bytes across all chunks.
    #[must_use]
    pub fn n_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Concatenate into one buffer.
    #[must_use]
    pub fn concat(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.n_bytes());
        for chunk in self.chunks {
            out.extend_from_slice(&chunk);
        }
        out
    }
}

impl Iterator for MemoryChunks {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        self.chunks.pop_front()
    }
}

/// `(offset, size)` spans splitting `length` at 256-byte boundaries.
fn chunk_spans(length: u32) -> impl Iterator<Item = (u32, u32)> {
    let step = UDP_MESSAGE_MAX_SIZE as u32;
    (0..length)
        .step_by(UDP_MESSAGE_MAX_SIZE)
        .map(move |offset| (offset, (length - offset).min(step)))
}

impl Transceiver {
    /// Read `length` bytes from chip memory, returned as in-order chunks.
    pub fn read_memory(&self, x: u8, y: u8, base: u32, length: u32) -> Result<MemoryChunks> {
        self.read_chunked(x, y, length, "ReadMemory", |chip, offset, size| {
            ScpRequest::read_memory(chip, base + offset, size)
        })
    }

    /// Read chip memory through a specific link.
    pub fn read_link_memory(
        &self,
        x: u8,
        y: u8,
        link: u8,
        base: u32,
        length: u32,
    ) -> Result<MemoryChunks> {
        self.read_chunked(x, y, length, "ReadLink", move |chip, offset, size| {
            ScpRequest::read_link(chip, link, base + offset, size)
        })
    }

    fn read_chunked(
        &self,
        x: u8,
        y: u8,
        length: u32,
        operation: &'static str,
        build: impl Fn(ChipCoord, u32, u32) -> Result<ScpRequest>,
    ) -> Result<MemoryChunks> {
        self.ensure_open()?;
        if length == 0 {
            return Err(Error::InvalidParameter {
                field: "length",
                value: "0".to_string(),
                reason: "reads must cover at least one byte",
            });
        }
        let chip = ChipCoord::new(x, y);
        let link = self.link_for(chip)?;
        let chunks: Arc<Mutex<BTreeMap<usize, Vec<u8>>>> = Arc::new(Mutex::new(BTreeMap::new()));
        let errors = ErrorSink::new();

        for (index, (offset, size)) in chunk_spans(length).enumerate() {
            let request = build(chip, offset, size)?;
            let store = Arc::clone(&chunks);
            let on_success: ResponseCallback = Box::new(move |response| {
                let payload = response.payload();
                store
                    .lock()
                    .insert(index, payload[..payload.len().min(size as usize)].to_vec());
            });
            link.pipeline().submit(
                request,
                SubmitOptions::named(operation),
                Some(on_success),
                errors.callback(CoreAddr::new(x, y, 0)),
            )?;
        }
        link.pipeline().finish()?;
        errors.check()?;

        let chunks: Vec<Vec<u8>> = std::mem::take(&mut *chunks.lock()).into_values().collect();
        let total: usize = chunks.iter().map(Vec::len).sum();
        if total != length as usize {
            return Err(Error::MalformedPacket(format!(
                "read of {} bytes yielded {}",
                length, total
            )));
        }
        Ok(MemoryChunks::new(chunks))
    }

    /// Write a buffer to chip memory.
    pub fn write_memory(&self, x: u8, y: u8, base: u32, data: &[u8]) -> Result<()> {
        self.write_chunked(x, y, base, data, "WriteMemory", |chip, address, chunk| {
            ScpRequest::write_memory(chip, address, chunk)
        })
    }

    /// Write a little-endian integer of `width` bytes (1..=4) to chip memory.
    pub fn write_memory_int(&self, x: u8, y: u8, base: u32, value: u32, width: u8) -> Result<()> {
        if !(1..=4).contains(&width) {
            return Err(Error::InvalidParameter {
                field: "width",
                value: width.to_string(),
                reason: "integer writes are 1..=4 bytes",
            });
        }
        let bytes = value.to_le_bytes();
        self.write_memory(x, y, base, &bytes[..width as usize])
    }

    /// Stream `n_bytes` from a reader into chip memory.
    pub fn write_memory_from(
        &self,
        x: u8,
        y: u8,
        base: u32,
        reader: &mut dyn Read,
        n_bytes: u32,
    ) -> Result<()> {
        self.ensure_open()?;
        let chip = ChipCoord::new(x, y);
        let link = self.link_for(chip)?;
        let errors = ErrorSink::new();

        for (offset, size) in chunk_spans(n_bytes) {
            let mut chunk = vec![0u8; size as usize];
            reader.read_exact(&mut chunk).map_err(Error::Io)?;
            let request = ScpRequest::write_memory(chip, base + offset, chunk)?;
            link.pipeline().submit(
                request,
                SubmitOptions::named("WriteMemory"),
                None,
                errors.callback(CoreAddr::new(x, y, 0)),
            )?;
        }
        link.pipeline().finish()?;
        errors.check()
    }

    /// Write chip memory through a specific link.
    pub fn write_link_memory(
        &self,
        x: u8,
        y: u8,
        link_id: u8,
        base: u32,
        data: &[u8],
    ) -> Result<()> {
        self.write_chunked(x, y, base, data, "WriteLink", move |chip, address, chunk| {
            ScpRequest::write_link(chip, link_id, address, chunk)
        })
    }

    fn write_chunked(
        &self,
        x: u8,
        y: u8,
        base: u32,
        data: &[u8],
        operation: &'static str,
        build: impl Fn(ChipCoord, u32, Vec<u8>) -> Result<ScpRequest>,
    ) -> Result<()> {
        self.ensure_open()?;
        if data.is_empty() {
            return Err(Error::InvalidParameter {
                field: "data",
                value: "0".to_string(),
                reason: "writes must carry at least one byte",
            });
        }
        let chip = ChipCoord::new(x, y);
        let link = self.link_for(chip)?;
        let errors = ErrorSink::new();

        for (offset, size) in chunk_spans(data.len() as u32) {
            let chunk = data[offset as usize..(offset + size) as usize].to_vec();
            let request = build(chip, base + offset, chunk)?;
            link.pipeline().submit(
                request,
                SubmitOptions::named(operation),
                None,
                errors.callback(CoreAddr::new(x, y, 0)),
            )?;
        }
        link.pipeline().finish()?;
        errors.check()
    }

    /// Fill a word-aligned region with a repeated 32-bit value.
    pub fn fill_memory(&self, x: u8, y: u8, base: u32, value: u32, size: u32) -> Result<()> {
        self.ensure_open()?;
        if base % 4 != 0 {
            return Err(Error::InvalidParameter {
                field: "base",
                value: format!("{:#x}", base),
                reason: "fills must start on a word boundary",
            });
        }
        if size == 0 || size % 4 != 0 {
            return Err(Error::InvalidParameter {
                field: "size",
                value: size.to_string(),
                reason: "fills cover a positive whole number of words",
            });
        }
        let chip = ChipCoord::new(x, y);
        self.round_trip(
            chip,
            ScpRequest::fill(chip, base, value, size),
            SubmitOptions::named("Fill"),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_spans_cover_length() {
        let spans: Vec<(u32, u32)> = chunk_spans(1000).collect();
        assert_eq!(
            spans,
            vec![(0, 256), (256, 256), (512, 256), (768, 232)]
        );
        assert_eq!(spans.iter().map(|&(_, s)| s).sum::<u32>(), 1000);
    }

    #[test]
    fn test_chunk_spans_exact_boundary() {
        let spans: Vec<(u32, u32)> = chunk_spans(512).collect();
        assert_eq!(spans, vec![(0, 256), (256, 256)]);
    }

    #[test]
    fn test_chunk_spans_small() {
        assert_eq!(chunk_spans(5).collect::<Vec<_>>(), vec![(0, 5)]);
    }

    #[test]
    fn test_memory_chunks_iterate_and_concat() {
        let chunks = MemoryChunks::new(vec![vec![1, 2], vec![3], vec![4, 5]]);
        assert_eq!(chunks.n_bytes(), 5);
        assert_eq!(chunks.concat(), vec![1, 2, 3, 4, 5]);

        let mut chunks = MemoryChunks::new(vec![vec![1, 2], vec![3]]);
        assert_eq!(chunks.next(), Some(vec![1, 2]));
        assert_eq!(chunks.next(), Some(vec![3]));
        assert_eq!(chunks.next(), None);
    }
}
