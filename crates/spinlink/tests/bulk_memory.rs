// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chunked memory transfers against a mock board with real address spaces.

mod common;

use std::time::Duration;

use common::{MockBoard, MockScamp};
use spinlink::pipeline::PipelineConfig;
use spinlink::{ScpCommand, Transceiver};

fn transceiver_for(mock: &MockScamp) -> Transceiver {
    Transceiver::builder("127.0.0.1".parse().expect("ip"))
        .scamp_port(mock.addr.port())
        .without_boot()
        .pipeline_config(PipelineConfig {
            packet_timeout: Duration::from_millis(200),
            ..PipelineConfig::default()
        })
        .build()
        .expect("transceiver")
}

#[test]
fn test_chunked_write_shapes() {
    let board = MockBoard::new();
    let mock = MockScamp::start(board.behaviour());
    let txrx = transceiver_for(&mock);

    txrx.write_memory(1, 1, 0x7000_0000, &vec![0u8; 1000])
        .expect("write");

    let writes = mock.seen_command(ScpCommand::Write);
    assert_eq!(writes.len(), 4, "1000 bytes split into 4 messages");
    let sizes: Vec<u32> = writes.iter().map(|w| w.arg2).collect();
    assert_eq!(sizes, vec![256, 256, 256, 232]);
    let bases: Vec<u32> = writes.iter().map(|w| w.arg1).collect();
    assert_eq!(
        bases,
        vec![0x7000_0000, 0x7000_0100, 0x7000_0200, 0x7000_0300]
    );
    for write in &writes {
        assert_eq!(write.dest_x, 1);
        assert_eq!(write.dest_y, 1);
        assert_eq!(write.payload.len() as u32, write.arg2);
    }
}

#[test]
fn test_write_read_round_trip() {
    let board = MockBoard::new();
    let mock = MockScamp::start(board.behaviour());
    let txrx = transceiver_for(&mock);

    let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 251) as u8).collect();
    txrx.write_memory(0, 1, 0x6040_0000, &data).expect("write");
    let read_back = txrx
        .read_memory(0, 1, 0x6040_0000, data.len() as u32)
        .expect("read")
        .concat();
    assert_eq!(read_back, data);
}

#[test]
fn test_read_yields_exact_length() {
    let board = MockBoard::new();
    board.seed_bytes((0, 0), 0x6100_0000, &[0xAB; 700]);
    let mock = MockScamp::start(board.behaviour());
    let txrx = transceiver_for(&mock);

    let chunks = txrx.read_memory(0, 0, 0x6100_0000, 700).expect("read");
    let mut total = 0;
    let mut chunk_sizes = Vec::new();
    for chunk in chunks {
        total += chunk.len();
        chunk_sizes.push(chunk.len());
    }
    assert_eq!(total, 700);
    assert_eq!(chunk_sizes, vec![256, 256, 188]);
}

#[test]
fn test_write_memory_int_width() {
    let board = MockBoard::new();
    let mock = MockScamp::start(board.behaviour());
    let txrx = transceiver_for(&mock);

    txrx.write_memory_int(0, 0, 0x6000_0000, 0xAABB_CCDD, 2)
        .expect("write");
    assert_eq!(board.read_bytes((0, 0), 0x6000_0000, 2), vec![0xDD, 0xCC]);
    assert!(txrx.write_memory_int(0, 0, 0, 1, 5).is_err());
}

#[test]
fn test_write_from_reader() {
    let board = MockBoard::new();
    let mock = MockScamp::start(board.behaviour());
    let txrx = transceiver_for(&mock);

    let data: Vec<u8> = (0..600u32).map(|i| (i % 256) as u8).collect();
    let mut reader = std::io::Cursor::new(data.clone());
    txrx.write_memory_from(2, 0, 0x6200_0000, &mut reader, 600)
        .expect("write");
    assert_eq!(board.read_bytes((2, 0), 0x6200_0000, 600), data);
}

#[test]
fn test_flood_fill_ordering() {
    let board = MockBoard::new();
    let mock = MockScamp::start(board.behaviour());
    let txrx = transceiver_for(&mock);

    txrx.write_memory_flood(0x6780_0000, &vec![0x5A; 600])
        .expect("flood");

    let seen = mock.seen();
    let first_nnp = seen
        .iter()
        .position(|r| r.command == ScpCommand::NearestNeighbourPacket.value())
        .expect("flood fill start sent");
    let last_nnp = seen
        .iter()
        .rposition(|r| r.command == ScpCommand::NearestNeighbourPacket.value())
        .expect("flood fill end sent");
    let data_blocks: Vec<usize> = seen
        .iter()
        .enumerate()
        .filter(|(_, r)| r.command == ScpCommand::FloodFillData.value())
        .map(|(i, _)| i)
        .collect();

    assert_eq!(data_blocks.len(), 3, "600 bytes in 256-byte blocks");
    assert!(
        data_blocks.iter().all(|&i| i > first_nnp && i < last_nnp),
        "data must sit between start and end"
    );

    // Block numbers count up from 0 in the request header.
    let block_numbers: Vec<u32> = seen
        .iter()
        .filter(|r| r.command == ScpCommand::FloodFillData.value())
        .map(|r| (r.arg2 >> 16) & 0xFF)
        .collect();
    assert_eq!(block_numbers, vec![0, 1, 2]);
}
