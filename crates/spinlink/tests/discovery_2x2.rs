// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery of a mocked 2x2 machine, and the operations that build on the
//! discovered topology.

mod common;

use std::time::Duration;

use common::{sysvar_for, MockBoard, MockScamp};
use spinlink::config::CPU_INFO_BYTES;
use spinlink::pipeline::PipelineConfig;
use spinlink::{ChipCoord, CoreAddr, CoreSubsets, CpuInfo, CpuState, Transceiver};

fn transceiver_for(mock: &MockScamp) -> Transceiver {
    Transceiver::builder("127.0.0.1".parse().expect("ip"))
        .scamp_port(mock.addr.port())
        .without_boot()
        .pipeline_config(PipelineConfig {
            packet_timeout: Duration::from_millis(100),
            ..PipelineConfig::default()
        })
        .build()
        .expect("transceiver")
}

/// A 2x2 board: chip 0,0 declares links 0, 1 and 2 to its three
/// neighbours; the neighbours declare no links of their own.
fn two_by_two() -> std::sync::Arc<MockBoard> {
    let board = MockBoard::new();
    board.seed_sysvar(&sysvar_for(ChipCoord::new(0, 0), (2, 2), 0b0000_0111));
    board.seed_sysvar(&sysvar_for(ChipCoord::new(1, 0), (2, 2), 0));
    board.seed_sysvar(&sysvar_for(ChipCoord::new(1, 1), (2, 2), 0));
    board.seed_sysvar(&sysvar_for(ChipCoord::new(0, 1), (2, 2), 0));
    board.seed_link((0, 0), 0, (1, 0));
    board.seed_link((0, 0), 1, (1, 1));
    board.seed_link((0, 0), 2, (0, 1));
    board
}

#[test]
fn test_discovers_two_by_two_machine() {
    let board = two_by_two();
    let mock = MockScamp::start(board.behaviour());
    let txrx = transceiver_for(&mock);

    let machine = txrx.discover_machine().expect("discovery");
    assert_eq!(machine.n_chips(), 4);
    assert_eq!((machine.width(), machine.height()), (2, 2));

    // The declared links.
    let origin = machine.chip(ChipCoord::new(0, 0)).expect("chip 0,0");
    assert_eq!(
        origin.router.link(0).expect("link 0").destination,
        ChipCoord::new(1, 0)
    );
    assert_eq!(
        origin.router.link(1).expect("link 1").destination,
        ChipCoord::new(1, 1)
    );
    assert_eq!(
        origin.router.link(2).expect("link 2").destination,
        ChipCoord::new(0, 1)
    );
    assert!(origin.router.link(3).is_none());

    // The patched opposite-link defaults.
    assert_eq!(
        machine
            .chip(ChipCoord::new(1, 0))
            .and_then(|c| c.router.link(3))
            .expect("patched link")
            .destination,
        ChipCoord::new(0, 0)
    );
    assert_eq!(
        machine
            .chip(ChipCoord::new(1, 1))
            .and_then(|c| c.router.link(4))
            .expect("patched link")
            .destination,
        ChipCoord::new(0, 0)
    );
    assert_eq!(
        machine
            .chip(ChipCoord::new(0, 1))
            .and_then(|c| c.router.link(5))
            .expect("patched link")
            .destination,
        ChipCoord::new(0, 0)
    );

    // Exactly the declared links and their opposites, nothing more.
    assert_eq!(machine.n_links(), 6);
}

#[test]
fn test_scamp_version_verification() {
    let board = two_by_two();
    let mock = MockScamp::start(board.behaviour());
    let txrx = transceiver_for(&mock);

    let version = txrx.verified_scamp_version().expect("version");
    assert_eq!(version.name, "SC&MP");
    assert_eq!(version.version.0, 1);
    assert_eq!(version.hardware, "SpiNNaker");
}

#[test]
fn test_machine_dimensions() {
    let board = two_by_two();
    let mock = MockScamp::start(board.behaviour());
    let txrx = transceiver_for(&mock);
    assert_eq!(txrx.get_machine_dimensions().expect("dims"), (2, 2));
}

#[test]
fn test_cpu_information_for_subset() {
    let board = two_by_two();

    // Seed a vcpu block for core 1,0,2.
    let vars = sysvar_for(ChipCoord::new(1, 0), (2, 2), 0);
    let mut info = CpuInfo::default();
    info.core = CoreAddr::new(1, 0, 2);
    info.state = CpuState::Running;
    info.application_id = 30;
    info.application_name = "blinker".to_string();
    board.seed_bytes(
        (1, 0),
        vars.cpu_info_base + CPU_INFO_BYTES * 2,
        &info.encode(),
    );

    let mock = MockScamp::start(board.behaviour());
    let txrx = transceiver_for(&mock);
    txrx.discover_machine().expect("discovery");

    let mut subsets = CoreSubsets::new();
    subsets.add_core(CoreAddr::new(1, 0, 2));
    let infos = txrx
        .get_cpu_information(Some(&subsets))
        .expect("cpu information");
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].state, CpuState::Running);
    assert_eq!(infos[0].application_id, 30);
    assert_eq!(infos[0].application_name, "blinker");
}

#[test]
fn test_iobuf_follows_buffer_chain() {
    let board = two_by_two();
    let vars = sysvar_for(ChipCoord::new(0, 1), (2, 2), 0);

    // Two chained buffers: "hello, " then "world".
    let first_base = 0x6050_0000u32;
    let second_base = 0x6050_8000u32;
    let mut first = Vec::new();
    first.extend_from_slice(&second_base.to_le_bytes());
    first.extend_from_slice(&[0u8; 8]);
    first.extend_from_slice(&7u32.to_le_bytes());
    first.extend_from_slice(b"hello, ");
    board.seed_bytes((0, 1), first_base, &first);

    let mut second = Vec::new();
    second.extend_from_slice(&0u32.to_le_bytes());
    second.extend_from_slice(&[0u8; 8]);
    second.extend_from_slice(&5u32.to_le_bytes());
    second.extend_from_slice(b"world");
    board.seed_bytes((0, 1), second_base, &second);

    let mut info = CpuInfo::default();
    info.core = CoreAddr::new(0, 1, 1);
    info.state = CpuState::Running;
    info.iobuf_address = first_base;
    board.seed_bytes(
        (0, 1),
        vars.cpu_info_base + CPU_INFO_BYTES,
        &info.encode(),
    );

    let mock = MockScamp::start(board.behaviour());
    let txrx = transceiver_for(&mock);
    txrx.discover_machine().expect("discovery");

    let mut subsets = CoreSubsets::new();
    subsets.add_core(CoreAddr::new(0, 1, 1));
    let iobufs = txrx.get_iobuf(Some(&subsets)).expect("iobuf");
    assert_eq!(iobufs.len(), 1);
    assert_eq!(iobufs[0].core, CoreAddr::new(0, 1, 1));
    assert_eq!(iobufs[0].contents, "hello, world");
}
