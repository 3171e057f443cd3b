// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end pipeline behaviour against a scripted mock monitor:
//! sequence matching, retry-code resends, timeout exhaustion, and the
//! outstanding-request window.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use common::{MockScamp, Reply, RC_TIMEOUT};
use spinlink::pipeline::{PipelineConfig, RequestPipeline, SequenceAllocator, SubmitOptions};
use spinlink::protocol::ScpRequest;
use spinlink::transport::udp::{Capabilities, UdpEndpoint};
use spinlink::{ChipCoord, Error, ScpCommand, Transceiver};

fn pipeline_to(mock: &MockScamp, config: PipelineConfig) -> RequestPipeline {
    let endpoint = UdpEndpoint::connect(
        mock.addr,
        Some(ChipCoord::new(0, 0)),
        Capabilities::scamp(),
    )
    .expect("endpoint");
    RequestPipeline::new(
        Arc::new(endpoint),
        Arc::new(SequenceAllocator::new()),
        config,
    )
}

fn read_request(base: u32, size: u32) -> ScpRequest {
    ScpRequest::read_memory(ChipCoord::new(0, 0), base, size).expect("valid read")
}

#[test]
fn test_sequence_round_trip() {
    // The mock echoes argument 1 back as the payload of a ReadMemory reply.
    let mock = MockScamp::start(Arc::new(|request| {
        Reply::Ok(request.arg1.to_le_bytes().to_vec())
    }));

    let txrx = Transceiver::builder("127.0.0.1".parse().expect("ip"))
        .scamp_port(mock.addr.port())
        .without_boot()
        .build()
        .expect("transceiver");

    let data = txrx
        .read_memory(0, 0, 0xDEAD_BEEF, 4)
        .expect("read")
        .concat();
    assert_eq!(data, b"\xEF\xBE\xAD\xDE");

    let seen = mock.seen_command(ScpCommand::Read);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].arg1, 0xDEAD_BEEF);
    assert_eq!(seen[0].arg2, 4);
}

#[test]
fn test_retry_on_rc_timeout() {
    // RC_TIMEOUT twice, then RC_OK with four bytes.
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let mock = MockScamp::start(Arc::new(move |_| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 | 1 => Reply::Code(RC_TIMEOUT, Vec::new()),
            _ => Reply::Ok(vec![0x01, 0x02, 0x03, 0x04]),
        }
    }));

    let pipeline = pipeline_to(
        &mock,
        PipelineConfig {
            n_channels: Some(1),
            n_retries: 3,
            packet_timeout: Duration::from_millis(100),
            ..PipelineConfig::default()
        },
    );

    let received: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&received);
    pipeline
        .submit(
            read_request(0x7000_0000, 4),
            SubmitOptions::default(),
            Some(Box::new(move |response| {
                *sink.lock() = Some(response.payload().to_vec());
            })),
            Box::new(|err| panic!("request failed: {}", err)),
        )
        .expect("submit");
    pipeline.finish().expect("finish");

    assert_eq!(
        received.lock().take().expect("response arrived"),
        vec![0x01, 0x02, 0x03, 0x04]
    );
    let counters = pipeline.counters();
    assert_eq!(counters.n_retry_code_resent, 2);
    assert_eq!(counters.n_timeouts, 0);
}

#[test]
fn test_total_timeout() {
    // The mock swallows everything.
    let mock = MockScamp::start(Arc::new(|_| Reply::Drop));
    let pipeline = pipeline_to(
        &mock,
        PipelineConfig {
            n_channels: Some(1),
            n_retries: 2,
            packet_timeout: Duration::from_millis(50),
            ..PipelineConfig::default()
        },
    );

    let errors: Arc<Mutex<Vec<Error>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    pipeline
        .submit(
            read_request(0, 4),
            SubmitOptions::default(),
            Some(Box::new(|_| panic!("no response was scripted"))),
            Box::new(move |err| sink.lock().push(err)),
        )
        .expect("submit");
    pipeline.finish().expect("finish");

    let errors = errors.lock();
    assert_eq!(errors.len(), 1, "exactly one error callback");
    assert!(
        matches!(errors[0], Error::Timeout { command: ScpCommand::Read, .. }),
        "unexpected error: {:?}",
        errors[0]
    );
    let counters = pipeline.counters();
    assert_eq!(counters.n_resent, 2);
    assert!(counters.n_timeouts >= 1);
}

#[test]
fn test_window_discipline() {
    // Responses held for 200 ms force the window to fill.
    const HOLD: Duration = Duration::from_millis(200);
    let mock = MockScamp::start(Arc::new(|_| Reply::Late(HOLD, Vec::new())));

    let pipeline = pipeline_to(
        &mock,
        PipelineConfig {
            n_channels: Some(4),
            n_retries: 3,
            packet_timeout: Duration::from_millis(500),
            ..PipelineConfig::default()
        },
    );

    let completed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    for _ in 0..10 {
        let counter = Arc::clone(&completed);
        pipeline
            .submit(
                read_request(0, 4),
                SubmitOptions::default(),
                Some(Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
                Box::new(|err| panic!("request failed: {}", err)),
            )
            .expect("submit");
        assert!(
            pipeline.in_progress() <= 4,
            "window exceeded: {} outstanding",
            pipeline.in_progress()
        );
    }
    pipeline.finish().expect("finish");
    let elapsed = start.elapsed();

    assert_eq!(completed.load(Ordering::SeqCst), 10);
    // ceil(10/4) rounds of 200 ms each, minus scheduling slack.
    assert!(
        elapsed >= Duration::from_millis(500),
        "completed too fast for the window: {:?}",
        elapsed
    );
}

#[test]
fn test_late_duplicate_is_ignored() {
    // Every request is answered twice; the duplicate must change nothing.
    let mock = MockScamp::start(Arc::new(|request| {
        Reply::OkAndLateDuplicate(
            request.arg1.to_le_bytes().to_vec(),
            Duration::from_millis(30),
        )
    }));

    let pipeline = pipeline_to(
        &mock,
        PipelineConfig {
            n_channels: Some(2),
            packet_timeout: Duration::from_millis(100),
            ..PipelineConfig::default()
        },
    );

    let hits = Arc::new(AtomicUsize::new(0));
    for i in 0..4u32 {
        let counter = Arc::clone(&hits);
        pipeline
            .submit(
                read_request(i * 4, 4),
                SubmitOptions::default(),
                Some(Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
                Box::new(|err| panic!("request failed: {}", err)),
            )
            .expect("submit");
    }
    pipeline.finish().expect("finish");
    assert_eq!(hits.load(Ordering::SeqCst), 4, "one callback per request");
    assert_eq!(pipeline.in_progress(), 0);
}
