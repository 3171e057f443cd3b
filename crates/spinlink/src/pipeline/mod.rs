// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The windowed SCP request pipeline.
//!
//! Each pipeline owns one endpoint and keeps up to `n_channels` requests in
//! flight. Submission blocks while the window is full, draining responses in
//! the calling thread; a receive timeout retransmits every outstanding
//! request, and a response whose code is in the retry set retransmits just
//! that request. Callbacks fire in response-arrival order, not submission
//! order.

/// Connection selection policy.
pub mod selector;
/// Shared sequence allocation.
pub mod sequence;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{
    CHANNEL_WAIT_MARGIN, DEFAULT_N_RETRIES, DEFAULT_PACKET_TIMEOUT, MIN_CALIBRATED_CHANNELS,
    SUBMIT_DRAIN_TIMEOUT,
};
use crate::error::{Error, Result};
use crate::protocol::constants::{ScpCommand, ScpResult, DEFAULT_RETRY_CODES};
use crate::protocol::{CoreAddr, ScpRequest, ScpResponse};
use crate::transport::udp::{is_timeout, UdpEndpoint};

pub use selector::{select_link, ScampLink};
pub use sequence::SequenceAllocator;

/// Retry reason recorded for a receive timeout.
const REASON_TIMEOUT: &str = "timeout";

/// Callback invoked with a successfully decoded response.
pub type ResponseCallback = Box<dyn FnOnce(ScpResponse) + Send>;

/// Callback invoked when a request fails terminally.
pub type ErrorCallback = Box<dyn FnOnce(Error) + Send>;

/// Pipeline construction parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Window size; `None` auto-calibrates on first submit.
    pub n_channels: Option<usize>,
    /// Drain threshold; `None` derives `n_channels - 8`, floored at 0.
    pub intermediate_channel_waits: Option<usize>,
    /// Response codes that trigger a retransmission.
    pub retry_codes: &'static [ScpResult],
    /// Retries allowed per request before a terminal failure.
    pub n_retries: u32,
    /// Elapsed time after which a sent packet counts as timed out.
    pub packet_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            n_channels: None,
            intermediate_channel_waits: None,
            retry_codes: DEFAULT_RETRY_CODES,
            n_retries: DEFAULT_N_RETRIES,
            packet_timeout: DEFAULT_PACKET_TIMEOUT,
        }
    }
}

/// Per-request overrides applied at submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmitOptions {
    /// Operation name used in `UnexpectedResponse` diagnostics.
    pub operation: &'static str,
    /// Retry count override.
    pub n_retries: Option<u32>,
    /// Retry-code set override.
    pub retry_codes: Option<&'static [ScpResult]>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        SubmitOptions {
            operation: "SCP request",
            n_retries: None,
            retry_codes: None,
        }
    }
}

impl SubmitOptions {
    /// Options naming the operation for diagnostics.
    #[must_use]
    pub fn named(operation: &'static str) -> Self {
        SubmitOptions {
            operation,
            ..SubmitOptions::default()
        }
    }
}

/// Counter snapshot for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCounters {
    /// Receive timeouts observed.
    pub n_timeouts: u64,
    /// Packets retransmitted for any reason.
    pub n_resent: u64,
    /// Packets retransmitted because of a retry-set response code.
    pub n_retry_code_resent: u64,
}

/// One request waiting for its response.
struct Pending {
    data: Vec<u8>,
    command: ScpCommand,
    destination: CoreAddr,
    operation: &'static str,
    retries_remaining: u32,
    n_retries: u32,
    retry_codes: &'static [ScpResult],
    retry_reasons: Vec<&'static str>,
    on_success: Option<ResponseCallback>,
    on_error: Option<ErrorCallback>,
}

struct PipelineState {
    n_channels: Option<usize>,
    intermediate_channel_waits: usize,
    pending: HashMap<u16, Pending>,
    in_progress: usize,
    counters: PipelineCounters,
    closed: bool,
}

/// Windowed request engine bound to one endpoint.
///
/// All state lives under one mutex; submission, draining and callback
/// dispatch are serialized. Callbacks must not call back into the pipeline.
pub struct RequestPipeline {
    endpoint: Arc<UdpEndpoint>,
    sequences: Arc<SequenceAllocator>,
    retry_codes: &'static [ScpResult],
    n_retries: u32,
    packet_timeout: Duration,
    state: Mutex<PipelineState>,
}

impl RequestPipeline {
    /// Bind a pipeline to `endpoint`.
    #[must_use]
    pub fn new(
        endpoint: Arc<UdpEndpoint>,
        sequences: Arc<SequenceAllocator>,
        config: PipelineConfig,
    ) -> Self {
        let n_channels = config.n_channels.map(|n| n.max(1));
        let intermediate_channel_waits = match (n_channels, config.intermediate_channel_waits) {
            (_, Some(waits)) => waits,
            (Some(n), None) => n.saturating_sub(CHANNEL_WAIT_MARGIN),
            (None, None) => 0,
        };
        // The drain threshold must leave room in the window.
        let intermediate_channel_waits = match n_channels {
            Some(n) => intermediate_channel_waits.min(n - 1),
            None => intermediate_channel_waits,
        };
        RequestPipeline {
            endpoint,
            sequences,
            retry_codes: config.retry_codes,
            n_retries: config.n_retries,
            packet_timeout: config.packet_timeout,
            state: Mutex::new(PipelineState {
                n_channels,
                intermediate_channel_waits,
                pending: HashMap::new(),
                in_progress: 0,
                counters: PipelineCounters::default(),
                closed: false,
            }),
        }
    }

    /// Endpoint this pipeline owns.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<UdpEndpoint> {
        &self.endpoint
    }

    /// Submit a request; blocks while the window is full.
    ///
    /// Exactly one of `on_success` / `on_error` will eventually fire for a
    /// request accepted here, unless this call itself returns an error.
    pub fn submit(
        &self,
        request: ScpRequest,
        options: SubmitOptions,
        on_success: Option<ResponseCallback>,
        on_error: ErrorCallback,
    ) -> Result<()> {
        request.validate()?;
        let command = request.command;
        let destination = request.destination();

        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }

        // First readiness observation calibrates an unmeasured window.
        if state.n_channels.is_none() {
            let n = (state.in_progress + CHANNEL_WAIT_MARGIN).max(MIN_CALIBRATED_CHANNELS);
            state.n_channels = Some(n);
            state.intermediate_channel_waits = n.saturating_sub(CHANNEL_WAIT_MARGIN);
            log::debug!(
                "[PIPELINE] calibrated window: {} channels, drain threshold {}",
                n,
                state.intermediate_channel_waits
            );
        }

        while state
            .n_channels
            .map_or(false, |n| state.in_progress >= n)
        {
            let target = state.intermediate_channel_waits;
            self.drain(&mut state, target, SUBMIT_DRAIN_TIMEOUT)?;
        }

        let sequence = self.sequences.next();
        let data = request.encode(sequence);
        self.endpoint.send(&data).map_err(Error::Io)?;
        state.pending.insert(
            sequence,
            Pending {
                data,
                command,
                destination,
                operation: options.operation,
                retries_remaining: options.n_retries.unwrap_or(self.n_retries),
                n_retries: options.n_retries.unwrap_or(self.n_retries),
                retry_codes: options.retry_codes.unwrap_or(self.retry_codes),
                retry_reasons: Vec::new(),
                on_success,
                on_error: Some(on_error),
            },
        );
        state.in_progress += 1;
        Ok(())
    }

    /// Drain until nothing is outstanding.
    ///
    /// Must be called once all requests of an operation are submitted, so
    /// every callback has fired before the operation inspects its results.
    pub fn finish(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.drain(&mut state, 0, self.packet_timeout)
    }

    /// Requests currently in flight.
    #[must_use]
    pub fn in_progress(&self) -> usize {
        self.state.lock().in_progress
    }

    /// Window size, once measured or configured.
    #[must_use]
    pub fn n_channels(&self) -> Option<usize> {
        self.state.lock().n_channels
    }

    /// Counter snapshot.
    #[must_use]
    pub fn counters(&self) -> PipelineCounters {
        self.state.lock().counters
    }

    /// Fail everything outstanding with `Closed` and refuse further work.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let sequences: Vec<u16> = state.pending.keys().copied().collect();
        for sequence in sequences {
            if let Some(pending) = state.pending.remove(&sequence) {
                state.in_progress -= 1;
                deliver_error(pending, Error::Closed);
            }
        }
        log::debug!("[PIPELINE] closed, dropped pending requests");
    }

    // ===================================================================
    // Receive path
    // ===================================================================

    /// Receive until `in_progress` is at most `target`.
    fn drain(
        &self,
        state: &mut PipelineState,
        target: usize,
        timeout: Duration,
    ) -> Result<()> {
        while state.in_progress > target {
            match self.endpoint.receive(timeout) {
                Ok(datagram) => self.handle_datagram(state, datagram),
                Err(err) if is_timeout(&err) => self.handle_receive_timeout(state),
                Err(err) => {
                    self.fail_all(state, &err);
                    return Err(Error::Io(err));
                }
            }
        }
        Ok(())
    }

    fn handle_datagram(&self, state: &mut PipelineState, datagram: Vec<u8>) {
        let response = match ScpResponse::from_datagram(datagram) {
            Ok(response) => response,
            // Stray or truncated traffic on the socket; not ours to report.
            Err(_) => return,
        };
        let sequence = response.sequence();
        let result = response.result();

        // A response for an unknown sequence is a late duplicate.
        let Some(mut pending) = state.pending.remove(&sequence) else {
            return;
        };
        state.in_progress -= 1;

        if pending.retry_codes.contains(&result) {
            match self.try_resend(&mut pending, result.name()) {
                Ok(()) => {
                    state.counters.n_resent += 1;
                    state.counters.n_retry_code_resent += 1;
                    state.pending.insert(sequence, pending);
                    state.in_progress += 1;
                }
                Err(err) => deliver_error(pending, err),
            }
        } else if result == ScpResult::Ok {
            if let Some(callback) = pending.on_success.take() {
                callback(response);
            }
        } else {
            let err = Error::UnexpectedResponse {
                operation: pending.operation,
                command: pending.command,
                result,
            };
            deliver_error(pending, err);
        }
    }

    /// A receive timeout retransmits every outstanding request.
    fn handle_receive_timeout(&self, state: &mut PipelineState) {
        state.counters.n_timeouts += 1;
        let sequences: Vec<u16> = state.pending.keys().copied().collect();
        for sequence in sequences {
            let Some(mut pending) = state.pending.remove(&sequence) else {
                continue;
            };
            state.in_progress -= 1;
            match self.try_resend(&mut pending, REASON_TIMEOUT) {
                Ok(()) => {
                    state.counters.n_resent += 1;
                    state.pending.insert(sequence, pending);
                    state.in_progress += 1;
                }
                Err(err) => deliver_error(pending, err),
            }
        }
    }

    /// Retransmit, or produce the terminal error when retries are spent.
    fn try_resend(&self, pending: &mut Pending, reason: &'static str) -> Result<()> {
        if pending.retries_remaining == 0 {
            if pending.retry_reasons.iter().all(|r| *r == REASON_TIMEOUT) {
                return Err(Error::Timeout {
                    command: pending.command,
                    timeout: self.packet_timeout,
                });
            }
            return Err(Error::RequestFailed {
                command: pending.command,
                destination: pending.destination,
                n_retries: pending.n_retries,
                reasons: std::mem::take(&mut pending.retry_reasons),
            });
        }
        pending.retries_remaining -= 1;
        pending.retry_reasons.push(reason);
        self.endpoint.send(&pending.data).map_err(Error::Io)
    }

    /// A socket failure is terminal for everything outstanding.
    fn fail_all(&self, state: &mut PipelineState, err: &std::io::Error) {
        let sequences: Vec<u16> = state.pending.keys().copied().collect();
        for sequence in sequences {
            if let Some(pending) = state.pending.remove(&sequence) {
                state.in_progress -= 1;
                deliver_error(
                    pending,
                    Error::Io(std::io::Error::new(err.kind(), err.to_string())),
                );
            }
        }
    }
}

fn deliver_error(mut pending: Pending, err: Error) {
    if let Some(callback) = pending.on_error.take() {
        callback(err);
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RequestPipeline")
            .field("endpoint", &self.endpoint.local_addr())
            .field("n_channels", &state.n_channels)
            .field("in_progress", &state.in_progress)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::SdpFlag;
    use crate::protocol::sdp::SdpHeader;
    use crate::protocol::ChipCoord;
    use crate::transport::Capabilities;
    use std::net::UdpSocket;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pipeline_to(peer: &UdpSocket, config: PipelineConfig) -> RequestPipeline {
        let endpoint = UdpEndpoint::connect(
            peer.local_addr().expect("peer addr"),
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

    fn no_reply_request() -> ScpRequest {
        let mut request = ScpRequest::version(CoreAddr::new(0, 0, 0));
        request.sdp.flags = SdpFlag::ReplyExpected;
        request
    }

    #[test]
    fn test_outstanding_matches_pending() {
        let peer = UdpSocket::bind("127.0.0.1:0").expect("bind");
        let pipeline = pipeline_to(
            &peer,
            PipelineConfig {
                n_channels: Some(8),
                packet_timeout: Duration::from_millis(20),
                n_retries: 0,
                ..PipelineConfig::default()
            },
        );

        for _ in 0..3 {
            pipeline
                .submit(
                    no_reply_request(),
                    SubmitOptions::default(),
                    None,
                    Box::new(|_| {}),
                )
                .expect("submit");
        }
        let state = pipeline.state.lock();
        assert_eq!(state.in_progress, 3);
        assert_eq!(state.pending.len(), 3);
    }

    #[test]
    fn test_timeouts_exhaust_into_timeout_error() {
        let peer = UdpSocket::bind("127.0.0.1:0").expect("bind");
        let pipeline = pipeline_to(
            &peer,
            PipelineConfig {
                n_channels: Some(4),
                packet_timeout: Duration::from_millis(10),
                n_retries: 2,
                ..PipelineConfig::default()
            },
        );

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        pipeline
            .submit(
                no_reply_request(),
                SubmitOptions::default(),
                None,
                Box::new(move |err| sink.lock().push(err)),
            )
            .expect("submit");
        pipeline.finish().expect("finish");

        let errors = errors.lock();
        assert_eq!(errors.len(), 1, "exactly one error callback");
        assert!(matches!(errors[0], Error::Timeout { .. }));
        let counters = pipeline.counters();
        assert_eq!(counters.n_resent, 2);
        assert!(counters.n_timeouts >= 1);
    }

    #[test]
    fn test_unknown_sequence_is_ignored() {
        let peer = UdpSocket::bind("127.0.0.1:0").expect("bind");
        let pipeline = pipeline_to(
            &peer,
            PipelineConfig {
                n_channels: Some(4),
                packet_timeout: Duration::from_millis(50),
                n_retries: 0,
                ..PipelineConfig::default()
            },
        );

        // Feed the pipeline a well-formed response nobody asked for.
        let header = SdpHeader::scp_request(ChipCoord::new(0, 0), 0);
        let mut frame = vec![0u8; 2];
        header.write_into(&mut frame);
        frame.extend_from_slice(&ScpResult::Ok.value().to_le_bytes());
        frame.extend_from_slice(&0xFFFEu16.to_le_bytes());

        let mut state = pipeline.state.lock();
        pipeline.handle_datagram(&mut state, frame);
        assert_eq!(state.in_progress, 0);
        assert_eq!(state.counters, PipelineCounters::default());
    }

    #[test]
    fn test_close_fails_pending_with_closed() {
        let peer = UdpSocket::bind("127.0.0.1:0").expect("bind");
        let pipeline = pipeline_to(
            &peer,
            PipelineConfig {
                n_channels: Some(4),
                ..PipelineConfig::default()
            },
        );

        let closed_errors = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&closed_errors);
        pipeline
            .submit(
                no_reply_request(),
                SubmitOptions::default(),
                None,
                Box::new(move |err| {
                    if matches!(err, Error::Closed) {
                        sink.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            )
            .expect("submit");

        pipeline.close();
        assert_eq!(closed_errors.load(Ordering::SeqCst), 1);
        assert!(matches!(
            pipeline.submit(
                no_reply_request(),
                SubmitOptions::default(),
                None,
                Box::new(|_| {})
            ),
            Err(Error::Closed)
        ));
    }

    #[test]
    fn test_auto_calibration_floor() {
        let peer = UdpSocket::bind("127.0.0.1:0").expect("bind");
        let pipeline = pipeline_to(&peer, PipelineConfig::default());
        pipeline
            .submit(
                no_reply_request(),
                SubmitOptions::default(),
                None,
                Box::new(|_| {}),
            )
            .expect("submit");
        assert_eq!(pipeline.n_channels(), Some(MIN_CALIBRATED_CHANNELS));
    }
}
