// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The transceiver: the public surface of this crate.
//!
//! A [`Transceiver`] owns the UDP endpoints of one machine, one pipeline per
//! endpoint, the shared sequence allocator, the discovered [`Machine`] and
//! the flood/execute lock table. Bulk operations live in the submodules and
//! compose pipeline submissions; everything here is safe to call from
//! multiple threads.

mod app;
mod bmp;
mod discovery;
mod flood;
mod iobuf;
/// Flood-fill vs chip-execute mutual exclusion.
pub mod locks;
mod memory;
mod router;
mod tags;

pub use bmp::AdcData;
pub use memory::MemoryChunks;

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};

use crate::config::{
    FACADE_N_RETRIES, MAX_CORE_ID, NN_ID_FIRST, NN_ID_MODULUS, SCAMP_NAME, SCAMP_VERSION,
    SCP_BMP_PORT, SCP_SCAMP_PORT,
};
use crate::error::{Error, Result};
use crate::listener::Listener;
use crate::model::version::VersionInfo;
use crate::model::Machine;
use crate::pipeline::{
    select_link, ErrorCallback, PipelineConfig, ResponseCallback, ScampLink, SequenceAllocator,
    SubmitOptions,
};
use crate::protocol::constants::ScpResult;
use crate::protocol::{ChipCoord, CoreAddr, ScpRequest, ScpResponse};
use crate::transport::boot::{BootFrame, BootOpcode, BootSender};
use crate::transport::udp::{Capabilities, UdpEndpoint};
use locks::ExecuteLocks;

/// Retry codes for the readiness-probing Version request.
const VERSION_RETRY_CODES: &[ScpResult] =
    &[ScpResult::P2pTimeout, ScpResult::Timeout, ScpResult::Len];

/// Attempts to see SCAMP after a boot before giving up.
const BOOT_VERSION_ATTEMPTS: u32 = 5;

/// Pause between post-boot version probes.
const BOOT_VERSION_DELAY: Duration = Duration::from_millis(250);

/// Position of one BMP within a machine rack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpCoords {
    /// Cabinet containing the frame.
    pub cabinet: u8,
    /// Frame within the cabinet.
    pub frame: u8,
    /// Boards managed by this BMP.
    pub boards: Vec<u8>,
}

struct BmpLink {
    coords: BmpCoords,
    link: Arc<ScampLink>,
}

/// Builder for a [`Transceiver`].
#[derive(Debug)]
pub struct TransceiverBuilder {
    host: IpAddr,
    scamp_port: u16,
    with_boot: bool,
    bmp_hosts: Vec<(BmpCoords, IpAddr)>,
    ignore_chips: Vec<ChipCoord>,
    ignore_cores: Vec<u8>,
    max_core_id: u8,
    pipeline: PipelineConfig,
}

impl TransceiverBuilder {
    /// Use a non-default SCAMP port.
    #[must_use]
    pub fn scamp_port(mut self, port: u16) -> Self {
        self.scamp_port = port;
        self
    }

    /// Skip opening the boot endpoint.
    #[must_use]
    pub fn without_boot(mut self) -> Self {
        self.with_boot = false;
        self
    }

    /// Register a BMP for power and FPGA control.
    #[must_use]
    pub fn bmp(mut self, coords: BmpCoords, host: IpAddr) -> Self {
        self.bmp_hosts.push((coords, host));
        self
    }

    /// Chips discovery must skip.
    #[must_use]
    pub fn ignore_chips(mut self, chips: Vec<ChipCoord>) -> Self {
        self.ignore_chips = chips;
        self
    }

    /// Virtual cores discovery must omit from every chip.
    #[must_use]
    pub fn ignore_cores(mut self, cores: Vec<u8>) -> Self {
        self.ignore_cores = cores;
        self
    }

    /// Highest virtual core id discovery may keep.
    #[must_use]
    pub fn max_core_id(mut self, max: u8) -> Self {
        self.max_core_id = max;
        self
    }

    /// Pipeline parameters applied to every connection.
    #[must_use]
    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline = config;
        self
    }

    /// Open the endpoints and build the transceiver.
    pub fn build(self) -> Result<Transceiver> {
        let sequences = Arc::new(SequenceAllocator::new());

        let mut scamp_links = HashMap::new();
        let remote = SocketAddr::new(self.host, self.scamp_port);
        let endpoint = UdpEndpoint::connect(
            remote,
            Some(ChipCoord::new(0, 0)),
            Capabilities::scamp(),
        )?;
        scamp_links.insert(
            remote,
            ScampLink::new(endpoint, Arc::clone(&sequences), self.pipeline.clone()),
        );

        let boot = if self.with_boot {
            Some(BootSender::open(self.host)?)
        } else {
            None
        };

        let mut bmp_links = Vec::new();
        for (coords, host) in self.bmp_hosts {
            let endpoint = UdpEndpoint::connect(
                SocketAddr::new(host, SCP_BMP_PORT),
                None,
                Capabilities::bmp(),
            )?;
            bmp_links.push(BmpLink {
                coords,
                link: ScampLink::new(endpoint, Arc::clone(&sequences), self.pipeline.clone()),
            });
        }

        log::debug!(
            "[TRANSCEIVER] open: scamp={} boot={} bmps={}",
            remote,
            self.with_boot,
            bmp_links.len()
        );
        Ok(Transceiver {
            scamp_links: RwLock::new(scamp_links),
            bmp_links,
            boot,
            listeners: Mutex::new(HashMap::new()),
            sequences,
            machine: ArcSwapOption::empty(),
            locks: ExecuteLocks::new(),
            next_nn_id: Mutex::new(NN_ID_FIRST),
            pipeline_config: self.pipeline,
            ignore_chips: self.ignore_chips,
            ignore_cores: self.ignore_cores,
            max_core_id: self.max_core_id,
            closed: AtomicBool::new(false),
        })
    }
}

/// Host-side handle onto one SpiNNaker machine.
pub struct Transceiver {
    scamp_links: RwLock<HashMap<SocketAddr, Arc<ScampLink>>>,
    bmp_links: Vec<BmpLink>,
    boot: Option<BootSender>,
    listeners: Mutex<HashMap<u16, Listener>>,
    sequences: Arc<SequenceAllocator>,
    machine: ArcSwapOption<Machine>,
    locks: ExecuteLocks,
    next_nn_id: Mutex<u8>,
    pipeline_config: PipelineConfig,
    ignore_chips: Vec<ChipCoord>,
    ignore_cores: Vec<u8>,
    max_core_id: u8,
    closed: AtomicBool,
}

impl Transceiver {
    /// Builder connecting to `host`.
    #[must_use]
    pub fn builder(host: IpAddr) -> TransceiverBuilder {
        TransceiverBuilder {
            host,
            scamp_port: SCP_SCAMP_PORT,
            with_boot: true,
            bmp_hosts: Vec::new(),
            ignore_chips: Vec::new(),
            ignore_cores: Vec::new(),
            max_core_id: MAX_CORE_ID,
            pipeline: PipelineConfig::default(),
        }
    }

    /// Open a transceiver with default settings.
    pub fn open(host: IpAddr) -> Result<Self> {
        Self::builder(host).build()
    }

    /// The machine discovered so far, if any.
    #[must_use]
    pub fn machine(&self) -> Option<Arc<Machine>> {
        self.machine.load_full()
    }

    /// Add an SCP connection to a further board.
    ///
    /// At most one endpoint may exist per remote address and port.
    pub fn add_scamp_connection(
        &self,
        host: IpAddr,
        port: u16,
        chip: ChipCoord,
    ) -> Result<()> {
        self.ensure_open()?;
        let remote = SocketAddr::new(host, port);
        let mut links = self.scamp_links.write();
        if links.contains_key(&remote) {
            return Err(Error::InvalidParameter {
                field: "remote",
                value: remote.to_string(),
                reason: "an endpoint for this address already exists",
            });
        }
        let endpoint = UdpEndpoint::connect(remote, Some(chip), Capabilities::scamp())?;
        links.insert(
            remote,
            ScampLink::new(
                endpoint,
                Arc::clone(&self.sequences),
                self.pipeline_config.clone(),
            ),
        );
        log::debug!("[TRANSCEIVER] added connection {} for chip {}", remote, chip);
        Ok(())
    }

    /// Stop all pipelines and listeners; pending requests fail with `Closed`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for link in self.scamp_links.read().values() {
            link.pipeline().close();
        }
        for bmp in &self.bmp_links {
            bmp.link.pipeline().close();
        }
        let mut listeners = self.listeners.lock();
        for (_, mut listener) in listeners.drain() {
            listener.close();
        }
        log::debug!("[TRANSCEIVER] closed");
    }

    // ===================================================================
    // Boot and readiness
    // ===================================================================

    /// Stream the boot frame sequence. No replies are solicited.
    ///
    /// Not idempotent, but safe to repeat when the machine did not actually
    /// boot.
    pub fn boot(&self, board_version: u8, dims: (u8, u8), n_boards: u32) -> Result<()> {
        self.ensure_open()?;
        let sender = self
            .boot
            .as_ref()
            .ok_or_else(|| Error::UnsupportedOperation("boot".to_string()))?;
        let frames = boot_sequence(board_version, dims, n_boards);
        log::debug!("[BOOT] streaming {} frames", frames.len());
        sender.send_all(frames.iter()).map_err(Error::Io)?;
        Ok(())
    }

    /// One Version round-trip against the chip-0 monitor.
    pub fn get_scamp_version(&self) -> Result<VersionInfo> {
        self.get_version(ChipCoord::new(0, 0))
    }

    /// One Version round-trip against any chip's monitor.
    pub fn get_version(&self, chip: ChipCoord) -> Result<VersionInfo> {
        let response = self.round_trip(
            chip,
            ScpRequest::version(CoreAddr::new(chip.x, chip.y, 0)),
            SubmitOptions {
                operation: "Version",
                n_retries: Some(FACADE_N_RETRIES),
                retry_codes: Some(VERSION_RETRY_CODES),
            },
        )?;
        VersionInfo::decode(&response)
    }

    /// Get the SCAMP version and verify name and major version.
    pub fn verified_scamp_version(&self) -> Result<VersionInfo> {
        let version = self.get_scamp_version()?;
        if version.name != SCAMP_NAME || version.version.0 != SCAMP_VERSION {
            return Err(Error::Incompatible {
                expected: format!("{} {}.x", SCAMP_NAME, SCAMP_VERSION),
                observed: format!("{} {}.{}", version.name, version.version.0, version.version.1),
            });
        }
        Ok(version)
    }

    /// Bring the machine to a responsive state.
    ///
    /// Probes the version; on timeout powers the boards on through any
    /// registered BMPs, re-probes, boots, and finally waits for the
    /// machine's important chips to answer.
    pub fn ensure_ready(
        &self,
        board_version: u8,
        dims: (u8, u8),
        n_boards: u32,
    ) -> Result<VersionInfo> {
        self.ensure_open()?;
        match self.verified_scamp_version() {
            Ok(version) => return Ok(version),
            Err(Error::Timeout { .. }) => {}
            Err(err) => return Err(err),
        }

        if !self.bmp_links.is_empty() {
            log::debug!("[TRANSCEIVER] machine silent; power cycling through BMPs");
            self.power_on_machine()?;
            match self.verified_scamp_version() {
                Ok(version) => return Ok(version),
                Err(Error::Timeout { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        log::debug!("[TRANSCEIVER] machine silent; booting");
        self.boot(board_version, dims, n_boards)?;

        let mut version = None;
        for attempt in 0..BOOT_VERSION_ATTEMPTS {
            match self.verified_scamp_version() {
                Ok(v) => {
                    version = Some(v);
                    break;
                }
                Err(Error::Timeout { .. }) if attempt + 1 < BOOT_VERSION_ATTEMPTS => {
                    std::thread::sleep(BOOT_VERSION_DELAY);
                }
                Err(err) => return Err(err),
            }
        }
        let version = version.ok_or_else(|| Error::Incompatible {
            expected: format!("{} {}.x", SCAMP_NAME, SCAMP_VERSION),
            observed: "no response after boot".to_string(),
        })?;

        self.wait_for_important_chips()?;
        Ok(version)
    }

    // ===================================================================
    // Shared plumbing
    // ===================================================================

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    pub(crate) fn locks(&self) -> &ExecuteLocks {
        &self.locks
    }

    pub(crate) fn ignore_chips(&self) -> &[ChipCoord] {
        &self.ignore_chips
    }

    pub(crate) fn ignore_cores(&self) -> &[u8] {
        &self.ignore_cores
    }

    pub(crate) fn max_core_id(&self) -> u8 {
        self.max_core_id
    }

    pub(crate) fn publish_machine(&self, machine: Machine) -> Arc<Machine> {
        let machine = Arc::new(machine);
        self.machine.store(Some(Arc::clone(&machine)));
        machine
    }

    pub(crate) fn listeners(&self) -> &Mutex<HashMap<u16, Listener>> {
        &self.listeners
    }

    /// Take the next nearest-neighbour flood-fill id.
    pub(crate) fn next_nn_id(&self) -> u8 {
        let mut next = self.next_nn_id.lock();
        let id = *next;
        *next = (*next + 1) % NN_ID_MODULUS;
        if *next < NN_ID_FIRST {
            *next = NN_ID_FIRST;
        }
        id
    }

    /// Snapshot of the SCP links.
    pub(crate) fn links_snapshot(&self) -> Vec<Arc<ScampLink>> {
        self.scamp_links.read().values().cloned().collect()
    }

    /// BMP links with their rack positions.
    fn bmp_iter(&self) -> impl Iterator<Item = (&BmpCoords, &Arc<ScampLink>)> {
        self.bmp_links.iter().map(|b| (&b.coords, &b.link))
    }

    /// Choose the link for a request to `chip`.
    pub(crate) fn link_for(&self, chip: ChipCoord) -> Result<Arc<ScampLink>> {
        self.ensure_open()?;
        let links = self.links_snapshot();
        let machine = self.machine();
        select_link(&links, chip, machine.as_deref())
    }

    /// One synchronous request/response exchange.
    pub(crate) fn round_trip(
        &self,
        chip: ChipCoord,
        request: ScpRequest,
        options: SubmitOptions,
    ) -> Result<ScpResponse> {
        let link = self.link_for(chip)?;
        round_trip_on(&link, request, options)
    }
}

impl Drop for Transceiver {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Transceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transceiver")
            .field("n_connections", &self.scamp_links.read().len())
            .field("n_bmps", &self.bmp_links.len())
            .field("has_machine", &self.machine.load().is_some())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Run one request to completion on a specific link.
pub(crate) fn round_trip_on(
    link: &ScampLink,
    request: ScpRequest,
    options: SubmitOptions,
) -> Result<ScpResponse> {
    let slot: Arc<Mutex<Option<Result<ScpResponse>>>> = Arc::new(Mutex::new(None));
    let on_success: ResponseCallback = {
        let slot = Arc::clone(&slot);
        Box::new(move |response: ScpResponse| {
            *slot.lock() = Some(Ok(response));
        })
    };
    let on_error: ErrorCallback = {
        let slot = Arc::clone(&slot);
        Box::new(move |err: Error| {
            *slot.lock() = Some(Err(err));
        })
    };
    link.pipeline()
        .submit(request, options, Some(on_success), on_error)?;
    link.pipeline().finish()?;

    let outcome = slot.lock().take();
    match outcome {
        Some(result) => result,
        // The pipeline guarantees one callback per accepted request; an
        // empty slot means the transceiver went away underneath us.
        None => Err(Error::Closed),
    }
}

/// First error of an aggregate operation plus a count of the rest.
#[derive(Clone, Default)]
pub(crate) struct ErrorSink {
    inner: Arc<Mutex<ErrorSinkInner>>,
}

#[derive(Default)]
struct ErrorSinkInner {
    first: Option<(CoreAddr, Error)>,
    later: usize,
}

impl ErrorSink {
    pub(crate) fn new() -> Self {
        ErrorSink::default()
    }

    /// Error callback recording into this sink with `destination` context.
    pub(crate) fn callback(&self, destination: CoreAddr) -> ErrorCallback {
        let sink = self.clone();
        Box::new(move |err| {
            let mut inner = sink.inner.lock();
            if inner.first.is_none() {
                inner.first = Some((destination, err));
            } else {
                inner.later += 1;
            }
        })
    }

    /// Whether anything failed.
    pub(crate) fn is_error(&self) -> bool {
        self.inner.lock().first.is_some()
    }

    /// Surface the first failure, annotated with the count of later ones.
    pub(crate) fn check(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.first.take() {
            None => Ok(()),
            Some((destination, cause)) => Err(Error::Process {
                destination,
                cause: Box::new(cause),
                n_other: inner.later,
            }),
        }
    }
}

/// The boot conversation for a machine of the given shape.
///
/// Only the framing is produced here; the boot image itself is outside this
/// library's scope.
fn boot_sequence(board_version: u8, dims: (u8, u8), n_boards: u32) -> Vec<BootFrame> {
    let mut config = BootFrame::control(BootOpcode::FloodFillBlock, 0, 0, 0);
    config.payload = {
        let mut words = Vec::new();
        words.extend_from_slice(&u32::from(board_version).to_be_bytes());
        words.extend_from_slice(&u32::from(dims.0).to_be_bytes());
        words.extend_from_slice(&u32::from(dims.1).to_be_bytes());
        words.extend_from_slice(&n_boards.to_be_bytes());
        words
    };
    vec![
        BootFrame::control(BootOpcode::FloodFillStart, 0, 0, 1),
        config,
        BootFrame::control(BootOpcode::FloodFillControl, 1, 0, 0),
    ]
}
