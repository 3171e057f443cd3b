// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Executable loading: single-chip execute and machine-wide flood fill.
//!
//! Ordering inside a flood fill is enforced by awaiting FloodFillStart
//! before any data block is submitted and awaiting all blocks before
//! FloodFillEnd goes out. The flood lock keeps two flood fills, or a flood
//! fill and a chip execute, from overlapping.

use crate::config::{EXECUTABLE_START_ADDRESS, UDP_MESSAGE_MAX_SIZE};
use crate::error::Result;
use crate::model::CoreSubsets;
use crate::pipeline::SubmitOptions;
use crate::protocol::{ChipCoord, CoreAddr, ScpRequest};
use crate::transceiver::{round_trip_on, ErrorSink, Transceiver};

impl Transceiver {
    /// Write `data` to every chip at once via nearest-neighbour flood fill.
    ///
    /// Exclusive with [`execute`](Self::execute) and
    /// [`execute_flood`](Self::execute_flood).
    pub fn write_memory_flood(&self, base: u32, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let _flood = self.locks().lock_flood();
        self.flood_write_locked(base, data)
    }

    /// Flood-fill body; the caller must hold the flood lock.
    fn flood_write_locked(&self, base: u32, data: &[u8]) -> Result<()> {
        let nn_id = self.next_nn_id();

        // Blocks carry whole words; pad the tail.
        let mut padded = data.to_vec();
        while padded.len() % 4 != 0 {
            padded.push(0);
        }
        let n_blocks = padded.len().div_ceil(UDP_MESSAGE_MAX_SIZE) as u32;
        log::debug!(
            "[FLOOD] nn_id={} base={:#x} bytes={} blocks={}",
            nn_id,
            base,
            padded.len(),
            n_blocks
        );

        let link = self.link_for(ChipCoord::new(0, 0))?;
        round_trip_on(
            &link,
            ScpRequest::flood_fill_start(nn_id, n_blocks, None),
            SubmitOptions::named("FloodFillStart"),
        )?;

        let errors = ErrorSink::new();
        for (block_no, block) in padded.chunks(UDP_MESSAGE_MAX_SIZE).enumerate() {
            let address = base + (block_no * UDP_MESSAGE_MAX_SIZE) as u32;
            let request =
                ScpRequest::flood_fill_data(nn_id, block_no as u32, address, block.to_vec())?;
            link.pipeline().submit(
                request,
                SubmitOptions::named("FloodFillData"),
                None,
                errors.callback(CoreAddr::new(0, 0, 0)),
            )?;
        }
        link.pipeline().finish()?;
        errors.check()?;

        round_trip_on(
            &link,
            ScpRequest::flood_fill_end(nn_id, 0, &[], false),
            SubmitOptions::named("FloodFillEnd"),
        )?;
        Ok(())
    }

    /// Load and start an executable on the processors of one chip.
    ///
    /// Holds the chip's execute lock across the write and the run, blocking
    /// other executes on the same chip and any flood fill.
    pub fn execute(
        &self,
        x: u8,
        y: u8,
        processors: &[u8],
        executable: &[u8],
        app_id: u8,
        wait: bool,
    ) -> Result<()> {
        self.ensure_open()?;
        let chip = ChipCoord::new(x, y);
        let _execute = self.locks().lock_execute(chip);

        self.write_memory(x, y, EXECUTABLE_START_ADDRESS, executable)?;
        self.round_trip(
            chip,
            ScpRequest::application_run(chip, app_id, processors, wait),
            SubmitOptions::named("ApplicationRun"),
        )?;
        Ok(())
    }

    /// Flood an executable to the whole machine and start it on the given
    /// cores.
    pub fn execute_flood(
        &self,
        core_subsets: &CoreSubsets,
        executable: &[u8],
        app_id: u8,
        wait: bool,
    ) -> Result<()> {
        self.ensure_open()?;
        let _flood = self.locks().lock_flood();

        self.flood_write_locked(EXECUTABLE_START_ADDRESS, executable)?;

        let errors = ErrorSink::new();
        let mut used_links = Vec::new();
        for subset in core_subsets.iter() {
            let link = self.link_for(subset.chip)?;
            let request =
                ScpRequest::application_run(subset.chip, app_id, subset.processor_ids(), wait);
            link.pipeline().submit(
                request,
                SubmitOptions::named("ApplicationRun"),
                None,
                errors.callback(CoreAddr::new(subset.chip.x, subset.chip.y, 0)),
            )?;
            if !used_links.iter().any(|l| std::sync::Arc::ptr_eq(l, &link)) {
                used_links.push(link);
            }
        }
        for link in used_links {
            link.pipeline().finish()?;
        }
        errors.check()
    }
}
