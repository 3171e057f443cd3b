// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application control: CPU state, signals, LEDs.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::CPU_INFO_BYTES;
use crate::error::{Error, Result};
use crate::model::{CoreSubsets, CpuInfo};
use crate::pipeline::{ResponseCallback, SubmitOptions};
use crate::protocol::constants::{CpuState, LedAction, Signal};
use crate::protocol::{ChipCoord, CoreAddr, ScpRequest};
use crate::transceiver::{ErrorSink, Transceiver};

impl Transceiver {
    /// Fetch the vcpu block of each requested core.
    ///
    /// `None` reads every discovered core.
    pub fn get_cpu_information(
        &self,
        core_subsets: Option<&CoreSubsets>,
    ) -> Result<Vec<CpuInfo>> {
        self.ensure_open()?;
        let machine = self.machine().ok_or_else(|| {
            Error::UnsupportedOperation("CPU information before machine discovery".to_string())
        })?;
        let subsets = match core_subsets {
            Some(subsets) => subsets.clone(),
            None => machine.all_cores(),
        };

        let blocks: Arc<Mutex<Vec<(CoreAddr, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
        let errors = ErrorSink::new();
        let mut used_links = Vec::new();

        for core in subsets.cores() {
            let chip = machine.chip(core.chip()).ok_or_else(|| {
                Error::UnsupportedOperation(format!("chip {} not discovered", core.chip()))
            })?;
            let address = chip.cpu_info_base + CPU_INFO_BYTES * u32::from(core.p);
            let request = ScpRequest::read_memory(core.chip(), address, CPU_INFO_BYTES)?;
            let link = self.link_for(core.chip())?;
            let store = Arc::clone(&blocks);
            let on_success: ResponseCallback = Box::new(move |response| {
                store.lock().push((core, response.payload().to_vec()));
            });
            link.pipeline().submit(
                request,
                SubmitOptions::named("ReadMemory"),
                Some(on_success),
                errors.callback(core),
            )?;
            if !used_links.iter().any(|l| Arc::ptr_eq(l, &link)) {
                used_links.push(link);
            }
        }
        for link in used_links {
            link.pipeline().finish()?;
        }
        errors.check()?;

        let blocks = std::mem::take(&mut *blocks.lock());
        blocks
            .into_iter()
            .map(|(core, data)| CpuInfo::decode(core, &data))
            .collect()
    }

    /// Send a signal to every core running `app_id`.
    pub fn send_signal(&self, app_id: u8, signal: Signal) -> Result<()> {
        self.ensure_open()?;
        self.round_trip(
            ChipCoord::new(0, 0),
            ScpRequest::signal(app_id, signal),
            SubmitOptions::named("Signal"),
        )?;
        Ok(())
    }

    /// Stop an application everywhere.
    pub fn stop_application(&self, app_id: u8) -> Result<()> {
        self.send_signal(app_id, Signal::Stop)
    }

    /// Count the cores of `app_id` currently in `state`.
    pub fn get_core_state_count(&self, app_id: u8, state: CpuState) -> Result<u32> {
        self.ensure_open()?;
        let response = self.round_trip(
            ChipCoord::new(0, 0),
            ScpRequest::count_state(app_id, state.value()),
            SubmitOptions::named("CountState"),
        )?;
        response.payload_u32(0)
    }

    /// Drive the LEDs attached to one chip.
    pub fn set_led(&self, x: u8, y: u8, cpu: u8, leds: &[(u8, LedAction)]) -> Result<()> {
        self.ensure_open()?;
        self.round_trip(
            ChipCoord::new(x, y),
            ScpRequest::set_led(CoreAddr::new(x, y, cpu), leds),
            SubmitOptions::named("LED"),
        )?;
        Ok(())
    }
}
