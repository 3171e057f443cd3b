// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Machine discovery.
//!
//! Starting from chip 0,0 the discoverer walks the link graph breadth-first:
//! each known chip is asked, link by link, for its neighbour's
//! system-variable block via LinkRead. A successful read adds the neighbour
//! and the link (with the opposite link patched to route back); a failed
//! read means the link is absent. The finished graph is published
//! immutably.

use std::collections::VecDeque;
use std::time::Duration;

use crate::config::{SCP_SCAMP_PORT, SYSTEM_VARIABLE_BASE_ADDRESS, SYSTEM_VARIABLE_BYTES};
use crate::error::{Error, Result};
use crate::model::machine::{Chip, Link, Machine};
use crate::pipeline::SubmitOptions;
use crate::protocol::sysvar::SystemVariables;
use crate::protocol::{ChipCoord, ScpRequest};
use crate::transceiver::Transceiver;

/// Attempts to see an important chip answer before readiness fails.
const READY_ATTEMPTS: u32 = 10;

/// Pause between readiness probes of an important chip.
const READY_DELAY: Duration = Duration::from_millis(200);

impl Transceiver {
    /// Width and height of the machine, read from chip 0,0.
    pub fn get_machine_dimensions(&self) -> Result<(u8, u8)> {
        Ok(self.read_sysvar(ChipCoord::new(0, 0))?.dims)
    }

    /// Discover the machine and publish the resulting topology model.
    ///
    /// Chips in the builder's ignore list are skipped; ignored cores and
    /// cores beyond the configured maximum are omitted from every chip.
    pub fn discover_machine(&self) -> Result<std::sync::Arc<Machine>> {
        self.ensure_open()?;
        self.get_scamp_version()?;

        let root = self.read_sysvar(ChipCoord::new(0, 0))?;
        let (width, height) = root.dims;
        log::debug!("[DISCOVERY] machine is {}x{}", width, height);

        let mut machine = Machine::new(width, height);
        machine.add_chip(Chip::from_sysvar(
            &root,
            self.ignore_cores(),
            self.max_core_id(),
        ));

        let mut frontier = VecDeque::new();
        frontier.push_back(root);
        while let Some(vars) = frontier.pop_front() {
            let source = vars.chip;
            for link_id in 0..6 {
                if vars.links_available & (1 << link_id) == 0 {
                    continue;
                }
                let Some(neighbour) = self.read_link_sysvar(source, link_id) else {
                    continue;
                };
                let destination = neighbour.chip;
                if self.ignore_chips().contains(&destination)
                    || !machine.in_bounds(destination)
                {
                    continue;
                }
                if machine.chip(destination).is_none() {
                    machine.add_chip(Chip::from_sysvar(
                        &neighbour,
                        self.ignore_cores(),
                        self.max_core_id(),
                    ));
                    frontier.push_back(neighbour);
                }
                machine.add_link(Link {
                    source,
                    id: link_id,
                    destination,
                });
            }
        }

        log::debug!(
            "[DISCOVERY] found {} chips, {} links",
            machine.n_chips(),
            machine.n_links()
        );
        let machine = self.publish_machine(machine);
        self.connect_ethernet_chips(&machine);
        Ok(machine)
    }

    /// Open additional connections to every discovered ethernet chip.
    fn connect_ethernet_chips(&self, machine: &Machine) {
        for chip in machine.chips() {
            let Some(ip) = chip.ethernet_ip else { continue };
            if chip.coord == ChipCoord::new(0, 0) {
                continue;
            }
            match self.add_scamp_connection(ip.into(), SCP_SCAMP_PORT, chip.coord) {
                Ok(()) => {}
                Err(Error::InvalidParameter { .. }) => {}
                Err(err) => {
                    log::warn!("[DISCOVERY] no connection to ethernet chip {}: {}", chip.coord, err);
                }
            }
        }
    }

    /// Whether the machine's mesh wraps around its edges.
    ///
    /// Reading the system-variable block down link 3 or link 4 from chip
    /// 0,0 only succeeds when a wrap-around link exists there.
    pub fn has_wrap_arounds(&self) -> bool {
        let origin = ChipCoord::new(0, 0);
        self.read_link_sysvar(origin, 3).is_some() || self.read_link_sysvar(origin, 4).is_some()
    }

    /// Wait for the machine's far chips to answer after a boot.
    ///
    /// Probes the top-right corner, or a set of interior chips when
    /// wrap-arounds make the corner meaningless.
    pub(crate) fn wait_for_important_chips(&self) -> Result<()> {
        let (width, height) = self.get_machine_dimensions()?;
        let important: Vec<ChipCoord> = if self.has_wrap_arounds() {
            vec![
                ChipCoord::new(width / 2, height / 2),
                ChipCoord::new(width / 2, 0),
                ChipCoord::new(0, height / 2),
            ]
        } else {
            vec![ChipCoord::new(
                width.saturating_sub(1),
                height.saturating_sub(1),
            )]
        };

        for chip in important {
            let mut last_err = None;
            let mut responsive = false;
            for attempt in 0..READY_ATTEMPTS {
                match self.read_sysvar(chip) {
                    Ok(_) => {
                        responsive = true;
                        break;
                    }
                    Err(err) => {
                        log::debug!(
                            "[DISCOVERY] chip {} not ready (attempt {}): {}",
                            chip,
                            attempt + 1,
                            err
                        );
                        last_err = Some(err);
                        std::thread::sleep(READY_DELAY);
                    }
                }
            }
            if !responsive {
                return Err(last_err.unwrap_or(Error::Closed));
            }
        }
        Ok(())
    }

    /// Read and decode a chip's system-variable block over point-to-point.
    pub(crate) fn read_sysvar(&self, chip: ChipCoord) -> Result<SystemVariables> {
        let data = self
            .read_memory(
                chip.x,
                chip.y,
                SYSTEM_VARIABLE_BASE_ADDRESS,
                SYSTEM_VARIABLE_BYTES,
            )?
            .concat();
        SystemVariables::decode(&data)
    }

    /// Read a neighbour's system-variable block down one link.
    ///
    /// Any failure means the link is treated as absent.
    fn read_link_sysvar(&self, source: ChipCoord, link_id: u8) -> Option<SystemVariables> {
        let request = ScpRequest::read_link(
            source,
            link_id,
            SYSTEM_VARIABLE_BASE_ADDRESS,
            SYSTEM_VARIABLE_BYTES,
        )
        .ok()?;
        let response = self
            .round_trip(source, request, SubmitOptions::named("ReadLink"))
            .ok()?;
        SystemVariables::decode(response.payload()).ok()
    }
}
