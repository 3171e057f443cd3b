// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Routing table management and router diagnostics.

use crate::config::{
    EXECUTABLE_START_ADDRESS, NO_ROUTER_DIAGNOSTIC_FILTERS, ROUTER_DEFAULT_FILTERS_MAX_POSITION,
    ROUTER_DIAGNOSTIC_CLEAR_ADDRESS, ROUTER_DIAGNOSTIC_COUNTER_OFFSET, ROUTER_ENTRY_BYTES,
    ROUTER_ERROR_STATUS_OFFSET, ROUTER_FILTER_CONTROLS_OFFSET, ROUTER_REGISTER_BASE_ADDRESS,
    ROUTER_TABLE_COPY_ADDRESS, ROUTER_TABLE_ENTRIES,
};
use crate::error::{Error, Result};
use crate::model::routes::serialize_routes;
use crate::model::{DiagnosticFilter, MulticastRoute, RouterDiagnostics};
use crate::pipeline::SubmitOptions;
use crate::protocol::{ChipCoord, ScpRequest};
use crate::transceiver::Transceiver;

impl Transceiver {
    /// Load multicast routes onto a chip.
    ///
    /// The serialized table (with its all-ones terminator) is staged in
    /// SDRAM, router entries are allocated, and the router is pointed at the
    /// image. Allocation failure surfaces as `OutOfRoutingSpace`.
    pub fn load_multicast_routes(
        &self,
        x: u8,
        y: u8,
        routes: &[MulticastRoute],
        app_id: u8,
    ) -> Result<()> {
        self.ensure_open()?;
        if routes.is_empty() || routes.len() > ROUTER_TABLE_ENTRIES as usize {
            return Err(Error::InvalidParameter {
                field: "routes",
                value: routes.len().to_string(),
                reason: "route tables hold 1..=1024 entries",
            });
        }
        let chip = ChipCoord::new(x, y);
        let image = serialize_routes(routes);
        self.write_memory(x, y, EXECUTABLE_START_ADDRESS, &image)?;

        let response = self.round_trip(
            chip,
            ScpRequest::router_alloc(chip, app_id, routes.len() as u32),
            SubmitOptions::named("RouterAlloc"),
        )?;
        let base_address = response.payload_u32(0)?;
        if base_address == 0 {
            return Err(Error::OutOfRoutingSpace {
                x,
                y,
                n_entries: routes.len(),
            });
        }

        self.round_trip(
            chip,
            ScpRequest::router_init(
                chip,
                routes.len() as u32,
                EXECUTABLE_START_ADDRESS,
                base_address,
                app_id,
            ),
            SubmitOptions::named("RouterInit"),
        )?;
        Ok(())
    }

    /// Read the multicast routes installed on a chip.
    ///
    /// `app_id` filters to one application's routes; `None` returns all
    /// in-use entries.
    pub fn get_multicast_routes(
        &self,
        x: u8,
        y: u8,
        app_id: Option<u8>,
    ) -> Result<Vec<MulticastRoute>> {
        self.ensure_open()?;
        let table = self
            .read_memory(
                x,
                y,
                ROUTER_TABLE_COPY_ADDRESS,
                ROUTER_TABLE_ENTRIES * ROUTER_ENTRY_BYTES,
            )?
            .concat();

        let mut routes = Vec::new();
        for record in table.chunks(ROUTER_ENTRY_BYTES as usize) {
            if let Some((entry_app, route)) = MulticastRoute::read_table_entry(record)? {
                if app_id.is_none() || app_id == Some(entry_app) {
                    routes.push(route);
                }
            }
        }
        Ok(routes)
    }

    /// Remove every multicast route on a chip.
    pub fn clear_multicast_routes(&self, x: u8, y: u8) -> Result<()> {
        self.ensure_open()?;
        let chip = ChipCoord::new(x, y);
        self.round_trip(
            chip,
            ScpRequest::router_clear(chip),
            SubmitOptions::named("RouterClear"),
        )?;
        Ok(())
    }

    /// Read the fixed-route entry of a chip, as raw route bits.
    pub fn read_fixed_route(&self, x: u8, y: u8, app_id: u8) -> Result<u32> {
        self.ensure_open()?;
        let chip = ChipCoord::new(x, y);
        let response = self.round_trip(
            chip,
            ScpRequest::fixed_route_read(chip, app_id),
            SubmitOptions::named("FixedRouteRead"),
        )?;
        response.payload_u32(0)
    }

    /// Read the router error status and its 16 diagnostic counters.
    pub fn get_router_diagnostics(&self, x: u8, y: u8) -> Result<RouterDiagnostics> {
        self.ensure_open()?;
        let status = self
            .read_memory(
                x,
                y,
                ROUTER_REGISTER_BASE_ADDRESS + ROUTER_ERROR_STATUS_OFFSET,
                4,
            )?
            .concat();
        let counter_block = self
            .read_memory(
                x,
                y,
                ROUTER_REGISTER_BASE_ADDRESS + ROUTER_DIAGNOSTIC_COUNTER_OFFSET,
                16 * 4,
            )?
            .concat();

        let mut counters = [0u32; 16];
        for (i, counter) in counters.iter_mut().enumerate() {
            *counter = u32::from_le_bytes([
                counter_block[i * 4],
                counter_block[i * 4 + 1],
                counter_block[i * 4 + 2],
                counter_block[i * 4 + 3],
            ]);
        }
        Ok(RouterDiagnostics {
            error_status: u32::from_le_bytes([status[0], status[1], status[2], status[3]]),
            counters,
        })
    }

    /// Install a diagnostic filter at `position`.
    ///
    /// Positions at or below 11 hold SCAMP defaults; writing one is allowed
    /// but logged.
    pub fn set_router_diagnostic_filter(
        &self,
        x: u8,
        y: u8,
        position: u32,
        filter: &DiagnosticFilter,
    ) -> Result<()> {
        self.ensure_open()?;
        let address = self.filter_address(position)?;
        if position <= ROUTER_DEFAULT_FILTERS_MAX_POSITION {
            log::warn!(
                "[ROUTER] overwriting default diagnostic filter {} on {},{}",
                position,
                x,
                y
            );
        }
        self.write_memory_int(x, y, address, filter.to_word(), 4)
    }

    /// Read the diagnostic filter at `position`.
    pub fn get_router_diagnostic_filter(
        &self,
        x: u8,
        y: u8,
        position: u32,
    ) -> Result<DiagnosticFilter> {
        self.ensure_open()?;
        let address = self.filter_address(position)?;
        let word = self.read_memory(x, y, address, 4)?.concat();
        Ok(DiagnosticFilter::from_word(u32::from_le_bytes([
            word[0], word[1], word[2], word[3],
        ])))
    }

    /// Clear (and optionally re-enable) diagnostic counters.
    ///
    /// The written word carries the clear mask in its low half and, when
    /// `enable` is set, the enable mask in its high half.
    pub fn clear_router_diagnostic_counters(
        &self,
        x: u8,
        y: u8,
        enable: bool,
        counter_ids: &[u32],
    ) -> Result<()> {
        self.ensure_open()?;
        let mut word = 0u32;
        for &id in counter_ids {
            if id >= NO_ROUTER_DIAGNOSTIC_FILTERS {
                return Err(Error::InvalidParameter {
                    field: "counter_ids",
                    value: id.to_string(),
                    reason: "diagnostic counters are 0..=15",
                });
            }
            word |= 1 << id;
            if enable {
                word |= 1 << (id + 16);
            }
        }
        self.write_memory_int(x, y, ROUTER_DIAGNOSTIC_CLEAR_ADDRESS, word, 4)
    }

    fn filter_address(&self, position: u32) -> Result<u32> {
        if position >= NO_ROUTER_DIAGNOSTIC_FILTERS {
            return Err(Error::InvalidParameter {
                field: "position",
                value: position.to_string(),
                reason: "diagnostic filters are 0..=15",
            });
        }
        Ok(ROUTER_REGISTER_BASE_ADDRESS + ROUTER_FILTER_CONTROLS_OFFSET + position * 4)
    }
}
