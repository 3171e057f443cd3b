// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The machine graph accumulated during discovery.
//!
//! A [`Machine`] is a directed graph of [`Chip`]s; each chip owns a
//! [`Router`] with up to six [`Link`]s to its neighbours. Discovery builds
//! the graph incrementally and then publishes it immutably; later discovery
//! rounds may extend it but never rewrite what is already there.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::config::ROUTER_LINKS;
use crate::protocol::sysvar::SystemVariables;
use crate::protocol::ChipCoord;

/// One processor of a chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processor {
    /// Virtual id assigned by the monitor.
    pub virtual_id: u8,
    /// Physical core behind the virtual id.
    pub physical_id: u8,
    /// Whether this core runs the monitor.
    pub is_monitor: bool,
}

/// A directed link between two chips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Chip the link leaves.
    pub source: ChipCoord,
    /// Link id on the source router, 0..=5.
    pub id: u8,
    /// Chip the link reaches.
    pub destination: ChipCoord,
}

/// Link id of the opposite direction on the destination chip.
#[must_use]
pub fn opposite_link(id: u8) -> u8 {
    (id + 3) % ROUTER_LINKS
}

/// The router of one chip.
#[derive(Debug, Clone, Default)]
pub struct Router {
    links: [Option<Link>; ROUTER_LINKS as usize],
    /// First multicast routing entry not claimed by the monitor.
    pub first_free_entry: u16,
}

impl Router {
    /// Link with the given id, if present.
    #[must_use]
    pub fn link(&self, id: u8) -> Option<&Link> {
        self.links.get(id as usize).and_then(Option::as_ref)
    }

    /// Record a link; an existing link with the same id is never rewritten.
    pub fn add_link(&mut self, link: Link) {
        if let Some(slot) = self.links.get_mut(link.id as usize) {
            if slot.is_none() {
                *slot = Some(link);
            }
        }
    }

    /// Iterate the present links.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().flatten()
    }

    /// Number of present links.
    #[must_use]
    pub fn n_links(&self) -> usize {
        self.links.iter().flatten().count()
    }
}

/// One chip with its metadata gathered from the system-variable block.
#[derive(Debug, Clone)]
pub struct Chip {
    /// Coordinates of the chip.
    pub coord: ChipCoord,
    /// Working processors, monitor first.
    pub processors: Vec<Processor>,
    /// The chip's router.
    pub router: Router,
    /// CPU clock in MHz.
    pub cpu_clock_mhz: u32,
    /// SDRAM heap base address.
    pub sdram_heap_address: u32,
    /// IOBUF size per core.
    pub iobuf_size: u32,
    /// Base of the per-core CPU information blocks.
    pub cpu_info_base: u32,
    /// Nearest ethernet-connected chip.
    pub nearest_ethernet: ChipCoord,
    /// IP address when this chip's own ethernet is up.
    pub ethernet_ip: Option<Ipv4Addr>,
}

impl Chip {
    /// Build a chip from its decoded system-variable block.
    ///
    /// `ignore_cores` and `max_core_id` prune the processor list; the
    /// monitor (virtual core 0) is never pruned.
    #[must_use]
    pub fn from_sysvar(
        vars: &SystemVariables,
        ignore_cores: &[u8],
        max_core_id: u8,
    ) -> Self {
        let processors = vars
            .working_virtual_cores()
            .filter(|&virt| virt == 0 || (virt <= max_core_id && !ignore_cores.contains(&virt)))
            .map(|virt| Processor {
                virtual_id: virt,
                physical_id: vars.virtual_core_map[virt as usize],
                is_monitor: virt == 0,
            })
            .collect();
        let ethernet_ip = if vars.ethernet_up && vars.ethernet_ip != [0; 4] {
            Some(Ipv4Addr::from(vars.ethernet_ip))
        } else {
            None
        };
        Chip {
            coord: vars.chip,
            processors,
            router: Router {
                links: Default::default(),
                first_free_entry: vars.first_free_router_entry,
            },
            cpu_clock_mhz: vars.cpu_clock_mhz,
            sdram_heap_address: vars.sdram_heap_address,
            iobuf_size: vars.iobuf_size,
            cpu_info_base: vars.cpu_info_base,
            nearest_ethernet: vars.nearest_ethernet,
            ethernet_ip,
        }
    }

    /// Virtual ids of the non-monitor processors.
    pub fn application_cores(&self) -> impl Iterator<Item = u8> + '_ {
        self.processors
            .iter()
            .filter(|p| !p.is_monitor)
            .map(|p| p.virtual_id)
    }
}

/// The discovered machine.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    width: u8,
    height: u8,
    chips: BTreeMap<ChipCoord, Chip>,
}

impl Machine {
    /// Empty machine of the given dimensions.
    #[must_use]
    pub fn new(width: u8, height: u8) -> Self {
        Machine {
            width,
            height,
            chips: BTreeMap::new(),
        }
    }

    /// Machine width in chips.
    #[must_use]
    pub fn width(&self) -> u8 {
        self.width
    }

    /// Machine height in chips.
    #[must_use]
    pub fn height(&self) -> u8 {
        self.height
    }

    /// Whether a coordinate falls inside the declared dimensions.
    #[must_use]
    pub fn in_bounds(&self, coord: ChipCoord) -> bool {
        coord.x < self.width && coord.y < self.height
    }

    /// Add a chip; an existing chip is never rewritten.
    pub fn add_chip(&mut self, chip: Chip) {
        self.chips.entry(chip.coord).or_insert(chip);
    }

    /// Look up a chip.
    #[must_use]
    pub fn chip(&self, coord: ChipCoord) -> Option<&Chip> {
        self.chips.get(&coord)
    }

    /// Record a link and patch the opposite link on the destination.
    pub fn add_link(&mut self, link: Link) {
        if let Some(chip) = self.chips.get_mut(&link.source) {
            chip.router.add_link(link);
        }
        let back = Link {
            source: link.destination,
            id: opposite_link(link.id),
            destination: link.source,
        };
        if let Some(chip) = self.chips.get_mut(&back.source) {
            chip.router.add_link(back);
        }
    }

    /// Iterate chips in coordinate order.
    pub fn chips(&self) -> impl Iterator<Item = &Chip> {
        self.chips.values()
    }

    /// Number of discovered chips.
    #[must_use]
    pub fn n_chips(&self) -> usize {
        self.chips.len()
    }

    /// Total links across all routers (each direction counted once).
    #[must_use]
    pub fn n_links(&self) -> usize {
        self.chips.values().map(|c| c.router.n_links()).sum()
    }

    /// Every discovered core as a subsets collection.
    #[must_use]
    pub fn all_cores(&self) -> crate::model::CoreSubsets {
        self.chips
            .values()
            .flat_map(|chip| {
                chip.processors.iter().map(move |p| {
                    crate::protocol::CoreAddr::new(chip.coord.x, chip.coord.y, p.virtual_id)
                })
            })
            .collect()
    }

    /// Every discovered application core (monitors excluded).
    #[must_use]
    pub fn application_cores(&self) -> crate::model::CoreSubsets {
        self.chips
            .values()
            .flat_map(|chip| {
                chip.application_cores().map(move |p| {
                    crate::protocol::CoreAddr::new(chip.coord.x, chip.coord.y, p)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip_at(x: u8, y: u8) -> Chip {
        let mut vars = SystemVariables::default();
        vars.chip = ChipCoord::new(x, y);
        Chip::from_sysvar(&vars, &[], 31)
    }

    #[test]
    fn test_opposite_link_pairs() {
        for id in 0..6 {
            assert_eq!(opposite_link(opposite_link(id)), id);
        }
        assert_eq!(opposite_link(0), 3);
        assert_eq!(opposite_link(4), 1);
    }

    #[test]
    fn test_add_link_patches_reverse() {
        let mut machine = Machine::new(2, 2);
        machine.add_chip(chip_at(0, 0));
        machine.add_chip(chip_at(1, 0));
        machine.add_link(Link {
            source: ChipCoord::new(0, 0),
            id: 0,
            destination: ChipCoord::new(1, 0),
        });

        let forward = machine
            .chip(ChipCoord::new(0, 0))
            .and_then(|c| c.router.link(0))
            .expect("forward link");
        assert_eq!(forward.destination, ChipCoord::new(1, 0));

        let back = machine
            .chip(ChipCoord::new(1, 0))
            .and_then(|c| c.router.link(3))
            .expect("patched reverse link");
        assert_eq!(back.destination, ChipCoord::new(0, 0));
    }

    #[test]
    fn test_chips_are_never_rewritten() {
        let mut machine = Machine::new(2, 2);
        let mut first = chip_at(0, 0);
        first.cpu_clock_mhz = 150;
        machine.add_chip(first);
        machine.add_chip(chip_at(0, 0));
        assert_eq!(
            machine.chip(ChipCoord::new(0, 0)).expect("chip").cpu_clock_mhz,
            150
        );
    }

    #[test]
    fn test_core_pruning() {
        let mut vars = SystemVariables::default();
        vars.chip = ChipCoord::new(0, 0);
        // 18 working cores by default; ignore two, cap at 10.
        let chip = Chip::from_sysvar(&vars, &[3, 4], 10);
        let ids: Vec<u8> = chip.processors.iter().map(|p| p.virtual_id).collect();
        assert!(ids.contains(&0), "monitor kept");
        assert!(!ids.contains(&3) && !ids.contains(&4), "ignored cores gone");
        assert!(ids.iter().all(|&p| p <= 10), "cap applied: {:?}", ids);
    }

    #[test]
    fn test_bounds() {
        let machine = Machine::new(2, 2);
        assert!(machine.in_bounds(ChipCoord::new(1, 1)));
        assert!(!machine.in_bounds(ChipCoord::new(2, 0)));
    }
}
