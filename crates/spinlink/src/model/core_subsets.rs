// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collections of cores grouped by chip.

use std::collections::BTreeMap;

use crate::protocol::{ChipCoord, CoreAddr};

/// The selected processors of one chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSubset {
    /// The chip.
    pub chip: ChipCoord,
    processor_ids: Vec<u8>,
}

impl CoreSubset {
    /// Empty subset for a chip.
    #[must_use]
    pub fn new(chip: ChipCoord) -> Self {
        CoreSubset {
            chip,
            processor_ids: Vec::new(),
        }
    }

    /// Add a processor; duplicates are kept out.
    pub fn add_processor(&mut self, p: u8) {
        if let Err(slot) = self.processor_ids.binary_search(&p) {
            self.processor_ids.insert(slot, p);
        }
    }

    /// Selected processor ids, ascending.
    #[must_use]
    pub fn processor_ids(&self) -> &[u8] {
        &self.processor_ids
    }

    /// Whether `p` is in the subset.
    #[must_use]
    pub fn contains(&self, p: u8) -> bool {
        self.processor_ids.binary_search(&p).is_ok()
    }
}

/// Core subsets across any number of chips.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreSubsets {
    subsets: BTreeMap<ChipCoord, CoreSubset>,
}

impl CoreSubsets {
    /// Empty collection.
    #[must_use]
    pub fn new() -> Self {
        CoreSubsets::default()
    }

    /// Add one core.
    pub fn add_core(&mut self, core: CoreAddr) {
        self.subsets
            .entry(core.chip())
            .or_insert_with(|| CoreSubset::new(core.chip()))
            .add_processor(core.p);
    }

    /// Merge a whole subset.
    pub fn add_subset(&mut self, subset: CoreSubset) {
        let entry = self
            .subsets
            .entry(subset.chip)
            .or_insert_with(|| CoreSubset::new(subset.chip));
        for &p in subset.processor_ids() {
            entry.add_processor(p);
        }
    }

    /// Iterate subsets in chip order.
    pub fn iter(&self) -> impl Iterator<Item = &CoreSubset> {
        self.subsets.values()
    }

    /// Iterate every core in chip order.
    pub fn cores(&self) -> impl Iterator<Item = CoreAddr> + '_ {
        self.subsets.values().flat_map(|subset| {
            subset
                .processor_ids()
                .iter()
                .map(move |&p| CoreAddr::new(subset.chip.x, subset.chip.y, p))
        })
    }

    /// Whether a core is in the collection.
    #[must_use]
    pub fn contains(&self, core: CoreAddr) -> bool {
        self.subsets
            .get(&core.chip())
            .is_some_and(|subset| subset.contains(core.p))
    }

    /// Number of selected cores.
    #[must_use]
    pub fn n_cores(&self) -> usize {
        self.subsets.values().map(|s| s.processor_ids().len()).sum()
    }

    /// Whether no cores are selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n_cores() == 0
    }
}

impl FromIterator<CoreAddr> for CoreSubsets {
    fn from_iter<I: IntoIterator<Item = CoreAddr>>(iter: I) -> Self {
        let mut subsets = CoreSubsets::new();
        for core in iter {
            subsets.add_core(core);
        }
        subsets
    }
}
