// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mutual exclusion between flood fills and chip executes.
//!
//! Two domains: a per-chip mutex serializes executes targeting the same
//! chip, and a readers/writer gate makes a flood fill (the writer) exclusive
//! with every chip execute (the readers). Lock order is always chip mutex
//! first, then the gate.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::protocol::ChipCoord;

#[derive(Default)]
struct GateState {
    /// Chip executes currently holding the gate.
    executing: usize,
    /// Whether a flood fill holds the gate.
    flooding: bool,
}

#[derive(Default)]
struct FloodGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

/// The lock table of one transceiver.
#[derive(Default)]
pub struct ExecuteLocks {
    chip_locks: DashMap<ChipCoord, Arc<Mutex<()>>>,
    gate: Arc<FloodGate>,
}

impl ExecuteLocks {
    /// Fresh lock table.
    #[must_use]
    pub fn new() -> Self {
        ExecuteLocks::default()
    }

    /// Acquire the right to execute on one chip.
    ///
    /// Blocks while another execute targets the same chip or a flood fill
    /// is running.
    #[must_use]
    pub fn lock_execute(&self, chip: ChipCoord) -> ChipExecuteGuard {
        let chip_lock = self
            .chip_locks
            .entry(chip)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let chip_guard = chip_lock.lock_arc();

        let mut state = self.gate.state.lock();
        while state.flooding {
            self.gate.changed.wait(&mut state);
        }
        state.executing += 1;
        drop(state);

        ChipExecuteGuard {
            gate: Arc::clone(&self.gate),
            _chip_guard: chip_guard,
        }
    }

    /// Acquire the right to flood fill.
    ///
    /// Blocks until no chip execute holds the gate and no other flood fill
    /// is running.
    #[must_use]
    pub fn lock_flood(&self) -> FloodGuard {
        let mut state = self.gate.state.lock();
        while state.flooding || state.executing > 0 {
            self.gate.changed.wait(&mut state);
        }
        state.flooding = true;
        drop(state);
        FloodGuard {
            gate: Arc::clone(&self.gate),
        }
    }

    /// Number of chip executes currently holding the gate.
    #[must_use]
    pub fn n_executing(&self) -> usize {
        self.gate.state.lock().executing
    }

    /// Whether a flood fill currently holds the gate.
    #[must_use]
    pub fn is_flooding(&self) -> bool {
        self.gate.state.lock().flooding
    }
}

/// Holds one chip-execute slot; released on drop.
pub struct ChipExecuteGuard {
    gate: Arc<FloodGate>,
    _chip_guard: parking_lot::ArcMutexGuard<parking_lot::RawMutex, ()>,
}

impl Drop for ChipExecuteGuard {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.executing -= 1;
        drop(state);
        self.gate.changed.notify_all();
    }
}

/// Holds the flood slot; released on drop.
pub struct FloodGuard {
    gate: Arc<FloodGate>,
}

impl Drop for FloodGuard {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.flooding = false;
        drop(state);
        self.gate.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_execute_blocks_flood() {
        let locks = Arc::new(ExecuteLocks::new());
        let guard = locks.lock_execute(ChipCoord::new(0, 0));

        let flood_ran = Arc::new(AtomicBool::new(false));
        let handle = {
            let locks = Arc::clone(&locks);
            let flood_ran = Arc::clone(&flood_ran);
            std::thread::spawn(move || {
                let _flood = locks.lock_flood();
                flood_ran.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(
            !flood_ran.load(Ordering::SeqCst),
            "flood started while a chip execute was running"
        );

        drop(guard);
        handle.join().expect("flood thread");
        assert!(flood_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_flood_blocks_execute() {
        let locks = Arc::new(ExecuteLocks::new());
        let flood = locks.lock_flood();

        let execute_ran = Arc::new(AtomicBool::new(false));
        let handle = {
            let locks = Arc::clone(&locks);
            let execute_ran = Arc::clone(&execute_ran);
            std::thread::spawn(move || {
                let _guard = locks.lock_execute(ChipCoord::new(1, 1));
                execute_ran.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!execute_ran.load(Ordering::SeqCst));

        drop(flood);
        handle.join().expect("execute thread");
        assert!(execute_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_executes_on_different_chips_overlap() {
        let locks = ExecuteLocks::new();
        let a = locks.lock_execute(ChipCoord::new(0, 0));
        let b = locks.lock_execute(ChipCoord::new(1, 0));
        assert_eq!(locks.n_executing(), 2);
        drop(a);
        drop(b);
        assert_eq!(locks.n_executing(), 0);
    }

    #[test]
    fn test_same_chip_executes_serialize() {
        let locks = Arc::new(ExecuteLocks::new());
        let guard = locks.lock_execute(ChipCoord::new(2, 2));

        let second_ran = Arc::new(AtomicBool::new(false));
        let handle = {
            let locks = Arc::clone(&locks);
            let second_ran = Arc::clone(&second_ran);
            std::thread::spawn(move || {
                let _guard = locks.lock_execute(ChipCoord::new(2, 2));
                second_ran.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!second_ran.load(Ordering::SeqCst));
        drop(guard);
        handle.join().expect("second execute");
        assert!(second_ran.load(Ordering::SeqCst));
    }
}
