use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{ItemState, ReferenceId};

/// Per-job mapping from reference id to current item lifecycle state, with
/// per-state counters.
///
/// Updates arrive from any number of dispatch workers concurrently, so each
/// item's state lives in an atomically swappable cell and the counters are
/// atomics. The map lock is held only to look up or insert a cell; the
/// state swap itself is a compare-and-swap guarded by a terminal check, so
/// an item that reached [`ItemState::Delivered`], [`ItemState::Failed`] or
/// [`ItemState::Cancelled`] never leaves that state.
#[derive(Debug, Default)]
pub struct ItemStateTracker {
    cells: RwLock<HashMap<ReferenceId, Arc<AtomicU8>>>,
    counters: [AtomicU64; ItemState::COUNT],
}

impl ItemStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a state transition for one reference id.
    ///
    /// An unseen reference id is recorded with `new_state` as its first
    /// state, even when that state is already terminal (a duplicate
    /// network delivery of a status message may report an item this job
    /// never saw queued). An item whose current state is terminal is left
    /// untouched and the update is dropped.
    ///
    /// Returns `true` when the update was applied.
    pub fn update_state(&self, reference_id: ReferenceId, new_state: ItemState) -> bool {
        let cell = {
            let cells = self.cells.read().unwrap();
            cells.get(&reference_id).cloned()
        };

        let cell = match cell {
            Some(cell) => cell,
            None => {
                let mut cells = self.cells.write().unwrap();
                match cells.entry(reference_id) {
                    Entry::Vacant(entry) => {
                        entry.insert(Arc::new(AtomicU8::new(new_state as u8)));
                        drop(cells);
                        self.counters[new_state as usize].fetch_add(1, Ordering::Relaxed);
                        return true;
                    }
                    // Another worker inserted the cell between our read and
                    // write; fall through to the swap path.
                    Entry::Occupied(entry) => entry.get().clone(),
                }
            }
        };

        loop {
            let current = ItemState::from_u8(cell.load(Ordering::Acquire));
            if current.is_terminal() {
                return false;
            }
            if current == new_state {
                return true;
            }

            if cell
                .compare_exchange(
                    current as u8,
                    new_state as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                self.counters[current as usize].fetch_sub(1, Ordering::Relaxed);
                self.counters[new_state as usize].fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
    }

    /// Current state of one reference id, if it has been seen.
    pub fn state_of(&self, reference_id: ReferenceId) -> Option<ItemState> {
        let cells = self.cells.read().unwrap();
        cells
            .get(&reference_id)
            .map(|cell| ItemState::from_u8(cell.load(Ordering::Acquire)))
    }

    /// Returns total item count and per-state counts.
    ///
    /// The snapshot is consistent enough for monitoring and for the job's
    /// working-loop exit condition; it is not a single atomic
    /// point-in-time across all counters.
    pub fn snapshot(&self) -> TrackerSnapshot {
        let total = self.cells.read().unwrap().len();
        let mut counts = [0u64; ItemState::COUNT];
        for state in ItemState::ALL {
            counts[state as usize] = self.counters[state as usize].load(Ordering::Relaxed);
        }

        TrackerSnapshot { total, counts }
    }
}

/// Point-in-time per-state item counts for one job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Number of distinct reference ids seen.
    pub total: usize,
    counts: [u64; ItemState::COUNT],
}

impl TrackerSnapshot {
    /// Count of items currently in `state`.
    pub fn count(&self, state: ItemState) -> u64 {
        self.counts[state as usize]
    }

    /// Items still requiring forward processing; the job's working state
    /// cannot exit while this is non-zero.
    pub fn blocking(&self) -> u64 {
        ItemState::ALL
            .iter()
            .filter(|state| state.is_blocking())
            .map(|state| self.counts[*state as usize])
            .sum()
    }

    pub fn delivered(&self) -> u64 {
        self.count(ItemState::Delivered)
    }

    pub fn failed(&self) -> u64 {
        self.count(ItemState::Failed)
    }

    pub fn cancelled(&self) -> u64 {
        self.count(ItemState::Cancelled)
    }

    /// Renders the non-zero counts for diagnostics.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        for state in ItemState::ALL {
            let count = self.counts[state as usize];
            if count > 0 {
                parts.push(format!("{state}={count}"));
            }
        }
        if parts.is_empty() {
            return format!("total={} (no items)", self.total);
        }
        format!("total={} {}", self.total, parts.join(" "))
    }
}
