// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Load-amortized round-robin over the live population.

use std::collections::VecDeque;

use echo_sched::Tick;

use crate::host::EntityId;

/// Most entities inspected per scan invocation.
pub const SCAN_BATCH: usize = 5;
/// Ticks between starting the monitor and its first scan.
pub const SCAN_INITIAL_DELAY: Tick = 20;

/// Cursor over a snapshot of the population.
///
/// When the snapshot is exhausted the next call takes a fresh one, so an
/// entity that joins mid-pass is picked up on the following pass.
#[derive(Debug, Default)]
pub struct ScanCursor {
    pending: VecDeque<EntityId>,
}

impl ScanCursor {
    /// Empty cursor; the first call snapshots the population.
    pub fn new() -> Self {
        Self::default()
    }

    /// Up to [`SCAN_BATCH`] ids in traversal order. `population` is only
    /// called when the current snapshot is exhausted.
    pub fn next_batch(&mut self, population: impl FnOnce() -> Vec<EntityId>) -> Vec<EntityId> {
        if self.pending.is_empty() {
            self.pending = population().into();
        }
        let take = self.pending.len().min(SCAN_BATCH);
        self.pending.drain(..take).collect()
    }

    /// Ids still waiting in the current snapshot.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Discards the current snapshot.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: std::ops::Range<u64>) -> Vec<EntityId> {
        range.map(EntityId).collect()
    }

    #[test]
    fn walks_population_in_batches_then_wraps() {
        let mut cursor = ScanCursor::new();
        let mut snapshots = 0;
        let mut pass = |cursor: &mut ScanCursor| {
            cursor.next_batch(|| {
                snapshots += 1;
                ids(0..12)
            })
        };
        assert_eq!(pass(&mut cursor), ids(0..5));
        assert_eq!(pass(&mut cursor), ids(5..10));
        assert_eq!(pass(&mut cursor), ids(10..12));
        assert_eq!(pass(&mut cursor), ids(0..5));
        assert_eq!(snapshots, 2);
    }

    #[test]
    fn empty_population_yields_empty_batch() {
        let mut cursor = ScanCursor::new();
        assert!(cursor.next_batch(Vec::new).is_empty());
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn budget_is_independent_of_population_size() {
        let mut cursor = ScanCursor::new();
        assert_eq!(cursor.next_batch(|| ids(0..10_000)).len(), SCAN_BATCH);
        assert_eq!(cursor.remaining(), 10_000 - SCAN_BATCH);
        cursor.reset();
        assert_eq!(cursor.remaining(), 0);
    }
}
