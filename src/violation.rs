//! Violation map: the pre-correction ("internal-only") timestamp recorded at
//! every receive-side event that underwent a forward amortization, keyed by
//! the event's local index so the backward pass can walk it in order.
//!
//! Grounded in `original_source/src/clc/Synchronizer.cpp`'s use of a
//! `map<uint32_t, timestamp_t>` alongside the `tsa` buffer during
//! `forward_amortization`/`backward_amortization`.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ViolationMap {
    entries: BTreeMap<u64, f64>,
}

impl ViolationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the internal-only amortized timestamp at `local_idx`.
    pub fn insert(&mut self, local_idx: u64, internal_ts: f64) {
        self.entries.insert(local_idx, internal_ts);
    }

    pub fn get(&self, local_idx: u64) -> Option<f64> {
        self.entries.get(&local_idx).copied()
    }

    pub fn contains(&self, local_idx: u64) -> bool {
        self.entries.contains_key(&local_idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates violations in ascending local-index order, as the backward
    /// pass requires.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (u64, f64)> + '_ {
        self.entries.iter().map(|(&idx, &ts)| (idx, ts))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
