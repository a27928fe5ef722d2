/// Changeset - record-level deltas produced by filter updates
///
/// Every time a dimension's filter changes, the store records which records
/// started passing that dimension and which stopped passing it. Consumers that
/// render per-record output (panel grids, highlight layers) can drain these
/// deltas instead of diffing whole pages.
///
/// # Usage Pattern
///
/// 1. A dimension filter update computes the records whose state flipped
/// 2. The store appends one `FilterChange` and bumps its generation
/// 3. Groups compare generations to decide whether to re-aggregate
/// 4. Downstream consumers call `drain()` when they have caught up

use crate::store::RecordIndex;
use std::collections::VecDeque;

/// Number of undrained changes kept before the oldest are discarded.
pub const DEFAULT_CHANGESET_CAPACITY: usize = 256;

/// The effect of one filter update on one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChange {
    /// Name of the dimension whose filter changed
    pub dimension: String,
    /// Records that now pass this dimension's filter and did not before
    pub added: Vec<RecordIndex>,
    /// Records that passed this dimension's filter before and now do not
    pub removed: Vec<RecordIndex>,
}

impl FilterChange {
    pub fn new(dimension: impl Into<String>) -> Self {
        FilterChange {
            dimension: dimension.into(),
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Returns true if no record changed state.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Number of records whose state flipped.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// Bounded log of filter changes with a monotonically increasing generation.
#[derive(Debug, Clone)]
pub struct Changeset {
    changes: VecDeque<FilterChange>,
    /// Incremented on every push, never reset
    generation: u64,
    capacity: usize,
    dropped: u64,
}

impl Default for Changeset {
    fn default() -> Self {
        Self::new()
    }
}

impl Changeset {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANGESET_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Changeset {
            changes: VecDeque::new(),
            generation: 0,
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Record a change. Empty changes still advance the generation because
    /// the filter itself changed.
    pub fn push(&mut self, change: FilterChange) {
        self.generation += 1;
        if self.changes.len() == self.capacity {
            self.changes.pop_front();
            self.dropped += 1;
        }
        self.changes.push_back(change);
    }

    /// Pending changes, oldest first.
    pub fn changes(&self) -> impl Iterator<Item = &FilterChange> {
        self.changes.iter()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of changes discarded because nobody drained them in time.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Take every pending change, leaving the generation untouched.
    pub fn drain(&mut self) -> Vec<FilterChange> {
        self.changes.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }
}
