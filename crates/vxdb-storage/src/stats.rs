//! Per-table statistics.
//!
//! The source dynamically downcasts between node- and rel-table statistics
//! variants; here that becomes a tagged enum dispatched on its own variant
//! (spec §9 design note).

use std::collections::HashSet;

/// Row-count and tombstone bookkeeping for a node table.
#[derive(Default)]
pub struct NodeStats {
    deleted_offsets: HashSet<u64>,
}

impl NodeStats {
    #[must_use]
    pub fn new() -> Self {
        NodeStats::default()
    }

    pub fn mark_deleted(&mut self, offset: u64) {
        self.deleted_offsets.insert(offset);
    }

    #[must_use]
    pub fn is_deleted(&self, offset: u64) -> bool {
        self.deleted_offsets.contains(&offset)
    }

    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted_offsets.len()
    }
}

/// Live-edge bookkeeping for a rel table.
#[derive(Default)]
pub struct RelStats {
    count: u64,
}

impl RelStats {
    #[must_use]
    pub fn new() -> Self {
        RelStats::default()
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    pub fn increment(&mut self) {
        self.count += 1;
    }

    pub fn decrement_by(&mut self, n: u64) {
        self.count = self.count.saturating_sub(n);
    }
}

/// Tagged dispatch between the two statistics kinds a table owns (spec §9
/// design note: dynamic downcasts become a tag).
pub enum TableStats {
    Node(NodeStats),
    Rel(RelStats),
}
