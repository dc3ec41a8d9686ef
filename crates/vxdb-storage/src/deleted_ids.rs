//! Per-node-table offset allocator: the linearisation point for offset
//! assignment (spec §5 "Deleted-IDs allocator").
//!
//! Reuses tombstoned offsets before handing out a fresh one, so a table's
//! offset space stays dense under churn rather than growing unboundedly.

use parking_lot::Mutex;

#[derive(Default)]
struct State {
    next_offset: u64,
    freed: Vec<u64>,
}

/// Internally-serialised allocator owned by one node table.
pub struct DeletedIdsAllocator {
    state: Mutex<State>,
}

impl DeletedIdsAllocator {
    #[must_use]
    pub fn new() -> Self {
        DeletedIdsAllocator {
            state: Mutex::new(State::default()),
        }
    }

    /// Obtain a fresh offset, preferring a tombstoned one if available.
    pub fn allocate(&self) -> u64 {
        let mut state = self.state.lock();
        if let Some(reused) = state.freed.pop() {
            return reused;
        }
        let offset = state.next_offset;
        state.next_offset += 1;
        offset
    }

    /// Mark `offset` deleted so a future [`DeletedIdsAllocator::allocate`]
    /// can reuse it.
    pub fn free(&self, offset: u64) {
        self.state.lock().freed.push(offset);
    }

    #[must_use]
    pub fn high_water_mark(&self) -> u64 {
        self.state.lock().next_offset
    }
}

impl Default for DeletedIdsAllocator {
    fn default() -> Self {
        DeletedIdsAllocator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequential_offsets_with_no_frees() {
        let a = DeletedIdsAllocator::new();
        assert_eq!(a.allocate(), 0);
        assert_eq!(a.allocate(), 1);
        assert_eq!(a.allocate(), 2);
    }

    #[test]
    fn freed_offset_is_reused_before_a_fresh_one() {
        let a = DeletedIdsAllocator::new();
        let o0 = a.allocate();
        let o1 = a.allocate();
        a.free(o0);
        assert_eq!(a.allocate(), o0);
        assert_eq!(a.allocate(), 2);
        let _ = o1;
    }
}
