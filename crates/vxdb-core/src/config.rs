//! Runtime configuration surface (spec §4.9).
//!
//! No external config file format is read; the embedding application
//! constructs an [`EngineConfig`] programmatically, matching the "no CLI
//! surface" contract in spec §6.

use vxdb_index::{DEFAULT_HT_LOAD_FACTOR, SLOT_CAPACITY};
use vxdb_types::DEFAULT_PAGE_SIZE;

/// Engine-wide tunables. `Default` matches the constants named throughout
/// the spec (4 KiB pages, `DEFAULT_HT_LOAD_FACTOR`).
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub page_size: usize,
    pub ht_load_factor: f64,
    pub initial_primary_slots_per_shard: usize,
    pub buffer_pool_capacity: usize,
}

impl EngineConfig {
    #[must_use]
    pub const fn new() -> Self {
        EngineConfig {
            page_size: DEFAULT_PAGE_SIZE,
            ht_load_factor: DEFAULT_HT_LOAD_FACTOR,
            initial_primary_slots_per_shard: SLOT_CAPACITY,
            buffer_pool_capacity: 4096,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.page_size, 4096);
        assert!((cfg.ht_load_factor - 0.8).abs() < f64::EPSILON);
    }
}
