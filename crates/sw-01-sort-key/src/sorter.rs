//! # Lexicographical Sorter
//!
//! Assigns a sort key to every record that lacks one and orders records by
//! key. Keys already present (assigned by a sequencer) are trusted as-is.

use shared_types::{InteractionRecord, SortKey};
use tracing::debug;

use crate::domain::generator::{create_sort_key, generate_last_sort_key};

/// Sorter implementing the lexicographical sort key protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicographicalSorter;

impl LexicographicalSorter {
    /// Create a sorter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Assign missing keys, then stable-sort by key.
    #[must_use]
    pub fn sort(&self, mut records: Vec<InteractionRecord>) -> Vec<InteractionRecord> {
        let mut assigned = 0usize;
        for record in &mut records {
            if record.sort_key.is_none() {
                record.sort_key = Some(self.create_sort_key(
                    &record.block.id,
                    &record.id,
                    record.block.height,
                    record.dry,
                ));
                assigned += 1;
            }
        }
        records.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
        debug!(total = records.len(), assigned, "sorted interactions");
        records
    }

    /// See [`create_sort_key`].
    #[must_use]
    pub fn create_sort_key(
        &self,
        block_id: &str,
        tx_id: &str,
        block_height: u64,
        dummy: bool,
    ) -> SortKey {
        create_sort_key(block_id, tx_id, block_height, dummy)
    }

    /// See [`generate_last_sort_key`].
    #[must_use]
    pub fn generate_last_sort_key(&self, block_height: u64) -> SortKey {
        generate_last_sort_key(block_height)
    }

    /// Block height encoded in a key.
    #[must_use]
    pub fn extract_block_height(&self, sort_key: &SortKey) -> Option<u64> {
        sort_key.block_height()
    }
}
