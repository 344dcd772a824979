//! Persistent monotonic counters for identifier allocation
//!
//! Counters live in the `sequences` table as decimal strings. Allocation is
//! read-increment-write with no internal locking: the hosting ledger
//! serializes top-level operations, so at most one allocation races per
//! transaction.

use crate::{
    error::Result,
    store::{StateStore, TABLE_SEQUENCES},
};
use std::sync::Arc;

/// Allocator over named persisted counters
pub struct SequenceAllocator {
    store: Arc<dyn StateStore>,
}

impl SequenceAllocator {
    /// Create an allocator over the store
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Issue the next value for `name`
    ///
    /// A missing or unparsable counter reads as 0, so the first issued
    /// value is 1.
    pub fn next(&self, name: &str) -> Result<u64> {
        let current = self
            .store
            .get(TABLE_SEQUENCES, name.as_bytes())?
            .map(|raw| String::from_utf8_lossy(&raw).parse::<u64>().unwrap_or(0))
            .unwrap_or(0);

        let next = current + 1;
        self.store
            .replace(TABLE_SEQUENCES, name.as_bytes(), next.to_string().as_bytes())?;

        tracing::debug!(sequence = name, value = next, "Allocated sequence value");
        Ok(next)
    }
}
