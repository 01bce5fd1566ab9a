//! Batch selection
//!
//! Selects the next work unit for a session: up to [`BATCH_SIZE`] pending
//! features from the numerically lowest category still containing pending
//! work, in ascending id order. Small enough that one agent invocation
//! stays inside a useful context window, large enough to amortize session
//! setup across related features. The batcher never mutates state; the
//! agent itself marks features in_progress as it picks them up.

use crate::store::{Feature, Store, StoreError};

/// Maximum features handed to one session.
pub const BATCH_SIZE: usize = 3;

#[derive(Debug, Clone)]
pub struct Batcher {
    store: Store,
}

impl Batcher {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The next batch, or an empty vec when no pending work remains.
    pub fn next_batch(&self) -> Result<Vec<Feature>, StoreError> {
        self.store.next_batch(BATCH_SIZE)
    }
}
