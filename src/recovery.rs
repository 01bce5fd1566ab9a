//! Startup recovery sweep
//!
//! Normalizes state a prior crash may have left behind. Runs exactly once,
//! before the first session opens. Only the current session ever writes
//! in_progress, so anything in_progress at startup is an orphan.

use crate::store::{Store, StoreError};

/// In-progress rows older than this are released even if a live process
/// somehow still holds them.
pub const STALE_HOURS: i64 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub orphans_reset: usize,
    pub stale_reset: usize,
}

/// Sweep orphaned and stale in-progress features back to pending.
/// Counts are logged; nothing here fails the run beyond store errors.
pub fn run(store: &Store) -> Result<RecoveryReport, StoreError> {
    let orphans_reset = store.reset_orphans()?;
    if orphans_reset > 0 {
        tracing::warn!(
            "recovered {} orphaned in-progress feature(s) from a prior crash",
            orphans_reset
        );
    }

    let stale_reset = store.reset_stale(STALE_HOURS)?;
    if stale_reset > 0 {
        tracing::warn!(
            "released {} stale in-progress feature(s) older than {}h",
            stale_reset,
            STALE_HOURS
        );
    }

    tracing::debug!(
        "recovery sweep complete: {} orphaned, {} stale",
        orphans_reset,
        stale_reset
    );
    Ok(RecoveryReport {
        orphans_reset,
        stale_reset,
    })
}
