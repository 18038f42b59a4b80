//! # Query Loop Tracking
//!
//! A store counts the query enumerators currently walking its columns.
//! Structural changes (archetype moves, entity create and delete, playback)
//! check the counter first and fail with
//! [`StoreError::QueryLoopActive`](crate::StoreError::QueryLoopActive)
//! instead of resizing storage an enumerator still reads.
//!
//! ## State Encoding
//!
//! | Counter | Meaning |
//! |--------:|---------|
//! | `0` | No active loop; structural changes allowed |
//! | `n > 0` | `n` enumerators alive |
//!
//! The counter is reentrant: nested loops simply increment it further. It
//! never blocks; a violation is reported to the caller immediately.
//!
//! ## RAII Integration
//!
//! [`QueryLoopGuard`] increments on creation and decrements on drop. It holds
//! an `Arc` to the counter rather than a borrow of the store, so hosts can
//! keep one open across calls that need `&mut Store` for non-structural work.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::engine::error::{StoreError, StoreResult};

/// Shared counter of active query loops.
#[derive(Clone, Default, Debug)]
pub struct QueryLoopTracker {
    active: Arc<AtomicU32>,
}

impl QueryLoopTracker {
    /// Creates a tracker with no active loops.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active loops.
    #[inline]
    pub fn active(&self) -> u32 {
        self.active.load(Ordering::Acquire)
    }

    /// Opens a loop.
    pub fn enter(&self) -> QueryLoopGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        QueryLoopGuard { active: Arc::clone(&self.active) }
    }

    /// Fails with `QueryLoopActive` while any loop is open.
    #[inline]
    pub fn ensure_idle(&self) -> StoreResult<()> {
        match self.active() {
            0 => Ok(()),
            loops => Err(StoreError::QueryLoopActive { loops }),
        }
    }
}

/// RAII guard for one active query loop.
#[derive(Debug)]
pub struct QueryLoopGuard {
    active: Arc<AtomicU32>,
}

impl Drop for QueryLoopGuard {
    fn drop(&mut self) {
        let previous = self.active.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0);
    }
}
