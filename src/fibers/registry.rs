/*!
 * Fiber Registry
 *
 * Maps each live scheduling unit to its guest TID and execution context.
 *
 * # Design
 *
 * One coarse lock over a flat list. Fiber counts are small, so lookups by
 * handle or TID are linear scans. TIDs come from a monotonic generator that
 * survives `clear` and `retain_only`, so a TID is never handed out twice in
 * the lifetime of the process. Registration fails once the TID space is
 * exhausted.
 */

use super::types::Fiber;
use crate::core::errors::{FiberError, FiberResult};
use crate::core::id::TidGenerator;
use crate::core::limits::BASE_FIBER_TID;
use crate::core::types::{FiberHandle, Tid};
use parking_lot::RwLock;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tracing::debug;

/// Lock-guarded table of live fibers
pub struct FiberRegistry<C> {
    fibers: RwLock<Vec<Arc<Fiber<C>>>>,
    tids: TidGenerator,
}

impl<C> FiberRegistry<C> {
    pub fn new() -> Self {
        Self {
            fibers: RwLock::new(Vec::new()),
            tids: TidGenerator::new(BASE_FIBER_TID),
        }
    }

    /// Register a scheduling unit and assign it the next TID
    pub fn register(
        &self,
        handle: FiberHandle,
        context: Arc<C>,
        clear_child_tid: Option<&'static AtomicU32>,
    ) -> FiberResult<Tid> {
        let mut fibers = self.fibers.write();
        let tid = self.tids.next().ok_or(FiberError::TidExhausted)?;
        fibers.push(Arc::new(Fiber::new(tid, handle, context, clear_child_tid)));
        debug!(tid, %handle, live = fibers.len(), "fiber registered");
        Ok(tid)
    }

    /// Remove the entry for `handle`, returning whether it existed
    pub fn unregister(&self, handle: FiberHandle) -> bool {
        self.take(handle).is_some()
    }

    /// Remove and return the entry for `handle`
    pub fn take(&self, handle: FiberHandle) -> Option<Arc<Fiber<C>>> {
        let mut fibers = self.fibers.write();
        let idx = fibers.iter().position(|f| f.handle() == handle)?;
        let fiber = fibers.swap_remove(idx);
        debug!(tid = fiber.tid(), %handle, live = fibers.len(), "fiber unregistered");
        Some(fiber)
    }

    pub fn by_handle(&self, handle: FiberHandle) -> Option<Arc<Fiber<C>>> {
        self.fibers
            .read()
            .iter()
            .find(|f| f.handle() == handle)
            .cloned()
    }

    pub fn by_tid(&self, tid: Tid) -> Option<Arc<Fiber<C>>> {
        self.fibers.read().iter().find(|f| f.tid() == tid).cloned()
    }

    /// Drop every entry except the one for `keep`
    ///
    /// Returns the removed entries so the caller can cancel their scheduling
    /// units. Used by the post-fork reset.
    pub fn retain_only(&self, keep: Option<FiberHandle>) -> Vec<Arc<Fiber<C>>> {
        let mut fibers = self.fibers.write();
        let (kept, removed): (Vec<_>, Vec<_>) = fibers
            .drain(..)
            .partition(|f| Some(f.handle()) == keep);
        *fibers = kept;
        removed
    }

    /// Drop every entry (TID numbering continues)
    pub fn clear(&self) {
        self.fibers.write().clear();
    }

    pub fn len(&self) -> usize {
        self.fibers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.read().is_empty()
    }

    /// TID most recently handed out
    pub fn last_tid(&self) -> Tid {
        self.tids.current()
    }
}

impl<C> Default for FiberRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
