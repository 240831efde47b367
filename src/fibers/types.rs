/*!
 * Fiber Types
 * Registry entries and the execution-context seam
 */

use crate::core::types::{FiberHandle, Signal, Tid};
use std::fmt;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

/// Guest execution context driven by a fiber
///
/// Owned by the emulator core; fibers only hold a shared reference.
pub trait GuestContext: Send + Sync + 'static {
    /// Queue `signal` for delivery into this context
    fn force_signal(&self, signal: Signal);
}

/// Registry entry for one live fiber
pub struct Fiber<C> {
    tid: Tid,
    handle: FiberHandle,
    context: Arc<C>,
    clear_child_tid: Option<&'static AtomicU32>,
}

impl<C> Fiber<C> {
    pub(crate) fn new(
        tid: Tid,
        handle: FiberHandle,
        context: Arc<C>,
        clear_child_tid: Option<&'static AtomicU32>,
    ) -> Self {
        Self {
            tid,
            handle,
            context,
            clear_child_tid,
        }
    }

    #[inline]
    pub fn tid(&self) -> Tid {
        self.tid
    }

    #[inline]
    pub fn handle(&self) -> FiberHandle {
        self.handle
    }

    #[inline]
    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    /// Word zeroed and woken when the fiber exits
    #[inline]
    pub fn clear_child_tid(&self) -> Option<&'static AtomicU32> {
        self.clear_child_tid
    }
}

impl<C> fmt::Debug for Fiber<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("tid", &self.tid)
            .field("handle", &self.handle)
            .field("clear_child_tid", &self.clear_child_tid.is_some())
            .finish()
    }
}

/// TID words filled in at spawn time (the `clone` TID pointers)
#[derive(Debug, Default, Clone, Copy)]
pub struct CloneTids<'a> {
    /// Receives the new TID in the parent's memory
    pub parent_tid: Option<&'a AtomicU32>,
    /// Receives the new TID in the child's memory
    pub child_tid: Option<&'a AtomicU32>,
    /// Zeroed and futex-woken when the child exits
    pub clear_child_tid: Option<&'static AtomicU32>,
}
