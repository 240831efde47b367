/*!
 * Fiber Lifecycle
 * Thread spawn, thread exit and the post-fork reset
 */

use super::FiberProcess;
use crate::core::errors::FiberResult;
use crate::core::limits::FUTEX_BITSET_MATCH_ANY;
use crate::core::types::{FiberHandle, Tid};
use crate::fibers::{CloneTids, GuestContext};
use crate::scheduler::CoopScheduler;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, trace};

impl<C: GuestContext, S: CoopScheduler> FiberProcess<C, S> {
    /// Start a new guest thread bound to `context`
    ///
    /// The fiber is registered before its body first runs, so the TID is
    /// visible to the parent and to the child immediately. The TID is also
    /// stored into the parent/child TID words when given. When `body`
    /// completes the fiber exits as if it had called `exit`.
    ///
    /// Fails with `TidExhausted` without starting anything once every TID
    /// has been handed out.
    pub fn spawn_thread<F, Fut>(
        self: &Arc<Self>,
        context: Arc<C>,
        tids: CloneTids<'_>,
        body: F,
    ) -> FiberResult<Tid>
    where
        F: FnOnce(Arc<C>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.scheduler.reserve();
        let tid = self
            .registry
            .register(handle, Arc::clone(&context), tids.clear_child_tid)?;

        for word in [tids.parent_tid, tids.child_tid].into_iter().flatten() {
            word.store(tid as u32, Ordering::Release);
        }

        let process = Arc::clone(self);
        let run = body(context);
        self.scheduler.spawn(
            handle,
            Box::pin(async move {
                run.await;
                process.exit_fiber(handle);
            }),
        );
        debug!(tid, %handle, "guest thread spawned");
        Ok(tid)
    }

    /// Unregister the fiber for `handle`
    ///
    /// Zeroes and wakes its clear-child-TID word if it has one. Returns
    /// whether the fiber was still registered; a second exit is a no-op.
    pub fn exit_fiber(&self, handle: FiberHandle) -> bool {
        let Some(fiber) = self.registry.take(handle) else {
            return false;
        };

        if let Some(word) = fiber.clear_child_tid() {
            word.store(0, Ordering::Release);
            if let Ok(woken) = self.futex.wake(word, 1, FUTEX_BITSET_MATCH_ANY) {
                trace!(tid = fiber.tid(), woken, "clear-child-tid woken");
            }
        }
        debug!(tid = fiber.tid(), %handle, "fiber exited");
        true
    }

    /// Fork hook; only the child side resets state
    pub fn fork_end(&self, child: bool) {
        if child {
            self.reset_after_fork();
        }
    }

    /// Leave exactly the calling fiber registered and no futex waiters
    ///
    /// Every other fiber's scheduling unit is cancelled, the inline main
    /// fiber included when a worker is the caller. Called from outside any
    /// fiber, the main fiber is the one kept. Takes the registry lock,
    /// releases it, then takes the futex lock. Idempotent.
    pub fn reset_after_fork(&self) {
        let keep = self.scheduler.current().or_else(|| *self.main.lock());
        let removed = self.registry.retain_only(keep);
        for fiber in &removed {
            self.scheduler.cancel(fiber.handle());
        }
        let dropped = self.futex.clear();

        if let Some(handle) = keep {
            *self.main.lock() = Some(handle);
        }
        info!(
            removed = removed.len(),
            dropped_waiters = dropped,
            "fiber state reset after fork"
        );
    }
}
