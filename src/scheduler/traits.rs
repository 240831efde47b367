/*!
 * Cooperative Scheduler Traits
 *
 * The minimal capability the fiber core needs from a cooperative runtime.
 *
 * # Design
 *
 * The futex engine only ever suspends the current fiber on a private wait
 * object, signals a specific wait object, yields, and reads the census.
 * Spawning, cancelling, sleeping and offloading are used by the process
 * layer. Any single-threaded cooperative runtime can implement this; the
 * crate ships a tokio implementation.
 */

use super::types::{TaskCensus, WakeReason};
use crate::core::errors::FiberResult;
use crate::core::types::FiberHandle;
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;

/// Cooperative scheduling capability
pub trait CoopScheduler: Send + Sync + 'static {
    /// Private wait object: one per suspended waiter
    type Signal: Default + Send + Sync + 'static;

    /// Scheduling handle of the fiber currently running, if any
    fn current(&self) -> Option<FiberHandle>;

    /// Allocate a handle for a scheduling unit that is about to be spawned
    fn reserve(&self) -> FiberHandle;

    /// Start a scheduling unit for `handle` running `body`
    fn spawn(&self, handle: FiberHandle, body: BoxFuture<'static, ()>);

    /// Run `body` inline as the fiber `handle` (used for the main fiber)
    ///
    /// The inline unit is cancellable like a spawned one; a cancelled body
    /// is dropped at its next suspension and the call fails with
    /// `FiberError::Discarded`.
    fn scope<'a, T>(
        &'a self,
        handle: FiberHandle,
        body: BoxFuture<'a, T>,
    ) -> BoxFuture<'a, FiberResult<T>>
    where
        T: Send + 'a;

    /// Discard the scheduling unit for `handle`, spawned or inline; returns
    /// whether it was live
    fn cancel(&self, handle: FiberHandle) -> bool;

    /// Suspend the current fiber until `signal` is notified or `timeout` elapses
    fn suspend<'a>(
        &'a self,
        signal: &'a Self::Signal,
        timeout: Option<Duration>,
    ) -> BoxFuture<'a, WakeReason>;

    /// Resume the fiber suspended on `signal`
    ///
    /// A notification delivered before the waiter reaches its suspension
    /// point is kept, so the waiter resumes immediately.
    fn notify(&self, signal: &Self::Signal);

    /// Suspend the current fiber for `duration`
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

    /// Let other ready fibers run
    fn yield_now(&self) -> BoxFuture<'static, ()>;

    /// Run a call that would block the execution context outside of it,
    /// suspending the current fiber until it completes
    fn offload<F, T>(&self, call: F) -> BoxFuture<'static, FiberResult<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static;

    /// Counts of new, ready and suspended fibers
    fn census(&self) -> TaskCensus;
}

/// Extension helpers over any scheduler
pub trait CoopSchedulerExt: CoopScheduler {
    /// Run `fut` as the fiber `handle`, boxing it first
    fn enter<'a, F>(&'a self, handle: FiberHandle, fut: F) -> BoxFuture<'a, FiberResult<F::Output>>
    where
        F: Future + Send + 'a,
        F::Output: Send + 'a,
    {
        self.scope(handle, Box::pin(fut))
    }
}

impl<S: CoopScheduler> CoopSchedulerExt for S {}
