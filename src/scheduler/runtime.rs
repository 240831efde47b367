/*!
 * Tokio Cooperative Scheduler
 *
 * Fibers as tokio tasks on a current-thread runtime.
 *
 * # Design
 *
 * - One task per fiber; the task-local `CURRENT_FIBER` carries its handle
 * - The main fiber runs inline under an `Abortable`, registered next to the
 *   spawned tasks so `cancel` reaches it too
 * - Private wait objects are `tokio::sync::Notify`, whose stored permit
 *   makes a notify that races ahead of the wait harmless
 * - Census counters are updated by RAII guards so cancelled tasks and
 *   dropped waits keep the counts balanced
 *
 * All entry points must be called from inside a tokio runtime with the time
 * driver enabled. A current-thread runtime gives the single execution
 * context the futex engine assumes.
 */

use super::traits::CoopScheduler;
use super::types::{TaskCensus, WakeReason};
use crate::core::errors::{FiberError, FiberResult};
use crate::core::id::{HandleGenerator, IdGenerator};
use crate::core::types::FiberHandle;
use ahash::RandomState;
use dashmap::DashMap;
use futures::future::{AbortHandle as InlineAbort, Abortable, BoxFuture};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::trace;

tokio::task_local! {
    static CURRENT_FIBER: FiberHandle;
}

/// Cancellation handle of one live scheduling unit
enum UnitAbort {
    Task(AbortHandle),
    Inline(InlineAbort),
}

impl UnitAbort {
    fn abort(&self) {
        match self {
            UnitAbort::Task(task) => task.abort(),
            UnitAbort::Inline(inline) => inline.abort(),
        }
    }
}

type TaskTable = DashMap<FiberHandle, UnitAbort, RandomState>;

#[derive(Default)]
struct CensusCounters {
    new: AtomicUsize,
    running: AtomicUsize,
    suspended: AtomicUsize,
}

impl CensusCounters {
    /// Decrement without wrapping; returns whether a unit was taken
    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Counts a spawned unit as new until first poll, then running until drop
struct UnitGuard {
    handle: FiberHandle,
    census: Arc<CensusCounters>,
    tasks: Arc<TaskTable>,
    started: bool,
}

impl UnitGuard {
    fn start(&mut self) {
        if !self.started {
            self.started = true;
            CensusCounters::take(&self.census.new);
            self.census.running.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        if self.started {
            CensusCounters::take(&self.census.running);
        } else {
            CensusCounters::take(&self.census.new);
        }
        self.tasks.remove(&self.handle);
        trace!(handle = %self.handle, "scheduling unit finished");
    }
}

/// Counts the inline main fiber as running
struct RunningGuard(Arc<CensusCounters>);

impl RunningGuard {
    fn enter(census: Arc<CensusCounters>) -> Self {
        census.running.fetch_add(1, Ordering::Relaxed);
        Self(census)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        CensusCounters::take(&self.0.running);
    }
}

/// Keeps an inline unit's abort handle registered while its scope exists
struct InlineGuard {
    handle: FiberHandle,
    tasks: Arc<TaskTable>,
}

impl Drop for InlineGuard {
    fn drop(&mut self) {
        self.tasks
            .remove_if(&self.handle, |_, unit| matches!(unit, UnitAbort::Inline(_)));
    }
}

/// Moves the caller from running to suspended for its lifetime
///
/// Callers outside any fiber were never counted as running.
struct SuspendedGuard {
    census: Arc<CensusCounters>,
    was_running: bool,
}

impl SuspendedGuard {
    fn enter(census: Arc<CensusCounters>, in_fiber: bool) -> Self {
        let was_running = in_fiber && CensusCounters::take(&census.running);
        census.suspended.fetch_add(1, Ordering::Relaxed);
        Self {
            census,
            was_running,
        }
    }
}

impl Drop for SuspendedGuard {
    fn drop(&mut self) {
        CensusCounters::take(&self.census.suspended);
        if self.was_running {
            self.census.running.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Cooperative scheduler backed by tokio tasks
pub struct TokioScheduler {
    handles: HandleGenerator,
    tasks: Arc<TaskTable>,
    census: Arc<CensusCounters>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self {
            handles: HandleGenerator::new(0),
            tasks: Arc::new(DashMap::with_hasher(RandomState::new())),
            census: Arc::new(CensusCounters::default()),
        }
    }

    /// Number of live units (spawned tasks and inline scopes) not yet
    /// finished or cancelled
    pub fn live_tasks(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CoopScheduler for TokioScheduler {
    type Signal = Notify;

    fn current(&self) -> Option<FiberHandle> {
        CURRENT_FIBER.try_with(|handle| *handle).ok()
    }

    fn reserve(&self) -> FiberHandle {
        self.handles.next()
    }

    fn spawn(&self, handle: FiberHandle, body: BoxFuture<'static, ()>) {
        self.census.new.fetch_add(1, Ordering::Relaxed);
        let mut guard = UnitGuard {
            handle,
            census: Arc::clone(&self.census),
            tasks: Arc::clone(&self.tasks),
            started: false,
        };

        let task = tokio::spawn(async move {
            guard.start();
            CURRENT_FIBER.scope(handle, body).await;
            drop(guard);
        });

        // Single execution context: the task cannot finish before this insert
        self.tasks.insert(handle, UnitAbort::Task(task.abort_handle()));
        trace!(%handle, "scheduling unit spawned");
    }

    fn scope<'a, T>(
        &'a self,
        handle: FiberHandle,
        body: BoxFuture<'a, T>,
    ) -> BoxFuture<'a, FiberResult<T>>
    where
        T: Send + 'a,
    {
        let census = Arc::clone(&self.census);
        let (abort, registration) = InlineAbort::new_pair();
        self.tasks.insert(handle, UnitAbort::Inline(abort));
        let unit = InlineGuard {
            handle,
            tasks: Arc::clone(&self.tasks),
        };

        Box::pin(async move {
            let _unit = unit;
            let _running = RunningGuard::enter(census);
            Abortable::new(CURRENT_FIBER.scope(handle, body), registration)
                .await
                .map_err(|_| FiberError::Discarded(handle))
        })
    }

    fn cancel(&self, handle: FiberHandle) -> bool {
        match self.tasks.remove(&handle) {
            Some((_, unit)) => {
                unit.abort();
                trace!(%handle, "scheduling unit cancelled");
                true
            }
            None => false,
        }
    }

    fn suspend<'a>(
        &'a self,
        signal: &'a Notify,
        timeout: Option<Duration>,
    ) -> BoxFuture<'a, WakeReason> {
        let census = Arc::clone(&self.census);
        let in_fiber = self.current().is_some();
        Box::pin(async move {
            let _suspended = SuspendedGuard::enter(census, in_fiber);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, signal.notified()).await {
                    Ok(()) => WakeReason::Notified,
                    Err(_) => WakeReason::TimedOut,
                },
                None => {
                    signal.notified().await;
                    WakeReason::Notified
                }
            }
        })
    }

    fn notify(&self, signal: &Notify) {
        signal.notify_one();
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let census = Arc::clone(&self.census);
        let in_fiber = self.current().is_some();
        Box::pin(async move {
            let _suspended = SuspendedGuard::enter(census, in_fiber);
            tokio::time::sleep(duration).await;
        })
    }

    fn yield_now(&self) -> BoxFuture<'static, ()> {
        Box::pin(tokio::task::yield_now())
    }

    fn offload<F, T>(&self, call: F) -> BoxFuture<'static, FiberResult<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let census = Arc::clone(&self.census);
        let in_fiber = self.current().is_some();
        Box::pin(async move {
            let _suspended = SuspendedGuard::enter(census, in_fiber);
            tokio::task::spawn_blocking(call)
                .await
                .map_err(|e| FiberError::Offload(e.to_string()))
        })
    }

    fn census(&self) -> TaskCensus {
        let running = self.census.running.load(Ordering::Relaxed);
        let ready = if self.current().is_some() {
            running.saturating_sub(1)
        } else {
            running
        };
        TaskCensus {
            new: self.census.new.load(Ordering::Relaxed),
            ready,
            suspended: self.census.suspended.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::traits::CoopSchedulerExt;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn test_current_is_scoped() {
        let scheduler = TokioScheduler::new();
        assert_eq!(scheduler.current(), None);

        let handle = scheduler.reserve();
        let seen = scheduler
            .enter(handle, async { scheduler.current() })
            .await;
        assert_eq!(seen, Ok(Some(handle)));
        assert_eq!(scheduler.current(), None);
        assert_eq!(scheduler.live_tasks(), 0);
    }

    #[tokio::test]
    async fn test_cancel_reaches_inline_unit() {
        let scheduler = Arc::new(TokioScheduler::new());
        let handle = scheduler.reserve();
        let signal = Notify::new();

        let other = scheduler.reserve();
        let inner = Arc::clone(&scheduler);
        scheduler.spawn(
            other,
            Box::pin(async move {
                inner.cancel(handle);
            }),
        );

        let result = scheduler
            .enter(handle, async {
                scheduler
                    .suspend(&signal, Some(Duration::from_secs(5)))
                    .await
            })
            .await;
        assert_eq!(result, Err(FiberError::Discarded(handle)));
        assert_eq!(scheduler.census().suspended, 0);
        assert_eq!(scheduler.census().ready, 0);
    }

    #[tokio::test]
    async fn test_spawned_unit_sees_its_handle() {
        let scheduler = Arc::new(TokioScheduler::new());
        let handle = scheduler.reserve();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let inner = Arc::clone(&scheduler);
        scheduler.spawn(
            handle,
            Box::pin(async move {
                let _ = tx.send(inner.current());
            }),
        );

        assert_eq!(scheduler.census().new, 1);
        assert_eq!(rx.await.ok().flatten(), Some(handle));
    }

    #[tokio::test]
    async fn test_notify_before_suspend_is_not_lost() {
        let scheduler = TokioScheduler::new();
        let signal = Notify::new();

        scheduler.notify(&signal);
        let reason = scheduler
            .suspend(&signal, Some(Duration::from_secs(1)))
            .await;
        assert_eq!(reason, WakeReason::Notified);
    }

    #[tokio::test]
    async fn test_suspend_times_out() {
        let scheduler = TokioScheduler::new();
        let signal = Notify::new();

        let reason = scheduler
            .suspend(&signal, Some(Duration::from_millis(10)))
            .await;
        assert!(reason.timed_out());
        assert_eq!(scheduler.census().suspended, 0);
    }

    #[tokio::test]
    async fn test_cancel_drops_unit() {
        let scheduler = TokioScheduler::new();
        let handle = scheduler.reserve();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        scheduler.spawn(
            handle,
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
            }),
        );
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));

        tokio::task::yield_now().await;
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(scheduler.live_tasks(), 0);
    }

    #[tokio::test]
    async fn test_offload_runs_blocking_call() {
        let scheduler = TokioScheduler::new();
        let value = scheduler.offload(|| 6 * 7).await;
        assert_eq!(value, Ok(42));
    }
}
