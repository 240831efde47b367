/*!
 * Fiber Process
 *
 * One emulated guest process: the fiber registry, the futex engine, the
 * cooperative scheduler and the yield policy, owned together.
 *
 * # Design
 *
 * - State is owned by the instance, not by statics, so independent
 *   processes (and tests) never share tables
 * - The registry lock and the futex lock are never held at the same time
 * - Fatal conditions go through one place that honors the configured policy
 */

mod builder;
mod lifecycle;

pub use builder::FiberProcessBuilder;

use crate::core::config::FiberConfig;
use crate::core::errors::{AsErrno, FiberError, FiberResult};
use crate::core::types::{FiberHandle, SyscallReturn, Tid};
use crate::fibers::{Fiber, FiberRegistry, GuestContext};
use crate::futex::FutexEngine;
use crate::scheduler::{CoopScheduler, CoopSchedulerExt, TokioScheduler, YieldPolicy};
use parking_lot::Mutex;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};

/// An emulated process whose guest threads run as fibers
pub struct FiberProcess<C: GuestContext, S: CoopScheduler = TokioScheduler> {
    config: FiberConfig,
    scheduler: Arc<S>,
    registry: FiberRegistry<C>,
    futex: FutexEngine<S>,
    yield_policy: YieldPolicy,
    main: Mutex<Option<FiberHandle>>,
}

impl<C: GuestContext> FiberProcess<C, TokioScheduler> {
    /// Builder over the tokio scheduler
    pub fn builder() -> FiberProcessBuilder<C, TokioScheduler> {
        FiberProcessBuilder::new()
    }
}

impl<C: GuestContext, S: CoopScheduler> FiberProcess<C, S> {
    pub fn new(config: FiberConfig, scheduler: Arc<S>) -> Self {
        Self {
            yield_policy: YieldPolicy::from_config(&config),
            futex: FutexEngine::new(Arc::clone(&scheduler)),
            registry: FiberRegistry::new(),
            scheduler,
            config,
            main: Mutex::new(None),
        }
    }

    /// Reset both tables and register the implicit main fiber
    ///
    /// Scheduling units of fibers that were registered before are cancelled,
    /// except the caller's own. TID numbering continues across calls.
    pub fn init(&self, main_context: Arc<C>) -> FiberResult<Tid> {
        let current = self.scheduler.current();
        for fiber in self.registry.retain_only(None) {
            if Some(fiber.handle()) != current {
                self.scheduler.cancel(fiber.handle());
            }
        }
        self.futex.clear();
        self.yield_policy.reseed(self.config.effective_seed());

        let handle = current.unwrap_or_else(|| self.scheduler.reserve());
        let tid = self.registry.register(handle, main_context, None)?;
        *self.main.lock() = Some(handle);
        info!(tid, %handle, "fiber process initialized");
        Ok(tid)
    }

    /// Run `body` as the main fiber registered by `init`
    ///
    /// Fails with `Discarded` if the main fiber is cancelled while `body`
    /// is suspended, as happens when another fiber resets a forked child.
    pub async fn run_main<F>(&self, body: F) -> FiberResult<F::Output>
    where
        F: Future + Send,
        F::Output: Send,
    {
        let handle = (*self.main.lock()).ok_or(FiberError::NotRegistered)?;
        if self.scheduler.current() == Some(handle) {
            return Ok(body.await);
        }
        self.scheduler.enter(handle, body).await
    }

    /// Registry entry of the calling fiber
    pub fn current_fiber(&self) -> Option<Arc<Fiber<C>>> {
        self.scheduler
            .current()
            .and_then(|handle| self.registry.by_handle(handle))
    }

    pub fn current_tid(&self) -> Option<Tid> {
        self.current_fiber().map(|fiber| fiber.tid())
    }

    /// Handle of the main fiber, once initialized
    pub fn main_handle(&self) -> Option<FiberHandle> {
        *self.main.lock()
    }

    /// Turn an error into a syscall return, terminating the process first if
    /// the error is fatal and the configuration says so
    pub fn report<E>(&self, err: E) -> SyscallReturn
    where
        E: AsErrno + Display,
    {
        if err.is_fatal() {
            if self.config.abort_on_unimplemented {
                error!(error = %err, tid = ?self.current_tid(), "fatal fiber error, terminating");
                std::process::exit(-1);
            }
            debug!(error = %err, "fatal fiber error reported as errno");
        }
        err.to_return()
    }

    pub fn config(&self) -> &FiberConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<S> {
        &self.scheduler
    }

    pub fn registry(&self) -> &FiberRegistry<C> {
        &self.registry
    }

    pub fn futex(&self) -> &FutexEngine<S> {
        &self.futex
    }

    pub fn yield_policy(&self) -> &YieldPolicy {
        &self.yield_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::limits::BASE_FIBER_TID;
    use crate::core::types::Signal;
    use nix::errno::Errno;

    struct Cpu;

    impl GuestContext for Cpu {
        fn force_signal(&self, _signal: Signal) {}
    }

    fn process() -> FiberProcess<Cpu> {
        FiberProcess::builder()
            .with_config(FiberConfig::testing())
            .build()
    }

    #[tokio::test]
    async fn test_run_main_requires_init() {
        let process = process();
        assert_eq!(
            process.run_main(async { 1 }).await,
            Err(FiberError::NotRegistered)
        );
    }

    #[tokio::test]
    async fn test_main_fiber_identity() {
        let process = process();
        let tid = process.init(Arc::new(Cpu)).expect("init");
        assert_eq!(tid, BASE_FIBER_TID + 1);

        let seen = process.run_main(async { process.current_tid() }).await;
        assert_eq!(seen, Ok(Some(tid)));
        assert_eq!(process.current_tid(), None);
    }

    #[tokio::test]
    async fn test_init_resets_tables() {
        let process = process();
        let first = process.init(Arc::new(Cpu)).expect("init");
        let second = process.init(Arc::new(Cpu)).expect("init");

        assert_eq!(process.registry().len(), 1);
        assert!(second > first);
        assert_eq!(process.futex().queued(), 0);
    }

    #[tokio::test]
    async fn test_alone_never_yields() {
        let process = FiberProcess::<Cpu>::builder().build();
        process.init(Arc::new(Cpu)).expect("init");
        let yielded = process.run_main(process.checkpoint()).await;
        assert_eq!(yielded, Ok(false));
    }

    #[test]
    fn test_report_non_fatal() {
        let process = process();
        let esrch = -(Errno::ESRCH as i64);
        assert_eq!(process.report(FiberError::NotFound(3)), esrch);
        // Fatal, but the testing preset reports instead of terminating
        assert_eq!(process.report(FiberError::NotRegistered), esrch);
    }
}
