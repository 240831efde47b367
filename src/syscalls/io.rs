/*!
 * Blocking Calls and Yield Checkpoints
 *
 * Host calls that would block the sole execution context run on the
 * offload pool while the calling fiber counts as suspended. Checkpoints
 * let the yield policy hand control to other fibers.
 */

use crate::core::errors::FiberResult;
use crate::core::types::SyscallReturn;
use crate::fibers::GuestContext;
use crate::process::FiberProcess;
use crate::scheduler::CoopScheduler;

impl<C: GuestContext, S: CoopScheduler> FiberProcess<C, S> {
    /// Yield to another fiber if the policy says so; returns whether it did
    ///
    /// Nothing is drawn from the policy when no other fiber could run.
    pub async fn checkpoint(&self) -> bool {
        if !self.yield_policy().should_yield(&self.scheduler().census()) {
            return false;
        }
        self.scheduler().yield_now().await;
        true
    }

    /// sched_yield(2): always let other ready fibers run
    pub async fn sys_sched_yield(&self) -> SyscallReturn {
        let span = self.syscall_span("sched_yield");
        span.run(async {
            self.scheduler().yield_now().await;
            0
        })
        .await
    }

    /// Run a blocking host call without stalling other fibers
    pub async fn blocking<F, T>(&self, call: F) -> FiberResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let span = self.syscall_span("blocking");
        span.instrument(self.scheduler().offload(call)).await
    }
}
