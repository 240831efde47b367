/*!
 * Thread Syscalls
 * Thread identity, creation, exit and signal delivery
 */

use crate::core::errors::FiberError;
use crate::core::limits::MAX_SIGNAL;
use crate::core::types::{Signal, SyscallReturn, Tid};
use crate::fibers::{CloneTids, GuestContext};
use crate::process::FiberProcess;
use crate::scheduler::CoopScheduler;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

impl<C: GuestContext, S: CoopScheduler> FiberProcess<C, S> {
    /// gettid(2)
    ///
    /// Every guest thread runs in a registered fiber, so an unregistered
    /// caller is an internal inconsistency and is treated as fatal.
    pub fn sys_gettid(&self) -> SyscallReturn {
        let span = self.syscall_span("gettid");
        let ret = match self.current_tid() {
            Some(tid) => SyscallReturn::from(tid),
            None => self.report(FiberError::NotRegistered),
        };
        span.finish(ret)
    }

    /// clone(2) for threads: start a fiber for `context` and return its TID
    ///
    /// EAGAIN once the TID space is exhausted.
    pub fn sys_clone_thread<F, Fut>(
        self: &Arc<Self>,
        context: Arc<C>,
        tids: CloneTids<'_>,
        body: F,
    ) -> SyscallReturn
    where
        F: FnOnce(Arc<C>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let span = self.syscall_span("clone");
        let ret = span.in_scope(|| match self.spawn_thread(context, tids, body) {
            Ok(tid) => SyscallReturn::from(tid),
            Err(err) => self.report(err),
        });
        span.finish(ret)
    }

    /// exit(2) for the calling thread
    ///
    /// Unregisters the caller and releases its clear-child-TID word. The
    /// guest thread body is expected to return right after.
    pub fn sys_exit(&self) -> SyscallReturn {
        let span = self.syscall_span("exit");
        let ret = span.in_scope(|| match self.scheduler().current() {
            Some(handle) if self.exit_fiber(handle) => 0,
            _ => self.report(FiberError::NotRegistered),
        });
        span.finish(ret)
    }

    /// tkill(2)
    ///
    /// Signal 0 only checks that the thread exists.
    pub fn sys_tkill(&self, tid: Tid, signal: Signal) -> SyscallReturn {
        let span = self.syscall_span("tkill");
        let ret = span.in_scope(|| match self.deliver(tid, signal) {
            Ok(()) => 0,
            Err(err) => self.report(err),
        });
        span.finish(ret)
    }

    /// tgkill(2); there is a single thread group, so only `tgid > 0` is checked
    pub fn sys_tgkill(&self, tgid: Tid, tid: Tid, signal: Signal) -> SyscallReturn {
        let span = self.syscall_span("tgkill");
        let ret = span.in_scope(|| {
            if tgid <= 0 {
                return self.report(FiberError::InvalidArgument("thread group id"));
            }
            match self.deliver(tid, signal) {
                Ok(()) => 0,
                Err(err) => self.report(err),
            }
        });
        span.finish(ret)
    }

    fn deliver(&self, tid: Tid, signal: Signal) -> Result<(), FiberError> {
        if tid <= 0 || !(0..=MAX_SIGNAL).contains(&signal) {
            return Err(FiberError::InvalidArgument("tid or signal out of range"));
        }
        let fiber = self
            .registry()
            .by_tid(tid)
            .ok_or(FiberError::NotFound(tid))?;
        if signal != 0 {
            fiber.context().force_signal(signal);
            debug!(tid, signal, "signal forced into fiber context");
        }
        Ok(())
    }
}
