/*!
 * Syscalls Module
 * Kernel-shaped entry points for the syscall-dispatch layer
 *
 * Every entry point returns a raw `SyscallReturn`: the result on success,
 * a negated errno on failure. Fatal errors go through the process's
 * configured policy before anything is returned.
 */

mod futex;
mod io;
mod thread;
mod time;

use crate::fibers::GuestContext;
use crate::monitoring::SyscallSpan;
use crate::process::FiberProcess;
use crate::scheduler::CoopScheduler;

impl<C: GuestContext, S: CoopScheduler> FiberProcess<C, S> {
    fn syscall_span(&self, name: &'static str) -> SyscallSpan {
        SyscallSpan::with_threshold(
            name,
            self.current_tid(),
            self.config().slow_syscall_threshold(),
        )
    }
}
