/*!
 * Guest Fibers Library
 *
 * Emulated guest threads as cooperative fibers, with the futex and thread
 * syscalls they need.
 *
 * - `futex`: WAIT/WAKE/REQUEUE over host-visible 32-bit words
 * - `fibers`: TID assignment and the live-fiber registry
 * - `scheduler`: cooperative scheduling capability, tokio runtime, yield policy
 * - `process`: one emulated process owning all of the above
 * - `syscalls`: kernel-shaped entry points returning negated errno on failure
 */

pub mod core;
pub mod fibers;
pub mod futex;
pub mod monitoring;
pub mod process;
pub mod scheduler;
pub mod syscalls;

// Re-exports
pub use crate::core::{
    AsErrno, FiberConfig, FiberError, FiberHandle, FiberResult, FutexError, FutexResult, Signal,
    SyscallReturn, Tid, Timespec,
};
pub use fibers::{CloneTids, Fiber, FiberRegistry, GuestContext};
pub use futex::{FutexArgs, FutexEngine, FutexOp, FutexStatsSnapshot};
pub use monitoring::{init_tracing, SyscallSpan};
pub use process::{FiberProcess, FiberProcessBuilder};
pub use scheduler::{CoopScheduler, TaskCensus, TokioScheduler, WakeReason, YieldPolicy};
