/*!
 * Futex Module
 * Fast userspace mutex emulation for cooperative fibers
 */

mod engine;
pub mod ops;
mod queue;
mod stats;

// Re-export public API
pub use engine::FutexEngine;
pub use ops::{
    FutexArgs, FutexCall, FutexOp, FUTEX_CLOCK_REALTIME, FUTEX_CMD_MASK, FUTEX_PRIVATE_FLAG,
};
pub use queue::{FutexKey, RequeueOutcome, WaitTable, WaiterId};
pub use stats::{FutexStats, FutexStatsSnapshot};
