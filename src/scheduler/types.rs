/*!
 * Scheduler Types
 * Values exchanged between the cooperative scheduler and its clients
 */

use serde::{Deserialize, Serialize};

/// Why a suspended fiber resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeReason {
    /// Its wait object was signaled
    Notified,
    /// The deadline passed first
    TimedOut,
}

impl WakeReason {
    #[inline]
    pub fn timed_out(&self) -> bool {
        matches!(self, WakeReason::TimedOut)
    }
}

/// Snapshot of fiber states as seen by the scheduler
///
/// `ready` excludes the fiber taking the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCensus {
    /// Spawned but not yet polled
    pub new: usize,
    /// Started, not suspended, other than the caller
    pub ready: usize,
    /// Blocked in a suspension point (futex wait, sleep, offloaded call)
    pub suspended: usize,
}

impl TaskCensus {
    /// Fibers other than the caller that could take over if it yielded
    #[inline]
    pub fn others_runnable(&self) -> usize {
        self.new + self.ready
    }

    /// All fibers the scheduler knows about
    #[inline]
    pub fn total(&self) -> usize {
        self.new + self.ready + self.suspended
    }
}
