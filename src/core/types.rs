/*!
 * Core Types
 * Common types shared by the registry, scheduler and futex engine
 */

use super::limits::NSEC_PER_SEC;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Fiber thread ID as seen by the guest
pub type Tid = i32;

/// Guest signal number
pub type Signal = i32;

/// Raw syscall return value (non-negative result or negated errno)
pub type SyscallReturn = i64;

/// Identity of one cooperative scheduling unit
///
/// Allocated by the scheduler, referenced by the registry and by futex wait
/// entries. Never reused within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FiberHandle(pub u64);

impl fmt::Display for FiberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fiber#{}", self.0)
    }
}

/// Kernel `struct timespec` layout (64-bit fields)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

impl Timespec {
    pub const fn new(tv_sec: i64, tv_nsec: i64) -> Self {
        Self { tv_sec, tv_nsec }
    }

    /// Check the kernel constraints: non-negative fields, nanoseconds below one second
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.tv_sec >= 0 && self.tv_nsec >= 0 && self.tv_nsec < NSEC_PER_SEC
    }

    /// Convert to a `Duration`, or `None` if the value is malformed
    pub fn to_duration(&self) -> Option<Duration> {
        if !self.is_valid() {
            return None;
        }
        Some(Duration::new(self.tv_sec as u64, self.tv_nsec as u32))
    }
}

impl From<Duration> for Timespec {
    fn from(d: Duration) -> Self {
        Self {
            tv_sec: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            tv_nsec: i64::from(d.subsec_nanos()),
        }
    }
}
