/*!
 * Time Syscalls
 * Sleeps that suspend the calling fiber instead of the execution context
 */

use crate::core::errors::FiberError;
use crate::core::limits::{CLOCK_BOOTTIME, CLOCK_MONOTONIC, CLOCK_REALTIME, TIMER_ABSTIME};
use crate::core::types::{SyscallReturn, Timespec};
use crate::fibers::GuestContext;
use crate::process::FiberProcess;
use crate::scheduler::CoopScheduler;
use nix::time::{clock_gettime, ClockId};
use std::time::Duration;

fn host_clock(clock_id: i32) -> Option<ClockId> {
    match clock_id {
        CLOCK_REALTIME => Some(ClockId::CLOCK_REALTIME),
        CLOCK_MONOTONIC => Some(ClockId::CLOCK_MONOTONIC),
        CLOCK_BOOTTIME => Some(ClockId::CLOCK_BOOTTIME),
        _ => None,
    }
}

/// Time left until `deadline` on `clock`, zero if it already passed
fn until(clock: ClockId, deadline: Duration) -> Result<Duration, FiberError> {
    let now = clock_gettime(clock)
        .map_err(|_| FiberError::InvalidArgument("clock unavailable"))?;
    let now = Timespec::new(i64::from(now.tv_sec()), i64::from(now.tv_nsec()))
        .to_duration()
        .unwrap_or_default();
    Ok(deadline.saturating_sub(now))
}

/// Relative sleep length for a clock_nanosleep request
fn sleep_duration(clock_id: i32, flags: i32, request: Timespec) -> Result<Duration, FiberError> {
    let clock = host_clock(clock_id).ok_or(FiberError::InvalidArgument("clock id"))?;
    let requested = request
        .to_duration()
        .ok_or(FiberError::InvalidArgument("malformed timespec"))?;
    if flags & TIMER_ABSTIME != 0 {
        until(clock, requested)
    } else {
        Ok(requested)
    }
}

impl<C: GuestContext, S: CoopScheduler> FiberProcess<C, S> {
    /// nanosleep(2): suspend the caller for a relative interval
    pub async fn sys_nanosleep(&self, request: Timespec) -> SyscallReturn {
        let span = self.syscall_span("nanosleep");
        span.run(async {
            match request.to_duration() {
                Some(duration) => {
                    self.scheduler().sleep(duration).await;
                    0
                }
                None => self.report(FiberError::InvalidArgument("malformed timespec")),
            }
        })
        .await
    }

    /// clock_nanosleep(2) on the realtime, monotonic or boottime clock
    ///
    /// With `TIMER_ABSTIME` the request is a deadline on that clock.
    pub async fn sys_clock_nanosleep(
        &self,
        clock_id: i32,
        flags: i32,
        request: Timespec,
    ) -> SyscallReturn {
        let span = self.syscall_span("clock_nanosleep");
        span.run(async {
            match sleep_duration(clock_id, flags, request) {
                Ok(duration) => {
                    self.scheduler().sleep(duration).await;
                    0
                }
                Err(err) => self.report(err),
            }
        })
        .await
    }
}
