/*!
 * Futex Syscalls
 */

use crate::core::errors::{FutexError, FutexResult};
use crate::core::types::{SyscallReturn, Timespec};
use crate::fibers::GuestContext;
use crate::futex::{FutexArgs, FutexOp};
use crate::process::FiberProcess;
use crate::scheduler::CoopScheduler;
use std::future::Future;
use std::sync::atomic::AtomicU32;

/// Borrow a guest word as an atomic
///
/// # Safety
/// A non-null `ptr` must stay valid for `'a` and only be accessed atomically.
unsafe fn word_ref<'a>(ptr: *const u32) -> FutexResult<&'a AtomicU32> {
    if ptr.is_null() {
        return Err(FutexError::Fault);
    }
    if ptr.align_offset(std::mem::align_of::<AtomicU32>()) != 0 {
        return Err(FutexError::InvalidArgument("misaligned futex word"));
    }
    // AtomicU32 has the same size and alignment as u32
    Ok(unsafe { &*ptr.cast::<AtomicU32>() })
}

impl<C: GuestContext, S: CoopScheduler> FiberProcess<C, S> {
    /// futex(2) over host-visible words
    pub async fn sys_futex(
        &self,
        uaddr: &AtomicU32,
        args: FutexArgs,
        uaddr2: Option<&AtomicU32>,
    ) -> SyscallReturn {
        let span = self.syscall_span("futex");
        span.run(async {
            match self.futex().futex(uaddr, &args, uaddr2).await {
                Ok(n) => SyscallReturn::from(n),
                Err(err) => self.report(err),
            }
        })
        .await
    }

    /// futex(2) with the raw kernel argument layout
    ///
    /// For WAIT and WAIT_BITSET `utime` points to a relative timeout (null
    /// for none); for the requeue family its value is the requeue count.
    /// `uaddr2` is only read by the requeue family. A null `uaddr`, or a
    /// null `uaddr2` on requeue, fails with EFAULT.
    ///
    /// # Safety
    /// Non-null `uaddr`, and non-null `uaddr2` for the requeue family, must
    /// point to 4-byte words that stay valid, and are only accessed
    /// atomically, until the returned future completes. For wait operations
    /// a non-null `utime` must point to a readable `Timespec`.
    pub unsafe fn sys_futex_raw<'a>(
        &'a self,
        uaddr: *const u32,
        op: i32,
        val: i32,
        utime: *const Timespec,
        uaddr2: *const u32,
        val3: u32,
    ) -> impl Future<Output = SyscallReturn> + Send + 'a {
        let prepared = unsafe { prepare_raw(uaddr, op, val, utime, uaddr2, val3) };
        async move {
            match prepared {
                Ok((word, args, target)) => self.sys_futex(word, args, target).await,
                Err(err) => {
                    let span = self.syscall_span("futex");
                    let ret = span.in_scope(|| self.report(err));
                    span.finish(ret)
                }
            }
        }
    }
}

type RawCall<'a> = (&'a AtomicU32, FutexArgs, Option<&'a AtomicU32>);

/// # Safety
/// Same contract as `sys_futex_raw`.
unsafe fn prepare_raw<'a>(
    uaddr: *const u32,
    op: i32,
    val: i32,
    utime: *const Timespec,
    uaddr2: *const u32,
    val3: u32,
) -> FutexResult<RawCall<'a>> {
    let word = unsafe { word_ref(uaddr)? };

    let mut args = FutexArgs {
        op,
        val,
        timeout: None,
        val2: 0,
        val3,
    };
    let cmd = FutexOp::from_raw(op).ok();
    if cmd.is_some_and(|cmd| cmd.takes_timeout()) {
        if !utime.is_null() {
            args.timeout = Some(unsafe { utime.read_unaligned() });
        }
    } else {
        // The timeout slot carries val2 for the requeue family
        args.val2 = utime as usize as u32;
    }

    // Other ops ignore uaddr2, whatever it holds
    let target = if cmd.is_some_and(|cmd| cmd.takes_target()) && !uaddr2.is_null() {
        Some(unsafe { word_ref(uaddr2)? })
    } else {
        None
    };
    Ok((word, args, target))
}
