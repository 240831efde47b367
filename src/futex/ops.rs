/*!
 * Futex Operation Codes
 *
 * Kernel-compatible operation numbers and flags, and decoding of a raw
 * (op, val, timeout, val2, val3) tuple into a validated call.
 */

use crate::core::errors::{FutexError, FutexResult};
use crate::core::limits::FUTEX_BITSET_MATCH_ANY;
use crate::core::types::Timespec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-private futex flag [LINUX-COMPAT]
pub const FUTEX_PRIVATE_FLAG: i32 = 128;
/// Measure the wait timeout against CLOCK_REALTIME [LINUX-COMPAT]
pub const FUTEX_CLOCK_REALTIME: i32 = 256;
/// Mask selecting the command bits of an op
pub const FUTEX_CMD_MASK: i32 = !(FUTEX_PRIVATE_FLAG | FUTEX_CLOCK_REALTIME);

/// Futex commands [LINUX-COMPAT]
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FutexOp {
    Wait = 0,
    Wake = 1,
    Fd = 2,
    Requeue = 3,
    CmpRequeue = 4,
    WakeOp = 5,
    LockPi = 6,
    UnlockPi = 7,
    TrylockPi = 8,
    WaitBitset = 9,
    WakeBitset = 10,
    WaitRequeuePi = 11,
    CmpRequeuePi = 12,
    LockPi2 = 13,
}

impl FutexOp {
    /// Decode the command part of `op`, ignoring flag bits
    pub fn from_raw(op: i32) -> FutexResult<Self> {
        let cmd = match op & FUTEX_CMD_MASK {
            0 => FutexOp::Wait,
            1 => FutexOp::Wake,
            2 => FutexOp::Fd,
            3 => FutexOp::Requeue,
            4 => FutexOp::CmpRequeue,
            5 => FutexOp::WakeOp,
            6 => FutexOp::LockPi,
            7 => FutexOp::UnlockPi,
            8 => FutexOp::TrylockPi,
            9 => FutexOp::WaitBitset,
            10 => FutexOp::WakeBitset,
            11 => FutexOp::WaitRequeuePi,
            12 => FutexOp::CmpRequeuePi,
            13 => FutexOp::LockPi2,
            _ => return Err(FutexError::NotSupported(op)),
        };
        Ok(cmd)
    }

    /// Whether the engine implements this command
    pub const fn is_supported(&self) -> bool {
        matches!(
            self,
            FutexOp::Wait
                | FutexOp::Wake
                | FutexOp::Requeue
                | FutexOp::CmpRequeue
                | FutexOp::WaitBitset
                | FutexOp::WakeBitset
        )
    }

    /// Commands whose fourth argument is a timeout rather than a count
    pub const fn takes_timeout(&self) -> bool {
        matches!(self, FutexOp::Wait | FutexOp::WaitBitset)
    }

    /// Commands that act on a second futex word
    pub const fn takes_target(&self) -> bool {
        matches!(self, FutexOp::Requeue | FutexOp::CmpRequeue)
    }
}

/// Scalar futex arguments, with the timeout and `val2` slots split apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FutexArgs {
    pub op: i32,
    pub val: i32,
    pub timeout: Option<Timespec>,
    pub val2: u32,
    pub val3: u32,
}

impl FutexArgs {
    pub fn new(op: FutexOp, val: i32) -> Self {
        Self {
            op: op as i32,
            val,
            timeout: None,
            val2: 0,
            val3: 0,
        }
    }

    /// FUTEX_WAIT with an optional relative timeout
    pub fn wait(expected: u32, timeout: Option<Duration>) -> Self {
        Self {
            timeout: timeout.map(Timespec::from),
            ..Self::new(FutexOp::Wait, expected as i32)
        }
    }

    pub fn wait_bitset(expected: u32, timeout: Option<Duration>, bitset: u32) -> Self {
        Self {
            timeout: timeout.map(Timespec::from),
            val3: bitset,
            ..Self::new(FutexOp::WaitBitset, expected as i32)
        }
    }

    pub fn wake(count: i32) -> Self {
        Self::new(FutexOp::Wake, count)
    }

    pub fn wake_bitset(count: i32, bitset: u32) -> Self {
        Self {
            val3: bitset,
            ..Self::new(FutexOp::WakeBitset, count)
        }
    }

    pub fn requeue(nr_wake: i32, nr_requeue: u32) -> Self {
        Self {
            val2: nr_requeue,
            ..Self::new(FutexOp::Requeue, nr_wake)
        }
    }

    pub fn cmp_requeue(nr_wake: i32, nr_requeue: u32, expected: u32) -> Self {
        Self {
            val2: nr_requeue,
            val3: expected,
            ..Self::new(FutexOp::CmpRequeue, nr_wake)
        }
    }

    /// Set flag bits (e.g. `FUTEX_PRIVATE_FLAG`) on the op
    pub fn with_flags(mut self, flags: i32) -> Self {
        self.op |= flags;
        self
    }
}

/// A validated futex call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutexCall {
    Wait {
        expected: u32,
        timeout: Option<Duration>,
        bitset: u32,
    },
    Wake {
        count: u32,
        bitset: u32,
    },
    Requeue {
        nr_wake: u32,
        nr_requeue: u32,
        compare: Option<u32>,
    },
}

impl FutexCall {
    /// Validate raw arguments
    ///
    /// Checks happen before any queue interaction: unknown commands are
    /// `NotSupported`, recognized but unimplemented ones are `Unimplemented`
    /// (fatal), malformed timeouts and zero bitsets are `InvalidArgument`.
    pub fn decode(args: &FutexArgs) -> FutexResult<Self> {
        let op = FutexOp::from_raw(args.op)?;
        if !op.is_supported() {
            return Err(FutexError::Unimplemented(op));
        }
        if args.op & FUTEX_CLOCK_REALTIME != 0 && !op.takes_timeout() {
            return Err(FutexError::NotSupported(args.op));
        }

        match op {
            FutexOp::Wait | FutexOp::WaitBitset => {
                let timeout = match args.timeout {
                    Some(ts) => Some(
                        ts.to_duration()
                            .ok_or(FutexError::InvalidArgument("malformed timeout"))?,
                    ),
                    None => None,
                };
                let bitset = if op == FutexOp::Wait {
                    FUTEX_BITSET_MATCH_ANY
                } else {
                    args.val3
                };
                if bitset == 0 {
                    return Err(FutexError::InvalidArgument("zero bitset"));
                }
                Ok(FutexCall::Wait {
                    expected: args.val as u32,
                    timeout,
                    bitset,
                })
            }
            FutexOp::Wake | FutexOp::WakeBitset => {
                let bitset = if op == FutexOp::Wake {
                    FUTEX_BITSET_MATCH_ANY
                } else {
                    args.val3
                };
                if bitset == 0 {
                    return Err(FutexError::InvalidArgument("zero bitset"));
                }
                Ok(FutexCall::Wake {
                    count: u32::try_from(args.val).unwrap_or(0),
                    bitset,
                })
            }
            FutexOp::Requeue | FutexOp::CmpRequeue => {
                let nr_wake = u32::try_from(args.val)
                    .map_err(|_| FutexError::InvalidArgument("negative wake count"))?;
                if i32::try_from(args.val2).is_err() {
                    return Err(FutexError::InvalidArgument("negative requeue count"));
                }
                Ok(FutexCall::Requeue {
                    nr_wake,
                    nr_requeue: args.val2,
                    compare: (op == FutexOp::CmpRequeue).then_some(args.val3),
                })
            }
            _ => Err(FutexError::Unimplemented(op)),
        }
    }
}
