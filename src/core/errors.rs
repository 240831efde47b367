/*!
 * Error Types
 * Centralized error handling with thiserror and miette, mapped to kernel errno values
 */

use super::types::{FiberHandle, SyscallReturn, Tid};
use crate::futex::FutexOp;
use miette::Diagnostic;
use nix::errno::Errno;
use thiserror::Error;

/// Futex operation errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Diagnostic)]
pub enum FutexError {
    #[error("Futex word no longer holds the expected value")]
    #[diagnostic(
        code(futex::stale_value),
        help("The word changed before the call could act on it. Reload and retry.")
    )]
    StaleValue,

    #[error("Invalid futex argument: {0}")]
    #[diagnostic(code(futex::invalid_argument))]
    InvalidArgument(&'static str),

    #[error("Unsupported futex operation {0:#x}")]
    #[diagnostic(
        code(futex::not_supported),
        help("Only WAIT, WAKE, REQUEUE, CMP_REQUEUE and their bitset forms are recognized.")
    )]
    NotSupported(i32),

    #[error("Futex operation {0:?} is not implemented for fibers")]
    #[diagnostic(
        code(futex::unimplemented),
        help("Priority-inheritance, FD and WAKE_OP futexes cannot be emulated safely.")
    )]
    Unimplemented(FutexOp),

    #[error("Bad futex address")]
    #[diagnostic(code(futex::fault))]
    Fault,
}

/// Fiber registry and lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum FiberError {
    #[error("Fiber {0} not found")]
    #[diagnostic(
        code(fiber::not_found),
        help("The fiber may have exited or never existed. Check the TID.")
    )]
    NotFound(Tid),

    #[error("Calling task is not a registered fiber")]
    #[diagnostic(
        code(fiber::not_registered),
        help("Every guest thread must run inside a fiber spawned or initialized by the process.")
    )]
    NotRegistered,

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(fiber::invalid_argument))]
    InvalidArgument(&'static str),

    #[error("Thread ID space exhausted")]
    #[diagnostic(
        code(fiber::tid_exhausted),
        help("TIDs are never reused; the process has handed out every valid TID.")
    )]
    TidExhausted,

    #[error("Fiber {0} was discarded")]
    #[diagnostic(
        code(fiber::discarded),
        help("Its scheduling unit was cancelled, e.g. by the post-fork reset in a child.")
    )]
    Discarded(FiberHandle),

    #[error("Offloaded blocking call failed: {0}")]
    #[diagnostic(code(fiber::offload_failed))]
    Offload(String),
}

/// Result type for futex operations
pub type FutexResult<T> = Result<T, FutexError>;

/// Result type for fiber operations
pub type FiberResult<T> = Result<T, FiberError>;

/// Mapping from an error kind to the errno surfaced to the guest
pub trait AsErrno {
    /// Kernel errno for this error
    fn errno(&self) -> Errno;

    /// Whether the error must terminate the process instead of being returned
    fn is_fatal(&self) -> bool {
        false
    }

    /// Negative return value for the syscall-dispatch layer
    #[inline]
    fn to_return(&self) -> SyscallReturn {
        -(self.errno() as SyscallReturn)
    }
}

impl AsErrno for FutexError {
    fn errno(&self) -> Errno {
        match self {
            FutexError::StaleValue => Errno::EAGAIN,
            FutexError::InvalidArgument(_) => Errno::EINVAL,
            FutexError::NotSupported(_) | FutexError::Unimplemented(_) => Errno::ENOSYS,
            FutexError::Fault => Errno::EFAULT,
        }
    }

    fn is_fatal(&self) -> bool {
        matches!(self, FutexError::Unimplemented(_))
    }
}

impl AsErrno for FiberError {
    fn errno(&self) -> Errno {
        match self {
            FiberError::NotFound(_) | FiberError::NotRegistered => Errno::ESRCH,
            FiberError::InvalidArgument(_) => Errno::EINVAL,
            FiberError::TidExhausted => Errno::EAGAIN,
            FiberError::Discarded(_) => Errno::EINTR,
            FiberError::Offload(_) => Errno::EIO,
        }
    }

    fn is_fatal(&self) -> bool {
        matches!(self, FiberError::NotRegistered)
    }
}
