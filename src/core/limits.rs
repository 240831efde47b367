/*!
 * System Limits and Constants
 *
 * Fixed values shared across the fiber core.
 * Linux-compatible values are marked with [LINUX-COMPAT]
 */

use super::types::Tid;

// =============================================================================
// FIBER IDENTITY
// =============================================================================

/// Base offset for fiber TIDs
/// The first fiber registered receives `BASE_FIBER_TID + 1`, which keeps
/// fiber TIDs disjoint from host thread and process ids.
pub const BASE_FIBER_TID: Tid = 0x3ff_ffff;

// =============================================================================
// FUTEX
// =============================================================================

/// Bitset that matches every waiter [LINUX-COMPAT]
pub const FUTEX_BITSET_MATCH_ANY: u32 = 0xffff_ffff;

/// Nanoseconds per second, upper bound (exclusive) for `tv_nsec`
pub const NSEC_PER_SEC: i64 = 1_000_000_000;

// =============================================================================
// SCHEDULING
// =============================================================================

/// Default seed for the yield policy's xorshift32 generator
pub const DEFAULT_YIELD_SEED: u32 = 123_456_789;

// =============================================================================
// SIGNALS AND CLOCKS
// =============================================================================

/// Highest valid signal number (including real-time signals) [LINUX-COMPAT]
pub const MAX_SIGNAL: i32 = 64;

/// `clock_nanosleep` clock ids [LINUX-COMPAT]
pub const CLOCK_REALTIME: i32 = 0;
pub const CLOCK_MONOTONIC: i32 = 1;
pub const CLOCK_BOOTTIME: i32 = 7;

/// `clock_nanosleep` flag: the request is an absolute time [LINUX-COMPAT]
pub const TIMER_ABSTIME: i32 = 1;
