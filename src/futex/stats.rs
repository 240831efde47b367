/*!
 * Futex Statistics
 * Atomic counters updated on the engine's hot paths
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutexStatsSnapshot {
    /// Waits that linked an entry and suspended
    pub waits: u64,
    /// Waits and compare-requeues refused because the word changed
    pub stale_values: u64,
    /// Waits that resumed on their deadline without being woken
    pub timeouts: u64,
    /// Waiters signaled by wake or requeue
    pub wakes: u64,
    /// Waiters moved to another address
    pub requeued: u64,
    /// Calls rejected during argument validation
    pub invalid: u64,
}

/// Lock-free futex counters
///
/// # Performance
/// - Cache-line aligned to keep the counters off the wait table's line
/// - Relaxed ordering; a snapshot is not a consistent cut
#[repr(C, align(64))]
#[derive(Default)]
pub struct FutexStats {
    waits: AtomicU64,
    stale_values: AtomicU64,
    timeouts: AtomicU64,
    wakes: AtomicU64,
    requeued: AtomicU64,
    invalid: AtomicU64,
}

impl FutexStats {
    #[inline]
    pub const fn new() -> Self {
        Self {
            waits: AtomicU64::new(0),
            stale_values: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            wakes: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
            invalid: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    pub fn inc_waits(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_stale(&self) {
        self.stale_values.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn add_wakes(&self, n: u32) {
        self.wakes.fetch_add(u64::from(n), Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn add_requeued(&self, n: u32) {
        self.requeued.fetch_add(u64::from(n), Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_invalid(&self) {
        self.invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FutexStatsSnapshot {
        FutexStatsSnapshot {
            waits: self.waits.load(Ordering::Relaxed),
            stale_values: self.stale_values.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            wakes: self.wakes.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        for counter in [
            &self.waits,
            &self.stale_values,
            &self.timeouts,
            &self.wakes,
            &self.requeued,
            &self.invalid,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
