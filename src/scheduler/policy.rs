/*!
 * Scheduler-Yield Policy
 *
 * Probabilistic decision of whether a checkpoint hands control to another
 * fiber. Without it a fiber that never blocks would run to completion and
 * starve logically independent fibers.
 *
 * # Design
 *
 * One bit per decision from a seeded xorshift32 generator: fast,
 * reproducible for a given seed, not cryptographic. Yields happen on a
 * zero bit, i.e. about half the time when another fiber could run.
 */

use super::types::TaskCensus;
use crate::core::config::FiberConfig;
use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide yield decision state
pub struct YieldPolicy {
    state: AtomicU32,
    enabled: bool,
}

impl YieldPolicy {
    /// Create a policy; a zero seed must be avoided by the caller
    pub const fn new(seed: u32, enabled: bool) -> Self {
        Self {
            state: AtomicU32::new(seed),
            enabled,
        }
    }

    pub fn from_config(config: &FiberConfig) -> Self {
        Self::new(config.effective_seed(), config.yield_enabled)
    }

    /// Advance the generator and return its low bit
    pub fn next_bit(&self) -> u32 {
        let prev = self
            .state
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| Some(xorshift32(x)))
            .unwrap_or_else(|x| x);
        xorshift32(prev) & 1
    }

    /// Decide whether the caller should yield given the current census
    ///
    /// No bit is drawn when nobody else could run.
    pub fn should_yield(&self, census: &TaskCensus) -> bool {
        if !self.enabled || census.others_runnable() == 0 {
            return false;
        }
        self.next_bit() == 0
    }

    /// Restart the sequence from `seed`
    pub fn reseed(&self, seed: u32) {
        self.state.store(seed, Ordering::Relaxed);
    }
}

#[inline]
fn xorshift32(mut x: u32) -> u32 {
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    x
}
