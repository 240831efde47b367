/*!
 * Fiber Configuration
 *
 * Runtime configuration for the fiber core: yield policy, fatal-operation
 * handling and tracing thresholds.
 */

use super::limits::DEFAULT_YIELD_SEED;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fiber core configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiberConfig {
    /// Allow yield-policy checkpoints to hand control to other fibers
    pub yield_enabled: bool,
    /// Seed for the yield policy's bit generator (0 means default)
    pub yield_seed: u32,
    /// Terminate the process on unimplemented futex operations (PI, FD, WAKE_OP)
    pub abort_on_unimplemented: bool,
    /// Syscalls slower than this are reported at warn level
    pub slow_syscall_threshold_ms: u64,
}

impl Default for FiberConfig {
    fn default() -> Self {
        Self {
            yield_enabled: true,
            yield_seed: DEFAULT_YIELD_SEED,
            abort_on_unimplemented: true,
            slow_syscall_threshold_ms: 10,
        }
    }
}

impl FiberConfig {
    /// Configuration without random yields (reproducible interleaving)
    pub const fn deterministic() -> Self {
        Self {
            yield_enabled: false,
            yield_seed: DEFAULT_YIELD_SEED,
            abort_on_unimplemented: true,
            slow_syscall_threshold_ms: 10,
        }
    }

    /// Deterministic configuration that reports fatal operations as ENOSYS
    pub const fn testing() -> Self {
        Self {
            yield_enabled: false,
            yield_seed: DEFAULT_YIELD_SEED,
            abort_on_unimplemented: false,
            slow_syscall_threshold_ms: 10,
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Defaults overridden by environment variables
    ///
    /// Environment variables:
    /// - FIBERS_YIELD: enable checkpoint yields (default: true)
    /// - FIBERS_YIELD_SEED: seed for the yield bit generator
    /// - FIBERS_ABORT_ON_UNIMPLEMENTED: terminate on PI futex ops (default: true)
    /// - FIBERS_SLOW_SYSCALL_MS: slow syscall warning threshold
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_flag("FIBERS_YIELD") {
            config.yield_enabled = v;
        }
        if let Some(seed) = env_parse::<u32>("FIBERS_YIELD_SEED") {
            config.yield_seed = seed;
        }
        if let Some(v) = env_flag("FIBERS_ABORT_ON_UNIMPLEMENTED") {
            config.abort_on_unimplemented = v;
        }
        if let Some(ms) = env_parse::<u64>("FIBERS_SLOW_SYSCALL_MS") {
            config.slow_syscall_threshold_ms = ms;
        }

        config
    }

    /// Seed actually used by the generator
    ///
    /// xorshift32 never leaves zero, so a zero seed falls back to the default.
    pub fn effective_seed(&self) -> u32 {
        if self.yield_seed == 0 {
            DEFAULT_YIELD_SEED
        } else {
            self.yield_seed
        }
    }

    pub fn slow_syscall_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_syscall_threshold_ms)
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
