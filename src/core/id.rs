/*!
 * ID Generation System
 * Monotonic identifier allocation for fiber TIDs and scheduling handles
 */

use super::types::{FiberHandle, Tid};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// ID Generator Trait
// ============================================================================

/// Generic ID generator interface
///
/// Identifiers handed out by a generator are never recycled: a fiber TID or
/// scheduling handle stays unique for the lifetime of the emulated process.
pub trait IdGenerator<T> {
    /// Generate next ID
    fn next(&self) -> T;

    /// Get the most recently issued ID (the start value if none issued yet)
    fn current(&self) -> T;
}

// ============================================================================
// Atomic Counter Generator
// ============================================================================

/// Atomic counter for monotonically increasing identifiers
///
/// `next` pre-increments, so a generator created with `new(base)` hands out
/// `base + 1` first.
#[repr(C, align(64))]
pub struct AtomicGenerator<T> {
    counter: Arc<AtomicU64>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> AtomicGenerator<T> {
    /// Create new generator whose first issued ID is `base + 1`
    #[inline]
    pub fn new(base: u64) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(base)),
            _marker: std::marker::PhantomData,
        }
    }

    #[inline]
    fn bump(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl<T> Clone for AtomicGenerator<T> {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
            _marker: std::marker::PhantomData,
        }
    }
}

impl IdGenerator<FiberHandle> for AtomicGenerator<FiberHandle> {
    #[inline]
    fn next(&self) -> FiberHandle {
        FiberHandle(self.bump())
    }

    #[inline]
    fn current(&self) -> FiberHandle {
        FiberHandle(self.counter.load(Ordering::Relaxed))
    }
}

// ============================================================================
// TID Generator
// ============================================================================

/// Fiber TID allocator
///
/// TIDs are kernel-shaped `i32` values, so this keeps its own 32-bit counter.
/// After `i32::MAX` has been handed out the generator is exhausted and never
/// wraps or repeats.
pub struct TidGenerator {
    counter: AtomicI32,
}

impl TidGenerator {
    /// Create a generator whose first TID is `base + 1`
    pub const fn new(base: Tid) -> Self {
        Self {
            counter: AtomicI32::new(base),
        }
    }

    /// Next TID, or `None` once the TID space is exhausted
    #[inline]
    pub fn next(&self) -> Option<Tid> {
        self.counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |tid| tid.checked_add(1))
            .ok()
            .map(|prev| prev + 1)
    }

    /// Most recently issued TID (the base if none issued yet)
    #[inline]
    pub fn current(&self) -> Tid {
        self.counter.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Convenience Type Aliases
// ============================================================================

/// Scheduling handle generator
pub type HandleGenerator = AtomicGenerator<FiberHandle>;

// ============================================================================
// Tests
// ============================================================================
