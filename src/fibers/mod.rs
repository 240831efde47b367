/*!
 * Fibers Module
 * Identity and lifecycle bookkeeping for emulated guest threads
 */

mod registry;
mod types;

// Re-export public API
pub use registry::FiberRegistry;
pub use types::{CloneTids, Fiber, GuestContext};
