/*!
 * Scheduler Module
 * Cooperative fiber scheduling: capability trait, tokio runtime, yield policy
 */

mod policy;
mod runtime;
pub mod traits;
pub mod types;

// Re-export public API
pub use policy::YieldPolicy;
pub use runtime::TokioScheduler;
pub use traits::{CoopScheduler, CoopSchedulerExt};
pub use types::{TaskCensus, WakeReason};
