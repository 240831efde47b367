/*!
 * Monitoring
 * Structured tracing for the fiber core
 */

mod tracer;

pub use tracer::{init_tracing, SyscallSpan, DEFAULT_SLOW_THRESHOLD};
