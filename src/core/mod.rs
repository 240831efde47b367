/*!
 * Core Module
 * Fundamental types, identifiers, configuration and error handling
 */

pub mod config;
pub mod errors;
pub mod id;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use config::FiberConfig;
pub use errors::*;
pub use id::{AtomicGenerator, HandleGenerator, IdGenerator, TidGenerator};
pub use types::*;
