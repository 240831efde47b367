/*!
 * Fiber Process Builder
 * Builder pattern for FiberProcess construction
 */

use super::FiberProcess;
use crate::core::config::FiberConfig;
use crate::fibers::GuestContext;
use crate::scheduler::{CoopScheduler, TokioScheduler};
use std::marker::PhantomData;
use std::sync::Arc;

/// Builder for FiberProcess
pub struct FiberProcessBuilder<C, S> {
    config: FiberConfig,
    scheduler: Option<Arc<S>>,
    _context: PhantomData<fn() -> C>,
}

impl<C: GuestContext, S: CoopScheduler> FiberProcessBuilder<C, S> {
    pub fn new() -> Self {
        Self {
            config: FiberConfig::default(),
            scheduler: None,
            _context: PhantomData,
        }
    }

    pub fn with_config(mut self, config: FiberConfig) -> Self {
        self.config = config;
        self
    }

    /// Read overrides from the environment on top of the defaults
    pub fn with_env_config(mut self) -> Self {
        self.config = FiberConfig::from_env();
        self
    }

    /// Share an existing scheduler instead of creating one
    pub fn with_scheduler(mut self, scheduler: Arc<S>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Build with a scheduler created by `make` when none was supplied
    pub fn build_with(self, make: impl FnOnce() -> S) -> FiberProcess<C, S> {
        let scheduler = self.scheduler.unwrap_or_else(|| Arc::new(make()));
        FiberProcess::new(self.config, scheduler)
    }
}

impl<C: GuestContext> FiberProcessBuilder<C, TokioScheduler> {
    pub fn build(self) -> FiberProcess<C, TokioScheduler> {
        self.build_with(TokioScheduler::new)
    }
}

impl<C: GuestContext, S: CoopScheduler> Default for FiberProcessBuilder<C, S> {
    fn default() -> Self {
        Self::new()
    }
}
