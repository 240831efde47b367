/*!
 * Syscall Tracing
 * Structured tracing for fiber syscalls using the tracing crate
 *
 * Features:
 * - Env-filtered subscriber with optional JSON output
 * - One span per syscall carrying the calling fiber's TID, entered while
 *   the syscall body runs so engine events nest under it
 * - Return values and slow-call warnings recorded when the span closes
 */

use crate::core::types::{SyscallReturn, Tid};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::instrument::Instrumented;
use tracing::{debug, info, span, warn, Instrument, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Default threshold above which a syscall is reported as slow
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(10);

/// Install the global tracing subscriber
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - FIBERS_TRACE_JSON: Enable JSON output (default: false)
///
/// Only binaries should call this; the library never installs a subscriber.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("FIBERS_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_line_number(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
        info!("Tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
        info!("Tracing initialized");
    }
}

/// Span covering one syscall issued by a fiber
///
/// Suspending syscalls keep the span open across the suspension, so the
/// recorded duration includes time spent blocked.
pub struct SyscallSpan {
    span: tracing::Span,
    start: Instant,
    name: &'static str,
    tid: Option<Tid>,
    threshold: Duration,
}

impl SyscallSpan {
    pub fn new(name: &'static str, tid: Option<Tid>) -> Self {
        Self::with_threshold(name, tid, DEFAULT_SLOW_THRESHOLD)
    }

    pub fn with_threshold(name: &'static str, tid: Option<Tid>, threshold: Duration) -> Self {
        let span = span!(
            Level::DEBUG,
            "syscall",
            syscall = name,
            tid = tid,
            duration_us = tracing::field::Empty,
            return_value = tracing::field::Empty,
            errno = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            name,
            tid,
            threshold,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Record a kernel-convention return value, splitting out errno
    pub fn record_return(&self, ret: SyscallReturn) {
        self.span.record("return_value", ret);
        if ret < 0 {
            self.span.record("errno", -ret);
        }
    }

    /// Record the return value and pass it through
    pub fn finish(self, ret: SyscallReturn) -> SyscallReturn {
        self.record_return(ret);
        ret
    }

    /// Run a synchronous syscall body inside the span
    pub fn in_scope<T>(&self, body: impl FnOnce() -> T) -> T {
        self.span.in_scope(body)
    }

    /// Attach the span to a suspending syscall body
    ///
    /// The span is entered on every poll, so events emitted below the
    /// syscall carry its fields.
    pub fn instrument<F: Future>(&self, body: F) -> Instrumented<F> {
        body.instrument(self.span.clone())
    }

    /// Run a suspending syscall inside the span and record its return value
    pub async fn run<F>(self, body: F) -> SyscallReturn
    where
        F: Future<Output = SyscallReturn>,
    {
        let ret = SyscallSpan::instrument(&self, body).await;
        self.finish(ret)
    }
}

impl Drop for SyscallSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if duration > self.threshold {
            warn!(
                syscall = self.name,
                tid = self.tid,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow syscall detected"
            );
        } else {
            debug!(
                syscall = self.name,
                tid = self.tid,
                duration_us = duration.as_micros() as u64,
                "syscall completed"
            );
        }
    }
}
