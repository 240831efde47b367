/*!
 * Shared Test Fixtures
 * Test guest context, process setup and fiber helpers
 */

#![allow(dead_code)]

use guest_fibers::{CloneTids, FiberConfig, FiberProcess, FutexArgs, GuestContext, Signal, Tid};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Guest context that records forced signals
#[derive(Default)]
pub struct TestCpu {
    pub signals: Mutex<Vec<Signal>>,
}

impl TestCpu {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl GuestContext for TestCpu {
    fn force_signal(&self, signal: Signal) {
        self.signals.lock().push(signal);
    }
}

pub type TestProcess = FiberProcess<TestCpu>;

/// Initialized process with the testing preset (no yields, fatal ops as ENOSYS)
pub fn process() -> Arc<TestProcess> {
    let process = Arc::new(
        TestProcess::builder()
            .with_config(FiberConfig::testing())
            .build(),
    );
    process.init(TestCpu::new()).expect("init");
    process
}

/// Let every ready fiber run until it blocks again
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// A `'static` word, as guest memory would be
pub fn leak_word(value: u32) -> &'static AtomicU32 {
    Box::leak(Box::new(AtomicU32::new(value)))
}

/// Spawn a fiber issuing one futex call on `word`; the receiver yields its return
pub fn spawn_futex(
    process: &Arc<TestProcess>,
    word: &Arc<AtomicU32>,
    args: FutexArgs,
) -> (Tid, oneshot::Receiver<i64>) {
    let (tx, rx) = oneshot::channel();
    let (p, w) = (Arc::clone(process), Arc::clone(word));
    let tid = process
        .spawn_thread(TestCpu::new(), CloneTids::default(), move |_| async move {
            let ret = p.sys_futex(&w, args, None).await;
            let _ = tx.send(ret);
        })
        .expect("spawn");
    (tid, rx)
}

/// Spawn a fiber that does nothing until cancelled
pub fn spawn_idle(process: &Arc<TestProcess>) -> Tid {
    process
        .spawn_thread(TestCpu::new(), CloneTids::default(), |_| {
            std::future::pending::<()>()
        })
        .expect("spawn")
}

/// Negated errno, as returned by the syscall entry points
pub fn err(errno: nix::errno::Errno) -> i64 {
    -(errno as i64)
}

/// Writer collecting formatted tracing output
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    /// Subscriber writing every level into this capture
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(self.clone())
            .finish()
    }

    /// First captured line mentioning `needle`
    pub fn line(&self, needle: &str) -> Option<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .find(|line| line.contains(needle))
            .map(str::to_owned)
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
