/*!
 * fiberd - Guest Fibers Demo
 *
 * Runs a few guest-style threads as fibers on one execution context:
 * - A futex-based mutex shared by worker fibers
 * - pthread_join-style waits on clear-child-TID words
 * - A condition-variable broadcast through CMP_REQUEUE
 *
 * Configuration comes from FIBERS_* environment variables; futex
 * statistics are printed as JSON at the end.
 */

use anyhow::{ensure, Result};
use guest_fibers::{
    init_tracing, CloneTids, FiberConfig, FiberProcess, FutexArgs, GuestContext, Signal, Timespec,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

const WORKERS: usize = 4;
const ROUNDS: u32 = 250;
const WAITERS: usize = 3;

/// Stand-in for an emulator CPU context
struct DemoCpu {
    name: String,
}

impl DemoCpu {
    fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into() })
    }
}

impl GuestContext for DemoCpu {
    fn force_signal(&self, signal: Signal) {
        info!(cpu = %self.name, signal, "signal forced");
    }
}

type Process = FiberProcess<DemoCpu>;

/// Three-state futex mutex: 0 unlocked, 1 locked, 2 locked with waiters
async fn lock(process: &Process, word: &AtomicU32) {
    let mut state = match word.compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed) {
        Ok(_) => return,
        Err(state) => state,
    };
    if state != 2 {
        state = word.swap(2, Ordering::Acquire);
    }
    while state != 0 {
        process.sys_futex(word, FutexArgs::wait(2, None), None).await;
        state = word.swap(2, Ordering::Acquire);
    }
}

async fn unlock(process: &Process, word: &AtomicU32) {
    if word.fetch_sub(1, Ordering::Release) != 1 {
        word.store(0, Ordering::Release);
        process.sys_futex(word, FutexArgs::wake(1), None).await;
    }
}

/// Block until the fiber owning `word` has exited
async fn join(process: &Process, word: &AtomicU32) {
    loop {
        let tid = word.load(Ordering::Acquire);
        if tid == 0 {
            return;
        }
        process.sys_futex(word, FutexArgs::wait(tid, None), None).await;
    }
}

fn leak_word() -> &'static AtomicU32 {
    Box::leak(Box::new(AtomicU32::new(0)))
}

#[derive(Default)]
struct Shared {
    mutex: AtomicU32,
    counter: AtomicU32,
    cond: AtomicU32,
    gate: AtomicU32,
    released: AtomicU32,
}

async fn mutex_demo(process: &Arc<Process>, shared: &Arc<Shared>) -> Result<u32> {
    let mut exits = Vec::with_capacity(WORKERS);
    for i in 0..WORKERS {
        let exit_word = leak_word();
        let tids = CloneTids {
            child_tid: Some(exit_word),
            clear_child_tid: Some(exit_word),
            ..CloneTids::default()
        };
        let (p, s) = (Arc::clone(process), Arc::clone(shared));
        let tid = process.sys_clone_thread(DemoCpu::new(format!("worker-{}", i)), tids, |_| {
            async move {
                for _ in 0..ROUNDS {
                    lock(&p, &s.mutex).await;
                    let seen = s.counter.load(Ordering::Relaxed);
                    p.checkpoint().await;
                    s.counter.store(seen + 1, Ordering::Relaxed);
                    unlock(&p, &s.mutex).await;
                }
            }
        });
        ensure!(tid > 0, "clone failed: {}", tid);
        info!(tid, "worker spawned");
        exits.push(exit_word);
    }

    for word in exits {
        join(process, word).await;
    }
    Ok(shared.counter.load(Ordering::Relaxed))
}

async fn broadcast_demo(process: &Arc<Process>, shared: &Arc<Shared>) -> Result<(i64, i64)> {
    let mut exits = Vec::with_capacity(WAITERS);
    for i in 0..WAITERS {
        let exit_word = leak_word();
        let tids = CloneTids {
            child_tid: Some(exit_word),
            clear_child_tid: Some(exit_word),
            ..CloneTids::default()
        };
        let (p, s) = (Arc::clone(process), Arc::clone(shared));
        process.sys_clone_thread(DemoCpu::new(format!("waiter-{}", i)), tids, |_| {
            async move {
                while s.cond.load(Ordering::Acquire) == 0 {
                    p.sys_futex(&s.cond, FutexArgs::wait(0, None), None).await;
                }
                s.released.fetch_add(1, Ordering::AcqRel);
            }
        });
        exits.push(exit_word);
    }

    // Let every waiter block on the condition word
    process.sys_nanosleep(Timespec::new(0, 10_000_000)).await;

    shared.cond.store(1, Ordering::Release);
    let moved = process
        .sys_futex(
            &shared.cond,
            FutexArgs::cmp_requeue(1, i32::MAX as u32, 1),
            Some(&shared.gate),
        )
        .await;
    let released = process
        .sys_futex(&shared.gate, FutexArgs::wake(i32::MAX), None)
        .await;

    for word in exits {
        join(process, word).await;
    }
    Ok((moved, released))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let config = FiberConfig::from_env();
    info!(?config, "fiberd starting");

    let process = Arc::new(Process::builder().with_config(config).build());
    let main_tid = process.init(DemoCpu::new("main"))?;
    info!(main_tid, "main fiber registered");

    let shared = Arc::new(Shared::default());
    let (p, s) = (Arc::clone(&process), Arc::clone(&shared));
    let (total, (moved, released)) = process
        .run_main(async move {
            let total = mutex_demo(&p, &s).await?;
            let broadcast = broadcast_demo(&p, &s).await?;
            p.sys_tkill(main_tid, 0);
            Ok::<_, anyhow::Error>((total, broadcast))
        })
        .await??;

    let expected = WORKERS as u32 * ROUNDS;
    ensure!(total == expected, "lost updates: {} of {}", total, expected);
    info!(total, "mutex demo complete");
    info!(
        moved,
        released,
        woken = shared.released.load(Ordering::Relaxed),
        "broadcast demo complete"
    );

    let stats = process.futex().stats().snapshot();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
