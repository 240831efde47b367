/*!
 * Futex Benchmarks
 *
 * Wait/wake round trips between fibers and wait-table scan cost
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use guest_fibers::futex::{FutexKey, WaitTable};
use guest_fibers::{CloneTids, FiberConfig, FiberProcess, FutexArgs, GuestContext, Signal};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct BenchCpu;

impl GuestContext for BenchCpu {
    fn force_signal(&self, _signal: Signal) {}
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
}

fn bench_wait_wake_round_trip(c: &mut Criterion) {
    let rt = runtime();
    let process = Arc::new(
        FiberProcess::<BenchCpu>::builder()
            .with_config(FiberConfig::deterministic())
            .build(),
    );
    process.init(Arc::new(BenchCpu)).expect("init");
    let word = Arc::new(AtomicU32::new(0));

    c.bench_function("wait_wake_round_trip", |b| {
        b.iter(|| {
            rt.block_on(async {
                word.store(0, Ordering::Release);
                let (p, w) = (Arc::clone(&process), Arc::clone(&word));
                process
                    .spawn_thread(Arc::new(BenchCpu), CloneTids::default(), move |_| {
                        async move {
                            while w.load(Ordering::Acquire) == 0 {
                                p.sys_futex(&w, FutexArgs::wait(0, None), None).await;
                            }
                        }
                    })
                    .expect("spawn");
                tokio::task::yield_now().await;

                word.store(1, Ordering::Release);
                black_box(process.sys_futex(&word, FutexArgs::wake(1), None).await);
                while process.registry().len() > 1 {
                    tokio::task::yield_now().await;
                }
            })
        });
    });
}

fn bench_wake_without_waiters(c: &mut Criterion) {
    let rt = runtime();
    let process = FiberProcess::<BenchCpu>::builder()
        .with_config(FiberConfig::deterministic())
        .build();
    let word = AtomicU32::new(0);

    c.bench_function("wake_without_waiters", |b| {
        b.iter(|| rt.block_on(process.sys_futex(&word, FutexArgs::wake(1), None)));
    });
}

fn bench_table_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_scan");

    for waiters in [1usize, 16, 256] {
        let word = AtomicU32::new(0);
        let key = FutexKey::of(&word);
        let mut table = WaitTable::<()>::new();
        for _ in 0..waiters {
            table.insert(key, 0x1, None, Arc::new(()));
        }

        group.bench_with_input(BenchmarkId::from_parameter(waiters), &waiters, |b, _| {
            // Non-matching bitset: every entry is inspected, none is woken
            b.iter(|| black_box(table.wake(key, u32::MAX, 0x2, |_| {})));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_wait_wake_round_trip,
    bench_wake_without_waiters,
    bench_table_scan
);

criterion_main!(benches);
