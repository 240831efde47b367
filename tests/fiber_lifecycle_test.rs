/*!
 * Fiber Lifecycle Tests
 * Spawn, exit, join through clear-child-TID, fork reset and signal delivery
 */

mod common;

use common::{err, leak_word, process, settle, spawn_futex, spawn_idle, TestCpu};
use guest_fibers::core::limits::BASE_FIBER_TID;
use guest_fibers::{
    CloneTids, CoopScheduler, FiberConfig, FiberError, FiberProcess, FutexArgs, GuestContext,
    Signal, TokioScheduler,
};
use mockall::mock;
use mockall::predicate::eq;
use nix::errno::Errno;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

mock! {
    pub Guest {}

    impl GuestContext for Guest {
        fn force_signal(&self, signal: Signal);
    }
}

#[tokio::test]
async fn test_spawn_assigns_increasing_tids() {
    let process = process();
    let main_tid = process.registry().last_tid();
    assert_eq!(main_tid, BASE_FIBER_TID + 1);

    let a = process.spawn_thread(TestCpu::new(), CloneTids::default(), |_| async {});
    let b = process.spawn_thread(TestCpu::new(), CloneTids::default(), |_| async {});
    assert_eq!(a, Ok(main_tid + 1));
    assert_eq!(b, Ok(main_tid + 2));
    assert_eq!(process.registry().len(), 3);
}

#[tokio::test]
async fn test_spawn_fills_tid_words() {
    let process = process();
    let parent = AtomicU32::new(0);
    let child = AtomicU32::new(0);

    let tids = CloneTids {
        parent_tid: Some(&parent),
        child_tid: Some(&child),
        clear_child_tid: None,
    };
    let tid = process
        .spawn_thread(TestCpu::new(), tids, |_| async {})
        .expect("spawn");

    assert_eq!(parent.load(Ordering::Acquire), tid as u32);
    assert_eq!(child.load(Ordering::Acquire), tid as u32);
}

#[tokio::test]
async fn test_gettid_inside_fiber() {
    let process = process();
    let (tx, rx) = oneshot::channel();

    let p = Arc::clone(&process);
    let tid = process.sys_clone_thread(TestCpu::new(), CloneTids::default(), move |_| {
        async move {
            let _ = tx.send(p.sys_gettid());
        }
    });
    assert_eq!(rx.await, Ok(tid));

    let main_tid = process.run_main(async { process.sys_gettid() }).await;
    assert_eq!(main_tid, Ok(i64::from(BASE_FIBER_TID + 1)));
}

#[tokio::test]
async fn test_finished_body_unregisters() {
    let process = process();
    process
        .spawn_thread(TestCpu::new(), CloneTids::default(), |_| async {})
        .expect("spawn");
    assert_eq!(process.registry().len(), 2);

    settle().await;
    assert_eq!(process.registry().len(), 1);
    assert_eq!(process.scheduler().live_tasks(), 0);
}

#[tokio::test]
async fn test_join_through_clear_child_tid() {
    let process = process();
    let exit_word = leak_word(0);
    let tids = CloneTids {
        child_tid: Some(exit_word),
        clear_child_tid: Some(exit_word),
        ..CloneTids::default()
    };

    let p = Arc::clone(&process);
    let tid = process
        .spawn_thread(TestCpu::new(), tids, move |_| async move {
            p.sys_sched_yield().await;
            p.sys_sched_yield().await;
        })
        .expect("spawn");
    assert_eq!(exit_word.load(Ordering::Acquire), tid as u32);

    let joined = process
        .run_main(async {
            loop {
                let seen = exit_word.load(Ordering::Acquire);
                if seen == 0 {
                    break;
                }
                process
                    .sys_futex(exit_word, FutexArgs::wait(seen, None), None)
                    .await;
            }
        })
        .await;

    assert_eq!(joined, Ok(()));
    assert_eq!(exit_word.load(Ordering::Acquire), 0);
    assert!(process.registry().by_tid(tid).is_none());
}

#[tokio::test]
async fn test_explicit_exit_is_idempotent() {
    let process = process();
    let exit_word = leak_word(0);
    let (tx, rx) = oneshot::channel();

    let tids = CloneTids {
        clear_child_tid: Some(exit_word),
        ..CloneTids::default()
    };
    exit_word.store(1, Ordering::Release);
    let p = Arc::clone(&process);
    process
        .spawn_thread(TestCpu::new(), tids, move |_| async move {
            let first = p.sys_exit();
            let registered = p.current_tid().is_some();
            let _ = tx.send((first, registered));
        })
        .expect("spawn");

    assert_eq!(rx.await, Ok((0, false)));
    assert_eq!(exit_word.load(Ordering::Acquire), 0);
    settle().await;
    assert_eq!(process.registry().len(), 1);
}

#[tokio::test]
async fn test_tids_not_reused_after_exit() {
    let process = process();
    let mut seen = Vec::new();
    for _ in 0..5 {
        let tid = process.spawn_thread(TestCpu::new(), CloneTids::default(), |_| async {});
        seen.push(tid.expect("spawn"));
        settle().await;
    }

    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(process.registry().len(), 1);
}

#[tokio::test]
async fn test_fork_reset_keeps_only_caller() {
    let process = process();
    let word = Arc::new(AtomicU32::new(0));
    let _waiters: Vec<_> = (0..3)
        .map(|_| spawn_futex(&process, &word, FutexArgs::wait(0, None)).1)
        .collect();
    settle().await;
    assert_eq!(process.registry().len(), 4);
    assert_eq!(process.futex().queued(), 3);

    let main_tid = process
        .run_main(async {
            process.fork_end(true);
            process.current_tid()
        })
        .await;

    assert_eq!(main_tid, Ok(Some(BASE_FIBER_TID + 1)));
    assert_eq!(process.registry().len(), 1);
    assert_eq!(process.futex().queued(), 0);

    settle().await;
    assert_eq!(process.scheduler().live_tasks(), 0);
    assert_eq!(process.futex().queued(), 0);

    // Idempotent
    process.run_main(async { process.reset_after_fork() }).await.ok();
    assert_eq!(process.registry().len(), 1);
}

#[tokio::test]
async fn test_fork_parent_side_is_untouched() {
    let process = process();
    let word = Arc::new(AtomicU32::new(0));
    let (_, _waiter) = spawn_futex(&process, &word, FutexArgs::wait(0, None));
    settle().await;

    process.fork_end(false);
    assert_eq!(process.registry().len(), 2);
    assert_eq!(process.futex().waiters(&word), 1);
}

#[tokio::test]
async fn test_fork_from_worker_discards_main() {
    let process = process();
    let word = Arc::new(AtomicU32::new(0));
    let main = process.main_handle();
    let (tx, rx) = oneshot::channel();

    let p = Arc::clone(&process);
    let worker = process
        .spawn_thread(TestCpu::new(), CloneTids::default(), move |_| async move {
            p.fork_end(true);
            let _ = tx.send(p.current_tid());
            std::future::pending::<()>().await;
        })
        .expect("spawn");

    // Main blocks first; the worker resets the child while main waits
    let resumed = process
        .run_main(process.sys_futex(
            &word,
            FutexArgs::wait(0, Some(Duration::from_millis(50))),
            None,
        ))
        .await;

    assert_eq!(resumed, Err(FiberError::Discarded(main.expect("initialized"))));
    assert_eq!(rx.await, Ok(Some(worker)));
    assert_eq!(process.registry().len(), 1);
    assert!(process.registry().by_tid(worker).is_some());
    assert_ne!(process.main_handle(), main);
    assert_eq!(process.futex().queued(), 0);
    assert_eq!(process.scheduler().census().suspended, 0);
}

#[tokio::test]
async fn test_fork_outside_any_fiber_keeps_main() {
    let process = process();
    let main = process.main_handle();
    spawn_idle(&process);
    spawn_idle(&process);
    settle().await;
    assert_eq!(process.registry().len(), 3);

    process.fork_end(true);

    assert_eq!(process.registry().len(), 1);
    assert!(process
        .registry()
        .by_tid(BASE_FIBER_TID + 1)
        .is_some_and(|fiber| Some(fiber.handle()) == main));
    settle().await;
    assert_eq!(process.scheduler().live_tasks(), 0);
}

#[tokio::test]
async fn test_tkill_forces_signal_into_context() {
    let process = Arc::new(
        FiberProcess::<MockGuest>::builder()
            .with_config(FiberConfig::testing())
            .build(),
    );
    process.init(Arc::new(MockGuest::new())).expect("init");

    let mut guest = MockGuest::new();
    guest
        .expect_force_signal()
        .with(eq(10))
        .times(1)
        .return_const(());
    let tid = process
        .spawn_thread(Arc::new(guest), CloneTids::default(), |_| {
            std::future::pending::<()>()
        })
        .expect("spawn");

    assert_eq!(process.sys_tkill(tid, 10), 0);
    // Signal 0 never reaches the context
    assert_eq!(process.sys_tgkill(1, tid, 0), 0);
}

#[tokio::test]
async fn test_signal_zero_checks_existence_only() {
    let process = process();
    let cpu = TestCpu::new();
    let tid = process
        .spawn_thread(Arc::clone(&cpu), CloneTids::default(), |_| {
            std::future::pending::<()>()
        })
        .expect("spawn");

    assert_eq!(process.sys_tkill(tid, 0), 0);
    assert!(cpu.signals.lock().is_empty());
    assert_eq!(process.sys_tkill(tid, 2), 0);
    assert_eq!(*cpu.signals.lock(), vec![2]);
}

#[tokio::test]
async fn test_kill_errors() {
    let process = process();

    assert_eq!(process.sys_tkill(BASE_FIBER_TID + 99, 9), err(Errno::ESRCH));
    assert_eq!(process.sys_tkill(BASE_FIBER_TID + 1, 65), err(Errno::EINVAL));
    assert_eq!(process.sys_tkill(BASE_FIBER_TID + 1, -1), err(Errno::EINVAL));
    assert_eq!(process.sys_tkill(0, 9), err(Errno::EINVAL));
    assert_eq!(
        process.sys_tgkill(0, BASE_FIBER_TID + 1, 9),
        err(Errno::EINVAL)
    );
}

#[tokio::test]
async fn test_processes_can_share_a_scheduler() {
    let scheduler = Arc::new(TokioScheduler::new());
    let a = common::TestProcess::builder()
        .with_scheduler(Arc::clone(&scheduler))
        .build();
    let b = common::TestProcess::builder()
        .with_scheduler(Arc::clone(&scheduler))
        .build();

    let tid_a = a.init(TestCpu::new()).expect("init");
    let tid_b = b.init(TestCpu::new()).expect("init");

    // Registries are per process
    assert_eq!(tid_a, tid_b);
    assert_ne!(a.main_handle(), b.main_handle());
}
