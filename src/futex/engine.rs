/*!
 * Futex Engine
 *
 * WAIT/WAKE/REQUEUE semantics over host-visible 32-bit words, suspending
 * fibers through the cooperative scheduler.
 *
 * # Design
 *
 * - One coarse lock over the wait table, held only for a check-and-link or
 *   a scan-and-signal sequence, never across a suspension
 * - The value check in WAIT happens under that lock, so a waker that
 *   changes the word and then calls WAKE cannot slip between check and link
 * - Each waiter owns its entry through a `WaitGuard`; dropping the guard
 *   (resume, timeout, cancellation) unlinks it
 * - Wake and requeue only see entries present at scan time
 */

use super::ops::{FutexArgs, FutexCall};
use super::queue::{FutexKey, WaitTable, WaiterId};
use super::stats::FutexStats;
use crate::core::errors::{FutexError, FutexResult};
use crate::scheduler::{CoopScheduler, WakeReason};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Unlinks a wait entry on every exit path of a wait
struct WaitGuard<'a, Sig> {
    table: &'a Mutex<WaitTable<Sig>>,
    id: Option<WaiterId>,
}

impl<'a, Sig> WaitGuard<'a, Sig> {
    /// Unlink now and report whether a waker signaled this entry
    fn finish(mut self) -> bool {
        match self.id.take() {
            Some(id) => self.table.lock().remove(id).is_some_and(|e| e.woken),
            None => false,
        }
    }
}

impl<Sig> Drop for WaitGuard<'_, Sig> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.table.lock().remove(id);
            trace!("abandoned futex wait unlinked");
        }
    }
}

/// Futex wait-queue engine for one emulated process
pub struct FutexEngine<S: CoopScheduler> {
    scheduler: Arc<S>,
    table: Mutex<WaitTable<S::Signal>>,
    stats: FutexStats,
}

impl<S: CoopScheduler> FutexEngine<S> {
    pub fn new(scheduler: Arc<S>) -> Self {
        Self {
            scheduler,
            table: Mutex::new(WaitTable::new()),
            stats: FutexStats::new(),
        }
    }

    /// Dispatch a futex call
    ///
    /// `uaddr2` is only consulted by the requeue family; its absence there
    /// is a fault. Returns 0 for waits, the number of woken waiters for
    /// WAKE and REQUEUE, and woken plus requeued for CMP_REQUEUE.
    pub async fn futex(
        &self,
        uaddr: &AtomicU32,
        args: &FutexArgs,
        uaddr2: Option<&AtomicU32>,
    ) -> FutexResult<u32> {
        let call = FutexCall::decode(args).map_err(|err| {
            self.stats.inc_invalid();
            debug!(op = args.op, error = %err, "futex call rejected");
            err
        })?;

        match call {
            FutexCall::Wait {
                expected,
                timeout,
                bitset,
            } => self.wait(uaddr, expected, timeout, bitset).await.map(|_| 0),
            FutexCall::Wake { count, bitset } => self.wake(uaddr, count, bitset),
            FutexCall::Requeue {
                nr_wake,
                nr_requeue,
                compare,
            } => {
                let target = uaddr2.ok_or(FutexError::Fault)?;
                self.requeue(uaddr, target, nr_wake, nr_requeue, compare)
            }
        }
    }

    /// Block the calling fiber while `word` holds `expected`
    ///
    /// Fails with `StaleValue` without linking anything if the word already
    /// differs. A timed-out wait is still a success; callers re-check the
    /// word to tell the cases apart.
    pub async fn wait(
        &self,
        word: &AtomicU32,
        expected: u32,
        timeout: Option<Duration>,
        bitset: u32,
    ) -> FutexResult<WakeReason> {
        if bitset == 0 {
            self.stats.inc_invalid();
            return Err(FutexError::InvalidArgument("zero bitset"));
        }

        let key = FutexKey::of(word);
        let signal = Arc::new(S::Signal::default());
        let guard = {
            let mut table = self.table.lock();
            if word.load(Ordering::Acquire) != expected {
                self.stats.inc_stale();
                trace!(addr = key.addr(), expected, "futex wait on stale value");
                return Err(FutexError::StaleValue);
            }
            let id = table.insert(key, bitset, self.scheduler.current(), Arc::clone(&signal));
            WaitGuard {
                table: &self.table,
                id: Some(id),
            }
        };
        self.stats.inc_waits();
        trace!(addr = key.addr(), expected, bitset, ?timeout, "futex wait");

        let reason = self.scheduler.suspend(&signal, timeout).await;
        if guard.finish() {
            return Ok(WakeReason::Notified);
        }
        if reason.timed_out() {
            self.stats.inc_timeouts();
            trace!(addr = key.addr(), "futex wait timed out");
        }
        Ok(reason)
    }

    /// Signal up to `count` waiters on `word` whose bitset intersects `bitset`
    pub fn wake(&self, word: &AtomicU32, count: u32, bitset: u32) -> FutexResult<u32> {
        if bitset == 0 {
            self.stats.inc_invalid();
            return Err(FutexError::InvalidArgument("zero bitset"));
        }

        let key = FutexKey::of(word);
        let woken = self
            .table
            .lock()
            .wake(key, count, bitset, |signal| self.scheduler.notify(signal));
        self.stats.add_wakes(woken);
        trace!(addr = key.addr(), count, bitset, woken, "futex wake");
        Ok(woken)
    }

    /// Wake up to `nr_wake` waiters on `src` and move up to `nr_requeue`
    /// more onto `dst`
    ///
    /// With `compare`, the call first checks that `src` still holds that
    /// value and otherwise fails with `StaleValue` without touching the
    /// queues.
    pub fn requeue(
        &self,
        src: &AtomicU32,
        dst: &AtomicU32,
        nr_wake: u32,
        nr_requeue: u32,
        compare: Option<u32>,
    ) -> FutexResult<u32> {
        let (from, to) = (FutexKey::of(src), FutexKey::of(dst));
        let outcome = {
            let mut table = self.table.lock();
            if let Some(expected) = compare {
                if src.load(Ordering::Acquire) != expected {
                    self.stats.inc_stale();
                    return Err(FutexError::StaleValue);
                }
            }
            table.requeue(from, to, nr_wake, nr_requeue, |signal| {
                self.scheduler.notify(signal)
            })
        };

        self.stats.add_wakes(outcome.woken);
        self.stats.add_requeued(outcome.requeued);
        debug!(
            src = from.addr(),
            dst = to.addr(),
            woken = outcome.woken,
            requeued = outcome.requeued,
            "futex requeue"
        );

        Ok(match compare {
            Some(_) => outcome.woken + outcome.requeued,
            None => outcome.woken,
        })
    }

    /// Drop every wait entry (process init and post-fork reset)
    pub fn clear(&self) -> usize {
        let dropped = self.table.lock().clear();
        if dropped > 0 {
            debug!(dropped, "futex wait table cleared");
        }
        dropped
    }

    /// Entries currently linked on `word`
    pub fn waiters(&self, word: &AtomicU32) -> usize {
        self.table.lock().waiters_on(FutexKey::of(word))
    }

    /// Entries currently linked on any word
    pub fn queued(&self) -> usize {
        self.table.lock().len()
    }

    pub fn stats(&self) -> &FutexStats {
        &self.stats
    }
}
