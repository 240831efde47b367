/*!
 * Futex Wait Table
 *
 * Owning storage for waiters blocked on futex words.
 *
 * # Design
 *
 * - An arena of entries keyed by a stable `WaiterId`
 * - A per-address index holding ids in arrival order
 * - Wakes mark entries instead of unlinking them; the waiter unlinks its own
 *   entry when it resumes, so every exit path goes through one place
 *
 * The table is plain data. Locking and suspension live in the engine.
 */

use crate::core::types::FiberHandle;
use ahash::RandomState;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

/// Identity of a futex word: its host address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FutexKey(usize);

impl FutexKey {
    #[inline]
    pub fn of(word: &AtomicU32) -> Self {
        Self(word as *const AtomicU32 as usize)
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.0
    }
}

/// Stable id of one wait entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

/// One blocked waiter
#[derive(Debug)]
pub struct WaitEntry<Sig> {
    pub key: FutexKey,
    pub bitset: u32,
    pub owner: Option<FiberHandle>,
    pub signal: Arc<Sig>,
    pub woken: bool,
}

/// Result of a requeue scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequeueOutcome {
    pub woken: u32,
    pub requeued: u32,
}

pub struct WaitTable<Sig> {
    next_id: u64,
    entries: HashMap<WaiterId, WaitEntry<Sig>, RandomState>,
    queues: HashMap<FutexKey, VecDeque<WaiterId>, RandomState>,
}

impl<Sig> WaitTable<Sig> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: HashMap::with_hasher(RandomState::new()),
            queues: HashMap::with_hasher(RandomState::new()),
        }
    }

    /// Link a new waiter at the tail of `key`'s queue
    pub fn insert(
        &mut self,
        key: FutexKey,
        bitset: u32,
        owner: Option<FiberHandle>,
        signal: Arc<Sig>,
    ) -> WaiterId {
        self.next_id += 1;
        let id = WaiterId(self.next_id);
        self.entries.insert(
            id,
            WaitEntry {
                key,
                bitset,
                owner,
                signal,
                woken: false,
            },
        );
        self.queues.entry(key).or_default().push_back(id);
        id
    }

    /// Unlink and return an entry; `None` if the table was cleared meanwhile
    pub fn remove(&mut self, id: WaiterId) -> Option<WaitEntry<Sig>> {
        let entry = self.entries.remove(&id)?;
        if let Some(queue) = self.queues.get_mut(&entry.key) {
            if let Some(pos) = queue.iter().position(|w| *w == id) {
                queue.remove(pos);
            }
            if queue.is_empty() {
                self.queues.remove(&entry.key);
            }
        }
        Some(entry)
    }

    /// Signal up to `count` unwoken waiters on `key` whose bitset intersects
    /// `bitset`, in arrival order; returns how many were signaled
    pub fn wake<F>(&mut self, key: FutexKey, count: u32, bitset: u32, mut notify: F) -> u32
    where
        F: FnMut(&Sig),
    {
        let Some(queue) = self.queues.get(&key) else {
            return 0;
        };

        let mut woken = 0;
        for id in queue {
            if woken >= count {
                break;
            }
            if let Some(entry) = self.entries.get_mut(id) {
                if !entry.woken && entry.bitset & bitset != 0 {
                    entry.woken = true;
                    notify(&entry.signal);
                    woken += 1;
                }
            }
        }
        woken
    }

    /// Signal the first `nr_wake` unwoken waiters on `src`, then move the
    /// next `nr_requeue` unwoken waiters to the tail of `dst`
    pub fn requeue<F>(
        &mut self,
        src: FutexKey,
        dst: FutexKey,
        nr_wake: u32,
        nr_requeue: u32,
        mut notify: F,
    ) -> RequeueOutcome
    where
        F: FnMut(&Sig),
    {
        let mut outcome = RequeueOutcome::default();
        let Some(queue) = self.queues.remove(&src) else {
            return outcome;
        };

        let mut stay = VecDeque::with_capacity(queue.len());
        let mut moved = Vec::new();
        for id in queue {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if entry.woken {
                stay.push_back(id);
            } else if outcome.woken < nr_wake {
                entry.woken = true;
                notify(&entry.signal);
                outcome.woken += 1;
                stay.push_back(id);
            } else if outcome.requeued < nr_requeue {
                entry.key = dst;
                outcome.requeued += 1;
                moved.push(id);
            } else {
                stay.push_back(id);
            }
        }

        if !stay.is_empty() {
            self.queues.insert(src, stay);
        }
        if !moved.is_empty() {
            self.queues.entry(dst).or_default().extend(moved);
        }
        outcome
    }

    /// Drop every entry; waiters still holding ids find them gone
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.queues.clear();
        dropped
    }

    /// Entries linked anywhere in the table
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries linked on `key`, woken or not
    pub fn waiters_on(&self, key: FutexKey) -> usize {
        self.queues.get(&key).map_or(0, VecDeque::len)
    }

    pub fn get(&self, id: WaiterId) -> Option<&WaitEntry<Sig>> {
        self.entries.get(&id)
    }
}

impl<Sig> Default for WaitTable<Sig> {
    fn default() -> Self {
        Self::new()
    }
}
