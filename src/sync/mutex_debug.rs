//! Mutex debug layer
//!
//! [`MutexDebug`] sits in front of the direct mutex implementation. For
//! every lock it records which task waits for which mutex and from where,
//! and for every successful lock which task holds it. From those records it
//! finds:
//!
//! - wait-for cycles, the run-time shape of a lock-order inversion: the
//!   task about to wait holds a mutex that the current holder, directly or
//!   through other tasks, is itself waiting for
//! - prolonged contention: a task that has been waiting for longer than
//!   [`CFG_MUTEX_DEBUG_CONTENTION_MS`], found by [`MutexDebug::check_contention`]

use alloc::vec::Vec;
use core::panic::Location;

use portable_atomic::{AtomicU32, Ordering};

use super::mutex::{MutexApi, MutexDirect};
use crate::config::{CFG_MUTEX_DEBUG_CONTENTION_MS, CFG_MUTEX_DEBUG_MAX_RECORDS};
use crate::core::critical::CsCell;
use crate::error::OsResult;
use crate::handle::MutexHandle;
use crate::kernel::Os;
use crate::port::Port;

#[derive(Clone, Copy)]
struct Record {
    mutex: u32,
    task: u32,
    location: &'static Location<'static>,
    since_ms: u64,
    holding: bool,
}

/// Waiting and holding records plus the counters derived from them.
///
/// One per [`Os`] when the `mutex-debug` feature is on; create your own to
/// wrap an `Os` explicitly.
pub struct MutexDebugState {
    records: CsCell<Vec<Record>>,
    inversions: AtomicU32,
    contentions: AtomicU32,
    dropped: AtomicU32,
}

impl MutexDebugState {
    pub const fn new() -> Self {
        MutexDebugState {
            records: CsCell::new(Vec::new()),
            inversions: AtomicU32::new(0),
            contentions: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Wait-for cycles seen so far
    pub fn inversions(&self) -> u32 {
        self.inversions.load(Ordering::Relaxed)
    }

    /// Over-long waits reported so far
    pub fn contentions(&self) -> u32 {
        self.contentions.load(Ordering::Relaxed)
    }

    /// Records not kept because the table was full
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of waiting and holding records
    pub fn tracked(&self) -> usize {
        self.records.with(|r| r.len())
    }

    /// Number of mutexes `task_id` holds, recursive locks counted each time
    pub fn held_by(&self, task_id: u32) -> usize {
        self.records
            .with(|r| r.iter().filter(|rec| rec.holding && rec.task == task_id).count())
    }

    fn push(&self, record: Record) {
        let kept = self.records.with(|r| {
            if r.len() >= CFG_MUTEX_DEBUG_MAX_RECORDS {
                return false;
            }
            r.push(record);
            true
        });
        if !kept {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record `task` as waiting for `mutex`; true if that closes a cycle
    fn begin_wait(&self, mutex: u32, task: u32, location: &'static Location<'static>, now_ms: u64) -> bool {
        let cycle = self.records.with(|r| closes_cycle(r, mutex, task));
        self.push(Record {
            mutex,
            task,
            location,
            since_ms: now_ms,
            holding: false,
        });
        cycle
    }

    fn end_wait(
        &self,
        mutex: u32,
        task: u32,
        location: &'static Location<'static>,
        acquired: bool,
        now_ms: u64,
    ) {
        let converted = self.records.with(|r| {
            match r.iter().position(|rec| !rec.holding && rec.mutex == mutex && rec.task == task) {
                Some(i) if acquired => {
                    r[i].holding = true;
                    r[i].since_ms = now_ms;
                    true
                }
                Some(i) => {
                    r.swap_remove(i);
                    true
                }
                None => false,
            }
        });
        // The waiting record was dropped; the holder still has to be known
        if acquired && !converted {
            self.push(Record {
                mutex,
                task,
                location,
                since_ms: now_ms,
                holding: true,
            });
        }
    }

    fn released(&self, mutex: u32, task: u32) {
        self.records.with(|r| {
            if let Some(i) = r.iter().rposition(|rec| rec.holding && rec.mutex == mutex && rec.task == task) {
                r.swap_remove(i);
            }
        });
    }

    fn forget(&self, mutex: u32) {
        self.records.with(|r| r.retain(|rec| rec.mutex != mutex));
    }
}

impl Default for MutexDebugState {
    fn default() -> Self {
        Self::new()
    }
}

/// Follow holder -> awaited mutex -> holder from `mutex` and report whether
/// the chain comes back to `task`
fn closes_cycle(records: &[Record], mutex: u32, task: u32) -> bool {
    let mut awaited = mutex;
    // Every step moves to a different waiting record, so the chain is
    // at most as long as the table
    for _ in 0..=records.len() {
        let holder = match records.iter().find(|rec| rec.holding && rec.mutex == awaited) {
            Some(rec) => rec.task,
            None => return false,
        };
        if holder == task {
            // Recursive lock, or the chain came back to us
            return awaited != mutex;
        }
        awaited = match records.iter().find(|rec| !rec.holding && rec.task == holder) {
            Some(rec) => rec.mutex,
            None => return false,
        };
    }
    false
}

/// Mutex operations with lock tracking, forwarding to [`MutexDirect`]
pub struct MutexDebug<'a, P: Port> {
    inner: &'a Os<P>,
    state: &'a MutexDebugState,
}

impl<'a, P: Port> MutexDebug<'a, P> {
    pub fn new(inner: &'a Os<P>, state: &'a MutexDebugState) -> Self {
        MutexDebug { inner, state }
    }

    pub fn state(&self) -> &'a MutexDebugState {
        self.state
    }

    fn direct(&self) -> MutexDirect<'a, P> {
        MutexDirect::new(self.inner)
    }

    fn current_task(&self) -> u32 {
        self.inner.task_get_handle().map(|h| h.id()).unwrap_or(0)
    }

    /// Report every task that has been waiting for a mutex for at least
    /// [`CFG_MUTEX_DEBUG_CONTENTION_MS`], together with where the holder
    /// locked it. Returns how many were found.
    pub fn check_contention(&self) -> usize {
        self.check_contention_over(CFG_MUTEX_DEBUG_CONTENTION_MS)
    }

    /// [`check_contention`](Self::check_contention) with an explicit threshold
    pub fn check_contention_over(&self, threshold_ms: u32) -> usize {
        let now = self.inner.uptime_ms();
        let snapshot = self.state.records.with(|r| r.clone());
        let mut found = 0;

        for waiter in snapshot.iter().filter(|rec| !rec.holding) {
            let waited = now.saturating_sub(waiter.since_ms);
            if waited < threshold_ms as u64 {
                continue;
            }
            found += 1;
            crate::warn!(
                "task {:#x} waiting {} ms for mutex {:#x} at {}:{}",
                waiter.task,
                waited,
                waiter.mutex,
                waiter.location.file(),
                waiter.location.line()
            );
            if let Some(holder) = snapshot.iter().find(|rec| rec.holding && rec.mutex == waiter.mutex) {
                crate::warn!(
                    "  held by task {:#x} since {}:{}",
                    holder.task,
                    holder.location.file(),
                    holder.location.line()
                );
            }
        }

        self.state.contentions.fetch_add(found as u32, Ordering::Relaxed);
        found
    }

    /// Log every held mutex with its holder and lock site
    pub fn report(&self) {
        let snapshot = self.state.records.with(|r| r.clone());
        for rec in snapshot.iter().filter(|rec| rec.holding) {
            crate::info!(
                "mutex {:#x} held by task {:#x} from {}:{}",
                rec.mutex,
                rec.task,
                rec.location.file(),
                rec.location.line()
            );
        }
    }

    #[track_caller]
    fn tracked_lock(&self, mutex: MutexHandle, lock: impl FnOnce() -> OsResult<()>) -> OsResult<()> {
        let location = Location::caller();
        let task = self.current_task();

        if self.state.begin_wait(mutex.id(), task, location, self.inner.uptime_ms()) {
            self.state.inversions.fetch_add(1, Ordering::Relaxed);
            crate::error!(
                "lock order inversion: task {:#x} waits for mutex {:#x} at {}:{}",
                task,
                mutex.id(),
                location.file(),
                location.line()
            );
        }

        let result = lock();
        self.state
            .end_wait(mutex.id(), task, location, result.is_ok(), self.inner.uptime_ms());
        result
    }
}

impl<'a, P: Port> MutexApi for MutexDebug<'a, P> {
    fn mutex_create(&self) -> OsResult<MutexHandle> {
        self.direct().mutex_create()
    }

    fn mutex_delete(&self, mutex: MutexHandle) -> OsResult<()> {
        self.direct().mutex_delete(mutex)?;
        self.state.forget(mutex.id());
        Ok(())
    }

    #[track_caller]
    fn mutex_lock(&self, mutex: MutexHandle) -> OsResult<()> {
        self.tracked_lock(mutex, || self.direct().mutex_lock(mutex))
    }

    #[track_caller]
    fn mutex_try_lock(&self, mutex: MutexHandle, wait_ms: u32) -> OsResult<()> {
        self.tracked_lock(mutex, || self.direct().mutex_try_lock(mutex, wait_ms))
    }

    #[track_caller]
    fn mutex_unlock(&self, mutex: MutexHandle) -> OsResult<()> {
        let task = self.current_task();
        self.direct().mutex_unlock(mutex)?;
        self.state.released(mutex.id(), task);
        Ok(())
    }
}
