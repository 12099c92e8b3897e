//! Simulated kernel mutex and counting semaphore

use std::sync::{Arc, Condvar, Mutex};

use super::{lock, SimKernel};
use crate::port::KernelError;
use crate::types::{OsSemCtr, OsTick};

struct MutexState {
    /// Id of the owning task
    owner: Option<u32>,
    /// Recursive lock depth of the owner
    depth: u32,
}

struct MutexInner {
    state: Mutex<MutexState>,
    released: Condvar,
}

/// A recursive mutex owned by a task
#[derive(Clone)]
pub struct SimMutex(Arc<MutexInner>);

impl SimMutex {
    pub(super) fn new() -> Self {
        SimMutex(Arc::new(MutexInner {
            state: Mutex::new(MutexState { owner: None, depth: 0 }),
            released: Condvar::new(),
        }))
    }

    pub(super) fn take(&self, kernel: &SimKernel, task: u32, wait: OsTick) -> Result<(), KernelError> {
        let state = lock(&self.0.state);
        let (mut state, free) = kernel.wait_while(&self.0.released, state, wait, |s| {
            s.owner.is_some_and(|owner| owner != task)
        });
        if !free {
            return Err(KernelError::Full);
        }
        state.owner = Some(task);
        state.depth += 1;
        Ok(())
    }

    pub(super) fn give(&self, task: u32) -> Result<(), KernelError> {
        let mut state = lock(&self.0.state);
        if state.owner != Some(task) {
            return Err(KernelError::NotOwner);
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.0.released.notify_one();
        }
        Ok(())
    }
}

struct SemaphoreState {
    count: OsSemCtr,
    limit: OsSemCtr,
    waiting: usize,
}

struct SemaphoreInner {
    state: Mutex<SemaphoreState>,
    available: Condvar,
}

/// A counting semaphore
#[derive(Clone)]
pub struct SimSemaphore(Arc<SemaphoreInner>);

impl SimSemaphore {
    pub(super) fn new(limit: OsSemCtr, initial: OsSemCtr) -> Result<Self, KernelError> {
        if limit == 0 || initial > limit {
            return Err(KernelError::Rejected);
        }
        Ok(SimSemaphore(Arc::new(SemaphoreInner {
            state: Mutex::new(SemaphoreState {
                count: initial,
                limit,
                waiting: 0,
            }),
            available: Condvar::new(),
        })))
    }

    pub(super) fn take(&self, kernel: &SimKernel, wait: OsTick) -> Result<(), KernelError> {
        let mut state = lock(&self.0.state);
        state.waiting += 1;
        let (mut state, available) = kernel.wait_while(&self.0.available, state, wait, |s| s.count == 0);
        state.waiting -= 1;
        if !available {
            return Err(KernelError::Empty);
        }
        state.count -= 1;
        Ok(())
    }

    /// Increment the count, true if a task was waiting for it
    pub(super) fn give(&self) -> Result<bool, KernelError> {
        let mut state = lock(&self.0.state);
        if state.count >= state.limit {
            return Err(KernelError::Full);
        }
        state.count += 1;
        let woken = state.waiting > 0;
        drop(state);
        self.0.available.notify_one();
        Ok(woken)
    }

    /// Current count
    pub fn count(&self) -> OsSemCtr {
        lock(&self.0.state).count
    }
}
