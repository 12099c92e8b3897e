//! Simulated kernel queue

use std::boxed::Box;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use super::{lock, SimKernel};
use crate::port::KernelError;
use crate::types::OsTick;

struct QueueState {
    items: VecDeque<Box<[u8]>>,
    capacity: usize,
    item_size: usize,
    waiting_senders: usize,
    waiting_receivers: usize,
}

struct QueueInner {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
}

/// A bounded FIFO of fixed-size records
#[derive(Clone)]
pub struct SimQueue(Arc<QueueInner>);

impl SimQueue {
    pub(super) fn new(length: usize, item_size: usize) -> Result<Self, KernelError> {
        if length == 0 || item_size == 0 {
            return Err(KernelError::Rejected);
        }
        Ok(SimQueue(Arc::new(QueueInner {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(length),
                capacity: length,
                item_size,
                waiting_senders: 0,
                waiting_receivers: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })))
    }

    /// Append a record, true if a receiver was waiting for it
    pub(super) fn send(&self, kernel: &SimKernel, item: &[u8], wait: OsTick) -> Result<bool, KernelError> {
        let mut state = lock(&self.0.state);
        if item.len() != state.item_size {
            return Err(KernelError::Rejected);
        }

        state.waiting_senders += 1;
        let (mut state, space) =
            kernel.wait_while(&self.0.not_full, state, wait, |s| s.items.len() >= s.capacity);
        state.waiting_senders -= 1;
        if !space {
            return Err(KernelError::Full);
        }

        state.items.push_back(Box::from(item));
        let woken = state.waiting_receivers > 0;
        drop(state);
        // Peekers and receivers share the condvar
        self.0.not_empty.notify_all();
        Ok(woken)
    }

    /// Remove the head record, true if a sender was waiting for the space
    pub(super) fn receive(&self, kernel: &SimKernel, out: &mut [u8], wait: OsTick) -> Result<bool, KernelError> {
        let mut state = lock(&self.0.state);
        state.waiting_receivers += 1;
        let (mut state, ready) = kernel.wait_while(&self.0.not_empty, state, wait, |s| s.items.is_empty());
        state.waiting_receivers -= 1;

        if !ready {
            return Err(KernelError::Empty);
        }
        let item = state.items.pop_front().ok_or(KernelError::Empty)?;
        copy_record(out, &item);
        let woken = state.waiting_senders > 0;
        drop(state);
        self.0.not_full.notify_one();
        Ok(woken)
    }

    /// Copy the head record without removing it
    pub(super) fn peek(&self, kernel: &SimKernel, out: &mut [u8], wait: OsTick) -> Result<(), KernelError> {
        let mut state = lock(&self.0.state);
        state.waiting_receivers += 1;
        let (mut state, ready) = kernel.wait_while(&self.0.not_empty, state, wait, |s| s.items.is_empty());
        state.waiting_receivers -= 1;

        match state.items.front() {
            Some(item) if ready => {
                copy_record(out, item);
                Ok(())
            }
            _ => Err(KernelError::Empty),
        }
    }

    pub(super) fn spaces(&self) -> usize {
        let state = lock(&self.0.state);
        state.capacity - state.items.len()
    }
}

fn copy_record(out: &mut [u8], item: &[u8]) {
    let n = out.len().min(item.len());
    out[..n].copy_from_slice(&item[..n]);
}
