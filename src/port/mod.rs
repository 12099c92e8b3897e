//! Port layer - the kernel capability boundary
//!
//! A [`Port`] wraps one RTOS kernel. The OS layer validates parameters,
//! converts milliseconds to ticks and maps [`KernelError`] onto
//! [`OsError`](crate::error::OsError); everything else is forwarded here.
//! All durations crossing this boundary are kernel ticks, with
//! [`OS_WAIT_FOREVER`](crate::types::OS_WAIT_FOREVER) meaning "no timeout".

use alloc::boxed::Box;

use crate::config::CFG_TICK_RATE_HZ;
use crate::types::{OsPrio, OsSemCtr, OsTaskState, OsTick};

#[cfg(feature = "std")]
pub mod sim;

/// Task entry point, the opaque task parameter is whatever it captures
pub type TaskEntry = Box<dyn FnOnce() + Send + 'static>;

/// Timer expiry callback, run in the port's timer event context
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

/// Kernel-native status of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Out of kernel-managed memory
    NoMemory,
    /// Queue full, semaphore at its limit or mutex held
    Full,
    /// Queue empty or semaphore at zero
    Empty,
    /// Caller does not own the object it tried to release
    NotOwner,
    /// The kernel refused the request, e.g. a zero-length queue or a timer
    /// command that was never acknowledged
    Rejected,
}

/// Capabilities the OS layer needs from an RTOS kernel.
///
/// Calls that take a wait may suspend the calling task; the `*_from_isr`
/// calls never do and report whether a higher-priority task was woken so the
/// caller can request a context switch at the end of the interrupt.
pub trait Port: Send + Sync + 'static {
    type Task: Clone + Send + 'static;
    type Queue: Clone + Send + 'static;
    type Mutex: Clone + Send + 'static;
    type Semaphore: Clone + Send + 'static;
    type Timer: Clone + Send + 'static;

    /// Kernel tick rate
    const TICK_RATE_HZ: u32 = CFG_TICK_RATE_HZ;

    // ============ Tasks ============

    /// Create a task. `entry` must not run before
    /// [`task_start`](Port::task_start) is called for it, and `tag` must be
    /// readable through [`task_current_tag`](Port::task_current_tag) from
    /// the task's first instruction.
    fn task_spawn(
        &self,
        entry: TaskEntry,
        name: &str,
        stack_size: usize,
        priority: OsPrio,
        tag: u32,
    ) -> Result<Self::Task, KernelError>;

    /// Let a spawned task run its entry function
    fn task_start(&self, task: &Self::Task);

    /// Delete the calling task
    fn task_delete_self(&self);

    /// Kernel object of the calling task
    fn task_current(&self) -> Self::Task;

    /// Tag of the calling task, zero if none was ever set
    fn task_current_tag(&self) -> u32;

    fn task_set_tag(&self, task: &Self::Task, tag: u32);

    fn task_delay(&self, ticks: OsTick);

    /// Lowest amount of free stack seen for `task`, in bytes
    fn task_stack_min_free(&self, task: &Self::Task) -> usize;

    fn task_state(&self, task: &Self::Task) -> OsTaskState;

    /// Fill `out` with return addresses of `task`, returning how many were
    /// written
    fn task_backtrace(&self, _task: &Self::Task, _out: &mut [usize]) -> usize {
        0
    }

    /// Ticks since the kernel started, wrapping
    fn tick_count(&self) -> OsTick;

    // ============ Interrupt context ============

    fn in_isr(&self) -> bool;

    /// Called on entry to [`Os::interrupt`](crate::kernel::Os::interrupt)
    fn isr_enter(&self) {}

    /// Called on exit from [`Os::interrupt`](crate::kernel::Os::interrupt)
    fn isr_exit(&self) {}

    /// Request a context switch once the interrupt returns
    fn yield_from_isr(&self);

    // ============ Queues ============

    fn queue_create(&self, length: usize, item_size: usize) -> Result<Self::Queue, KernelError>;

    fn queue_delete(&self, queue: Self::Queue);

    fn queue_send(&self, queue: &Self::Queue, item: &[u8], wait: OsTick) -> Result<(), KernelError>;

    fn queue_send_from_isr(
        &self,
        queue: &Self::Queue,
        item: &[u8],
        woken: &mut bool,
    ) -> Result<(), KernelError>;

    fn queue_receive(&self, queue: &Self::Queue, out: &mut [u8], wait: OsTick) -> Result<(), KernelError>;

    fn queue_receive_from_isr(
        &self,
        queue: &Self::Queue,
        out: &mut [u8],
        woken: &mut bool,
    ) -> Result<(), KernelError>;

    fn queue_peek(&self, queue: &Self::Queue, out: &mut [u8], wait: OsTick) -> Result<(), KernelError>;

    fn queue_spaces(&self, queue: &Self::Queue) -> usize;

    // ============ Mutexes ============

    fn mutex_create(&self) -> Result<Self::Mutex, KernelError>;

    fn mutex_delete(&self, mutex: Self::Mutex);

    fn mutex_take(&self, mutex: &Self::Mutex, wait: OsTick) -> Result<(), KernelError>;

    fn mutex_give(&self, mutex: &Self::Mutex) -> Result<(), KernelError>;

    // ============ Semaphores ============

    fn semaphore_create(&self, limit: OsSemCtr, initial: OsSemCtr) -> Result<Self::Semaphore, KernelError>;

    fn semaphore_delete(&self, semaphore: Self::Semaphore);

    fn semaphore_take(&self, semaphore: &Self::Semaphore, wait: OsTick) -> Result<(), KernelError>;

    fn semaphore_give(&self, semaphore: &Self::Semaphore) -> Result<(), KernelError>;

    fn semaphore_give_from_isr(&self, semaphore: &Self::Semaphore, woken: &mut bool) -> Result<(), KernelError>;

    // ============ Timers ============

    /// Create a dormant timer
    fn timer_create(
        &self,
        name: &str,
        period: OsTick,
        periodic: bool,
        callback: TimerCallback,
    ) -> Result<Self::Timer, KernelError>;

    /// Each timer command waits up to `wait` for the kernel to acknowledge it
    fn timer_delete(&self, timer: &Self::Timer, wait: OsTick) -> Result<(), KernelError>;

    fn timer_start(&self, timer: &Self::Timer, wait: OsTick) -> Result<(), KernelError>;

    fn timer_stop(&self, timer: &Self::Timer, wait: OsTick) -> Result<(), KernelError>;

    /// Change the period; a dormant timer is started by this
    fn timer_change_period(&self, timer: &Self::Timer, period: OsTick, wait: OsTick) -> Result<(), KernelError>;
}
