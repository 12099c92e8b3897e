//! Host simulation kernel
//!
//! Runs the layer on a desktop OS so it can be tested without hardware:
//!
//! - every task is a thread, created parked and released by `task_start`
//! - queues, mutexes and semaphores are built on `std::sync` condvars
//! - timers are kept by a service thread, which hands expiries to a
//!   separate event thread that runs the callbacks
//! - interrupt context is emulated per thread between `isr_enter` and
//!   `isr_exit`
//!
//! Stack figures are approximate. The high-water mark is sampled from the
//! address of a local every time a task blocks.
//!
//! Faults can be injected with [`SimKernel::inject`] to exercise the error
//! paths of the layer above.

mod queue;
mod sync;
mod timer;

pub use queue::SimQueue;
pub use sync::{SimMutex, SimSemaphore};
pub use timer::SimTimer;

use std::cell::{Cell, RefCell};
use std::string::String;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use std::vec::Vec;

use portable_atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

use crate::config::CFG_TICK_RATE_HZ;
use crate::port::{KernelError, Port, TaskEntry, TimerCallback};
use crate::types::{OsPrio, OsSemCtr, OsTaskState, OsTick, OS_NO_WAIT, OS_WAIT_FOREVER};

use timer::TimerService;

/// Smallest stack given to a task thread; host frames are far larger than
/// the target ones the requested size is written for
const MIN_HOST_STACK: usize = 256 * 1024;

static NEXT_KERNEL_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_TASK_ID: AtomicU32 = AtomicU32::new(1);

std::thread_local! {
    /// Task object of this thread, one per kernel that has seen it
    static CURRENT: RefCell<Registered> = const { RefCell::new(Registered(Vec::new())) };
    /// Interrupt nesting depth of this thread
    static ISR_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Task objects of one thread. They all end with it.
struct Registered(Vec<(u32, SimTask)>);

impl Drop for Registered {
    fn drop(&mut self) {
        for (_, task) in &self.0 {
            task.0.state.store(OsTaskState::Deleted as u8, Ordering::Release);
        }
    }
}

/// A fault to inject into the next kernel calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// The next `count` object creations fail with `KernelError::NoMemory`
    FailAllocations { count: u32 },
    /// The next `count` timer commands are never acknowledged
    RejectTimerCommands { count: u32 },
}

pub(crate) struct SimShared {
    id: u32,
    start: Instant,
    fail_allocations: AtomicU32,
    reject_timer_commands: AtomicU32,
    timers: OnceLock<TimerService>,
}

impl SimShared {
    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_alloc(&self) -> Result<(), KernelError> {
        if Self::take(&self.fail_allocations) {
            crate::debug!("sim: injected allocation failure");
            return Err(KernelError::NoMemory);
        }
        Ok(())
    }

    fn check_timer_command(&self) -> Result<(), KernelError> {
        if Self::take(&self.reject_timer_commands) {
            crate::debug!("sim: injected timer command rejection");
            return Err(KernelError::Rejected);
        }
        Ok(())
    }
}

impl Drop for SimShared {
    fn drop(&mut self) {
        if let Some(service) = self.timers.get() {
            service.shutdown();
        }
    }
}

/// Kernel port running on host threads
pub struct SimKernel {
    shared: Arc<SimShared>,
}

impl SimKernel {
    pub fn new() -> Self {
        SimKernel {
            shared: Arc::new(SimShared {
                id: NEXT_KERNEL_ID.fetch_add(1, Ordering::Relaxed),
                start: Instant::now(),
                fail_allocations: AtomicU32::new(0),
                reject_timer_commands: AtomicU32::new(0),
                timers: OnceLock::new(),
            }),
        }
    }

    /// Make upcoming kernel calls fail
    pub fn inject(&self, fault: SimFault) {
        match fault {
            SimFault::FailAllocations { count } => {
                self.shared.fail_allocations.fetch_add(count, Ordering::AcqRel);
            }
            SimFault::RejectTimerCommands { count } => {
                self.shared.reject_timer_commands.fetch_add(count, Ordering::AcqRel);
            }
        }
    }

    /// Drop every fault not triggered yet
    pub fn clear_faults(&self) {
        self.shared.fail_allocations.store(0, Ordering::Release);
        self.shared.reject_timer_commands.store(0, Ordering::Release);
    }

    fn timers(&self) -> &TimerService {
        self.shared.timers.get_or_init(|| TimerService::spawn(self.shared.id))
    }

    /// Task object of the calling thread if it has one for this kernel
    fn registered(&self) -> Option<SimTask> {
        let id = self.shared.id;
        CURRENT.with(|current| {
            current
                .borrow()
                .0
                .iter()
                .find(|(kernel, _)| *kernel == id)
                .map(|(_, task)| task.clone())
        })
    }

    fn register(&self, task: SimTask) {
        let id = self.shared.id;
        CURRENT.with(|current| current.borrow_mut().0.push((id, task)));
    }

    /// Wait on `cv` while `blocked` holds, for at most `wait` ticks.
    ///
    /// Returns the guard and whether the condition cleared.
    pub(crate) fn wait_while<'a, T>(
        &self,
        cv: &Condvar,
        mut guard: MutexGuard<'a, T>,
        wait: OsTick,
        mut blocked: impl FnMut(&mut T) -> bool,
    ) -> (MutexGuard<'a, T>, bool) {
        if !blocked(&mut guard) {
            return (guard, true);
        }
        if wait == OS_NO_WAIT {
            return (guard, false);
        }

        let task = self.registered();
        if let Some(task) = &task {
            task.note_stack();
            task.set_state(OsTaskState::Blocked);
        }

        let mut guard = if wait == OS_WAIT_FOREVER {
            cv.wait_while(guard, |t| blocked(t))
                .unwrap_or_else(PoisonError::into_inner)
        } else {
            cv.wait_timeout_while(guard, ticks_to_duration(wait), |t| blocked(t))
                .unwrap_or_else(PoisonError::into_inner)
                .0
        };

        if let Some(task) = &task {
            task.set_state(OsTaskState::Running);
        }
        let cleared = !blocked(&mut guard);
        (guard, cleared)
    }
}

impl Default for SimKernel {
    fn default() -> Self {
        Self::new()
    }
}

/// Poison-tolerant lock; a task that panicked must not take the kernel down
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn ticks_to_duration(ticks: OsTick) -> Duration {
    Duration::from_micros(ticks as u64 * 1_000_000 / CFG_TICK_RATE_HZ as u64)
}

struct SimTaskInner {
    id: u32,
    name: String,
    priority: OsPrio,
    tag: AtomicU32,
    state: AtomicU8,
    stack_size: usize,
    stack_base: AtomicUsize,
    stack_used: AtomicUsize,
    started: Mutex<bool>,
    start_cv: Condvar,
}

/// A task of the simulation kernel
#[derive(Clone)]
pub struct SimTask(Arc<SimTaskInner>);

impl SimTask {
    fn new(name: &str, priority: OsPrio, stack_size: usize, tag: u32, started: bool) -> Self {
        SimTask(Arc::new(SimTaskInner {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            name: String::from(name),
            priority,
            tag: AtomicU32::new(tag),
            state: AtomicU8::new(OsTaskState::Ready as u8),
            stack_size,
            stack_base: AtomicUsize::new(0),
            stack_used: AtomicUsize::new(0),
            started: Mutex::new(started),
            start_cv: Condvar::new(),
        }))
    }

    /// Kernel-wide unique task number
    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn priority(&self) -> OsPrio {
        self.0.priority
    }

    fn set_state(&self, state: OsTaskState) {
        // A deleted task stays deleted
        let _ = self
            .0
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s != OsTaskState::Deleted as u8).then_some(state as u8)
            });
    }

    fn state(&self) -> OsTaskState {
        OsTaskState::from_u8(self.0.state.load(Ordering::Acquire))
    }

    fn mark_stack_base(&self) {
        let marker = 0u8;
        let here = &marker as *const u8 as usize;
        self.0.stack_base.store(here, Ordering::Release);
    }

    /// Sample the stack depth of the calling thread, which must be this task
    fn note_stack(&self) {
        let marker = 0u8;
        let here = &marker as *const u8 as usize;
        let base = self.0.stack_base.load(Ordering::Acquire);
        if base != 0 {
            self.0.stack_used.fetch_max(base.abs_diff(here), Ordering::AcqRel);
        }
    }

    fn wait_started(&self) {
        let started = lock(&self.0.started);
        drop(
            self.0
                .start_cv
                .wait_while(started, |s| !*s)
                .unwrap_or_else(PoisonError::into_inner),
        );
    }
}

impl Port for SimKernel {
    type Task = SimTask;
    type Queue = SimQueue;
    type Mutex = SimMutex;
    type Semaphore = SimSemaphore;
    type Timer = SimTimer;

    fn task_spawn(
        &self,
        entry: TaskEntry,
        name: &str,
        stack_size: usize,
        priority: OsPrio,
        tag: u32,
    ) -> Result<SimTask, KernelError> {
        self.shared.check_alloc()?;

        let task = SimTask::new(name, priority, stack_size, tag, false);
        let thread_task = task.clone();
        let kernel_id = self.shared.id;

        thread::Builder::new()
            .name(name.replace('\0', ""))
            .stack_size(stack_size.max(MIN_HOST_STACK))
            .spawn(move || {
                CURRENT.with(|current| current.borrow_mut().0.push((kernel_id, thread_task.clone())));
                thread_task.mark_stack_base();
                thread_task.wait_started();
                thread_task.set_state(OsTaskState::Running);
                entry();
                thread_task.0.state.store(OsTaskState::Deleted as u8, Ordering::Release);
            })
            .map_err(|_| KernelError::NoMemory)?;

        Ok(task)
    }

    fn task_start(&self, task: &SimTask) {
        *lock(&task.0.started) = true;
        task.0.start_cv.notify_all();
    }

    fn task_delete_self(&self) {
        if let Some(task) = self.registered() {
            task.0.state.store(OsTaskState::Deleted as u8, Ordering::Release);
        }
    }

    fn task_current(&self) -> SimTask {
        if let Some(task) = self.registered() {
            return task;
        }
        // A thread this kernel did not spawn, e.g. the test harness
        let name = thread::current().name().map(String::from).unwrap_or_default();
        let task = SimTask::new(&name, 0, 0, 0, true);
        task.mark_stack_base();
        task.set_state(OsTaskState::Running);
        self.register(task.clone());
        task
    }

    fn task_current_tag(&self) -> u32 {
        self.registered().map(|t| t.0.tag.load(Ordering::Acquire)).unwrap_or(0)
    }

    fn task_set_tag(&self, task: &SimTask, tag: u32) {
        task.0.tag.store(tag, Ordering::Release);
    }

    fn task_delay(&self, ticks: OsTick) {
        let task = self.registered();
        if let Some(task) = &task {
            task.note_stack();
            task.set_state(OsTaskState::Blocked);
        }
        if ticks == OS_WAIT_FOREVER {
            loop {
                thread::park();
            }
        }
        thread::sleep(ticks_to_duration(ticks));
        if let Some(task) = &task {
            task.set_state(OsTaskState::Running);
        }
    }

    fn task_stack_min_free(&self, task: &SimTask) -> usize {
        task.0
            .stack_size
            .saturating_sub(task.0.stack_used.load(Ordering::Acquire))
    }

    fn task_state(&self, task: &SimTask) -> OsTaskState {
        task.state()
    }

    fn tick_count(&self) -> OsTick {
        let elapsed = self.shared.start.elapsed();
        (elapsed.as_millis() as u64 * Self::TICK_RATE_HZ as u64 / 1000) as OsTick
    }

    fn in_isr(&self) -> bool {
        ISR_DEPTH.with(|depth| depth.get() > 0)
    }

    fn isr_enter(&self) {
        ISR_DEPTH.with(|depth| depth.set(depth.get() + 1));
    }

    fn isr_exit(&self) {
        ISR_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }

    fn yield_from_isr(&self) {
        thread::yield_now();
    }

    fn queue_create(&self, length: usize, item_size: usize) -> Result<SimQueue, KernelError> {
        self.shared.check_alloc()?;
        SimQueue::new(length, item_size)
    }

    fn queue_delete(&self, _queue: SimQueue) {}

    fn queue_send(&self, queue: &SimQueue, item: &[u8], wait: OsTick) -> Result<(), KernelError> {
        queue.send(self, item, wait).map(|_| ())
    }

    fn queue_send_from_isr(&self, queue: &SimQueue, item: &[u8], woken: &mut bool) -> Result<(), KernelError> {
        *woken = queue.send(self, item, OS_NO_WAIT)?;
        Ok(())
    }

    fn queue_receive(&self, queue: &SimQueue, out: &mut [u8], wait: OsTick) -> Result<(), KernelError> {
        queue.receive(self, out, wait).map(|_| ())
    }

    fn queue_receive_from_isr(&self, queue: &SimQueue, out: &mut [u8], woken: &mut bool) -> Result<(), KernelError> {
        *woken = queue.receive(self, out, OS_NO_WAIT)?;
        Ok(())
    }

    fn queue_peek(&self, queue: &SimQueue, out: &mut [u8], wait: OsTick) -> Result<(), KernelError> {
        queue.peek(self, out, wait)
    }

    fn queue_spaces(&self, queue: &SimQueue) -> usize {
        queue.spaces()
    }

    fn mutex_create(&self) -> Result<SimMutex, KernelError> {
        self.shared.check_alloc()?;
        Ok(SimMutex::new())
    }

    fn mutex_delete(&self, _mutex: SimMutex) {}

    fn mutex_take(&self, mutex: &SimMutex, wait: OsTick) -> Result<(), KernelError> {
        let me = self.task_current().id();
        mutex.take(self, me, wait)
    }

    fn mutex_give(&self, mutex: &SimMutex) -> Result<(), KernelError> {
        let me = self.task_current().id();
        mutex.give(me)
    }

    fn semaphore_create(&self, limit: OsSemCtr, initial: OsSemCtr) -> Result<SimSemaphore, KernelError> {
        self.shared.check_alloc()?;
        SimSemaphore::new(limit, initial)
    }

    fn semaphore_delete(&self, _semaphore: SimSemaphore) {}

    fn semaphore_take(&self, semaphore: &SimSemaphore, wait: OsTick) -> Result<(), KernelError> {
        semaphore.take(self, wait)
    }

    fn semaphore_give(&self, semaphore: &SimSemaphore) -> Result<(), KernelError> {
        semaphore.give().map(|_| ())
    }

    fn semaphore_give_from_isr(&self, semaphore: &SimSemaphore, woken: &mut bool) -> Result<(), KernelError> {
        *woken = semaphore.give()?;
        Ok(())
    }

    fn timer_create(
        &self,
        name: &str,
        period: OsTick,
        periodic: bool,
        callback: TimerCallback,
    ) -> Result<SimTimer, KernelError> {
        self.shared.check_alloc()?;
        self.timers().create(name, period, periodic, callback)
    }

    fn timer_delete(&self, timer: &SimTimer, _wait: OsTick) -> Result<(), KernelError> {
        self.shared.check_timer_command()?;
        self.timers().delete(timer)
    }

    fn timer_start(&self, timer: &SimTimer, _wait: OsTick) -> Result<(), KernelError> {
        self.shared.check_timer_command()?;
        self.timers().start(timer)
    }

    fn timer_stop(&self, timer: &SimTimer, _wait: OsTick) -> Result<(), KernelError> {
        self.shared.check_timer_command()?;
        self.timers().stop(timer)
    }

    fn timer_change_period(&self, timer: &SimTimer, period: OsTick, _wait: OsTick) -> Result<(), KernelError> {
        self.shared.check_timer_command()?;
        self.timers().change_period(timer, period)
    }
}
