//! Compile-time configuration for the OS abstraction layer
//!
//! These constants control parameter validation, tick conversion and the
//! capacity of the handle tables.

/// Lowest task priority accepted by `task_create`
pub const CFG_PRIO_MIN: i32 = 1;

/// Highest task priority accepted by `task_create`
pub const CFG_PRIO_MAX: i32 = 15;

/// System tick rate in Hz used when a port does not override it
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Time to block for to be sure a yield happens
pub const CFG_YIELD_MS: u32 = 1;

/// Minimum task stack size in bytes
pub const CFG_STK_SIZE_MIN: usize = 512;

/// Maximum number of live tasks known to the layer
pub const CFG_MAX_TASKS: usize = 32;

/// Maximum number of live queues
pub const CFG_MAX_QUEUES: usize = 32;

/// Maximum number of live mutexes
pub const CFG_MAX_MUTEXES: usize = 64;

/// Maximum number of live semaphores
pub const CFG_MAX_SEMAPHORES: usize = 32;

/// Maximum number of live timers
pub const CFG_MAX_TIMERS: usize = 32;

/// Maximum length of a task name in bytes
pub const CFG_TASK_NAME_MAX_LEN: usize = 16;

/// Maximum length of a timer name in bytes, longer names are truncated
pub const CFG_TIMER_NAME_MAX_LEN: usize = 16;

/// Period at which the inactivity detector samples the activity counter
pub const CFG_INACTIVITY_CHECK_PERIOD_SEC: u32 = 60;

/// Stack size of the inactivity detector task
pub const CFG_INACTIVITY_TASK_STACK_SIZE: usize = 2048;

/// Priority of the inactivity detector task
pub const CFG_INACTIVITY_TASK_PRIORITY: i32 = CFG_PRIO_MIN;

/// Number of return addresses captured per task in a thread dump
pub const CFG_BACKTRACE_DEPTH: usize = 8;

/// Number of concurrent lock records kept by the mutex debug layer
pub const CFG_MUTEX_DEBUG_MAX_RECORDS: usize = 64;

/// Wait after which the mutex debug layer reports a lock as contended
pub const CFG_MUTEX_DEBUG_CONTENTION_MS: u32 = 5000;
