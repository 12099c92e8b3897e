//! Synchronization primitives
//!
//! Contains message queues, counting semaphores, mutexes and the mutex
//! debug layer.

pub mod mutex;
pub mod mutex_debug;
pub mod queue;
pub mod sem;

pub use mutex::{MutexApi, MutexDirect, Mutexes};
pub use mutex_debug::{MutexDebug, MutexDebugState};
