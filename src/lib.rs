//! Portable RTOS abstraction layer
//!
//! One API for upper-layer protocol and driver code that has to run on
//! several RTOS kernels:
//! - Tasks, message queues, mutexes, counting semaphores and software timers
//!   behind typed, generation-checked handles
//! - Leak accounting through a per-context resource counter
//! - Interrupt-safe variants reachable only through an [`isr::Isr`] token
//! - A mutex interposition seam for lock-order and contention diagnostics
//! - An inactivity detector that reports a stalled application
//!
//! Each kernel is wrapped by a [`port::Port`]. The `std` feature adds a host
//! simulation port so the whole layer runs and is tested on a desktop.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// ============ Critical Section ============

#[cfg(all(target_arch = "arm", feature = "single-core-cs"))]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;

pub mod core;
pub mod debug;
pub mod port;
pub mod sync;

#[doc(hidden)]
#[cfg(feature = "defmt")]
pub use ::defmt as __defmt;
#[doc(hidden)]
#[cfg(feature = "log")]
pub use ::log as __log;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult};
pub use crate::core::handle;
pub use crate::core::handle::{MutexHandle, QueueHandle, SemaphoreHandle, TaskHandle, TimerHandle};
pub use crate::core::isr;
pub use crate::core::isr::Isr;
pub use crate::core::kernel;
pub use crate::core::kernel::Os;
pub use crate::core::resource;
pub use crate::core::resource::ResourceCounter;
pub use crate::core::task;
pub use crate::core::time;
pub use crate::core::time::{ms_to_ticks, ticks_to_ms};
pub use crate::core::timer;
pub use crate::core::types;
pub use crate::core::types::*;

pub use crate::debug::inactivity::{InactivityConfig, InactivityDetector};
pub use crate::sync::{mutex, mutex_debug, queue, sem};
pub use crate::sync::{MutexApi, MutexDebug, MutexDebugState, MutexDirect, Mutexes};

#[cfg(feature = "std")]
pub use crate::port::sim::SimKernel;
