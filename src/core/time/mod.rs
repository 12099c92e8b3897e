//! Time management module
//!
//! Millisecond to tick conversion and task delays. The public surface of the
//! layer only ever takes milliseconds; ticks exist at the port boundary.

use crate::config::CFG_YIELD_MS;
use crate::kernel::Os;
use crate::port::Port;
use crate::types::{OsTick, OS_WAIT_FOREVER};

/// Convert milliseconds to kernel ticks at `tick_rate_hz`.
///
/// Rounds up, so a wait is never shorter than asked for, and saturates one
/// below [`OS_WAIT_FOREVER`] so a finite wait never turns into an endless one.
#[inline]
pub const fn ms_to_ticks(ms: u32, tick_rate_hz: u32) -> OsTick {
    let ticks = (ms as u64 * tick_rate_hz as u64 + 999) / 1000;
    if ticks >= OS_WAIT_FOREVER as u64 {
        OS_WAIT_FOREVER - 1
    } else {
        ticks as OsTick
    }
}

/// Convert kernel ticks to milliseconds at `tick_rate_hz`, rounding down
#[inline]
pub const fn ticks_to_ms(ticks: OsTick, tick_rate_hz: u32) -> u64 {
    if tick_rate_hz == 0 {
        return 0;
    }
    ticks as u64 * 1000 / tick_rate_hz as u64
}

impl<P: Port> Os<P> {
    #[inline]
    pub(crate) fn ticks(&self, ms: u32) -> OsTick {
        ms_to_ticks(ms, P::TICK_RATE_HZ)
    }

    /// Block the calling task for at least `delay_ms`.
    ///
    /// Not allowed from interrupt context; such a call is logged and
    /// ignored.
    pub fn task_block(&self, delay_ms: u32) {
        if self.port().in_isr() {
            crate::error!("task_block({}) from interrupt context ignored", delay_ms);
            return;
        }
        self.port().task_delay(self.ticks(delay_ms));
    }

    /// Give up the processor for the configured yield time
    pub fn task_yield(&self) {
        self.task_block(CFG_YIELD_MS);
    }

    /// Kernel ticks since start, wrapping
    #[inline]
    pub fn tick_count(&self) -> OsTick {
        self.port().tick_count()
    }

    /// Milliseconds since the kernel started, wraps with the tick counter
    #[inline]
    pub fn uptime_ms(&self) -> u64 {
        ticks_to_ms(self.tick_count(), P::TICK_RATE_HZ)
    }
}
