//! Software timer management
//!
//! Timers are dormant until started. Start, stop and change-interval are
//! control-plane calls: they wait as long as it takes for the kernel to
//! acknowledge the command, separately from the timer's own expiry.

use alloc::boxed::Box;

use crate::config::CFG_TIMER_NAME_MAX_LEN;
use crate::error::{OsError, OsResult};
use crate::handle::TimerHandle;
use crate::kernel::{kernel_error_str, Os};
use crate::port::Port;
use crate::types::{OsObjType, ShortName, OS_WAIT_FOREVER};

/// Timer bookkeeping entry
pub(crate) struct OsTimer<T> {
    pub native: T,
    pub name: ShortName<CFG_TIMER_NAME_MAX_LEN>,
    pub interval_ms: u32,
    pub periodic: bool,
}

impl<P: Port> Os<P> {
    /// Create a timer.
    ///
    /// `callback` runs in the port's timer event context, never inside the
    /// kernel's own timer bookkeeping, so it may call the timer API itself.
    /// The timer does not run until [`timer_start`](Os::timer_start).
    pub fn timer_create<F>(
        &self,
        name: &str,
        callback: F,
        interval_ms: u32,
        periodic: bool,
    ) -> OsResult<TimerHandle>
    where
        F: FnMut(TimerHandle) + Send + 'static,
    {
        let name = ShortName::<CFG_TIMER_NAME_MAX_LEN>::new(name);
        let period = self.ticks(interval_ms);

        let raw = self.create_in(&self.timers, OsObjType::Timer, |raw| {
            let handle = TimerHandle::from_raw(raw);
            let mut callback = callback;
            self.port()
                .timer_create(
                    name.as_str(),
                    period,
                    periodic,
                    Box::new(move || callback(handle)),
                )
                .map(|native| OsTimer {
                    native,
                    name,
                    interval_ms,
                    periodic,
                })
        })?;

        crate::trace!(
            "create timer {:#x} \"{}\" interval {} ms periodic {}",
            raw.id(),
            name.as_str(),
            interval_ms,
            periodic
        );
        Ok(TimerHandle::from_raw(raw))
    }

    /// Destroy a timer.
    ///
    /// If the kernel does not acknowledge the delete the timer stays alive
    /// and `OsError::Platform` is returned.
    pub fn timer_delete(&self, timer: TimerHandle) -> OsResult<()> {
        self.suspendable()?;
        let native = Self::lookup(&self.timers, timer.raw(), |t| t.native.clone())?;
        if let Err(err) = self.port().timer_delete(&native, OS_WAIT_FOREVER) {
            crate::warn!("timer {:#x} delete: {}", timer.id(), kernel_error_str(err));
            return Err(OsError::Platform);
        }
        // A concurrent delete of the same handle loses here
        self.destroy_in(&self.timers, timer.raw(), OsObjType::Timer, |_| {})
    }

    /// Start a timer, or restart it from now if it is running
    pub fn timer_start(&self, timer: TimerHandle) -> OsResult<()> {
        self.suspendable()?;
        let native = Self::lookup(&self.timers, timer.raw(), |t| t.native.clone())?;
        self.port()
            .timer_start(&native, OS_WAIT_FOREVER)
            .map_err(|_| OsError::Platform)
    }

    /// Stop a timer
    pub fn timer_stop(&self, timer: TimerHandle) -> OsResult<()> {
        self.suspendable()?;
        let native = Self::lookup(&self.timers, timer.raw(), |t| t.native.clone())?;
        self.port()
            .timer_stop(&native, OS_WAIT_FOREVER)
            .map_err(|_| OsError::Platform)
    }

    /// Change a timer's interval. Like the kernels underneath, this also
    /// starts a dormant timer.
    pub fn timer_change(&self, timer: TimerHandle, interval_ms: u32) -> OsResult<()> {
        self.suspendable()?;
        let native = Self::lookup(&self.timers, timer.raw(), |t| t.native.clone())?;
        self.port()
            .timer_change_period(&native, self.ticks(interval_ms), OS_WAIT_FOREVER)
            .map_err(|_| OsError::Platform)?;
        self.timers.with(|t| {
            if let Some(entry) = t.get_mut(timer.raw()) {
                entry.interval_ms = interval_ms;
            }
        });
        Ok(())
    }

    /// Interval and periodic flag of a live timer
    pub fn timer_info(&self, timer: TimerHandle) -> OsResult<(u32, bool)> {
        Self::lookup(&self.timers, timer.raw(), |t| (t.interval_ms, t.periodic))
    }

    /// Name of a live timer, truncated to the configured length
    pub fn timer_name(&self, timer: TimerHandle) -> OsResult<ShortName<CFG_TIMER_NAME_MAX_LEN>> {
        Self::lookup(&self.timers, timer.raw(), |t| t.name)
    }
}
