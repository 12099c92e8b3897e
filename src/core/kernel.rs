//! The OS context
//!
//! [`Os`] owns one kernel port, the handle tables for every primitive kind
//! and the resource counter. Primitive operations are implemented on it in
//! their own modules (`task`, `time`, `timer`, `sync::*`).

use crate::config::{CFG_MAX_MUTEXES, CFG_MAX_QUEUES, CFG_MAX_SEMAPHORES, CFG_MAX_TASKS, CFG_MAX_TIMERS};
use crate::core::critical::CsCell;
use crate::core::handle::{RawHandle, SlotTable};
use crate::core::resource::ResourceCounter;
use crate::core::task::OsTcb;
use crate::core::timer::OsTimer;
use crate::error::{OsError, OsResult};
use crate::port::{KernelError, Port};
use crate::sync::queue::OsQueue;
use crate::sync::sem::OsSem;
use crate::types::OsObjType;

#[cfg(feature = "mutex-debug")]
use crate::sync::mutex_debug::MutexDebugState;

/// Process-level context through which every primitive is created, used
/// and destroyed.
///
/// Share it between tasks behind an `Arc` or a `'static` reference. Each
/// context has its own [`ResourceCounter`], so tests can run isolated.
pub struct Os<P: Port> {
    port: P,
    resources: ResourceCounter,
    pub(crate) tasks: CsCell<SlotTable<OsTcb<P::Task>, CFG_MAX_TASKS>>,
    pub(crate) queues: CsCell<SlotTable<OsQueue<P::Queue>, CFG_MAX_QUEUES>>,
    pub(crate) mutexes: CsCell<SlotTable<P::Mutex, CFG_MAX_MUTEXES>>,
    pub(crate) semaphores: CsCell<SlotTable<OsSem<P::Semaphore>, CFG_MAX_SEMAPHORES>>,
    pub(crate) timers: CsCell<SlotTable<OsTimer<P::Timer>, CFG_MAX_TIMERS>>,
    #[cfg(feature = "mutex-debug")]
    pub(crate) mutex_debug: MutexDebugState,
}

impl<P: Port> Os<P> {
    pub fn new(port: P) -> Self {
        Os {
            port,
            resources: ResourceCounter::new(),
            tasks: CsCell::new(SlotTable::new()),
            queues: CsCell::new(SlotTable::new()),
            mutexes: CsCell::new(SlotTable::new()),
            semaphores: CsCell::new(SlotTable::new()),
            timers: CsCell::new(SlotTable::new()),
            #[cfg(feature = "mutex-debug")]
            mutex_debug: MutexDebugState::new(),
        }
    }

    /// The kernel port this context runs on
    #[inline(always)]
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Number of OS resources currently allocated through this context
    #[inline]
    pub fn resource_count(&self) -> i32 {
        self.resources.get()
    }

    #[inline]
    pub fn resources(&self) -> &ResourceCounter {
        &self.resources
    }

    /// Suspending calls are a contract violation in interrupt context
    #[inline]
    pub(crate) fn suspendable(&self) -> OsResult<()> {
        if self.port.in_isr() {
            crate::error!("suspending call from interrupt context");
            return Err(OsError::InvalidParameter);
        }
        Ok(())
    }

    /// Reserve a slot, let `make` ask the kernel for the object and publish
    /// it. The counter moves only when both steps succeed.
    pub(crate) fn create_in<T, const N: usize>(
        &self,
        table: &CsCell<SlotTable<T, N>>,
        kind: OsObjType,
        make: impl FnOnce(RawHandle) -> Result<T, KernelError>,
    ) -> OsResult<RawHandle> {
        let raw = match table.with(|t| t.reserve()) {
            Some(raw) => raw,
            None => {
                crate::warn!("no free {} slot", kind.as_str());
                return Err(OsError::Platform);
            }
        };

        match make(raw) {
            Ok(object) => {
                table.with(|t| t.fill(raw, object));
                self.resources.increment();
                Ok(raw)
            }
            Err(err) => {
                table.with(|t| t.release(raw));
                crate::debug!("kernel refused {} create: {}", kind.as_str(), kernel_error_str(err));
                Err(OsError::Platform)
            }
        }
    }

    /// Unpublish the object behind `raw` and hand it to `release`.
    ///
    /// Stale handles are rejected without side effects.
    pub(crate) fn destroy_in<T, const N: usize>(
        &self,
        table: &CsCell<SlotTable<T, N>>,
        raw: RawHandle,
        kind: OsObjType,
        release: impl FnOnce(T),
    ) -> OsResult<()> {
        let object = table.with(|t| t.remove(raw)).ok_or(OsError::InvalidParameter)?;
        release(object);
        self.resources.decrement();
        crate::trace!("delete {} {:#x}", kind.as_str(), raw.id());
        Ok(())
    }

    /// Run `f` on the live object behind `raw`
    #[inline]
    pub(crate) fn lookup<T, const N: usize, R>(
        table: &CsCell<SlotTable<T, N>>,
        raw: RawHandle,
        f: impl FnOnce(&T) -> R,
    ) -> OsResult<R> {
        table.with(|t| t.get(raw).map(f)).ok_or(OsError::InvalidParameter)
    }
}

impl<P: Port + Default> Default for Os<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

pub(crate) fn kernel_error_str(err: KernelError) -> &'static str {
    match err {
        KernelError::NoMemory => "no memory",
        KernelError::Full => "full",
        KernelError::Empty => "empty",
        KernelError::NotOwner => "not owner",
        KernelError::Rejected => "rejected",
    }
}
