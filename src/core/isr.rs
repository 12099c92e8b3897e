//! Interrupt context
//!
//! Inside [`Os::interrupt`] the caller only gets an [`Isr`] token, which
//! exposes the operations that never suspend. Suspending operations are not
//! reachable through it, so calling one from an interrupt handler written
//! against the token does not compile.

use core::cell::Cell;
use core::marker::PhantomData;

use crate::error::{OsError, OsResult};
use crate::handle::{QueueHandle, SemaphoreHandle};
use crate::kernel::Os;
use crate::port::Port;

/// Non-suspending view of an [`Os`], valid for one interrupt
pub struct Isr<'a, P: Port> {
    os: &'a Os<P>,
    yield_requested: Cell<bool>,
    // Tied to the interrupt it was created for
    _not_send: PhantomData<*const ()>,
}

impl<P: Port> Os<P> {
    /// Run `f` as an interrupt handler body.
    ///
    /// If any call inside woke a task that should run next, a context switch
    /// is requested from the kernel once `f` returns.
    pub fn interrupt<R>(&self, f: impl FnOnce(&Isr<'_, P>) -> R) -> R {
        self.port().isr_enter();
        let isr = Isr {
            os: self,
            yield_requested: Cell::new(false),
            _not_send: PhantomData,
        };
        let result = f(&isr);
        self.port().isr_exit();
        if isr.yield_requested.get() {
            self.port().yield_from_isr();
        }
        result
    }
}

impl<'a, P: Port> Isr<'a, P> {
    #[inline]
    fn note_woken(&self, woken: bool) {
        if woken {
            self.yield_requested.set(true);
        }
    }

    /// Send to a queue without blocking.
    ///
    /// # Returns
    /// * `Err(OsError::Platform)` - The queue is full
    /// * `Err(OsError::InvalidParameter)` - Stale handle or wrong record size
    pub fn queue_send(&self, queue: QueueHandle, item: &[u8]) -> OsResult<()> {
        let native = self.os.queue_native(queue, item.len())?;
        let mut woken = false;
        let result = self.os.port().queue_send_from_isr(&native, item, &mut woken);
        self.note_woken(woken);
        result.map_err(|_| OsError::Platform)
    }

    /// Receive from a queue without blocking, `OsError::Platform` if empty
    pub fn queue_receive(&self, queue: QueueHandle, out: &mut [u8]) -> OsResult<()> {
        let native = self.os.queue_native(queue, out.len())?;
        let mut woken = false;
        let result = self.os.port().queue_receive_from_isr(&native, out, &mut woken);
        self.note_woken(woken);
        result.map_err(|_| OsError::Platform)
    }

    /// Free slots in a queue
    pub fn queue_get_free(&self, queue: QueueHandle) -> OsResult<usize> {
        self.os.queue_get_free(queue)
    }

    /// Give a semaphore without blocking, `OsError::Platform` if it is
    /// already at its limit
    pub fn semaphore_give(&self, semaphore: SemaphoreHandle) -> OsResult<()> {
        let native = self.os.semaphore_native(semaphore)?;
        let mut woken = false;
        let result = self.os.port().semaphore_give_from_isr(&native, &mut woken);
        self.note_woken(woken);
        result.map_err(|_| OsError::Platform)
    }

    /// Whether a context switch will be requested when the interrupt ends
    pub fn yield_requested(&self) -> bool {
        self.yield_requested.get()
    }
}
