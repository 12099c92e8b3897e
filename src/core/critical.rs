//! Critical section handling
//!
//! Provides a cell whose contents can only be reached inside a critical
//! section. The handle tables live in such cells; they are never held across
//! a kernel call that may suspend.

use core::cell::RefCell;

use critical_section::Mutex;

/// A cell that can only be accessed within a critical section.
pub(crate) struct CsCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> CsCell<T> {
    #[inline(always)]
    pub(crate) const fn new(value: T) -> Self {
        CsCell {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access to the contents.
    ///
    /// Must not be nested for the same cell.
    #[inline]
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}

/// Check if currently executing in an exception handler.
///
/// Ports for Cortex-M kernels can forward `Port::in_isr` here.
#[cfg(target_arch = "arm")]
#[inline]
pub fn in_exception_handler() -> bool {
    use cortex_m::peripheral::scb::VectActive;
    !matches!(cortex_m::peripheral::SCB::vect_active(), VectActive::ThreadMode)
}
