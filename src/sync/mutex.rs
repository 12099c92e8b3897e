//! Mutex implementation
//!
//! Every mutex operation goes through [`MutexApi`], reached from
//! [`Os::mutexes`]. Without the `mutex-debug` feature that hands out
//! [`MutexDirect`], which forwards to the kernel. With it, it hands out
//! [`MutexDebug`](super::mutex_debug::MutexDebug), which records the call
//! and then forwards to `MutexDirect`. Application code cannot build a
//! `MutexDirect` itself, so the debug layer sees every call.

use crate::error::{OsError, OsResult};
use crate::handle::MutexHandle;
use crate::kernel::{kernel_error_str, Os};
use crate::port::{KernelError, Port};
use crate::types::{OsObjType, OS_WAIT_FOREVER};

/// The five mutex operations
///
/// Lock and unlock carry `#[track_caller]` so an interposed implementation
/// can see where in the application they were called from.
pub trait MutexApi {
    /// Create a mutex
    fn mutex_create(&self) -> OsResult<MutexHandle>;

    /// Delete a mutex. It must not be locked.
    fn mutex_delete(&self, mutex: MutexHandle) -> OsResult<()>;

    /// Lock a mutex, waiting as long as it takes
    #[track_caller]
    fn mutex_lock(&self, mutex: MutexHandle) -> OsResult<()>;

    /// Lock a mutex, waiting at most `wait_ms`
    ///
    /// # Returns
    /// * `Err(OsError::Timeout)` - Still held by another task when the wait ran out
    #[track_caller]
    fn mutex_try_lock(&self, mutex: MutexHandle, wait_ms: u32) -> OsResult<()>;

    /// Unlock a mutex.
    ///
    /// Unlocking a mutex the caller does not hold changes nothing and still
    /// succeeds.
    #[track_caller]
    fn mutex_unlock(&self, mutex: MutexHandle) -> OsResult<()>;
}

#[cfg(not(feature = "mutex-debug"))]
/// What [`Os::mutexes`] hands out
pub type Mutexes<'a, P> = MutexDirect<'a, P>;

#[cfg(feature = "mutex-debug")]
/// What [`Os::mutexes`] hands out
pub type Mutexes<'a, P> = super::mutex_debug::MutexDebug<'a, P>;

impl<P: Port> Os<P> {
    /// The mutex operations, interposed by the debug layer when the
    /// `mutex-debug` feature is on
    #[cfg(not(feature = "mutex-debug"))]
    #[inline(always)]
    pub fn mutexes(&self) -> Mutexes<'_, P> {
        MutexDirect::new(self)
    }

    /// The mutex operations, interposed by the debug layer when the
    /// `mutex-debug` feature is on
    #[cfg(feature = "mutex-debug")]
    #[inline(always)]
    pub fn mutexes(&self) -> Mutexes<'_, P> {
        super::mutex_debug::MutexDebug::new(self, &self.mutex_debug)
    }

    fn mutex_native(&self, mutex: MutexHandle) -> OsResult<P::Mutex> {
        Self::lookup(&self.mutexes, mutex.raw(), |m| m.clone())
    }
}

/// Mutex operations forwarded straight to the kernel
///
/// Only [`Os::mutexes`] and the debug layer hand these out; `Os` has no
/// mutex operations of its own.
///
/// ```compile_fail
/// use osal::{MutexApi, Os, SimKernel};
///
/// let os = Os::new(SimKernel::new());
/// let _ = os.mutex_create();
/// ```
pub struct MutexDirect<'a, P: Port> {
    os: &'a Os<P>,
}

impl<'a, P: Port> MutexDirect<'a, P> {
    #[inline(always)]
    pub(crate) fn new(os: &'a Os<P>) -> Self {
        MutexDirect { os }
    }
}

impl<'a, P: Port> MutexApi for MutexDirect<'a, P> {
    fn mutex_create(&self) -> OsResult<MutexHandle> {
        let os = self.os;
        let raw = os.create_in(&os.mutexes, OsObjType::Mutex, |_| os.port().mutex_create())?;
        crate::trace!("create mutex {:#x}", raw.id());
        Ok(MutexHandle::from_raw(raw))
    }

    fn mutex_delete(&self, mutex: MutexHandle) -> OsResult<()> {
        self.os.destroy_in(&self.os.mutexes, mutex.raw(), OsObjType::Mutex, |m| {
            self.os.port().mutex_delete(m)
        })
    }

    fn mutex_lock(&self, mutex: MutexHandle) -> OsResult<()> {
        self.os.suspendable()?;
        let native = self.os.mutex_native(mutex)?;
        self.os
            .port()
            .mutex_take(&native, OS_WAIT_FOREVER)
            .map_err(|_| OsError::Platform)
    }

    fn mutex_try_lock(&self, mutex: MutexHandle, wait_ms: u32) -> OsResult<()> {
        self.os.suspendable()?;
        let native = self.os.mutex_native(mutex)?;
        self.os
            .port()
            .mutex_take(&native, self.os.ticks(wait_ms))
            .map_err(|_| OsError::Timeout)
    }

    fn mutex_unlock(&self, mutex: MutexHandle) -> OsResult<()> {
        let native = self.os.mutex_native(mutex)?;
        match self.os.port().mutex_give(&native) {
            Ok(()) => Ok(()),
            Err(KernelError::NotOwner) => {
                crate::debug!("unlock of mutex {:#x} not held by caller", mutex.id());
                Ok(())
            }
            Err(err) => {
                crate::warn!("mutex {:#x} unlock: {}", mutex.id(), kernel_error_str(err));
                Err(OsError::Platform)
            }
        }
    }
}
