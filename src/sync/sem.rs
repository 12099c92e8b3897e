//! Semaphore implementation
//!
//! Counting semaphores for task synchronization and resource counting.

use crate::error::{OsError, OsResult};
use crate::handle::SemaphoreHandle;
use crate::kernel::Os;
use crate::port::Port;
use crate::types::{OsObjType, OsSemCtr, OS_WAIT_FOREVER};

/// Semaphore bookkeeping entry
pub(crate) struct OsSem<S> {
    pub native: S,
    pub limit: OsSemCtr,
}

impl<P: Port> Os<P> {
    /// Create a counting semaphore
    ///
    /// # Arguments
    /// * `initial_count` - Initial count, at most `limit`
    /// * `limit` - Highest count, at least 1
    pub fn semaphore_create(&self, initial_count: OsSemCtr, limit: OsSemCtr) -> OsResult<SemaphoreHandle> {
        if limit == 0 || initial_count > limit {
            return Err(OsError::InvalidParameter);
        }

        let raw = self.create_in(&self.semaphores, OsObjType::Sem, |_| {
            self.port()
                .semaphore_create(limit, initial_count)
                .map(|native| OsSem { native, limit })
        })?;

        crate::trace!(
            "create semaphore {:#x} initial {} limit {}",
            raw.id(),
            initial_count,
            limit
        );
        Ok(SemaphoreHandle::from_raw(raw))
    }

    /// Delete a semaphore. Nothing may be blocked on it.
    pub fn semaphore_delete(&self, semaphore: SemaphoreHandle) -> OsResult<()> {
        self.destroy_in(&self.semaphores, semaphore.raw(), OsObjType::Sem, |s| {
            self.port().semaphore_delete(s.native)
        })
    }

    pub(crate) fn semaphore_native(&self, semaphore: SemaphoreHandle) -> OsResult<P::Semaphore> {
        Self::lookup(&self.semaphores, semaphore.raw(), |s| s.native.clone())
    }

    /// Take a semaphore, waiting as long as it takes
    pub fn semaphore_take(&self, semaphore: SemaphoreHandle) -> OsResult<()> {
        self.suspendable()?;
        let native = self.semaphore_native(semaphore)?;
        self.port()
            .semaphore_take(&native, OS_WAIT_FOREVER)
            .map_err(|_| OsError::Platform)
    }

    /// Take a semaphore, waiting at most `wait_ms`
    ///
    /// # Returns
    /// * `Err(OsError::Timeout)` - The count stayed at zero for the whole wait
    pub fn semaphore_try_take(&self, semaphore: SemaphoreHandle, wait_ms: u32) -> OsResult<()> {
        self.suspendable()?;
        let native = self.semaphore_native(semaphore)?;
        self.port()
            .semaphore_take(&native, self.ticks(wait_ms))
            .map_err(|_| OsError::Timeout)
    }

    /// Give a semaphore.
    ///
    /// Giving one that is already at its limit leaves the count unchanged
    /// and still succeeds. From interrupt context the same case is an error,
    /// see [`Isr::semaphore_give`](crate::isr::Isr::semaphore_give).
    pub fn semaphore_give(&self, semaphore: SemaphoreHandle) -> OsResult<()> {
        let native = self.semaphore_native(semaphore)?;
        if self.port().semaphore_give(&native).is_err() {
            crate::debug!("semaphore {:#x} already at its limit", semaphore.id());
        }
        Ok(())
    }

    /// Limit a semaphore was created with
    pub fn semaphore_limit(&self, semaphore: SemaphoreHandle) -> OsResult<OsSemCtr> {
        Self::lookup(&self.semaphores, semaphore.raw(), |s| s.limit)
    }
}
