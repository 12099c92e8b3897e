//! Message queue implementation
//!
//! Bounded FIFOs of fixed-size records. Length and record size are handed
//! to the kernel unmodified and never change for the life of the queue.

use crate::error::{OsError, OsResult};
use crate::handle::QueueHandle;
use crate::kernel::Os;
use crate::port::Port;
use crate::types::{OsObjType, OS_WAIT_FOREVER};

#[cfg(feature = "queue-debug")]
use crate::config::CFG_YIELD_MS;
#[cfg(feature = "queue-debug")]
use crate::types::OS_NO_WAIT;

/// Queue bookkeeping entry
pub(crate) struct OsQueue<Q> {
    pub native: Q,
    pub length: usize,
    pub item_size: usize,
}

impl<P: Port> Os<P> {
    /// Create a queue of `length` records of `item_size` bytes each
    pub fn queue_create(&self, length: usize, item_size: usize) -> OsResult<QueueHandle> {
        let raw = self.create_in(&self.queues, OsObjType::Queue, |_| {
            self.port()
                .queue_create(length, item_size)
                .map(|native| OsQueue {
                    native,
                    length,
                    item_size,
                })
        })?;

        crate::trace!(
            "create queue {:#x} length {} item size {}",
            raw.id(),
            length,
            item_size
        );
        Ok(QueueHandle::from_raw(raw))
    }

    /// Delete a queue. Nothing may be blocked on it.
    pub fn queue_delete(&self, queue: QueueHandle) -> OsResult<()> {
        self.destroy_in(&self.queues, queue.raw(), OsObjType::Queue, |q| {
            self.port().queue_delete(q.native)
        })
    }

    /// Kernel queue behind `queue`, checking `len` against the record size
    pub(crate) fn queue_native(&self, queue: QueueHandle, len: usize) -> OsResult<P::Queue> {
        let (native, item_size) = Self::lookup(&self.queues, queue.raw(), |q| {
            (q.native.clone(), q.item_size)
        })?;
        if len != item_size {
            return Err(OsError::InvalidParameter);
        }
        Ok(native)
    }

    /// Send to a queue, waiting for space as long as it takes
    #[cfg(not(feature = "queue-debug"))]
    pub fn queue_send(&self, queue: QueueHandle, item: &[u8]) -> OsResult<()> {
        self.suspendable()?;
        let native = self.queue_native(queue, item.len())?;
        self.port()
            .queue_send(&native, item, OS_WAIT_FOREVER)
            .map_err(|_| OsError::Platform)
    }

    /// Send to a queue, polling for space.
    ///
    /// Diagnostic variant: while the queue stays full a notice is logged
    /// about once a second, at the price of up to `CFG_YIELD_MS` extra
    /// latency once space appears.
    #[cfg(feature = "queue-debug")]
    pub fn queue_send(&self, queue: QueueHandle, item: &[u8]) -> OsResult<()> {
        self.suspendable()?;
        let native = self.queue_native(queue, item.len())?;
        let notice_every = (1000 / CFG_YIELD_MS.max(1)) as usize;
        let mut attempts: usize = 0;
        while self.port().queue_send(&native, item, OS_NO_WAIT).is_err() {
            if attempts % notice_every == 0 {
                crate::warn!("queue {:#x} is full, retrying...", queue.id());
            }
            attempts = attempts.wrapping_add(1);
            self.task_block(CFG_YIELD_MS);
        }
        Ok(())
    }

    /// Receive from a queue, waiting for a record as long as it takes
    pub fn queue_receive(&self, queue: QueueHandle, out: &mut [u8]) -> OsResult<()> {
        self.suspendable()?;
        let native = self.queue_native(queue, out.len())?;
        self.port()
            .queue_receive(&native, out, OS_WAIT_FOREVER)
            .map_err(|_| OsError::Platform)
    }

    /// Receive from a queue, waiting at most `wait_ms`.
    ///
    /// # Returns
    /// * `Err(OsError::Timeout)` - Nothing arrived in time; the queue is untouched
    pub fn queue_try_receive(&self, queue: QueueHandle, wait_ms: u32, out: &mut [u8]) -> OsResult<()> {
        self.suspendable()?;
        let native = self.queue_native(queue, out.len())?;
        self.port()
            .queue_receive(&native, out, self.ticks(wait_ms))
            .map_err(|_| OsError::Timeout)
    }

    /// Copy the head record without removing it, waiting for one as long as
    /// it takes. A kernel that still comes back empty is reported as
    /// `OsError::Timeout` so a peek can be retried like a receive.
    pub fn queue_peek(&self, queue: QueueHandle, out: &mut [u8]) -> OsResult<()> {
        self.suspendable()?;
        let native = self.queue_native(queue, out.len())?;
        self.port()
            .queue_peek(&native, out, OS_WAIT_FOREVER)
            .map_err(|_| OsError::Timeout)
    }

    /// Number of free slots in a queue
    pub fn queue_get_free(&self, queue: QueueHandle) -> OsResult<usize> {
        let native = Self::lookup(&self.queues, queue.raw(), |q| q.native.clone())?;
        Ok(self.port().queue_spaces(&native))
    }

    /// Length and record size a queue was created with
    pub fn queue_info(&self, queue: QueueHandle) -> OsResult<(usize, usize)> {
        Self::lookup(&self.queues, queue.raw(), |q| (q.length, q.item_size))
    }
}
