//! Task management module
//!
//! Provides task creation, deletion, identity and stack queries.

mod tcb;

pub(crate) use tcb::OsTcb;

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::config::{CFG_PRIO_MAX, CFG_PRIO_MIN, CFG_STK_SIZE_MIN};
use crate::core::handle::RawHandle;
use crate::error::{OsError, OsResult};
use crate::handle::TaskHandle;
use crate::kernel::Os;
use crate::port::Port;
use crate::types::{OsObjType, OsPrio, OsTaskState};

impl<P: Port> Os<P> {
    /// Create a task and start it.
    ///
    /// # Arguments
    /// * `entry` - Task body; the opaque task parameter is whatever it captures
    /// * `name` - Task name for debugging, truncated if too long
    /// * `stack_size` - Stack size in bytes, at least [`CFG_STK_SIZE_MIN`]
    /// * `priority` - Between [`CFG_PRIO_MIN`] and [`CFG_PRIO_MAX`]
    ///
    /// # Returns
    /// * `Ok(handle)` - Task created
    /// * `Err(OsError::InvalidParameter)` - Priority or stack size out of range
    /// * `Err(OsError::Platform)` - The kernel could not create the task
    ///
    /// # Example
    /// ```ignore
    /// let os = Arc::new(Os::new(SimKernel::new()));
    /// let worker = os.clone();
    /// os.task_create(move || {
    ///     worker.task_block(10);
    ///     let _ = worker.task_delete(None);
    /// }, "worker", 4096, 5)?;
    /// ```
    pub fn task_create<F>(
        &self,
        entry: F,
        name: &str,
        stack_size: usize,
        priority: OsPrio,
    ) -> OsResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        if !(CFG_PRIO_MIN..=CFG_PRIO_MAX).contains(&priority) {
            return Err(OsError::InvalidParameter);
        }

        if stack_size < CFG_STK_SIZE_MIN {
            return Err(OsError::InvalidParameter);
        }

        self.reclaim_adopted();
        let raw = self.create_in(&self.tasks, OsObjType::Task, |raw| {
            self.port()
                .task_spawn(Box::new(entry), name, stack_size, priority, raw.id())
                .map(|native| OsTcb::new(native, name, priority, stack_size, true))
        })?;

        // Published, so the task may now look itself up
        let native = Self::lookup(&self.tasks, raw, |tcb| tcb.native.clone())?;
        self.port().task_start(&native);

        crate::trace!(
            "create task {:#x} \"{}\" stack {} priority {}",
            raw.id(),
            name,
            stack_size,
            priority
        );
        Ok(TaskHandle::from_raw(raw))
    }

    /// Delete a task.
    ///
    /// The supported kernels only let a task delete itself, so `task` must
    /// be `None`, meaning the calling task. On the host port the calling
    /// thread carries on until its entry function returns, which it should
    /// do straight away.
    pub fn task_delete(&self, task: Option<TaskHandle>) -> OsResult<()> {
        if task.is_some() {
            return Err(OsError::InvalidParameter);
        }
        self.suspendable()?;

        let tag = self.port().task_current_tag();
        if tag == 0 {
            // Never created or adopted through this layer
            return Err(OsError::InvalidParameter);
        }
        let me = TaskHandle::from_id(tag);

        let owned = Self::lookup(&self.tasks, me.raw(), |tcb| tcb.owned)?;
        if !owned {
            return Err(OsError::InvalidParameter);
        }

        self.destroy_in(&self.tasks, me.raw(), OsObjType::Task, |_| {})?;
        self.port().task_delete_self();
        Ok(())
    }

    /// Check if `task` is the calling task
    pub fn task_is_this(&self, task: TaskHandle) -> bool {
        self.port().task_current_tag() == task.id()
    }

    /// Get the calling task's handle.
    ///
    /// A task the layer did not create (e.g. the one running `main`) is
    /// adopted on first call: it gets a handle but does not count as a
    /// resource and cannot be deleted through this layer.
    pub fn task_get_handle(&self) -> OsResult<TaskHandle> {
        let tag = self.port().task_current_tag();
        if tag != 0 {
            return Ok(TaskHandle::from_id(tag));
        }

        let native = self.port().task_current();
        self.reclaim_adopted();
        let raw = match self.tasks.with(|t| t.reserve()) {
            Some(raw) => raw,
            None => {
                crate::warn!("no free task slot to adopt the calling task");
                return Err(OsError::Platform);
            }
        };
        self.port().task_set_tag(&native, raw.id());
        let tcb = OsTcb::new(native, "", 0, 0, false);
        self.tasks.with(|t| t.fill(raw, tcb));
        Ok(TaskHandle::from_raw(raw))
    }

    /// Get the minimum free stack a task has had, in bytes.
    ///
    /// `None` means the calling task.
    pub fn task_stack_min_free(&self, task: Option<TaskHandle>) -> OsResult<usize> {
        let native = match task {
            Some(handle) => Self::lookup(&self.tasks, handle.raw(), |tcb| tcb.native.clone())?,
            None => self.port().task_current(),
        };
        Ok(self.port().task_stack_min_free(&native))
    }

    /// Free the slots of adopted tasks the kernel reports as gone.
    ///
    /// Adopted tasks are not resources, so the counter does not move.
    fn reclaim_adopted(&self) {
        let adopted: Vec<(RawHandle, P::Task)> = self.tasks.with(|t| {
            t.iter()
                .filter(|(_, tcb)| !tcb.owned)
                .map(|(raw, tcb)| (raw, tcb.native.clone()))
                .collect()
        });
        for (raw, native) in adopted {
            if self.port().task_state(&native) == OsTaskState::Deleted
                && self.tasks.with(|t| t.remove(raw)).is_some()
            {
                crate::trace!("reclaim adopted task {:#x}", raw.id());
            }
        }
    }

    /// Number of tasks this context knows about, adopted ones included
    pub fn task_count(&self) -> usize {
        self.tasks.with(|t| t.len())
    }
}
