//! Task dump
//!
//! Lists every task the context knows about with its run state, stack
//! headroom and, where the port can unwind, a line of return addresses
//! for offline symbol resolution.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::config::{CFG_BACKTRACE_DEPTH, CFG_TASK_NAME_MAX_LEN};
use crate::handle::TaskHandle;
use crate::kernel::Os;
use crate::port::Port;
use crate::types::{OsPrio, OsTaskState, ShortName};

/// Snapshot of one task
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub handle: TaskHandle,
    pub name: ShortName<CFG_TASK_NAME_MAX_LEN>,
    pub state: OsTaskState,
    pub priority: OsPrio,
    pub stack_size: usize,
    pub stack_min_free: usize,
    /// Created through this layer, as opposed to adopted
    pub owned: bool,
    pub backtrace: [usize; CFG_BACKTRACE_DEPTH],
    /// Valid entries in `backtrace`
    pub depth: usize,
}

impl TaskInfo {
    pub fn backtrace(&self) -> &[usize] {
        &self.backtrace[..self.depth]
    }
}

impl<P: Port> Os<P> {
    /// Run `f` on a snapshot of every live task, in table order
    pub fn for_each_task(&self, mut f: impl FnMut(&TaskInfo)) {
        // Port queries may block, so copy out of the table first
        let tasks: Vec<_> = self.tasks.with(|t| {
            t.iter()
                .map(|(raw, tcb)| {
                    (
                        TaskHandle::from_raw(raw),
                        tcb.native.clone(),
                        tcb.name,
                        tcb.prio,
                        tcb.stk_size,
                        tcb.owned,
                    )
                })
                .collect()
        });

        for (handle, native, name, priority, stack_size, owned) in tasks {
            let mut info = TaskInfo {
                handle,
                name,
                state: self.port().task_state(&native),
                priority,
                stack_size,
                stack_min_free: self.port().task_stack_min_free(&native),
                owned,
                backtrace: [0; CFG_BACKTRACE_DEPTH],
                depth: 0,
            };
            info.depth = self
                .port()
                .task_backtrace(&native, &mut info.backtrace)
                .min(CFG_BACKTRACE_DEPTH);
            f(&info);
        }
    }

    /// Log every live task
    pub fn dump_tasks(&self) {
        crate::info!("### Dumping threads ###");
        self.for_each_task(|info| {
            crate::info!(
                "{:#x} \"{}\": {}, priority {}, stack min free {} of {} bytes",
                info.handle.id(),
                info.name.as_str(),
                info.state.as_str(),
                info.priority,
                info.stack_min_free,
                info.stack_size
            );

            if info.depth > 0 {
                let mut line = String::from("backtrace:");
                for pc in info.backtrace() {
                    let _ = write!(line, " {:#010x}", pc);
                }
                crate::info!("  {}", line.as_str());
            }
        });
        crate::info!("### End of dump ###");
    }
}
