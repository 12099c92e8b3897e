//! Task Control Block (TCB) definition
//!
//! What the OS layer remembers about a task next to the kernel's own object.

use crate::config::CFG_TASK_NAME_MAX_LEN;
use crate::types::{OsPrio, ShortName};

/// Task Control Block
pub(crate) struct OsTcb<T> {
    /// Kernel task object
    pub native: T,
    /// Task name for debugging
    pub name: ShortName<CFG_TASK_NAME_MAX_LEN>,
    /// Priority at creation
    pub prio: OsPrio,
    /// Requested stack size in bytes
    pub stk_size: usize,
    /// Created through this layer and therefore counted as a resource.
    /// Tasks that merely asked for their own handle are adopted, not owned.
    pub owned: bool,
}

impl<T> OsTcb<T> {
    pub(crate) fn new(native: T, name: &str, prio: OsPrio, stk_size: usize, owned: bool) -> Self {
        OsTcb {
            native,
            name: ShortName::new(name),
            prio,
            stk_size,
            owned,
        }
    }
}
