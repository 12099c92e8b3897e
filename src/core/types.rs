//! Core type definitions for the OS abstraction layer

/// Task priority, larger is more urgent, valid range is
/// [`CFG_PRIO_MIN`](crate::config::CFG_PRIO_MIN)..=[`CFG_PRIO_MAX`](crate::config::CFG_PRIO_MAX)
pub type OsPrio = i32;

/// Kernel tick counter type
pub type OsTick = u32;

/// Semaphore counter type
pub type OsSemCtr = u32;

/// Tick value meaning "wait until satisfied"
pub const OS_WAIT_FOREVER: OsTick = OsTick::MAX;

/// Tick value meaning "do not wait at all"
pub const OS_NO_WAIT: OsTick = 0;

/// Run state of a task as reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsTaskState {
    /// Task is executing
    Running = 0,
    /// Task is ready to run
    Ready = 1,
    /// Task is delayed or pending on a kernel object
    Blocked = 2,
    /// Task is suspended
    Suspended = 3,
    /// Task has deleted itself or returned from its entry function
    Deleted = 4,
}

impl OsTaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            OsTaskState::Running => "running",
            OsTaskState::Ready => "ready",
            OsTaskState::Blocked => "pending",
            OsTaskState::Suspended => "suspended",
            OsTaskState::Deleted => "deleted",
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => OsTaskState::Running,
            1 => OsTaskState::Ready,
            2 => OsTaskState::Blocked,
            3 => OsTaskState::Suspended,
            _ => OsTaskState::Deleted,
        }
    }
}

/// Kernel object type marker, carried by every handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OsObjType {
    Mutex = 0x4D555458,   // 'MUTX'
    Queue = 0x51554555,   // 'QUEU'
    Sem = 0x53454D41,     // 'SEMA'
    Task = 0x5441534B,    // 'TASK'
    Timer = 0x544D5220,   // 'TMR '
}

impl OsObjType {
    pub fn as_str(self) -> &'static str {
        match self {
            OsObjType::Mutex => "mutex",
            OsObjType::Queue => "queue",
            OsObjType::Sem => "semaphore",
            OsObjType::Task => "task",
            OsObjType::Timer => "timer",
        }
    }
}

/// Fixed-capacity copy of an object name, truncated on a char boundary
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ShortName<const N: usize> {
    buf: [u8; N],
    len: u8,
}

impl<const N: usize> ShortName<N> {
    pub fn new(name: &str) -> Self {
        let mut len = name.len().min(N).min(u8::MAX as usize);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        let mut buf = [0u8; N];
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        ShortName { buf, len: len as u8 }
    }

    pub fn as_str(&self) -> &str {
        // Only ever filled from a &str cut on a char boundary
        ::core::str::from_utf8(&self.buf[..self.len as usize]).unwrap_or("")
    }
}

impl<const N: usize> ::core::fmt::Debug for ShortName<N> {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        ::core::fmt::Debug::fmt(self.as_str(), f)
    }
}
