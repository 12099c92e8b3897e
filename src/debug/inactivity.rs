//! Inactivity detector
//!
//! A low-priority task that samples an application-owned activity counter
//! once per check period. Any change of value counts as activity, so the
//! counter may run in either direction and wrap. A period without change is
//! reported as a stall, once per period for as long as it lasts.
//!
//! The detector is a test aid that lives as long as the process. Once armed
//! it is never stopped, and its task stays in the resource count.

use alloc::sync::Arc;

use portable_atomic::{AtomicU32, AtomicU8, Ordering};

use crate::config::{
    CFG_INACTIVITY_CHECK_PERIOD_SEC, CFG_INACTIVITY_TASK_PRIORITY, CFG_INACTIVITY_TASK_STACK_SIZE,
};
use crate::error::{OsError, OsResult};
use crate::handle::TaskHandle;
use crate::kernel::Os;
use crate::port::Port;
use crate::types::OsPrio;

/// The counter type the application bumps to show it is alive
pub type ActivityCounter = portable_atomic::AtomicI32;

/// Detector settings
#[derive(Clone, Copy)]
pub struct InactivityConfig {
    /// Time between two samples of the activity counter
    pub check_period_ms: u32,
    /// Dump every task on each stall
    pub dump_tasks: bool,
    pub priority: OsPrio,
    pub stack_size: usize,
    /// Called from the detector task on each stall, after it is logged
    pub on_stall: Option<fn(&StallReport)>,
}

impl Default for InactivityConfig {
    fn default() -> Self {
        InactivityConfig {
            check_period_ms: CFG_INACTIVITY_CHECK_PERIOD_SEC * 1000,
            dump_tasks: cfg!(feature = "dump-threads"),
            priority: CFG_INACTIVITY_TASK_PRIORITY,
            stack_size: CFG_INACTIVITY_TASK_STACK_SIZE,
            on_stall: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DetectorState {
    Stopped = 0,
    Armed = 1,
}

/// One stall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallReport {
    /// 1 for the first stall reported by this detector
    pub sequence: u32,
    /// Value the counter is stuck at
    pub counter: i32,
    /// Time since the counter last changed, a multiple of the period
    pub stalled_ms: u64,
}

struct DetectorShared {
    state: AtomicU8,
    stalls: AtomicU32,
}

/// Handle to a running detector
pub struct InactivityDetector {
    shared: Arc<DetectorShared>,
    task: TaskHandle,
}

impl InactivityDetector {
    /// Arm a detector watching `activity`.
    ///
    /// # Returns
    /// * `Err(OsError::InvalidParameter)` - No counter given, or a zero period
    /// * Any error of [`Os::task_create`] if the detector task cannot be created
    pub fn start<P: Port>(
        os: &Arc<Os<P>>,
        activity: Option<&'static ActivityCounter>,
        config: InactivityConfig,
    ) -> OsResult<Self> {
        let counter = activity.ok_or(OsError::InvalidParameter)?;
        if config.check_period_ms == 0 {
            return Err(OsError::InvalidParameter);
        }

        let shared = Arc::new(DetectorShared {
            state: AtomicU8::new(DetectorState::Stopped as u8),
            stalls: AtomicU32::new(0),
        });

        let task_os = os.clone();
        let task_shared = shared.clone();
        let task = os.task_create(
            move || watch(&task_os, counter, &task_shared, config),
            "inactivity",
            config.stack_size,
            config.priority,
        )?;

        shared.state.store(DetectorState::Armed as u8, Ordering::Release);
        crate::info!(
            "inactivity detector armed, check period {} ms",
            config.check_period_ms
        );
        Ok(InactivityDetector { shared, task })
    }

    pub fn state(&self) -> DetectorState {
        match self.shared.state.load(Ordering::Acquire) {
            0 => DetectorState::Stopped,
            _ => DetectorState::Armed,
        }
    }

    /// Stalls reported so far
    pub fn stall_count(&self) -> u32 {
        self.shared.stalls.load(Ordering::Acquire)
    }

    /// The detector task
    pub fn task(&self) -> TaskHandle {
        self.task
    }
}

fn watch<P: Port>(os: &Os<P>, counter: &ActivityCounter, shared: &DetectorShared, config: InactivityConfig) {
    let mut previous = counter.load(Ordering::Relaxed);
    let mut stalled_ms: u64 = 0;

    loop {
        os.task_block(config.check_period_ms);

        let current = counter.load(Ordering::Relaxed);
        if current != previous {
            previous = current;
            stalled_ms = 0;
            continue;
        }

        stalled_ms += config.check_period_ms as u64;
        let report = StallReport {
            sequence: shared.stalls.fetch_add(1, Ordering::AcqRel) + 1,
            counter: current,
            stalled_ms,
        };
        crate::error!(
            "inactivity detected: counter stuck at {} for {} ms (stall #{})",
            report.counter,
            report.stalled_ms,
            report.sequence
        );

        if let Some(on_stall) = config.on_stall {
            on_stall(&report);
        }
        if config.dump_tasks {
            os.dump_tasks();
        }
        #[cfg(feature = "mutex-debug")]
        os.mutexes().check_contention();
    }
}
