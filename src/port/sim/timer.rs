//! Simulated timer service
//!
//! A service thread keeps the deadlines. Expired callbacks are sent to an
//! event thread and run there with no service lock held, so a callback may
//! start, stop, change or delete timers, itself included.

use std::collections::BTreeMap;
use std::format;
use std::string::String;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use std::vec::Vec;

use super::{lock, ticks_to_duration};
use crate::port::{KernelError, TimerCallback};
use crate::types::OsTick;

type SharedCallback = Arc<Mutex<TimerCallback>>;

struct TimerEntry {
    period: Duration,
    periodic: bool,
    deadline: Option<Instant>,
    callback: SharedCallback,
}

struct TimerTable {
    entries: BTreeMap<u32, TimerEntry>,
    next_id: u32,
    shutdown: bool,
}

struct ServiceShared {
    table: Mutex<TimerTable>,
    changed: Condvar,
}

/// Timer object handed to the layer above
#[derive(Clone)]
pub struct SimTimer {
    id: u32,
    name: Arc<str>,
}

impl SimTimer {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(super) struct TimerService {
    shared: Arc<ServiceShared>,
}

impl TimerService {
    pub(super) fn spawn(kernel_id: u32) -> Self {
        let shared = Arc::new(ServiceShared {
            table: Mutex::new(TimerTable {
                entries: BTreeMap::new(),
                next_id: 1,
                shutdown: false,
            }),
            changed: Condvar::new(),
        });

        let (events, fired) = mpsc::channel::<SharedCallback>();

        let spawned = thread::Builder::new()
            .name(format!("osal-tmr-evt-{}", kernel_id))
            .spawn(move || {
                for callback in fired {
                    let mut callback = lock(&callback);
                    (&mut **callback)();
                }
            });
        if spawned.is_err() {
            crate::error!("sim: timer event thread could not be started");
        }

        let service = shared.clone();
        let spawned = thread::Builder::new()
            .name(format!("osal-tmr-svc-{}", kernel_id))
            .spawn(move || run_service(&service, events));
        if spawned.is_err() {
            crate::error!("sim: timer service thread could not be started");
        }

        TimerService { shared }
    }

    pub(super) fn shutdown(&self) {
        lock(&self.shared.table).shutdown = true;
        self.shared.changed.notify_all();
    }

    fn update<R>(&self, timer: &SimTimer, f: impl FnOnce(&mut TimerEntry) -> R) -> Result<R, KernelError> {
        let mut table = lock(&self.shared.table);
        let entry = table.entries.get_mut(&timer.id).ok_or(KernelError::Rejected)?;
        let result = f(entry);
        drop(table);
        self.shared.changed.notify_all();
        Ok(result)
    }

    pub(super) fn create(
        &self,
        name: &str,
        period: OsTick,
        periodic: bool,
        callback: TimerCallback,
    ) -> Result<SimTimer, KernelError> {
        if period == 0 {
            return Err(KernelError::Rejected);
        }
        let mut table = lock(&self.shared.table);
        let id = table.next_id;
        table.next_id = table.next_id.wrapping_add(1).max(1);
        table.entries.insert(
            id,
            TimerEntry {
                period: ticks_to_duration(period),
                periodic,
                deadline: None,
                callback: Arc::new(Mutex::new(callback)),
            },
        );
        Ok(SimTimer {
            id,
            name: Arc::from(String::from(name)),
        })
    }

    pub(super) fn delete(&self, timer: &SimTimer) -> Result<(), KernelError> {
        let removed = lock(&self.shared.table).entries.remove(&timer.id);
        self.shared.changed.notify_all();
        removed.map(|_| ()).ok_or(KernelError::Rejected)
    }

    pub(super) fn start(&self, timer: &SimTimer) -> Result<(), KernelError> {
        self.update(timer, |entry| entry.deadline = Some(Instant::now() + entry.period))
    }

    pub(super) fn stop(&self, timer: &SimTimer) -> Result<(), KernelError> {
        self.update(timer, |entry| entry.deadline = None)
    }

    pub(super) fn change_period(&self, timer: &SimTimer, period: OsTick) -> Result<(), KernelError> {
        if period == 0 {
            return Err(KernelError::Rejected);
        }
        self.update(timer, |entry| {
            entry.period = ticks_to_duration(period);
            entry.deadline = Some(Instant::now() + entry.period);
        })
    }
}

fn run_service(shared: &ServiceShared, events: Sender<SharedCallback>) {
    let mut table = lock(&shared.table);
    loop {
        if table.shutdown {
            return;
        }

        let now = Instant::now();
        let mut due: Vec<SharedCallback> = Vec::new();
        for entry in table.entries.values_mut() {
            match entry.deadline {
                Some(deadline) if deadline <= now => {
                    due.push(entry.callback.clone());
                    entry.deadline = if entry.periodic {
                        // Skip periods missed while the host was busy
                        let next = deadline + entry.period;
                        Some(if next <= now { now + entry.period } else { next })
                    } else {
                        None
                    };
                }
                _ => {}
            }
        }
        for callback in due {
            if events.send(callback).is_err() {
                return;
            }
        }

        let next = table.entries.values().filter_map(|entry| entry.deadline).min();
        table = match next {
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                shared
                    .changed
                    .wait_timeout(table, timeout)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared
                .changed
                .wait(table)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}
