//! Primitive lifecycle tests on the host simulation kernel

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use osal::port::sim::{SimFault, SimKernel};
use osal::Os;

fn os() -> Arc<Os<SimKernel>> {
    Arc::new(Os::new(SimKernel::new()))
}

/// Poll `cond` until it holds or `limit` runs out
fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[cfg(test)]
mod resource_tests {
    use super::*;
    use osal::config::CFG_MAX_QUEUES;
    use osal::{MutexApi, OsError};

    #[test]
    fn test_counter_tracks_create_and_delete() {
        let os = os();
        assert_eq!(os.resource_count(), 0);

        let q = os.queue_create(4, 4).unwrap();
        let m = os.mutexes().mutex_create().unwrap();
        let s = os.semaphore_create(0, 1).unwrap();
        let t = os.timer_create("t", |_| {}, 100, false).unwrap();
        assert_eq!(os.resource_count(), 4);

        os.queue_delete(q).unwrap();
        os.mutexes().mutex_delete(m).unwrap();
        assert_eq!(os.resource_count(), 2);

        os.semaphore_delete(s).unwrap();
        os.timer_delete(t).unwrap();
        assert_eq!(os.resource_count(), 0);
    }

    #[test]
    fn test_double_delete_is_rejected() {
        let os = os();
        let q = os.queue_create(1, 8).unwrap();
        os.queue_delete(q).unwrap();
        assert_eq!(os.queue_delete(q), Err(OsError::InvalidParameter));
        assert_eq!(os.resource_count(), 0);

        let s = os.semaphore_create(1, 1).unwrap();
        os.semaphore_delete(s).unwrap();
        assert_eq!(os.semaphore_delete(s), Err(OsError::InvalidParameter));
        assert_eq!(os.resource_count(), 0);
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let os = os();
        let q = os.queue_create(2, 4).unwrap();
        os.queue_delete(q).unwrap();

        assert_eq!(os.queue_send(q, &[0; 4]), Err(OsError::InvalidParameter));
        assert_eq!(os.queue_get_free(q), Err(OsError::InvalidParameter));

        // The slot is reused under a new identity
        let q2 = os.queue_create(2, 4).unwrap();
        assert_ne!(q.id(), q2.id());
        assert_eq!(os.queue_get_free(q), Err(OsError::InvalidParameter));
        assert_eq!(os.queue_get_free(q2), Ok(2));
    }

    #[test]
    fn test_handle_ids_unique_and_nonzero() {
        let os = os();
        let a = os.queue_create(1, 1).unwrap();
        let b = os.queue_create(1, 1).unwrap();
        assert_ne!(a.id(), 0);
        assert_ne!(b.id(), 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_injected_failure_leaves_counter_untouched() {
        let os = os();
        os.port().inject(SimFault::FailAllocations { count: 1 });

        assert_eq!(os.queue_create(4, 4), Err(OsError::Platform));
        assert_eq!(os.resource_count(), 0);

        // Only one failure was injected
        let q = os.queue_create(4, 4).unwrap();
        assert_eq!(os.resource_count(), 1);
        os.queue_delete(q).unwrap();
    }

    #[test]
    fn test_kernel_refusal_is_platform() {
        let os = os();
        assert_eq!(os.queue_create(0, 4), Err(OsError::Platform));
        assert_eq!(os.resource_count(), 0);
    }

    #[test]
    fn test_table_full_is_platform() {
        let os = os();
        let queues: Vec<_> = (0..CFG_MAX_QUEUES)
            .map(|_| os.queue_create(1, 1).unwrap())
            .collect();
        assert_eq!(os.queue_create(1, 1), Err(OsError::Platform));
        assert_eq!(os.resource_count(), CFG_MAX_QUEUES as i32);

        for q in queues {
            os.queue_delete(q).unwrap();
        }
        assert_eq!(os.resource_count(), 0);
    }

    #[test]
    fn test_stale_handle_outlives_generation_exhaustion() {
        let os = os();
        let stale = os.semaphore_create(0, 1).unwrap();
        os.semaphore_delete(stale).unwrap();

        // Enough churn to use up every generation of the first slot
        for _ in 0..u16::MAX {
            let s = os.semaphore_create(0, 1).unwrap();
            assert_ne!(s.id(), stale.id());
            os.semaphore_delete(s).unwrap();
        }

        let fresh = os.semaphore_create(0, 1).unwrap();
        assert_ne!(fresh.id(), stale.id());
        assert_eq!(os.semaphore_limit(stale), Err(OsError::InvalidParameter));
        assert_eq!(os.semaphore_delete(stale), Err(OsError::InvalidParameter));
        assert_eq!(os.resource_count(), 1);
        assert_eq!(os.semaphore_limit(fresh), Ok(1));
        os.semaphore_delete(fresh).unwrap();
        assert_eq!(os.resource_count(), 0);
    }

    #[test]
    fn test_counter_under_concurrent_churn() {
        const WORKERS: u32 = 8;
        const ROUNDS: u32 = 2000;

        let os = os();
        let done = os.semaphore_create(0, WORKERS).unwrap();

        for n in 0..WORKERS {
            let worker = os.clone();
            os.task_create(
                move || {
                    for round in 0..ROUNDS {
                        if (n + round) % 2 == 0 {
                            let s = worker.semaphore_create(0, 1).unwrap();
                            worker.semaphore_delete(s).unwrap();
                        } else {
                            let q = worker.queue_create(1, 4).unwrap();
                            worker.queue_delete(q).unwrap();
                        }
                    }
                    worker.semaphore_give(done).unwrap();
                    worker.task_delete(None).unwrap();
                },
                "churn",
                8192,
                5,
            )
            .unwrap();
        }

        for _ in 0..WORKERS {
            os.semaphore_try_take(done, 10_000).unwrap();
        }
        assert!(wait_until(Duration::from_secs(2), || os.task_count() == 0));
        assert_eq!(os.resource_count(), 1);
        os.semaphore_delete(done).unwrap();
        assert_eq!(os.resource_count(), 0);
    }

    #[test]
    fn test_contexts_are_isolated() {
        let a = os();
        let b = os();
        let _q = a.queue_create(1, 1).unwrap();
        assert_eq!(a.resource_count(), 1);
        assert_eq!(b.resource_count(), 0);
    }
}

#[cfg(test)]
mod semaphore_tests {
    use super::*;
    use osal::OsError;

    #[test]
    fn test_create_validates_counts() {
        let os = os();
        assert_eq!(os.semaphore_create(0, 0), Err(OsError::InvalidParameter));
        assert_eq!(os.semaphore_create(3, 2), Err(OsError::InvalidParameter));
        assert_eq!(os.resource_count(), 0);
    }

    #[test]
    fn test_take_exactly_initial_count() {
        let os = os();
        let s = os.semaphore_create(3, 5).unwrap();
        for _ in 0..3 {
            os.semaphore_try_take(s, 0).unwrap();
        }
        assert_eq!(os.semaphore_try_take(s, 20), Err(OsError::Timeout));
        assert_eq!(os.semaphore_limit(s), Ok(5));
    }

    #[test]
    fn test_give_at_limit_is_noop() {
        let os = os();
        let s = os.semaphore_create(1, 1).unwrap();
        assert_eq!(os.semaphore_give(s), Ok(()));

        os.semaphore_take(s).unwrap();
        assert_eq!(os.semaphore_try_take(s, 0), Err(OsError::Timeout));
    }

    #[test]
    fn test_give_wakes_taker() {
        let os = os();
        let s = os.semaphore_create(0, 1).unwrap();
        let done = os.semaphore_create(0, 1).unwrap();

        let worker = os.clone();
        os.task_create(
            move || {
                worker.semaphore_take(s).unwrap();
                worker.semaphore_give(done).unwrap();
            },
            "taker",
            4096,
            5,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        os.semaphore_give(s).unwrap();
        os.semaphore_try_take(done, 1000).unwrap();
    }
}

#[cfg(test)]
mod queue_tests {
    use super::*;
    use osal::OsError;

    #[test]
    fn test_fifo_and_capacity() {
        let os = os();
        let q = os.queue_create(4, 4).unwrap();
        assert_eq!(os.queue_info(q), Ok((4, 4)));

        for v in 0u32..4 {
            os.queue_send(q, &v.to_le_bytes()).unwrap();
        }
        assert_eq!(os.queue_get_free(q), Ok(0));

        // A fifth record does not fit without waiting
        let full = os.interrupt(|isr| isr.queue_send(q, &9u32.to_le_bytes()));
        assert_eq!(full, Err(OsError::Platform));

        let mut out = [0u8; 4];
        for v in 0u32..4 {
            os.queue_receive(q, &mut out).unwrap();
            assert_eq!(u32::from_le_bytes(out), v);
        }
        assert_eq!(os.queue_get_free(q), Ok(4));
    }

    #[test]
    fn test_wrong_record_size() {
        let os = os();
        let q = os.queue_create(2, 8).unwrap();
        assert_eq!(os.queue_send(q, &[0; 4]), Err(OsError::InvalidParameter));
        let mut out = [0u8; 16];
        assert_eq!(os.queue_try_receive(q, 0, &mut out), Err(OsError::InvalidParameter));
    }

    #[test]
    fn test_try_receive_times_out() {
        let os = os();
        let q = os.queue_create(1, 4).unwrap();
        let mut out = [0u8; 4];

        let start = Instant::now();
        assert_eq!(os.queue_try_receive(q, 50, &mut out), Err(OsError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(os.queue_get_free(q), Ok(1));
    }

    #[test]
    fn test_peek_keeps_record() {
        let os = os();
        let q = os.queue_create(2, 2).unwrap();
        os.queue_send(q, &[1, 2]).unwrap();

        let mut out = [0u8; 2];
        os.queue_peek(q, &mut out).unwrap();
        assert_eq!(out, [1, 2]);
        assert_eq!(os.queue_get_free(q), Ok(1));

        out = [0; 2];
        os.queue_receive(q, &mut out).unwrap();
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn test_blocked_send_resumes_when_drained() {
        let os = os();
        let q = os.queue_create(1, 4).unwrap();
        os.queue_send(q, &1u32.to_le_bytes()).unwrap();

        let sender = os.clone();
        os.task_create(
            move || {
                // Blocks until the first record is taken
                sender.queue_send(q, &2u32.to_le_bytes()).unwrap();
            },
            "sender",
            4096,
            5,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(os.queue_get_free(q), Ok(0));

        let mut out = [0u8; 4];
        os.queue_receive(q, &mut out).unwrap();
        assert_eq!(u32::from_le_bytes(out), 1);
        os.queue_try_receive(q, 1000, &mut out).unwrap();
        assert_eq!(u32::from_le_bytes(out), 2);
    }
}

#[cfg(test)]
mod isr_tests {
    use super::*;
    use osal::OsError;

    #[test]
    fn test_send_from_isr_requests_yield_for_waiter() {
        let os = os();
        let q = os.queue_create(1, 4).unwrap();
        let done = os.semaphore_create(0, 1).unwrap();

        let receiver = os.clone();
        os.task_create(
            move || {
                let mut out = [0u8; 4];
                receiver.queue_receive(q, &mut out).unwrap();
                assert_eq!(u32::from_le_bytes(out), 7);
                receiver.semaphore_give(done).unwrap();
            },
            "receiver",
            4096,
            5,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        let yielded = os.interrupt(|isr| {
            isr.queue_send(q, &7u32.to_le_bytes()).unwrap();
            isr.yield_requested()
        });
        assert!(yielded);
        os.semaphore_try_take(done, 1000).unwrap();
    }

    #[test]
    fn test_no_yield_without_waiter() {
        let os = os();
        let q = os.queue_create(2, 1).unwrap();
        let yielded = os.interrupt(|isr| {
            isr.queue_send(q, &[1]).unwrap();
            isr.yield_requested()
        });
        assert!(!yielded);

        let mut out = [0u8; 1];
        os.interrupt(|isr| isr.queue_receive(q, &mut out)).unwrap();
        assert_eq!(out, [1]);
        assert_eq!(
            os.interrupt(|isr| isr.queue_receive(q, &mut out)),
            Err(OsError::Platform)
        );
    }

    #[test]
    fn test_semaphore_give_from_isr_at_limit() {
        let os = os();
        let s = os.semaphore_create(0, 1).unwrap();
        assert_eq!(os.interrupt(|isr| isr.semaphore_give(s)), Ok(()));
        assert_eq!(os.interrupt(|isr| isr.semaphore_give(s)), Err(OsError::Platform));
    }

    #[test]
    fn test_suspending_calls_rejected_in_isr() {
        let os = os();
        let q = os.queue_create(1, 1).unwrap();
        let s = os.semaphore_create(0, 1).unwrap();
        let mut out = [0u8; 1];

        os.interrupt(|_| {
            assert_eq!(os.queue_receive(q, &mut out), Err(OsError::InvalidParameter));
            assert_eq!(os.semaphore_take(s), Err(OsError::InvalidParameter));
            assert_eq!(os.task_delete(None), Err(OsError::InvalidParameter));
        });

        // task_block is ignored rather than failing
        let start = Instant::now();
        os.interrupt(|_| os.task_block(1000));
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}

#[cfg(test)]
mod task_tests {
    use super::*;
    use osal::config::{CFG_MAX_TASKS, CFG_PRIO_MAX, CFG_PRIO_MIN, CFG_STK_SIZE_MIN};
    use osal::types::OsTaskState;
    use osal::OsError;

    #[test]
    fn test_create_validates_parameters() {
        let os = os();
        assert_eq!(
            os.task_create(|| {}, "lo", 4096, CFG_PRIO_MIN - 1).map(|_| ()),
            Err(OsError::InvalidParameter)
        );
        assert_eq!(
            os.task_create(|| {}, "hi", 4096, CFG_PRIO_MAX + 1).map(|_| ()),
            Err(OsError::InvalidParameter)
        );
        assert_eq!(
            os.task_create(|| {}, "stk", CFG_STK_SIZE_MIN - 1, CFG_PRIO_MIN).map(|_| ()),
            Err(OsError::InvalidParameter)
        );
        assert_eq!(os.resource_count(), 0);
    }

    #[test]
    fn test_task_knows_itself_and_deletes_itself() {
        let os = os();
        let ids = os.queue_create(1, 4).unwrap();

        let worker = os.clone();
        let task = os
            .task_create(
                move || {
                    let me = worker.task_get_handle().unwrap();
                    assert!(worker.task_is_this(me));
                    worker.queue_send(ids, &me.id().to_le_bytes()).unwrap();
                    worker.task_delete(None).unwrap();
                },
                "worker",
                4096,
                5,
            )
            .unwrap();

        let mut out = [0u8; 4];
        os.queue_try_receive(ids, 1000, &mut out).unwrap();
        assert_eq!(u32::from_le_bytes(out), task.id());
        assert!(!os.task_is_this(task));

        // Queue is the only resource left once the task is gone
        assert!(wait_until(Duration::from_secs(1), || os.resource_count() == 1));
        assert_eq!(os.task_count(), 0);
    }

    #[test]
    fn test_delete_other_task_rejected() {
        let os = os();
        let release = os.semaphore_create(0, 1).unwrap();
        let worker = os.clone();
        let task = os
            .task_create(
                move || {
                    worker.semaphore_take(release).unwrap();
                    worker.task_delete(None).unwrap();
                },
                "parked",
                4096,
                5,
            )
            .unwrap();

        assert_eq!(os.task_delete(Some(task)), Err(OsError::InvalidParameter));
        os.semaphore_give(release).unwrap();
        assert!(wait_until(Duration::from_secs(1), || os.resource_count() == 1));
    }

    #[test]
    fn test_adopted_thread_is_not_a_resource() {
        let os = os();
        let me = os.task_get_handle().unwrap();
        assert_eq!(os.task_get_handle().unwrap(), me);
        assert!(os.task_is_this(me));
        assert_eq!(os.resource_count(), 0);
        assert_eq!(os.task_count(), 1);
        assert_eq!(os.task_delete(None), Err(OsError::InvalidParameter));
    }

    #[test]
    fn test_finished_foreign_threads_free_their_slots() {
        let os = os();
        for _ in 0..CFG_MAX_TASKS + 4 {
            let foreign = os.clone();
            let adopted = thread::spawn(move || foreign.task_get_handle().is_ok())
                .join()
                .unwrap();
            assert!(adopted);
        }
        assert_eq!(os.resource_count(), 0);

        let worker = os.clone();
        os.task_create(
            move || {
                worker.task_delete(None).unwrap();
            },
            "after",
            4096,
            5,
        )
        .unwrap();
        assert!(os.task_count() <= 1);
        assert!(wait_until(Duration::from_secs(1), || os.resource_count() == 0));
    }

    #[test]
    fn test_task_state_and_dump() {
        let os = os();
        let release = os.semaphore_create(0, 1).unwrap();
        let worker = os.clone();
        let task = os
            .task_create(
                move || {
                    worker.semaphore_take(release).unwrap();
                },
                "sleeper",
                8192,
                3,
            )
            .unwrap();

        thread::sleep(Duration::from_millis(30));
        let mut seen = Vec::new();
        os.for_each_task(|info| seen.push(info.clone()));
        let info = seen.iter().find(|info| info.handle == task).unwrap();
        assert_eq!(info.name.as_str(), "sleeper");
        assert_eq!(info.state, OsTaskState::Blocked);
        assert_eq!(info.priority, 3);
        assert!(info.owned);
        assert!(info.stack_min_free <= 8192);
        assert!(os.task_stack_min_free(Some(task)).is_ok());

        os.dump_tasks();
        os.semaphore_give(release).unwrap();
    }

    #[test]
    fn test_uptime_advances() {
        let os = os();
        let before = os.uptime_ms();
        os.task_block(20);
        assert!(os.uptime_ms() >= before + 15);
        os.task_yield();
    }
}

#[cfg(test)]
mod mutex_tests {
    use super::*;
    use osal::{MutexApi, OsError};

    #[test]
    fn test_try_lock_times_out_while_held() {
        let os = os();
        let m = os.mutexes().mutex_create().unwrap();
        let result = os.queue_create(1, 1).unwrap();
        os.mutexes().mutex_lock(m).unwrap();

        let worker = os.clone();
        os.task_create(
            move || {
                let r = worker.mutexes().mutex_try_lock(m, 30);
                let code = [(r == Err(OsError::Timeout)) as u8];
                worker.queue_send(result, &code).unwrap();
            },
            "contender",
            4096,
            5,
        )
        .unwrap();

        let mut out = [0u8; 1];
        os.queue_try_receive(result, 1000, &mut out).unwrap();
        assert_eq!(out, [1]);
        os.mutexes().mutex_unlock(m).unwrap();
    }

    #[test]
    fn test_lock_passes_between_tasks() {
        let os = os();
        let m = os.mutexes().mutex_create().unwrap();
        let done = os.semaphore_create(0, 1).unwrap();
        os.mutexes().mutex_lock(m).unwrap();

        let worker = os.clone();
        os.task_create(
            move || {
                worker.mutexes().mutex_lock(m).unwrap();
                worker.mutexes().mutex_unlock(m).unwrap();
                worker.semaphore_give(done).unwrap();
            },
            "waiter",
            4096,
            5,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert_eq!(os.semaphore_try_take(done, 0), Err(OsError::Timeout));
        os.mutexes().mutex_unlock(m).unwrap();
        os.semaphore_try_take(done, 1000).unwrap();
    }

    #[test]
    fn test_unlock_not_held_is_noop() {
        let os = os();
        let m = os.mutexes().mutex_create().unwrap();
        assert_eq!(os.mutexes().mutex_unlock(m), Ok(()));
        os.mutexes().mutex_lock(m).unwrap();
        os.mutexes().mutex_unlock(m).unwrap();
        os.mutexes().mutex_delete(m).unwrap();
        assert_eq!(os.mutexes().mutex_lock(m), Err(OsError::InvalidParameter));
    }
}

#[cfg(test)]
mod timer_tests {
    use super::*;
    use osal::OsError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_periodic_timer_fires_until_stopped() {
        let os = os();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        let t = os
            .timer_create(
                "tick",
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                20,
                true,
            )
            .unwrap();

        // Dormant until started
        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        os.timer_start(t).unwrap();
        assert!(wait_until(Duration::from_secs(2), || fired.load(Ordering::SeqCst) >= 3));

        os.timer_stop(t).unwrap();
        thread::sleep(Duration::from_millis(50));
        let stopped_at = fired.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), stopped_at);

        os.timer_delete(t).unwrap();
        assert_eq!(os.resource_count(), 0);
    }

    #[test]
    fn test_one_shot_fires_once() {
        let os = os();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        let t = os
            .timer_create(
                "once",
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                10,
                false,
            )
            .unwrap();
        os.timer_start(t).unwrap();

        assert!(wait_until(Duration::from_secs(1), || fired.load(Ordering::SeqCst) == 1));
        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_change_starts_dormant_timer() {
        let os = os();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        let t = os
            .timer_create(
                "change",
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                10_000,
                false,
            )
            .unwrap();

        os.timer_change(t, 10).unwrap();
        assert_eq!(os.timer_info(t), Ok((10, false)));
        assert!(wait_until(Duration::from_secs(1), || fired.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_callback_may_restart_its_timer() {
        let os = os();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        let control = os.clone();
        let t = os
            .timer_create(
                "again",
                move |me| {
                    if counter.fetch_add(1, Ordering::SeqCst) + 1 < 3 {
                        control.timer_start(me).unwrap();
                    }
                },
                10,
                false,
            )
            .unwrap();
        os.timer_start(t).unwrap();

        assert!(wait_until(Duration::from_secs(1), || fired.load(Ordering::SeqCst) == 3));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unacknowledged_delete_keeps_timer() {
        let os = os();
        let t = os.timer_create("keep", |_| {}, 100, true).unwrap();

        os.port().inject(SimFault::RejectTimerCommands { count: 1 });
        assert_eq!(os.timer_delete(t), Err(OsError::Platform));
        assert_eq!(os.resource_count(), 1);
        assert_eq!(os.timer_info(t), Ok((100, true)));

        os.timer_delete(t).unwrap();
        assert_eq!(os.resource_count(), 0);
        assert_eq!(os.timer_start(t), Err(OsError::InvalidParameter));
    }

    #[test]
    fn test_name_is_truncated() {
        let os = os();
        let t = os
            .timer_create("a-very-long-timer-name", |_| {}, 100, false)
            .unwrap();
        assert_eq!(os.timer_name(t).unwrap().as_str(), "a-very-long-time");
    }
}
