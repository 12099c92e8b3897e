//! Mutex debug layer tests on the host simulation kernel

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use osal::config::CFG_MAX_TASKS;
use osal::port::sim::SimKernel;
use osal::{MutexApi, MutexDebug, MutexDebugState, Os, OsError};

fn os() -> Arc<Os<SimKernel>> {
    Arc::new(Os::new(SimKernel::new()))
}

#[cfg(test)]
mod forwarding_tests {
    use super::*;

    #[test]
    fn test_decorator_forwards_and_tracks() {
        let os = os();
        let state = MutexDebugState::new();
        let mutexes = MutexDebug::new(&os, &state);

        let m = mutexes.mutex_create().unwrap();
        assert_eq!(os.resource_count(), 1);

        mutexes.mutex_lock(m).unwrap();
        let me = os.task_get_handle().unwrap().id();
        assert_eq!(state.held_by(me), 1);
        assert_eq!(state.tracked(), 1);

        mutexes.mutex_unlock(m).unwrap();
        assert_eq!(state.held_by(me), 0);
        assert_eq!(state.tracked(), 0);

        mutexes.mutex_delete(m).unwrap();
        assert_eq!(os.resource_count(), 0);
        assert_eq!(mutexes.mutex_lock(m), Err(OsError::InvalidParameter));
        assert_eq!(state.tracked(), 0);
    }

    #[test]
    fn test_recursive_lock_is_not_an_inversion() {
        let os = os();
        let state = MutexDebugState::new();
        let mutexes = MutexDebug::new(&os, &state);
        let m = mutexes.mutex_create().unwrap();

        mutexes.mutex_lock(m).unwrap();
        mutexes.mutex_try_lock(m, 10).unwrap();
        let me = os.task_get_handle().unwrap().id();
        assert_eq!(state.held_by(me), 2);
        assert_eq!(state.inversions(), 0);

        mutexes.mutex_unlock(m).unwrap();
        mutexes.mutex_unlock(m).unwrap();
        assert_eq!(state.tracked(), 0);
    }

    #[test]
    fn test_unlock_not_held_leaves_records() {
        let os = os();
        let state = MutexDebugState::new();
        let mutexes = MutexDebug::new(&os, &state);
        let m = mutexes.mutex_create().unwrap();

        assert_eq!(mutexes.mutex_unlock(m), Ok(()));
        assert_eq!(state.tracked(), 0);
    }

    #[test]
    fn test_foreign_threads_locking_do_not_exhaust_tasks() {
        let os = os();
        let state = Arc::new(MutexDebugState::new());
        let m = MutexDebug::new(&os, &state).mutex_create().unwrap();

        for _ in 0..CFG_MAX_TASKS + 4 {
            let foreign_os = os.clone();
            let foreign_state = state.clone();
            thread::spawn(move || {
                let mutexes = MutexDebug::new(&foreign_os, &foreign_state);
                mutexes.mutex_lock(m).unwrap();
                mutexes.mutex_unlock(m).unwrap();
            })
            .join()
            .unwrap();
        }
        assert_eq!(state.tracked(), 0);

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
    }

    #[test]
    fn test_selected_implementation() {
        let os = os();
        let m = os.mutexes().mutex_create().unwrap();
        os.mutexes().mutex_lock(m).unwrap();
        os.mutexes().mutex_unlock(m).unwrap();

        #[cfg(feature = "mutex-debug")]
        assert_eq!(os.mutexes().state().tracked(), 0);

        os.mutexes().mutex_delete(m).unwrap();
        assert_eq!(os.resource_count(), 0);
    }
}

#[cfg(test)]
mod diagnosis_tests {
    use super::*;

    #[test]
    fn test_lock_order_inversion_detected() {
        let os = os();
        let state = Arc::new(MutexDebugState::new());
        let mutexes = MutexDebug::new(&os, &state);

        let first = mutexes.mutex_create().unwrap();
        let second = mutexes.mutex_create().unwrap();
        let ready = os.semaphore_create(0, 1).unwrap();
        let done = os.semaphore_create(0, 1).unwrap();

        mutexes.mutex_lock(first).unwrap();

        let worker_os = os.clone();
        let worker_state = state.clone();
        os.task_create(
            move || {
                let mutexes = MutexDebug::new(&worker_os, &worker_state);
                mutexes.mutex_lock(second).unwrap();
                worker_os.semaphore_give(ready).unwrap();
                // Opposite order to the main task
                if mutexes.mutex_try_lock(first, 300).is_ok() {
                    mutexes.mutex_unlock(first).unwrap();
                }
                mutexes.mutex_unlock(second).unwrap();
                worker_os.semaphore_give(done).unwrap();
            },
            "b-then-a",
            8192,
            5,
        )
        .unwrap();

        os.semaphore_try_take(ready, 1000).unwrap();
        thread::sleep(Duration::from_millis(30));

        // The worker holds `second` and waits for `first`, which we hold
        assert_eq!(mutexes.mutex_try_lock(second, 20), Err(OsError::Timeout));
        assert_eq!(state.inversions(), 1);

        mutexes.mutex_unlock(first).unwrap();
        os.semaphore_try_take(done, 2000).unwrap();
        assert_eq!(state.tracked(), 0);
    }

    #[test]
    fn test_consistent_order_is_clean() {
        let os = os();
        let state = MutexDebugState::new();
        let mutexes = MutexDebug::new(&os, &state);
        let a = mutexes.mutex_create().unwrap();
        let b = mutexes.mutex_create().unwrap();

        for _ in 0..3 {
            mutexes.mutex_lock(a).unwrap();
            mutexes.mutex_lock(b).unwrap();
            mutexes.mutex_unlock(b).unwrap();
            mutexes.mutex_unlock(a).unwrap();
        }
        assert_eq!(state.inversions(), 0);
        assert_eq!(state.tracked(), 0);
    }

    #[test]
    fn test_prolonged_contention_reported() {
        let os = os();
        let state = Arc::new(MutexDebugState::new());
        let mutexes = MutexDebug::new(&os, &state);
        let m = mutexes.mutex_create().unwrap();
        let done = os.semaphore_create(0, 1).unwrap();

        mutexes.mutex_lock(m).unwrap();

        let worker_os = os.clone();
        let worker_state = state.clone();
        os.task_create(
            move || {
                let mutexes = MutexDebug::new(&worker_os, &worker_state);
                mutexes.mutex_lock(m).unwrap();
                mutexes.mutex_unlock(m).unwrap();
                worker_os.semaphore_give(done).unwrap();
            },
            "waiter",
            8192,
            5,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(80));
        assert_eq!(mutexes.check_contention_over(40), 1);
        assert_eq!(state.contentions(), 1);
        // Nobody has waited anywhere near the default threshold
        assert_eq!(mutexes.check_contention(), 0);
        mutexes.report();

        mutexes.mutex_unlock(m).unwrap();
        os.semaphore_try_take(done, 1000).unwrap();
        assert_eq!(mutexes.check_contention_over(0), 0);
        assert_eq!(state.tracked(), 0);
    }
}
