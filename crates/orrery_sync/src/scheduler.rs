//! Periodic background drain scheduler.

use crate::manager::SyncManager;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

struct SchedulerState {
    stopped: bool,
    nudged: bool,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    wake: Condvar,
}

/// Drives periodic drain attempts from a background thread.
///
/// Each tick calls [`SyncManager::attempt_drain`], which itself enforces
/// connectivity and exclusivity, so a tick while offline or mid-drain is a
/// cheap no-op. [`nudge`](Self::nudge) wakes the thread early for an
/// immediate attempt. The thread is joined on [`stop`](Self::stop) or drop.
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
    handle: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Spawns the scheduler thread ticking at the given interval.
    #[must_use]
    pub fn start(manager: Arc<SyncManager>, interval: Duration) -> Self {
        let inner = Arc::new(SchedulerInner {
            state: Mutex::new(SchedulerState {
                stopped: false,
                nudged: false,
            }),
            wake: Condvar::new(),
        });

        let thread_inner = Arc::clone(&inner);
        let handle = std::thread::spawn(move || loop {
            {
                let mut state = thread_inner.state.lock();
                if !state.stopped && !state.nudged {
                    let _ = thread_inner.wake.wait_for(&mut state, interval);
                }
                if state.stopped {
                    break;
                }
                state.nudged = false;
            }

            if let Err(err) = manager.attempt_drain() {
                warn!(error = %err, "scheduled drain failed");
            }
        });

        Self {
            inner,
            handle: Some(handle),
        }
    }

    /// Wakes the scheduler for an immediate drain attempt.
    pub fn nudge(&self) {
        let mut state = self.inner.state.lock();
        state.nudged = true;
        self.inner.wake.notify_one();
    }

    /// Stops the scheduler and joins its thread.
    pub fn stop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            self.inner.wake.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::connectivity::ConnectivityMonitor;
    use crate::remote::MockRemote;
    use orrery_store::{ChartStore, EvictionLimits, ManualClock, MemoryBackend, QueuedMutation};
    use serde_json::json;

    fn manager_with_remote() -> (Arc<SyncManager>, Arc<MockRemote>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Arc::new(
            ChartStore::open(
                MemoryBackend::new(),
                EvictionLimits::default(),
                clock as _,
            )
            .unwrap(),
        );
        store
            .enqueue_mutation(QueuedMutation::create("r1".into(), json!({}), 1_000))
            .unwrap();

        let remote = Arc::new(MockRemote::new());
        let connectivity = Arc::new(ConnectivityMonitor::new());
        connectivity.set_online(None);

        let manager = Arc::new(SyncManager::new(
            store,
            Arc::clone(&remote) as _,
            connectivity,
            SyncConfig::default(),
        ));
        (manager, remote)
    }

    #[test]
    fn periodic_tick_drains() {
        let (manager, remote) = manager_with_remote();

        let mut scheduler = SyncScheduler::start(manager, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(200));
        scheduler.stop();

        assert!(remote.call_count() >= 1);
    }

    #[test]
    fn nudge_wakes_early() {
        let (manager, remote) = manager_with_remote();

        let mut scheduler = SyncScheduler::start(manager, Duration::from_secs(3600));
        scheduler.nudge();

        // Give the thread a moment to service the nudge.
        for _ in 0..50 {
            if remote.call_count() >= 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        scheduler.stop();

        assert_eq!(remote.call_count(), 1);
    }

    #[test]
    fn stop_is_idempotent_and_joins() {
        let (manager, _remote) = manager_with_remote();

        let mut scheduler = SyncScheduler::start(manager, Duration::from_millis(10));
        scheduler.stop();
        scheduler.stop();
    }
}
