//! Per-output worker thread.
//!
//! Each worker owns one actuator and drives it toward the shared setpoint:
//! apply, wait for a change (or back off after a failure), repeat until
//! cancelled. The cancel flag is written under the shared mutex and signaled,
//! so a waiting worker wakes immediately and a worker inside an actuator
//! retry loop sees it before its next attempt.

use crate::control::Control;
use crate::state::{DEFAULT_PERCENTAGE, Shared, SharedState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff after a failed apply, and the relearn interval when the actuator's
/// current level is unknown.
const RETRY_DELAY: Duration = Duration::from_secs(60);

/// Handle to a running worker. Dropping it cancels the thread and joins it.
pub struct Worker {
    state: Arc<SharedState>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(control: Control, state: Arc<SharedState>, output: String) -> Worker {
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_loop = WorkerLoop {
            control,
            state: Arc::clone(&state),
            cancel: Arc::clone(&cancel),
            output,
        };
        let handle = std::thread::spawn(move || worker_loop.run());
        Worker {
            state,
            cancel,
            handle: Some(handle),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        {
            let _shared = self.state.lock();
            self.cancel.store(true, Ordering::Relaxed);
            self.state.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct WorkerLoop {
    control: Control,
    state: Arc<SharedState>,
    // Writes happen under the state lock so waiters can observe them
    // alongside setpoint changes.
    cancel: Arc<AtomicBool>,
    output: String,
}

impl WorkerLoop {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn run(mut self) {
        let mut last_target = {
            let mut shared = self.state.lock();
            if shared.desired_percentage.is_none() {
                // Adopt whatever the hardware currently shows as the shared
                // target. The budgeted cancel allows one full exchange and
                // abandons retries.
                let mut polls = 0u32;
                let mut first_try = move || {
                    polls += 1;
                    polls > 2
                };
                let adopted = match self.control.get_percent(&mut first_try) {
                    Ok(percent) => percent,
                    Err(err) => {
                        debug!(
                            "failed to read initial brightness on output {}: {err}",
                            self.output
                        );
                        DEFAULT_PERCENTAGE
                    }
                };
                shared.desired_percentage = Some(adopted);
                self.state.notify_all();
            }
            shared.desired_percentage.unwrap_or(DEFAULT_PERCENTAGE)
        };

        loop {
            let result = {
                let mut cancel = || self.cancel.load(Ordering::Relaxed);
                self.control.set_percent(last_target, &mut cancel)
            };
            let shared = self.state.lock();
            match result {
                Ok(()) => {
                    let (shared, cancelled) = self.wait_new_target_or_cancel(shared, RETRY_DELAY);
                    if cancelled {
                        return;
                    }
                    last_target = shared.desired_percentage.unwrap_or(DEFAULT_PERCENTAGE);
                }
                Err(err) => {
                    if err.is_cancelled() {
                        return;
                    }
                    warn!(
                        "failed to set brightness to {last_target} on output {} ({}): {err}; will retry in {}s",
                        self.output,
                        self.control.name(),
                        RETRY_DELAY.as_secs()
                    );
                    let (shared, cancelled) = self.wait_cancel_or_timeout(shared, RETRY_DELAY);
                    if cancelled {
                        return;
                    }
                    last_target = shared.desired_percentage.unwrap_or(DEFAULT_PERCENTAGE);
                }
            }
        }
    }

    /// Block until cancelled or the setpoint differs from the percent the
    /// actuator last confirmed. Comparing against the actuator-cached value
    /// (not the setpoint captured at wait entry) means an external change
    /// that matches the setpoint still wakes the worker. When no confirmed
    /// percent exists, fall back to a timed wait and relearn.
    fn wait_new_target_or_cancel<'a>(
        &'a self,
        guard: MutexGuard<'a, Shared>,
        fallback: Duration,
    ) -> (MutexGuard<'a, Shared>, bool) {
        let Some(confirmed) = self.control.cached_percent() else {
            debug!(
                "no confirmed brightness on output {}; will relearn in {}s",
                self.output,
                fallback.as_secs()
            );
            return self.wait_cancel_or_timeout(guard, fallback);
        };
        let mut shared = guard;
        while !self.cancelled() && shared.desired_percentage == Some(confirmed) {
            shared = self.state.wait(shared);
        }
        (shared, self.cancelled())
    }

    /// Block until cancelled or the timeout elapses.
    fn wait_cancel_or_timeout<'a>(
        &'a self,
        guard: MutexGuard<'a, Shared>,
        timeout: Duration,
    ) -> (MutexGuard<'a, Shared>, bool) {
        let deadline = std::time::Instant::now() + timeout;
        let mut shared = guard;
        while !self.cancelled() {
            let now = std::time::Instant::now();
            if now >= deadline {
                break;
            }
            shared = self.state.wait_timeout(shared, deadline - now);
        }
        (shared, self.cancelled())
    }
}
