//! Process-wide desired-brightness cell.
//!
//! One mutex guards the setpoint; per-worker cancel flags are written under
//! the same mutex so a single condition variable can wake waiters for either
//! kind of change. Writers always signal under the lock.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Fallback when no setpoint has been established and the monitor could not
/// be read.
pub const DEFAULT_PERCENTAGE: i64 = 50;

#[derive(Debug, Default)]
pub struct Shared {
    /// Absent until the first worker or bus client establishes it; once
    /// present it never becomes absent again.
    pub desired_percentage: Option<i64>,
}

#[derive(Debug, Default)]
pub struct SharedState {
    shared: Mutex<Shared>,
    changed: Condvar,
}

impl SharedState {
    pub fn new() -> SharedState {
        SharedState::default()
    }

    /// A poisoned lock only means some worker panicked mid-update of a plain
    /// integer; recover the guard rather than wedging every other thread.
    pub fn lock(&self) -> MutexGuard<'_, Shared> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn wait<'a>(&self, guard: MutexGuard<'a, Shared>) -> MutexGuard<'a, Shared> {
        match self.changed.wait(guard) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, Shared>,
        timeout: Duration,
    ) -> MutexGuard<'a, Shared> {
        match self.changed.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    /// Wake every waiter; callers invoke this while holding the lock.
    pub fn notify_all(&self) {
        self.changed.notify_all();
    }

    pub fn get(&self) -> i64 {
        self.lock().desired_percentage.unwrap_or(DEFAULT_PERCENTAGE)
    }

    /// Store a clamped setpoint. Returns the resulting value and whether it
    /// changed (an unchanged store is a no-op and wakes nobody).
    pub fn set(&self, percentage: i64) -> (i64, bool) {
        let percentage = percentage.clamp(0, 100);
        let mut shared = self.lock();
        if shared.desired_percentage == Some(percentage) {
            return (percentage, false);
        }
        shared.desired_percentage = Some(percentage);
        self.notify_all();
        (percentage, true)
    }

    /// Step the setpoint up, saturating at 100. A zero step or an
    /// already-saturated setpoint is a no-op.
    pub fn increment(&self, amount: i64) -> (i64, bool) {
        let amount = amount.clamp(0, 100);
        let mut shared = self.lock();
        let current = shared.desired_percentage.unwrap_or(DEFAULT_PERCENTAGE);
        if amount == 0 {
            return (current, false);
        }
        if shared.desired_percentage == Some(100) {
            return (100, false);
        }
        let next = (current + amount).min(100);
        shared.desired_percentage = Some(next);
        self.notify_all();
        (next, true)
    }

    /// Step the setpoint down, saturating at 0.
    pub fn decrement(&self, amount: i64) -> (i64, bool) {
        let amount = amount.clamp(0, 100);
        let mut shared = self.lock();
        let current = shared.desired_percentage.unwrap_or(DEFAULT_PERCENTAGE);
        if amount == 0 {
            return (current, false);
        }
        if shared.desired_percentage == Some(0) {
            return (0, false);
        }
        let next = (current - amount).max(0);
        shared.desired_percentage = Some(next);
        self.notify_all();
        (next, true)
    }
}
