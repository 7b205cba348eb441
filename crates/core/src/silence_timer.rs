//! SilenceTimer (C3) — cancellable debounce timer (spec §4.3).
//!
//! One instance per turn. `cancel()` is idempotent and wakes an in-flight
//! `wait()` immediately rather than waiting for the sleep to elapse.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Inactive,
    Running,
    Fired,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Fired,
    Canceled,
}

pub struct SilenceTimer {
    cancelled: AtomicBool,
    started: AtomicBool,
    notify: Notify,
}

impl SilenceTimer {
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            started: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn state(&self) -> TimerState {
        if self.cancelled.load(Ordering::Acquire) {
            TimerState::Canceled
        } else if self.started.load(Ordering::Acquire) {
            TimerState::Running
        } else {
            TimerState::Inactive
        }
    }

    /// Cancel the timer. Idempotent; safe to call before `wait` starts.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }

    /// Run the debounce for `duration`. Resolves to `Fired` if the full
    /// duration elapsed without a cancel, otherwise `Canceled`.
    pub async fn wait(&self, duration: Duration) -> TimerOutcome {
        self.started.store(true, Ordering::Release);
        if self.cancelled.load(Ordering::Acquire) {
            return TimerOutcome::Canceled;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                if self.cancelled.load(Ordering::Acquire) {
                    TimerOutcome::Canceled
                } else {
                    TimerOutcome::Fired
                }
            }
            _ = self.notify.notified() => TimerOutcome::Canceled,
        }
    }
}

impl Default for SilenceTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_duration_without_cancel() {
        let timer = SilenceTimer::new();
        let outcome = timer.wait(Duration::from_millis(400)).await;
        assert_eq!(outcome, TimerOutcome::Fired);
        assert_eq!(timer.state(), TimerState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_wait_short_circuits() {
        let timer = SilenceTimer::new();
        timer.cancel();
        let outcome = timer.wait(Duration::from_millis(400)).await;
        assert_eq!(outcome, TimerOutcome::Canceled);
    }

    #[tokio::test]
    async fn cancel_during_wait_wakes_immediately() {
        let timer = std::sync::Arc::new(SilenceTimer::new());
        let waiter = timer.clone();
        let handle = tokio::spawn(async move { waiter.wait(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        timer.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancel should wake the waiter well before the 5s debounce")
            .unwrap();
        assert_eq!(outcome, TimerOutcome::Canceled);
    }

    #[test]
    fn cancel_is_idempotent() {
        let timer = SilenceTimer::new();
        timer.cancel();
        timer.cancel();
        assert_eq!(timer.state(), TimerState::Canceled);
    }
}
