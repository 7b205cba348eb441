//! Per-session telemetry counters (spec §4.7.5).
//!
//! A `telemetry` server message is emitted every `telemetry_every_n_turns`
//! completed turns, plus whenever explicitly requested. Telemetry is
//! best-effort: failures to emit never stall the turn pipeline (§7
//! "never-block rule").

use parking_lot::Mutex;
use voice_protocol::server::TelemetrySnapshot;

#[derive(Debug, Default)]
struct Counters {
    completed_turns: u64,
    speculatively_canceled: u64,
    interruptions: u64,
    tokens_wasted: u64,
    /// Running sum of turn latencies, paired with a count, so the
    /// average can be recomputed without storing the whole history.
    latency_sum_ms: u64,
    latency_samples: u64,
}

pub struct TelemetryTracker {
    counters: Mutex<Counters>,
    every_n_turns: u64,
}

impl TelemetryTracker {
    pub fn new(every_n_turns: u64) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            every_n_turns: every_n_turns.max(1),
        }
    }

    /// Record a closed turn. Returns `true` if a telemetry message is due
    /// this turn (every `every_n_turns` completed turns).
    pub fn record_turn(
        &self,
        was_speculatively_canceled: bool,
        was_interrupted: bool,
        tokens_wasted: u64,
        latency_ms: u64,
    ) -> bool {
        let mut counters = self.counters.lock();
        counters.completed_turns += 1;
        if was_speculatively_canceled {
            counters.speculatively_canceled += 1;
        }
        if was_interrupted {
            counters.interruptions += 1;
        }
        counters.tokens_wasted += tokens_wasted;
        counters.latency_sum_ms += latency_ms;
        counters.latency_samples += 1;

        counters.completed_turns % self.every_n_turns == 0
    }

    /// Record a silently-canceled speculative episode (spec §4.7.2.5,
    /// §4.7.5's `speculatively_canceled` counter). Unlike [`Self::record_turn`]
    /// this does not close a turn — the turn itself stays open and is
    /// recorded later, so only the cancellation counter is bumped here.
    pub fn record_speculative_cancel(&self) {
        self.counters.lock().speculatively_canceled += 1;
    }

    pub fn snapshot(&self, current_debounce_ms: u64) -> TelemetrySnapshot {
        let counters = self.counters.lock();
        let total = counters.completed_turns.max(1);
        let avg_latency_ms = if counters.latency_samples == 0 {
            0.0
        } else {
            counters.latency_sum_ms as f64 / counters.latency_samples as f64
        };

        TelemetrySnapshot {
            cancellation_rate: counters.speculatively_canceled as f64 / total as f64,
            avg_debounce_ms: current_debounce_ms as f64,
            turn_latency_ms: avg_latency_ms,
            total_turns: counters.completed_turns,
            tokens_wasted: counters.tokens_wasted,
            interruption_count: counters.interruptions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_due_every_n_turns() {
        let tracker = TelemetryTracker::new(5);
        for i in 1..=5 {
            let due = tracker.record_turn(false, false, 0, 100);
            assert_eq!(due, i == 5);
        }
    }

    #[test]
    fn snapshot_reflects_accumulated_counters() {
        let tracker = TelemetryTracker::new(10);
        tracker.record_turn(true, false, 42, 200);
        tracker.record_turn(false, true, 0, 400);
        let snap = tracker.snapshot(425);
        assert_eq!(snap.total_turns, 2);
        assert_eq!(snap.tokens_wasted, 42);
        assert_eq!(snap.interruption_count, 1);
        assert_eq!(snap.avg_debounce_ms, 425.0);
        assert_eq!(snap.turn_latency_ms, 300.0);
        assert!((snap.cancellation_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn speculative_cancel_feeds_cancellation_rate() {
        let tracker = TelemetryTracker::new(10);
        tracker.record_speculative_cancel();
        tracker.record_speculative_cancel();
        let due = tracker.record_turn(false, false, 0, 100);
        assert!(!due);
        let snap = tracker.snapshot(400);
        assert_eq!(snap.total_turns, 1);
        assert!((snap.cancellation_rate - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_turns_divides_safely() {
        let tracker = TelemetryTracker::new(5);
        let snap = tracker.snapshot(400);
        assert_eq!(snap.total_turns, 0);
        assert_eq!(snap.turn_latency_ms, 0.0);
        assert_eq!(snap.cancellation_rate, 0.0);
    }
}
