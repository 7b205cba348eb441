//! AdaptiveDebounceController (C6) — tunes the silence debounce from the
//! observed speculative-cancellation rate (spec §4.3).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use voice_domain::config::DebounceConfig;

pub struct AdaptiveDebounceController {
    config: DebounceConfig,
    window_size: usize,
    /// `true` entries are turns that closed `speculatively_canceled`.
    window: Mutex<VecDeque<bool>>,
    current_ms: Mutex<u64>,
    /// Runtime toggle, defaulting to `config.adaptive_enabled`; flipped by
    /// an `update_settings` patch (spec §6.1 `adaptive_debounce_enabled`).
    enabled: AtomicBool,
}

impl AdaptiveDebounceController {
    pub fn new(config: DebounceConfig, window_size: usize) -> Self {
        let current_ms = config.initial_ms;
        let enabled = AtomicBool::new(config.adaptive_enabled);
        Self {
            config,
            window_size,
            window: Mutex::new(VecDeque::with_capacity(window_size)),
            current_ms: Mutex::new(current_ms),
            enabled,
        }
    }

    pub fn current_ms(&self) -> u64 {
        *self.current_ms.lock()
    }

    pub fn set_current_ms(&self, value: u64) {
        *self.current_ms.lock() = value.clamp(self.config.min_ms, self.config.max_ms);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Rolling cancellation rate over the last `window_size` turns.
    pub fn cancellation_rate(&self) -> f64 {
        let window = self.window.lock();
        if window.is_empty() {
            return 0.0;
        }
        let canceled = window.iter().filter(|&&c| c).count();
        canceled as f64 / window.len().max(1) as f64
    }

    /// Record a closed turn's outcome and apply the adaptation rule
    /// (spec §4.3). Returns the resulting debounce value. The rate is a
    /// "rolling window of the last `window_size` turns" (spec §4.3); until
    /// that many turns have actually closed there is no such window yet,
    /// so the adaptation rule is skipped rather than evaluated against a
    /// partial, rapidly-shifting sample (spec §8 S6: 4/10 canceled turns
    /// move the debounce by exactly one +50 step, not one step per turn).
    pub fn record_turn_outcome(&self, was_speculatively_canceled: bool) -> u64 {
        if !self.enabled.load(Ordering::Relaxed) {
            return self.current_ms();
        }

        let window_full = {
            let mut window = self.window.lock();
            if window.len() == self.window_size {
                window.pop_front();
            }
            window.push_back(was_speculatively_canceled);
            window.len() == self.window_size
        };

        if !window_full {
            return self.current_ms();
        }

        let rate = self.cancellation_rate();
        let mut current = self.current_ms.lock();
        *current = if rate > self.config.increase_above {
            (*current + self.config.increase_step_ms).min(self.config.max_ms)
        } else if rate < self.config.decrease_below {
            current.saturating_sub(self.config.decrease_step_ms).max(self.config.min_ms)
        } else {
            *current
        };
        *current
    }
}

/// Whether `text` contains one of `markers` as a whole word, case-
/// insensitively (spec §4.3, §GLOSSARY "correction marker").
pub fn contains_correction_marker(text: &str, markers: &[String]) -> bool {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    markers
        .iter()
        .any(|marker| words.contains(&marker.to_lowercase().as_str()))
}
