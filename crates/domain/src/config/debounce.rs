use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adaptive silence debounce (spec §4.3 / §8 boundary behavior)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    #[serde(default = "d_min_ms")]
    pub min_ms: u64,
    #[serde(default = "d_max_ms")]
    pub max_ms: u64,
    #[serde(default = "d_initial_ms")]
    pub initial_ms: u64,
    /// Cancellation-rate threshold above which the debounce is increased.
    #[serde(default = "d_high_watermark")]
    pub increase_above: f64,
    /// Cancellation-rate threshold below which the debounce is decreased.
    #[serde(default = "d_low_watermark")]
    pub decrease_below: f64,
    #[serde(default = "d_increase_step_ms")]
    pub increase_step_ms: u64,
    #[serde(default = "d_decrease_step_ms")]
    pub decrease_step_ms: u64,
    #[serde(default = "d_adaptive_enabled")]
    pub adaptive_enabled: bool,
    /// Correction markers that force an immediate silent cancel (spec §4.3/§9).
    #[serde(default = "d_correction_markers")]
    pub correction_markers: Vec<String>,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            min_ms: d_min_ms(),
            max_ms: d_max_ms(),
            initial_ms: d_initial_ms(),
            increase_above: d_high_watermark(),
            decrease_below: d_low_watermark(),
            increase_step_ms: d_increase_step_ms(),
            decrease_step_ms: d_decrease_step_ms(),
            adaptive_enabled: true,
            correction_markers: d_correction_markers(),
        }
    }
}

fn d_min_ms() -> u64 {
    400
}
fn d_max_ms() -> u64 {
    1200
}
fn d_initial_ms() -> u64 {
    400
}
fn d_high_watermark() -> f64 {
    0.30
}
fn d_low_watermark() -> f64 {
    0.15
}
fn d_increase_step_ms() -> u64 {
    50
}
fn d_decrease_step_ms() -> u64 {
    25
}
fn d_adaptive_enabled() -> bool {
    true
}
fn d_correction_markers() -> Vec<String> {
    vec!["actually".into(), "wait".into(), "sorry".into(), "no".into()]
}
