use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLMAdapter (C8) configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_default_model")]
    pub default_model: String,
    /// First-token watchdog; a single retry is attempted if it elapses
    /// (spec §4.6 "single retry with 5-second budget").
    #[serde(default = "d_first_token_watchdog_ms")]
    pub first_token_watchdog_ms: u64,
    #[serde(default = "d_pool_size")]
    pub pool_size: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            default_model: d_default_model(),
            first_token_watchdog_ms: d_first_token_watchdog_ms(),
            pool_size: d_pool_size(),
        }
    }
}

fn d_base_url() -> String {
    "http://127.0.0.1:9001".into()
}
fn d_default_model() -> String {
    "default".into()
}
fn d_first_token_watchdog_ms() -> u64 {
    5_000
}
fn d_pool_size() -> usize {
    4
}
