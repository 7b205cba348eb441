use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TTSAdapter (C9) configuration — pooled, pre-warmed connections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_default_voice")]
    pub default_voice_id: String,
    #[serde(default = "d_first_chunk_watchdog_ms")]
    pub first_chunk_watchdog_ms: u64,
    /// Bounded wait for client playback-complete confirmation (spec §4.7.3).
    #[serde(default = "d_playback_watchdog_ms")]
    pub playback_watchdog_ms: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            default_voice_id: d_default_voice(),
            first_chunk_watchdog_ms: d_first_chunk_watchdog_ms(),
            playback_watchdog_ms: d_playback_watchdog_ms(),
        }
    }
}

fn d_base_url() -> String {
    "http://127.0.0.1:9002".into()
}
fn d_default_voice() -> String {
    "default".into()
}
fn d_first_chunk_watchdog_ms() -> u64 {
    5_000
}
fn d_playback_watchdog_ms() -> u64 {
    15_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_playback_watchdog_is_fifteen_seconds() {
        assert_eq!(TtsConfig::default().playback_watchdog_ms, 15_000);
    }
}
