use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// STTAdapter (C7) configuration — reconnect policy from spec §4.6
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub punctuation: bool,
    #[serde(default)]
    pub interim_results: bool,
    /// Exponential reconnect backoff, in seconds: {0, 1, 2, 4, 8}.
    #[serde(default = "d_backoff_schedule_secs")]
    pub backoff_schedule_secs: Vec<u64>,
    #[serde(default = "d_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Audio buffered during an outage is replayed only if its staleness
    /// is below this threshold on reconnect.
    #[serde(default = "d_replay_staleness_ms")]
    pub max_replay_staleness_ms: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            punctuation: true,
            interim_results: true,
            backoff_schedule_secs: d_backoff_schedule_secs(),
            max_reconnect_attempts: d_max_reconnect_attempts(),
            max_replay_staleness_ms: d_replay_staleness_ms(),
        }
    }
}

fn d_base_url() -> String {
    "http://127.0.0.1:9000".into()
}
fn d_backoff_schedule_secs() -> Vec<u64> {
    vec![0, 1, 2, 4, 8]
}
fn d_max_reconnect_attempts() -> u32 {
    5
}
fn d_replay_staleness_ms() -> u64 {
    3_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_schedule_matches_spec() {
        assert_eq!(SttConfig::default().backoff_schedule_secs, vec![0, 1, 2, 4, 8]);
    }

    #[test]
    fn default_max_attempts_is_five() {
        assert_eq!(SttConfig::default().max_reconnect_attempts, 5);
    }
}
