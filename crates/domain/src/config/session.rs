use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session lifecycle (spec §3 Session, §5 heartbeat/timeouts)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity timeout before a session is torn down. Default 5 minutes.
    #[serde(default = "d_inactivity_secs")]
    pub inactivity_timeout_secs: u64,
    /// Server `ping` interval.
    #[serde(default = "d_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Time to wait for a `pong` before closing the connection.
    #[serde(default = "d_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    /// Rolling window size for adaptive debounce (spec §4.3, N = 10).
    #[serde(default = "d_rolling_window")]
    pub rolling_window: usize,
    /// Emit a `telemetry` message every N completed turns (spec §4.7.5).
    #[serde(default = "d_telemetry_every_n")]
    pub telemetry_every_n_turns: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: d_inactivity_secs(),
            heartbeat_interval_secs: d_heartbeat_interval_secs(),
            heartbeat_timeout_secs: d_heartbeat_timeout_secs(),
            rolling_window: d_rolling_window(),
            telemetry_every_n_turns: d_telemetry_every_n(),
        }
    }
}

fn d_inactivity_secs() -> u64 {
    300
}
fn d_heartbeat_interval_secs() -> u64 {
    30
}
fn d_heartbeat_timeout_secs() -> u64 {
    60
}
fn d_rolling_window() -> usize {
    10
}
fn d_telemetry_every_n() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.inactivity_timeout_secs, 300);
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.heartbeat_timeout_secs, 60);
        assert_eq!(cfg.rolling_window, 10);
        assert_eq!(cfg.telemetry_every_n_turns, 5);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: SessionConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.inactivity_timeout_secs, 300);
    }
}
