mod audio;
mod debounce;
mod llm;
mod observability;
mod rag;
mod server;
mod session;
mod stt;
mod tts;

pub use audio::*;
pub use debounce::*;
pub use llm::*;
pub use observability::*;
pub use rag::*;
pub use server::*;
pub use session::*;
pub use stt::*;
pub use tts::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    /// Empty vec means everything checks out.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.debounce.min_ms > self.debounce.max_ms {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "debounce.min_ms".into(),
                message: format!(
                    "min_ms ({}) must not exceed max_ms ({})",
                    self.debounce.min_ms, self.debounce.max_ms
                ),
            });
        }

        if self.debounce.initial_ms < self.debounce.min_ms
            || self.debounce.initial_ms > self.debounce.max_ms
        {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "debounce.initial_ms".into(),
                message: format!(
                    "initial_ms ({}) must lie within [min_ms, max_ms] ({}, {})",
                    self.debounce.initial_ms, self.debounce.min_ms, self.debounce.max_ms
                ),
            });
        }

        if self.rag.enabled && self.rag.timeout_ms >= self.debounce.min_ms {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "rag.timeout_ms".into(),
                message: format!(
                    "rag.timeout_ms ({}) should stay below debounce.min_ms ({}) so RAG never outlasts the debounce window",
                    self.rag.timeout_ms, self.debounce.min_ms
                ),
            });
        }

        if self.debounce.correction_markers.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "debounce.correction_markers".into(),
                message: "no correction markers configured — silent self-correction cancel (spec §4.3) is disabled".into(),
            });
        }

        if self.server.client_token.is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "server.client_token".into(),
                message: "no client_token configured — WebSocket upgrade is unauthenticated (dev mode)".into(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_with_only_warnings() {
        let cfg = Config::default();
        let issues = cfg.validate();
        assert!(issues.iter().all(|i| i.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn zero_port_is_an_error() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "server.port"));
    }

    #[test]
    fn inverted_debounce_bounds_is_an_error() {
        let mut cfg = Config::default();
        cfg.debounce.min_ms = 1200;
        cfg.debounce.max_ms = 400;
        let issues = cfg.validate();
        assert!(issues.iter().any(|i| i.field == "debounce.min_ms"));
    }

    #[test]
    fn rag_timeout_above_min_debounce_warns() {
        let mut cfg = Config::default();
        cfg.rag.enabled = true;
        cfg.rag.timeout_ms = 500;
        cfg.debounce.min_ms = 400;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "rag.timeout_ms" && i.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn deserialize_empty_toml_uses_all_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.debounce.initial_ms, 400);
        assert_eq!(cfg.session.inactivity_timeout_secs, 300);
    }
}
