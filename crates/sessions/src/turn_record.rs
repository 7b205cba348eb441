//! TurnRecord — the persistent shape of a closed turn (spec §6.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    SpeculativelyCanceled,
    Interrupted,
    LlmFailed,
    TtsFailed,
}

/// One entry in a turn's state-transition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransitionLogEntry {
    pub from: String,
    pub to: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnLatencies {
    /// Final transcript → first audio chunk, in milliseconds.
    pub final_to_first_audio_ms: Option<u64>,
    /// Final transcript → first LLM token, in milliseconds.
    pub final_to_first_token_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub user_text: String,
    pub agent_text: String,
    pub outcome: TurnOutcome,
    pub state_transition_log: Vec<StateTransitionLogEntry>,
    pub was_interrupted: bool,
    pub tokens_prompt: u32,
    pub tokens_completion: u32,
    pub tokens_wasted: u32,
    pub latencies: TurnLatencies,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_no_latencies() {
        let l = TurnLatencies::default();
        assert!(l.final_to_first_audio_ms.is_none());
        assert!(l.final_to_first_token_ms.is_none());
    }
}
