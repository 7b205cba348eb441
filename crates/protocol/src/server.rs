//! Server → client message types (spec §6.1).

use serde::{Deserialize, Serialize};

/// Mirrors the five [`voice_domain`]-independent turn-state labels so the
/// protocol crate has no dependency on `voice-core`. Kept in lockstep with
/// `voice_core::state_machine::TurnState` by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WireState {
    Idle,
    Listening,
    Speculative,
    Committed,
    Speaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    SpeculativelyCanceled,
    Interrupted,
    LlmFailed,
    TtsFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub cancellation_rate: f64,
    pub avg_debounce_ms: f64,
    pub turn_latency_ms: f64,
    pub total_turns: u64,
    pub tokens_wasted: u64,
    pub interruption_count: u64,
}

/// Outbound WebSocket envelope. One variant per spec §6.1 server message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session_ready")]
    SessionReady {
        session_id: String,
        timestamp: i64,
    },

    #[serde(rename = "state_change")]
    StateChange {
        from_state: WireState,
        to_state: WireState,
        timestamp: i64,
    },

    #[serde(rename = "transcript_partial")]
    TranscriptPartial {
        text: String,
        confidence: f64,
        timestamp: i64,
    },

    #[serde(rename = "transcript_final")]
    TranscriptFinal {
        text: String,
        confidence: f64,
        timestamp: i64,
    },

    #[serde(rename = "agent_audio_chunk")]
    AgentAudioChunk {
        /// Base64-encoded audio payload.
        audio: String,
        chunk_index: u32,
        is_final: bool,
    },

    #[serde(rename = "agent_text_fallback")]
    AgentTextFallback { text: String, reason: String },

    #[serde(rename = "turn_complete")]
    TurnComplete {
        turn_id: String,
        user_text: String,
        agent_text: String,
        duration_ms: u64,
        was_interrupted: bool,
        timestamp: i64,
    },

    #[serde(rename = "telemetry")]
    Telemetry(TelemetrySnapshot),

    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
        recoverable: bool,
        timestamp: i64,
    },

    #[serde(rename = "ping")]
    Ping { timestamp: i64 },
}

impl ServerMessage {
    /// Build an `error` message from a domain error, deriving `code` and
    /// `recoverable` from the error variant (spec §6.2).
    pub fn from_error(err: &voice_domain::Error, timestamp: i64) -> Self {
        ServerMessage::Error {
            code: err.wire_code().to_string(),
            message: err.to_string(),
            recoverable: err.recoverable(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_change_serializes_uppercase_states() {
        let msg = ServerMessage::StateChange {
            from_state: WireState::Listening,
            to_state: WireState::Speculative,
            timestamp: 0,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"LISTENING\""));
        assert!(json.contains("\"SPECULATIVE\""));
    }

    #[test]
    fn from_error_carries_wire_code_and_recoverable() {
        let err = voice_domain::Error::RagTimeout(350);
        let msg = ServerMessage::from_error(&err, 42);
        match msg {
            ServerMessage::Error {
                code,
                recoverable,
                timestamp,
                ..
            } => {
                assert_eq!(code, "RAG_TIMEOUT");
                assert!(recoverable);
                assert_eq!(timestamp, 42);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn turn_complete_round_trips() {
        let msg = ServerMessage::TurnComplete {
            turn_id: "t1".into(),
            user_text: "hi".into(),
            agent_text: "hello".into(),
            duration_ms: 1200,
            was_interrupted: false,
            timestamp: 1,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ServerMessage::TurnComplete { .. }));
    }
}
