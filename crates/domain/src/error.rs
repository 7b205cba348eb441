//! Shared error type used across every `voice-*` crate.
//!
//! Variants line up with the wire error-code taxonomy in spec §6.2
//! (`WS_`, `STT_`, `LLM_`, `TTS_`, plus the cross-cutting kinds) so a
//! gateway handler can derive a wire `code` and `recoverable` flag
//! directly from the variant that was raised.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("transport: {0}")]
    Transport(String),

    #[error("STT unavailable: {0}")]
    SttUnavailable(String),

    #[error("STT: {0}")]
    Stt(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM: {0}")]
    Llm(String),

    #[error("TTS unavailable: {0}")]
    TtsUnavailable(String),

    #[error("TTS: {0}")]
    Tts(String),

    #[error("RAG timeout after {0}ms")]
    RagTimeout(u64),

    #[error("transcript buffer locked")]
    BufferLocked,

    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: String, to: String },

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("audio buffer overflow: dropped {0} frame(s)")]
    AudioBufferOverflow(usize),

    #[error("config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The wire error code (spec §6.2) for this error.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Error::Transport(_) => "WS_TRANSPORT",
            Error::SttUnavailable(_) => "STT_UNAVAILABLE",
            Error::Stt(_) => "STT_ERROR",
            Error::LlmUnavailable(_) => "LLM_UNAVAILABLE",
            Error::Llm(_) => "LLM_ERROR",
            Error::TtsUnavailable(_) => "TTS_UNAVAILABLE",
            Error::Tts(_) => "TTS_ERROR",
            Error::RagTimeout(_) => "RAG_TIMEOUT",
            Error::BufferLocked => "BUFFER_LOCKED",
            Error::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Error::SessionExpired(_) => "SESSION_EXPIRED",
            Error::AudioBufferOverflow(_) => "AUDIO_BUFFER_OVERFLOW",
            Error::Config(_) => "UNKNOWN_ERROR",
            Error::Io(_) | Error::Json(_) | Error::Other(_) => "UNKNOWN_ERROR",
        }
    }

    /// Whether the client can reasonably retry after this error.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Error::RagTimeout(_)
                | Error::Stt(_)
                | Error::Llm(_)
                | Error::Tts(_)
                | Error::Transport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_not_recoverable() {
        assert!(!Error::SessionExpired("s1".into()).recoverable());
        assert!(!Error::BufferLocked.recoverable());
        assert!(!Error::InvalidStateTransition {
            from: "IDLE".into(),
            to: "SPEAKING".into(),
        }
        .recoverable());
    }

    #[test]
    fn transient_errors_are_recoverable() {
        assert!(Error::RagTimeout(350).recoverable());
        assert!(Error::Stt("reset by peer".into()).recoverable());
    }

    #[test]
    fn wire_codes_match_taxonomy_prefixes() {
        assert_eq!(Error::SttUnavailable("x".into()).wire_code(), "STT_UNAVAILABLE");
        assert_eq!(Error::LlmUnavailable("x".into()).wire_code(), "LLM_UNAVAILABLE");
        assert_eq!(Error::TtsUnavailable("x".into()).wire_code(), "TTS_UNAVAILABLE");
        assert_eq!(
            Error::AudioBufferOverflow(3).wire_code(),
            "AUDIO_BUFFER_OVERFLOW"
        );
    }
}
