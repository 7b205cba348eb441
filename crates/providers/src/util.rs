//! Shared utility functions for provider adapters.

use voice_domain::Error;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
pub(crate) fn from_reqwest_stt(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::SttUnavailable(e.to_string())
    } else {
        Error::Stt(e.to_string())
    }
}

pub(crate) fn from_reqwest_llm(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::LlmUnavailable(e.to_string())
    } else {
        Error::Llm(e.to_string())
    }
}

pub(crate) fn from_reqwest_tts(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::TtsUnavailable(e.to_string())
    } else {
        Error::Tts(e.to_string())
    }
}
