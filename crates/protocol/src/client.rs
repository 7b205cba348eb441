//! Client → server message types (spec §6.1).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Pcm,
    Wav,
    Webm,
}

/// Settings a client may change mid-session. Every field is optional;
/// absent fields leave the current value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_debounce_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptive_debounce_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
}

/// Inbound WebSocket envelope. One variant per spec §6.1 client message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "connect")]
    Connect,

    #[serde(rename = "audio_chunk")]
    AudioChunk {
        /// Base64-encoded audio payload.
        audio: String,
        format: AudioFormat,
        sample_rate: u32,
    },

    #[serde(rename = "interrupt")]
    Interrupt { timestamp: i64 },

    #[serde(rename = "playback_complete")]
    PlaybackComplete { timestamp: i64 },

    #[serde(rename = "update_settings")]
    UpdateSettings {
        #[serde(flatten)]
        patch: SettingsPatch,
    },

    #[serde(rename = "disconnect")]
    Disconnect,

    #[serde(rename = "pong")]
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_chunk_round_trips() {
        let msg = ClientMessage::AudioChunk {
            audio: "YWJj".into(),
            format: AudioFormat::Pcm,
            sample_rate: 16_000,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"audio_chunk\""));
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        match back {
            ClientMessage::AudioChunk { sample_rate, .. } => assert_eq!(sample_rate, 16_000),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn update_settings_allows_partial_patch() {
        let json = r#"{"type":"update_settings","voice_id":"en-US-1"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::UpdateSettings { patch } => {
                assert_eq!(patch.voice_id.as_deref(), Some("en-US-1"));
                assert!(patch.silence_debounce_ms.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn connect_has_no_payload() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"connect"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Connect));
    }
}
