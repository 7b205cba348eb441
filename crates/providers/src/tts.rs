//! TTSAdapter (C9) — contract plus a pooled HTTP-streaming implementation
//! and an in-memory mock for tests.

use async_trait::async_trait;
use serde::Deserialize;
use voice_domain::config::TtsConfig;
use voice_domain::{BoxStream, CancelToken, Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub audio: Vec<u8>,
    pub is_final: bool,
}

#[derive(Debug, Deserialize)]
struct WireAudioChunk {
    #[serde(with = "base64_bytes")]
    audio: Vec<u8>,
    #[serde(default)]
    is_final: bool,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

/// Streams synthesized audio for one sentence, observing `cancel` at every
/// chunk boundary (spec §4.4).
#[async_trait]
pub trait TtsAdapter: Send + Sync {
    async fn stream(
        &self,
        text: String,
        voice_id: Option<String>,
        cancel: CancelToken,
    ) -> Result<BoxStream<'static, Result<AudioChunk>>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP-streaming implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HttpTtsAdapter {
    client: reqwest::Client,
    base_url: String,
    default_voice_id: String,
}

impl HttpTtsAdapter {
    pub fn new(config: TtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(crate::util::from_reqwest_tts)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_voice_id: config.default_voice_id,
            client,
        })
    }

    async fn open_stream(
        &self,
        text: &str,
        voice_id: &str,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}/v1/tts/stream", self.base_url);
        self.client
            .post(url)
            .json(&serde_json::json!({ "text": text, "voice_id": voice_id }))
            .send()
            .await
    }
}

#[async_trait]
impl TtsAdapter for HttpTtsAdapter {
    async fn stream(
        &self,
        text: String,
        voice_id: Option<String>,
        cancel: CancelToken,
    ) -> Result<BoxStream<'static, Result<AudioChunk>>> {
        let voice_id = voice_id.unwrap_or_else(|| self.default_voice_id.clone());

        let response = match self.open_stream(&text, &voice_id).await {
            Ok(r) => r,
            Err(_e) => {
                // Single retry on transient failure (spec §4.6).
                self.open_stream(&text, &voice_id)
                    .await
                    .map_err(crate::util::from_reqwest_tts)?
            }
        };

        let cancel_for_parse = cancel.clone();
        let stream = crate::sse::sse_response_stream(
            response,
            move |data: &str| -> Vec<Result<AudioChunk>> {
                match serde_json::from_str::<WireAudioChunk>(data) {
                    Ok(w) => vec![Ok(AudioChunk {
                        audio: w.audio,
                        is_final: w.is_final,
                    })],
                    Err(e) => vec![Err(Error::Tts(e.to_string()))],
                }
            },
            move || cancel_for_parse.is_cancelled(),
            crate::util::from_reqwest_tts,
        );

        Ok(stream)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mock implementation for tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A scripted TTS adapter that emits a fixed number of chunks per call,
/// honoring cancellation between chunks.
pub struct MockTtsAdapter {
    chunks_per_call: usize,
    /// When true, every call fails permanently (used for S5 fallback tests).
    always_fail: bool,
}

impl MockTtsAdapter {
    pub fn new(chunks_per_call: usize) -> Self {
        Self {
            chunks_per_call,
            always_fail: false,
        }
    }

    pub fn always_failing() -> Self {
        Self {
            chunks_per_call: 0,
            always_fail: true,
        }
    }
}

#[async_trait]
impl TtsAdapter for MockTtsAdapter {
    async fn stream(
        &self,
        text: String,
        _voice_id: Option<String>,
        cancel: CancelToken,
    ) -> Result<BoxStream<'static, Result<AudioChunk>>> {
        if self.always_fail {
            return Err(Error::TtsUnavailable("mock configured to always fail".into()));
        }

        let n = self.chunks_per_call;
        let stream = async_stream::stream! {
            for i in 0..n {
                if cancel.is_cancelled() {
                    return;
                }
                yield Ok(AudioChunk {
                    audio: format!("{text}#{i}").into_bytes(),
                    is_final: i + 1 == n,
                });
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn mock_marks_last_chunk_final() {
        let adapter = MockTtsAdapter::new(3);
        let cancel = CancelToken::new();
        let chunks: Vec<_> = adapter
            .stream("hi".into(), None, cancel)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
        assert!(!chunks[0].as_ref().unwrap().is_final);
        assert!(chunks[2].as_ref().unwrap().is_final);
    }

    #[tokio::test]
    async fn always_failing_mock_errors_immediately() {
        let adapter = MockTtsAdapter::always_failing();
        let cancel = CancelToken::new();
        let result = adapter.stream("hi".into(), None, cancel).await;
        assert!(result.is_err());
    }
}
