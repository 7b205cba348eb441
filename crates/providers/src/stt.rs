//! STTAdapter (C7) — contract plus a pooled HTTP-streaming implementation
//! and an in-memory mock for tests.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voice_domain::config::SttConfig;
use voice_domain::{BoxStream, Error, Result};

/// One event yielded by a live STT session (spec §4.6).
#[derive(Debug, Clone, PartialEq)]
pub enum SttEvent {
    Partial { text: String, confidence: f64 },
    Final { text: String, confidence: f64 },
    Endpoint,
    Error { message: String, recoverable: bool },
}

#[derive(Debug, Deserialize)]
struct WireSttEvent {
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    recoverable: bool,
}

impl From<WireSttEvent> for Option<SttEvent> {
    fn from(w: WireSttEvent) -> Self {
        match w.kind.as_str() {
            "partial" => Some(SttEvent::Partial {
                text: w.text,
                confidence: w.confidence,
            }),
            "final" => Some(SttEvent::Final {
                text: w.text,
                confidence: w.confidence,
            }),
            "endpoint" => Some(SttEvent::Endpoint),
            "error" => Some(SttEvent::Error {
                message: w.message,
                recoverable: w.recoverable,
            }),
            _ => None,
        }
    }
}

/// A live STT session handle, returned by [`SttAdapter::open`].
#[async_trait]
pub trait SttSession: Send + Sync {
    /// Push a bounded audio frame (≤ 100 KB per spec §6.1).
    async fn send(&self, frame: Vec<u8>) -> Result<()>;

    /// Consume the event stream. Called once per session.
    fn events(&self) -> BoxStream<'static, Result<SttEvent>>;

    /// Force the current utterance to finalize (barge-in, spec §4.6).
    async fn finalize(&self) -> Result<()>;

    /// Release resources.
    async fn close(&self) -> Result<()>;
}

/// Opens STT sessions. One instance is shared across sessions; `open`
/// establishes a new per-session connection.
#[async_trait]
pub trait SttAdapter: Send + Sync {
    async fn open(&self, sample_rate_hz: u32) -> Result<Arc<dyn SttSession>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP-streaming implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// STTAdapter speaking to a streaming HTTP endpoint: audio frames are
/// POSTed to `{base_url}/v1/stt/frame`, events come back as an SSE-style
/// `data:`-framed body on a separate GET stream, reconnected with the
/// exponential backoff schedule from config (spec §4.6). Audio arriving
/// while the event stream is reconnecting is not replayed into the new
/// connection; bounding and smoothing of inbound audio itself is the
/// caller's [`voice_core::AudioInboundBuffer`], not this adapter.
pub struct HttpSttAdapter {
    client: reqwest::Client,
    base_url: String,
    config: SttConfig,
}

impl HttpSttAdapter {
    pub fn new(config: SttConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(crate::util::from_reqwest_stt)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            config,
        })
    }
}

#[async_trait]
impl SttAdapter for HttpSttAdapter {
    async fn open(&self, sample_rate_hz: u32) -> Result<Arc<dyn SttSession>> {
        Ok(Arc::new(HttpSttSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            config: self.config.clone(),
            sample_rate_hz,
            cancelled: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct HttpSttSession {
    client: reqwest::Client,
    base_url: String,
    config: SttConfig,
    sample_rate_hz: u32,
    cancelled: Arc<AtomicBool>,
}

#[async_trait]
impl SttSession for HttpSttSession {
    async fn send(&self, frame: Vec<u8>) -> Result<()> {
        let url = format!("{}/v1/stt/frame?sample_rate={}", self.base_url, self.sample_rate_hz);
        self.client
            .post(url)
            .body(frame)
            .send()
            .await
            .map_err(crate::util::from_reqwest_stt)?;
        Ok(())
    }

    fn events(&self) -> BoxStream<'static, Result<SttEvent>> {
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let sample_rate_hz = self.sample_rate_hz;
        let backoff = self.config.backoff_schedule_secs.clone();
        let max_attempts = self.config.max_reconnect_attempts;
        let cancelled = self.cancelled.clone();

        let stream = async_stream::stream! {
            let mut attempt = 0u32;

            loop {
                if cancelled.load(Ordering::Acquire) {
                    break;
                }

                let url = format!(
                    "{base_url}/v1/stt/events?sample_rate={sample_rate_hz}&punctuation=true&interim_results=true"
                );
                match client.get(&url).send().await {
                    Ok(response) => {
                        attempt = 0;
                        let cancelled_for_parse = cancelled.clone();
                        let mut inner = crate::sse::sse_response_stream(
                            response,
                            |data: &str| -> Vec<Result<SttEvent>> {
                                match serde_json::from_str::<WireSttEvent>(data) {
                                    Ok(w) => match Option::<SttEvent>::from(w) {
                                        Some(ev) => vec![Ok(ev)],
                                        None => vec![],
                                    },
                                    Err(e) => vec![Err(Error::Stt(e.to_string()))],
                                }
                            },
                            move || cancelled_for_parse.load(Ordering::Acquire),
                            |e| crate::util::from_reqwest_stt(e),
                        );
                        use futures_util::StreamExt;
                        while let Some(event) = inner.next().await {
                            if cancelled.load(Ordering::Acquire) {
                                return;
                            }
                            yield event;
                        }
                        // connection closed; fall through to reconnect
                    }
                    Err(_e) => {}
                }

                if cancelled.load(Ordering::Acquire) {
                    break;
                }
                if attempt >= max_attempts {
                    yield Err(Error::SttUnavailable(format!(
                        "exhausted {max_attempts} reconnect attempts"
                    )));
                    break;
                }
                let delay = backoff
                    .get(attempt as usize)
                    .copied()
                    .unwrap_or_else(|| *backoff.last().unwrap_or(&8));
                attempt += 1;
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
        };

        Box::pin(stream)
    }

    async fn finalize(&self) -> Result<()> {
        let url = format!("{}/v1/stt/finalize", self.base_url);
        self.client
            .post(url)
            .send()
            .await
            .map_err(crate::util::from_reqwest_stt)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.cancelled.store(true, Ordering::Release);
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mock implementation for tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A scripted STT adapter: replays a fixed event sequence regardless of
/// the audio it receives. Used in `voice-core` integration tests.
pub struct MockSttAdapter {
    script: Vec<SttEvent>,
}

impl MockSttAdapter {
    pub fn new(script: Vec<SttEvent>) -> Self {
        Self { script }
    }
}

#[async_trait]
impl SttAdapter for MockSttAdapter {
    async fn open(&self, _sample_rate_hz: u32) -> Result<Arc<dyn SttSession>> {
        Ok(Arc::new(MockSttSession {
            script: self.script.clone(),
            finalized: AtomicBool::new(false),
        }))
    }
}

struct MockSttSession {
    script: Vec<SttEvent>,
    finalized: AtomicBool,
}

#[async_trait]
impl SttSession for MockSttSession {
    async fn send(&self, _frame: Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn events(&self) -> BoxStream<'static, Result<SttEvent>> {
        let script = self.script.clone();
        Box::pin(futures_util::stream::iter(script.into_iter().map(Ok)))
    }

    async fn finalize(&self) -> Result<()> {
        self.finalized.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_session_replays_script() {
        use futures_util::StreamExt;
        let adapter = MockSttAdapter::new(vec![
            SttEvent::Partial {
                text: "hel".into(),
                confidence: 0.5,
            },
            SttEvent::Final {
                text: "hello".into(),
                confidence: 0.9,
            },
        ]);
        let session = adapter.open(16_000).await.unwrap();
        let events: Vec<_> = session.events().collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Ok(SttEvent::Final { .. })));
    }

    #[test]
    fn wire_event_maps_unknown_kind_to_none() {
        let w = WireSttEvent {
            kind: "unknown".into(),
            text: String::new(),
            confidence: 0.0,
            message: String::new(),
            recoverable: false,
        };
        let event: Option<SttEvent> = w.into();
        assert!(event.is_none());
    }
}
