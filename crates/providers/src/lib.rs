//! Adapters for the three external streaming services (STT, LLM, TTS)
//! plus the optional RAG retriever (spec §4.6, §6.3). Each concern gets a
//! narrow trait, an HTTP-streaming implementation, and an in-memory mock
//! used by `voice-core`'s integration tests.

pub mod llm;
pub mod rag;
pub mod stt;
pub(crate) mod sse;
pub mod tts;
pub(crate) mod util;

pub use llm::{HttpLlmAdapter, LlmAdapter, LlmEvent, MockLlmAdapter};
pub use rag::{HttpRagRetriever, MockRagRetriever, RagRetriever, Snippet};
pub use stt::{HttpSttAdapter, MockSttAdapter, SttAdapter, SttEvent, SttSession};
pub use tts::{AudioChunk, HttpTtsAdapter, MockTtsAdapter, TtsAdapter};
