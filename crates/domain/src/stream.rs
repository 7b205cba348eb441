//! Shared streaming primitives used by every adapter (C7–C9) and by the
//! sentence segmenter (C5).

use std::pin::Pin;

/// A boxed async stream, used for every adapter's event stream.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Token usage for a completed LLM call.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
