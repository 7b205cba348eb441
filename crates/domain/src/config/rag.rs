use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RAG retrieval (C10) — bounded-latency sidecar, optional
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Hard timeout (spec §5 `RAG_TIMEOUT`), always less than any debounce.
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "d_top_k")]
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: d_timeout_ms(),
            top_k: d_top_k(),
        }
    }
}

fn d_timeout_ms() -> u64 {
    350
}
fn d_top_k() -> usize {
    3
}
