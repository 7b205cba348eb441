//! RagRetriever (C10) — narrow retrieval trait plus an HTTP implementation
//! and an in-memory mock. The caller (the turn controller) is responsible
//! for enforcing the hard timeout from spec §5 `RAG_TIMEOUT`; this trait
//! just performs one query.

use async_trait::async_trait;
use serde::Deserialize;
use voice_domain::config::RagConfig;
use voice_domain::Result;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Snippet {
    pub text: String,
    pub score: f64,
}

#[async_trait]
pub trait RagRetriever: Send + Sync {
    /// Semantic search, ranked descending by relevance, truncated to
    /// `top_k`.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<Snippet>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HttpRagRetriever {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRagRetriever {
    pub fn new(config: &RagConfig, base_url: impl Into<String>) -> Result<Self> {
        let _ = config;
        let client = reqwest::Client::builder()
            .build()
            .map_err(crate::util::from_reqwest_llm)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl RagRetriever for HttpRagRetriever {
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<Snippet>> {
        let url = format!("{}/v1/rag/search", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "query": text, "top_k": top_k }))
            .send()
            .await
            .map_err(crate::util::from_reqwest_llm)?;

        let snippets: Vec<Snippet> = response
            .json()
            .await
            .map_err(crate::util::from_reqwest_llm)?;
        Ok(snippets.into_iter().take(top_k).collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mock implementation for tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MockRagRetriever {
    snippets: Vec<Snippet>,
    delay: Option<std::time::Duration>,
}

impl MockRagRetriever {
    pub fn new(snippets: Vec<Snippet>) -> Self {
        Self {
            snippets,
            delay: None,
        }
    }

    /// Simulate a retriever that never returns within the caller's
    /// timeout budget.
    pub fn slow(delay: std::time::Duration) -> Self {
        Self {
            snippets: vec![],
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl RagRetriever for MockRagRetriever {
    async fn query(&self, _text: &str, top_k: usize) -> Result<Vec<Snippet>> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        Ok(self.snippets.iter().take(top_k).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_truncates_to_top_k() {
        let retriever = MockRagRetriever::new(vec![
            Snippet { text: "a".into(), score: 0.9 },
            Snippet { text: "b".into(), score: 0.8 },
            Snippet { text: "c".into(), score: 0.7 },
        ]);
        let results = retriever.query("q", 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
