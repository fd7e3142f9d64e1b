use crate::error::SearchServiceError;
use crate::score::RawHit;
use crate::service::{EmbeddingProvider, IndexSearchService, SearchRequest};
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Index search service backed by fixed hit lists.
///
/// Text requests are answered from the text hits and vector requests from the
/// vector hits, each truncated to the request limit. Combined requests (only
/// when enabled) merge both lists by document id. Reranker scores are dropped
/// unless the request names a semantic configuration. Every request is recorded.
#[derive(Default)]
pub struct InMemorySearchService {
    text_hits: Vec<RawHit>,
    vector_hits: Vec<RawHit>,
    text_failure: Option<SearchServiceError>,
    vector_failure: Option<SearchServiceError>,
    text_latency: Duration,
    vector_latency: Duration,
    combined: bool,
    requests: Mutex<Vec<SearchRequest>>,
}

impl InMemorySearchService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text_hits(mut self, hits: Vec<RawHit>) -> Self {
        self.text_hits = hits;
        self
    }

    pub fn with_vector_hits(mut self, hits: Vec<RawHit>) -> Self {
        self.vector_hits = hits;
        self
    }

    /// Accept requests carrying both text and vector
    pub fn with_combined_queries(mut self) -> Self {
        self.combined = true;
        self
    }

    pub fn with_text_latency(mut self, latency: Duration) -> Self {
        self.text_latency = latency;
        self
    }

    pub fn with_vector_latency(mut self, latency: Duration) -> Self {
        self.vector_latency = latency;
        self
    }

    /// Fail text requests with `error` (after the text latency)
    pub fn failing_text(mut self, error: SearchServiceError) -> Self {
        self.text_failure = Some(error);
        self
    }

    /// Fail vector requests with `error` (after the vector latency)
    pub fn failing_vector(mut self, error: SearchServiceError) -> Self {
        self.vector_failure = Some(error);
        self
    }

    /// Requests received so far, in arrival order
    pub async fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().await.clone()
    }

    fn merge_by_id(text: &[RawHit], vector: &[RawHit]) -> Vec<RawHit> {
        let mut merged: Vec<RawHit> = Vec::with_capacity(text.len() + vector.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for hit in text.iter().chain(vector) {
            match positions.get(&hit.id) {
                Some(&position) => merged[position].merge_from(hit),
                None => {
                    positions.insert(hit.id.clone(), merged.len());
                    merged.push(hit.clone());
                }
            }
        }

        merged
    }
}

#[async_trait]
impl IndexSearchService for InMemorySearchService {
    async fn search(
        &self,
        request: SearchRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<RawHit>, SearchServiceError> {
        self.requests.lock().await.push(request.clone());

        let (latency, failure) = match (request.has_text(), request.has_vector()) {
            (true, true) if self.combined => (
                self.text_latency.max(self.vector_latency),
                self.text_failure
                    .clone()
                    .or_else(|| self.vector_failure.clone()),
            ),
            (true, true) => {
                return Err(SearchServiceError::Rejected(
                    "combined text and vector queries are not supported".to_string(),
                ));
            }
            (true, false) => (self.text_latency, self.text_failure.clone()),
            (false, true) => (self.vector_latency, self.vector_failure.clone()),
            (false, false) => {
                return Err(SearchServiceError::Rejected(
                    "request carries neither text nor vector".to_string(),
                ));
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchServiceError::Cancelled),
            _ = tokio::time::sleep(latency) => {}
        }

        if let Some(error) = failure {
            return Err(error);
        }

        let limit = request.limit;
        let text = &self.text_hits[..limit.min(self.text_hits.len())];
        let vector = &self.vector_hits[..limit.min(self.vector_hits.len())];

        let mut hits = match (request.has_text(), request.has_vector()) {
            (true, true) => Self::merge_by_id(text, vector),
            (true, false) => text.to_vec(),
            _ => vector.to_vec(),
        };

        // Reranker scores only come back when a semantic configuration is named.
        if request.semantic_config_name.is_none() {
            for hit in &mut hits {
                hit.semantic_rerank_score = None;
            }
        }

        debug!("In-memory index answered with {} hits", hits.len());
        Ok(hits)
    }

    fn supports_combined_queries(&self) -> bool {
        self.combined
    }
}

/// Embedding provider answering from a fixed text-to-vector table
#[derive(Debug, Clone, Default)]
pub struct StaticEmbeddingProvider {
    vectors: HashMap<String, Vec<f32>>,
}

impl StaticEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedding(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchServiceError> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| SearchServiceError::Rejected(format!("no embedding for '{text}'")))
    }
}
