use crate::error::SearchServiceError;
use crate::query::{TermMatchMode, TextSearchMode};
use crate::score::RawHit;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Request sent to the index search service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,

    /// Query syntax for `query_text`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_syntax: Option<TextSearchMode>,

    /// Whether a match needs any or all query terms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_mode: Option<TermMatchMode>,

    /// Fields the lexical query is matched against
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_vector: Option<Vec<f32>>,

    /// Field holding the document vectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_field: Option<String>,

    /// Fields returned with each hit
    #[serde(default)]
    pub fields: Vec<String>,

    /// Number of hits (and vector neighbours) requested
    pub limit: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhaustive_vector_search: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_config_name: Option<String>,
}

impl SearchRequest {
    pub fn has_text(&self) -> bool {
        self.query_text.is_some()
    }

    pub fn has_vector(&self) -> bool {
        self.query_vector.is_some()
    }

    /// Merge a text request and a vector request into one combined query.
    pub fn combine(text: SearchRequest, vector: SearchRequest) -> SearchRequest {
        SearchRequest {
            query_vector: vector.query_vector,
            vector_field: vector.vector_field,
            exhaustive_vector_search: vector.exhaustive_vector_search,
            limit: text.limit.max(vector.limit),
            ..text
        }
    }
}

/// The external document index.
///
/// Implementations own connections, authentication and retries. The engine
/// only calls [`search`](IndexSearchService::search) and never retries a
/// failed call.
#[async_trait]
pub trait IndexSearchService: Send + Sync {
    /// Run one query. `cancel` fires when the caller gives up on the query.
    async fn search(
        &self,
        request: SearchRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<RawHit>, SearchServiceError>;

    /// Whether a single request may carry both a text and a vector query.
    fn supports_combined_queries(&self) -> bool {
        false
    }
}

/// Turns query text into a fixed-length vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchServiceError>;
}
