use thiserror::Error;

/// Failure reported by an [`IndexSearchService`](crate::IndexSearchService)
/// or [`EmbeddingProvider`](crate::EmbeddingProvider).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchServiceError {
    #[error("index search service unavailable: {0}")]
    Unavailable(String),

    #[error("index search service timed out after {0}ms")]
    Timeout(u64),

    #[error("query cancelled")]
    Cancelled,

    #[error("index search service rejected the request: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum RankingError {
    #[error("Invalid query spec: {0}")]
    InvalidQuerySpec(String),

    #[error("Invalid ranking strategy: {0}")]
    InvalidStrategy(String),

    #[error("Empty fusion input: {0}")]
    EmptyInput(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] SearchServiceError),

    #[error("Invalid hit '{id}': {reason}")]
    InvalidHit { id: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),
}

impl RankingError {
    /// Only upstream failures may succeed when the same query is issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RankingError::UpstreamUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, RankingError>;
