use crate::score::RankedHit;
use serde::{Deserialize, Serialize};

/// Final hits of one query with timing metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// Ranked hits, already truncated to the query limit
    pub hits: Vec<RankedHit>,

    /// Search statistics
    pub stats: SearchStats,
}

/// Search performance statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Total search time in milliseconds
    pub total_time_ms: u64,

    /// Query embedding time in milliseconds
    pub embedding_time_ms: u64,

    /// Lexical sub-query time in milliseconds
    pub text_time_ms: u64,

    /// Vector sub-query time in milliseconds
    pub vector_time_ms: u64,

    /// Ranking and fusion time in milliseconds
    pub fusion_time_ms: u64,

    /// Number of raw lexical hits
    pub text_count: usize,

    /// Number of raw vector hits
    pub vector_count: usize,

    /// Both modalities were sent in one request
    pub combined_request: bool,
}

impl SearchResults {
    pub fn new(hits: Vec<RankedHit>, stats: SearchStats) -> Self {
        Self { hits, stats }
    }

    /// Get top N results
    pub fn top(&self, n: usize) -> &[RankedHit] {
        &self.hits[..n.min(self.hits.len())]
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn into_hits(self) -> Vec<RankedHit> {
        self.hits
    }
}
