/*!
# Hybrid Ranking

Ranking engine for hybrid retrieval over an external document index:
- **Lexical search** ranked by BM25 relevance or a semantic reranker score
- **Vector search** (approximate or exact) ranked by similarity
- **Reciprocal Rank Fusion (RRF)** to combine rankings whose scores live on
  different scales
- **Deterministic ordering**: equal scores always break ties by document id

## Architecture

```text
QuerySpec
  └─> HybridSearch
        ├─> Text sub-query ───> IndexSearchService ─> rank_text
        ├─> Vector sub-query ─> IndexSearchService ─> rank_vector
        └─> FusionEngine (Identity / ScoreDescending / RRF / SemanticRerank)
              └─> Truncate to limit
```

The text and vector sub-queries run concurrently. A failure in either cancels
the other and fails the whole query; partial results are never returned.

## Example

```rust,no_run
use hybrid_ranking::{
    FusionPolicy, HybridSearch, InMemorySearchService, QuerySpec, RankingConfig, RawHit,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service = InMemorySearchService::new()
        .with_text_hits(vec![RawHit::new("doc-1").with_lexical_score(7.2)])
        .with_vector_hits(vec![RawHit::new("doc-1").with_vector_score(0.83)]);

    let search = HybridSearch::new(RankingConfig::default(), Arc::new(service))?;
    let spec = QuerySpec::hybrid("async error handling", vec![0.1, 0.7, 0.2], FusionPolicy::ReciprocalRankFusion, 10);

    for hit in search.execute(&spec).await? {
        println!("{}. {} (score: {:.4})", hit.final_rank, hit.id(), hit.final_score);
    }

    Ok(())
}
```

## Fusion Policies

- **Identity**: single source, order unchanged
- **ScoreDescending**: union sorted by one named score
- **ReciprocalRankFusion**: `Σ 1 / (k + rank)`, k = 60 by default
- **SemanticRerank**: union sorted by reranker score; missing scores count as 0.0
*/

mod config;
mod error;
mod fusion;
mod memory;
mod orchestrator;
mod query;
mod result;
mod score;
mod service;
mod text;
mod vector;

pub use config::RankingConfig;
pub use error::{RankingError, Result, SearchServiceError};
pub use fusion::{DEFAULT_RRF_K, FusionEngine, FusionParams, fuse};
pub use memory::{InMemorySearchService, StaticEmbeddingProvider};
pub use orchestrator::HybridSearch;
pub use query::{
    FusionPolicy, QuerySpec, TermMatchMode, TextRankingMode, TextSearchMode, VectorRankingMode,
    VectorSearchMode,
};
pub use result::{SearchResults, SearchStats};
pub use score::{DEFAULT_SEMANTIC_SCORE, RankedHit, RawHit, ScoreKind, SearchSource, SourceName};
pub use service::{EmbeddingProvider, IndexSearchService, SearchRequest};
pub use text::{TextStrategy, rank_text};
pub use vector::{VectorStrategy, rank_vector};
