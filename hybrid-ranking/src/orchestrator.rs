use crate::config::RankingConfig;
use crate::error::{RankingError, Result, SearchServiceError};
use crate::fusion::FusionEngine;
use crate::query::QuerySpec;
use crate::result::{SearchResults, SearchStats};
use crate::score::{RankedHit, RawHit, SourceName};
use crate::service::{EmbeddingProvider, IndexSearchService, SearchRequest};
use crate::text::TextStrategy;
use crate::vector::VectorStrategy;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Hybrid query orchestrator: dispatches the lexical and vector sub-queries,
/// ranks each response and fuses them into the final list.
pub struct HybridSearch {
    config: RankingConfig,
    service: Arc<dyn IndexSearchService>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    text_strategy: TextStrategy,
    vector_strategy: VectorStrategy,
    fusion_engine: FusionEngine,
}

/// Raw hits per modality as returned by the index
#[derive(Default)]
struct Gathered {
    text: Option<Vec<RawHit>>,
    vector: Option<Vec<RawHit>>,
    stats: SearchStats,
}

impl HybridSearch {
    /// Create a new orchestrator over `service`
    pub fn new(config: RankingConfig, service: Arc<dyn IndexSearchService>) -> Result<Self> {
        config.validate().map_err(RankingError::Config)?;

        info!("Initializing hybrid search (rrf_k={})", config.rrf_k);

        Ok(Self {
            text_strategy: TextStrategy::new(config.clone()),
            vector_strategy: VectorStrategy::new(config.clone()),
            fusion_engine: FusionEngine::new(config.fusion_params()),
            config,
            service,
            embedder: None,
        })
    }

    /// Use `embedder` to turn query text into a vector for
    /// [`QuerySpec::with_vector_from_text`] queries
    pub fn with_embedding_provider(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Run a query to completion and return its ranked hits
    pub async fn execute(&self, spec: &QuerySpec) -> Result<Vec<RankedHit>> {
        self.execute_with_cancel(spec, CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), abandoning the query when `cancel` fires
    pub async fn execute_with_cancel(
        &self,
        spec: &QuerySpec,
        cancel: CancellationToken,
    ) -> Result<Vec<RankedHit>> {
        Ok(self.search(spec, cancel).await?.into_hits())
    }

    /// Run a query and report per-stage statistics alongside the hits
    pub async fn search(&self, spec: &QuerySpec, cancel: CancellationToken) -> Result<SearchResults> {
        let start = Instant::now();

        spec.validate()?;
        let text_request = if spec.wants_text() {
            Some(self.text_strategy.build_request(spec)?)
        } else {
            None
        };
        if spec.vector_from_text && spec.query_vector().is_none() && self.embedder.is_none() {
            return Err(RankingError::InvalidQuerySpec(
                "vector_from_text requires an embedding provider".to_string(),
            ));
        }

        debug!(
            "Hybrid search: text={:?} vector={} fusion={}",
            spec.query_text(),
            spec.wants_vector(),
            spec.fusion
        );

        // Sub-queries share a child token so one failing cancels the other
        // without cancelling the caller's token.
        let token = cancel.child_token();
        let upstream = self.gather(spec, text_request, &token);
        let gathered = match self.config.query_timeout_ms {
            Some(timeout_ms) => {
                match tokio::time::timeout(Duration::from_millis(timeout_ms), upstream).await {
                    Ok(gathered) => gathered,
                    Err(_) => {
                        token.cancel();
                        info!("Query timed out after {timeout_ms}ms");
                        return Err(SearchServiceError::Timeout(timeout_ms).into());
                    }
                }
            }
            None => upstream.await,
        }?;

        let mut stats = gathered.stats;
        let fusion_start = Instant::now();

        let mut sources = BTreeMap::new();
        if let Some(hits) = gathered.text {
            sources.insert(
                SourceName::Text,
                self.text_strategy.rank(hits, spec.text_ranking)?,
            );
        }
        if let Some(hits) = gathered.vector {
            sources.insert(
                SourceName::Vector,
                self.vector_strategy.rank(hits, spec.vector_search)?,
            );
        }

        let mut hits = self.fusion_engine.fuse(sources, spec.fusion)?;
        hits.truncate(spec.limit);

        stats.fusion_time_ms = fusion_start.elapsed().as_millis() as u64;
        stats.total_time_ms = start.elapsed().as_millis() as u64;

        info!(
            "Search completed in {}ms, returned {} results",
            stats.total_time_ms,
            hits.len()
        );

        Ok(SearchResults::new(hits, stats))
    }

    /// Resolve the query vector and fetch raw hits for every modality.
    async fn gather(
        &self,
        spec: &QuerySpec,
        text_request: Option<SearchRequest>,
        token: &CancellationToken,
    ) -> Result<Gathered> {
        let mut gathered = Gathered::default();

        let vector = match (spec.query_vector(), spec.vector_from_text) {
            (Some(vector), _) => Some(vector.to_vec()),
            (None, true) => {
                let embedding_start = Instant::now();
                let vector = self.embed_query(spec, token).await?;
                gathered.stats.embedding_time_ms = embedding_start.elapsed().as_millis() as u64;
                Some(vector)
            }
            (None, false) => None,
        };
        let vector_request = match &vector {
            Some(vector) => Some(self.vector_strategy.build_request(spec, vector)?),
            None => None,
        };

        match (text_request, vector_request) {
            (Some(text), Some(vector))
                if self.config.prefer_combined_queries && self.service.supports_combined_queries() =>
            {
                let request = SearchRequest::combine(text, vector);
                let (hits, elapsed_ms) = self.sub_query(request, token).await?;
                let text_hits: Vec<RawHit> = hits
                    .iter()
                    .filter(|hit| TextStrategy::accepts(hit, spec.text_ranking))
                    .cloned()
                    .collect();
                let vector_hits: Vec<RawHit> = hits
                    .into_iter()
                    .filter(|hit| hit.vector_score.is_some())
                    .collect();
                debug!(
                    "Combined request split into {} text + {} vector hits",
                    text_hits.len(),
                    vector_hits.len()
                );

                gathered.stats.combined_request = true;
                gathered.stats.text_time_ms = elapsed_ms;
                gathered.stats.vector_time_ms = elapsed_ms;
                gathered.stats.text_count = text_hits.len();
                gathered.stats.vector_count = vector_hits.len();
                gathered.text = Some(text_hits);
                gathered.vector = Some(vector_hits);
            }
            (Some(text), Some(vector)) => {
                let ((text_hits, text_ms), (vector_hits, vector_ms)) = tokio::try_join!(
                    self.sub_query(text, token),
                    self.sub_query(vector, token)
                )?;

                gathered.stats.text_time_ms = text_ms;
                gathered.stats.vector_time_ms = vector_ms;
                gathered.stats.text_count = text_hits.len();
                gathered.stats.vector_count = vector_hits.len();
                gathered.text = Some(text_hits);
                gathered.vector = Some(vector_hits);
            }
            (Some(text), None) => {
                let (hits, elapsed_ms) = self.sub_query(text, token).await?;
                gathered.stats.text_time_ms = elapsed_ms;
                gathered.stats.text_count = hits.len();
                gathered.text = Some(hits);
            }
            (None, Some(vector)) => {
                let (hits, elapsed_ms) = self.sub_query(vector, token).await?;
                gathered.stats.vector_time_ms = elapsed_ms;
                gathered.stats.vector_count = hits.len();
                gathered.vector = Some(hits);
            }
            (None, None) => {
                return Err(RankingError::InvalidQuerySpec(
                    "at least one of text or vector must be provided".to_string(),
                ));
            }
        }

        Ok(gathered)
    }

    /// One call to the index. A failure cancels `token` so the sibling
    /// sub-query stops too.
    async fn sub_query(
        &self,
        request: SearchRequest,
        token: &CancellationToken,
    ) -> Result<(Vec<RawHit>, u64)> {
        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(SearchServiceError::Cancelled),
            result = self.service.search(request, token.clone()) => result,
        };

        match result {
            Ok(hits) => Ok((hits, start.elapsed().as_millis() as u64)),
            Err(err) => {
                token.cancel();
                debug!("Sub-query failed: {err}");
                Err(err.into())
            }
        }
    }

    async fn embed_query(&self, spec: &QuerySpec, token: &CancellationToken) -> Result<Vec<f32>> {
        let (Some(embedder), Some(text)) = (&self.embedder, spec.query_text()) else {
            return Err(RankingError::InvalidQuerySpec(
                "vector_from_text requires query text and an embedding provider".to_string(),
            ));
        };

        let vector = tokio::select! {
            biased;
            _ = token.cancelled() => Err(SearchServiceError::Cancelled),
            result = embedder.embed(text) => result,
        }?;

        if vector.is_empty() || vector.iter().any(|component| !component.is_finite()) {
            return Err(SearchServiceError::Rejected(
                "embedding provider returned an unusable vector".to_string(),
            )
            .into());
        }

        Ok(vector)
    }

    /// Get configuration
    pub fn config(&self) -> &RankingConfig {
        &self.config
    }
}
