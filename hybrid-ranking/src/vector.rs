use crate::config::RankingConfig;
use crate::error::{RankingError, Result};
use crate::query::{QuerySpec, VectorSearchMode};
use crate::score::{RankedHit, RawHit, ScoreKind, SearchSource, rank_by_score};
use crate::service::SearchRequest;
use log::debug;

/// Similarity half of a query: request building and ranking
pub struct VectorStrategy {
    config: RankingConfig,
}

impl VectorStrategy {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Build the similarity request for `vector`.
    ///
    /// `spec.neighbors` is passed through as the neighbour count unchanged.
    pub fn build_request(&self, spec: &QuerySpec, vector: &[f32]) -> Result<SearchRequest> {
        if vector.is_empty() {
            return Err(RankingError::InvalidQuerySpec(
                "vector strategy requires a query vector".to_string(),
            ));
        }

        Ok(SearchRequest {
            query_vector: Some(vector.to_vec()),
            vector_field: Some(self.config.vector_field.clone()),
            fields: spec.fields.clone(),
            limit: spec.neighbors,
            exhaustive_vector_search: Some(spec.vector_search == VectorSearchMode::Exact),
            ..Default::default()
        })
    }

    pub fn rank(&self, hits: Vec<RawHit>, mode: VectorSearchMode) -> Result<Vec<RankedHit>> {
        rank_vector(hits, mode)
    }
}

/// Order vector hits by similarity, highest first.
///
/// `mode` only changes how the index executed the query; the ordering is the
/// same for approximate and exact results.
pub fn rank_vector(hits: Vec<RawHit>, mode: VectorSearchMode) -> Result<Vec<RankedHit>> {
    debug!("Ranking {} {mode} vector hits", hits.len());
    rank_by_score(hits, ScoreKind::Vector, SearchSource::Vector)
}
