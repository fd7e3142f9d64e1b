use crate::config::RankingConfig;
use crate::error::{RankingError, Result};
use crate::query::{QuerySpec, TextRankingMode};
use crate::score::{RankedHit, RawHit, ScoreKind, SearchSource, rank_by_score};
use crate::service::SearchRequest;
use log::debug;

/// Lexical half of a query: request building and ranking
pub struct TextStrategy {
    config: RankingConfig,
}

impl TextStrategy {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Build the lexical request for `spec`.
    ///
    /// Reranker scores are requested whenever ranking or fusion reads them.
    /// That needs a semantic configuration on the index, so it fails with
    /// `InvalidStrategy` when none is configured.
    pub fn build_request(&self, spec: &QuerySpec) -> Result<SearchRequest> {
        let text = spec.query_text().ok_or_else(|| {
            RankingError::InvalidQuerySpec("text strategy requires query text".to_string())
        })?;

        let semantic_config_name = if spec.needs_semantic_scores() {
            let name = self
                .config
                .semantic_configuration_name
                .clone()
                .ok_or_else(|| {
                    RankingError::InvalidStrategy(format!(
                        "{} ranking with {} fusion requires semantic_configuration_name",
                        spec.text_ranking, spec.fusion
                    ))
                })?;
            Some(name)
        } else {
            None
        };

        Ok(SearchRequest {
            query_text: Some(text.to_string()),
            query_syntax: Some(spec.text_search),
            search_mode: spec.text_search.term_match(),
            search_fields: self.config.search_fields.clone(),
            fields: spec.fields.clone(),
            limit: spec.neighbors,
            semantic_config_name,
            ..Default::default()
        })
    }

    /// Whether a hit from a combined response belongs to the lexical list:
    /// it must carry the score `mode` ranks by, or have one `mode` can default.
    pub fn accepts(hit: &RawHit, mode: TextRankingMode) -> bool {
        match mode {
            TextRankingMode::Bm25 => hit.lexical_score.is_some(),
            TextRankingMode::Semantic => {
                hit.lexical_score.is_some() || hit.semantic_rerank_score.is_some()
            }
        }
    }

    pub fn rank(&self, hits: Vec<RawHit>, mode: TextRankingMode) -> Result<Vec<RankedHit>> {
        rank_text(hits, mode)
    }
}

/// Order lexical hits by the score `mode` selects.
///
/// BM25 requires a lexical score on every hit. Semantic ranking substitutes
/// [`DEFAULT_SEMANTIC_SCORE`](crate::DEFAULT_SEMANTIC_SCORE) for a missing
/// reranker score.
pub fn rank_text(hits: Vec<RawHit>, mode: TextRankingMode) -> Result<Vec<RankedHit>> {
    debug!("Ranking {} text hits by {mode}", hits.len());

    let kind = match mode {
        TextRankingMode::Bm25 => ScoreKind::Lexical,
        TextRankingMode::Semantic => ScoreKind::SemanticRerank,
    };
    rank_by_score(hits, kind, SearchSource::Text)
}
