use crate::error::{RankingError, Result};
use crate::query::FusionPolicy;
use crate::score::{
    RankedHit, RawHit, ScoreKind, SearchSource, SourceName, number, sort_and_number,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Default RRF smoothing constant
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Tunables for [`FusionEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionParams {
    /// RRF constant k
    pub rrf_k: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

/// Fusion engine for combining ranked lists into one ordering
pub struct FusionEngine {
    params: FusionParams,
}

/// One document seen across the fused sources
struct Candidate {
    hit: RawHit,
    ranks: BTreeMap<SourceName, usize>,
}

impl FusionEngine {
    pub fn new(params: FusionParams) -> Self {
        Self { params }
    }

    /// Fuse named ranked lists under `policy`.
    ///
    /// The output is sorted, numbered from 1, and fully determined by the
    /// input lists and parameters.
    pub fn fuse(
        &self,
        sources: BTreeMap<SourceName, Vec<RankedHit>>,
        policy: FusionPolicy,
    ) -> Result<Vec<RankedHit>> {
        if sources.is_empty() {
            return Err(RankingError::EmptyInput(format!(
                "{policy} fusion requires at least one source"
            )));
        }

        match policy {
            FusionPolicy::Identity => Self::identity(sources),
            FusionPolicy::ScoreDescending(kind) => Self::score_descending(sources, kind),
            FusionPolicy::ReciprocalRankFusion => self.reciprocal_rank_fusion(sources),
            FusionPolicy::SemanticRerank => Self::semantic_rerank(sources),
        }
    }

    /// Single source passed through in its own order
    fn identity(sources: BTreeMap<SourceName, Vec<RankedHit>>) -> Result<Vec<RankedHit>> {
        if sources.len() > 1 {
            return Err(RankingError::InvalidStrategy(format!(
                "identity fusion accepts exactly one source, got {}",
                sources.len()
            )));
        }

        let Some((name, mut hits)) = sources.into_iter().next() else {
            return Err(RankingError::EmptyInput(
                "identity fusion requires one source".to_string(),
            ));
        };

        debug!("Identity fusion: {} {name} hits", hits.len());
        number(&mut hits);
        Ok(hits)
    }

    /// Union of every source sorted by one named score
    fn score_descending(
        sources: BTreeMap<SourceName, Vec<RankedHit>>,
        kind: ScoreKind,
    ) -> Result<Vec<RankedHit>> {
        let source = Self::output_source(&sources);
        let candidates = Self::collect_candidates(sources)?;

        debug!(
            "Score fusion by {kind}: {} distinct documents",
            candidates.len()
        );

        let mut results = candidates
            .into_values()
            .map(|candidate| -> Result<RankedHit> {
                let score = candidate.hit.resolved_score(kind)?;
                let mut ranked = RankedHit::new(candidate.hit, score, source);
                ranked.source_ranks = candidate.ranks;
                Ok(ranked)
            })
            .collect::<Result<Vec<_>>>()?;

        sort_and_number(&mut results);
        Ok(results)
    }

    /// Union of every source sorted by semantic reranker score
    fn semantic_rerank(sources: BTreeMap<SourceName, Vec<RankedHit>>) -> Result<Vec<RankedHit>> {
        let has_semantic = sources
            .values()
            .flatten()
            .any(|ranked| ranked.hit.semantic_rerank_score.is_some());
        if !has_semantic {
            warn!("Semantic rerank requested but no hit carries a reranker score");
        }

        Self::score_descending(sources, ScoreKind::SemanticRerank)
    }

    /// Reciprocal Rank Fusion (RRF)
    /// RRF(d) = Σ 1 / (k + rank(d))
    /// where rank(d) is the 1-based position of d in each list containing it
    fn reciprocal_rank_fusion(
        &self,
        sources: BTreeMap<SourceName, Vec<RankedHit>>,
    ) -> Result<Vec<RankedHit>> {
        let k = self.params.rrf_k;
        if !k.is_finite() || k <= 0.0 {
            return Err(RankingError::InvalidStrategy(format!(
                "rrf_k must be > 0, got {k}"
            )));
        }

        debug!(
            "RRF fusion (k={k}): {}",
            sources
                .iter()
                .map(|(name, hits)| format!("{} {name}", hits.len()))
                .collect::<Vec<_>>()
                .join(" + ")
        );

        let source = Self::output_source(&sources);
        let candidates = Self::collect_candidates(sources)?;

        let mut results: Vec<RankedHit> = candidates
            .into_values()
            .map(|candidate| {
                // Summing in rank order makes equal rank sets produce equal bits.
                let mut ranks: Vec<usize> = candidate.ranks.values().copied().collect();
                ranks.sort_unstable();
                let score = ranks.iter().map(|&rank| 1.0 / (k + rank as f64)).sum();

                let mut ranked = RankedHit::new(candidate.hit, score, source);
                ranked.source_ranks = candidate.ranks;
                ranked
            })
            .collect();

        sort_and_number(&mut results);

        debug!("RRF produced {} results", results.len());
        Ok(results)
    }

    fn output_source(sources: &BTreeMap<SourceName, Vec<RankedHit>>) -> SearchSource {
        match sources.keys().next() {
            Some(name) if sources.len() == 1 => SearchSource::from(*name),
            _ => SearchSource::Hybrid,
        }
    }

    /// Merge all lists by document id, recording each document's best rank
    /// per source and filling in scores reported by other sources.
    fn collect_candidates(
        sources: BTreeMap<SourceName, Vec<RankedHit>>,
    ) -> Result<BTreeMap<String, Candidate>> {
        let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();

        for (name, hits) in sources {
            for (position, ranked) in hits.into_iter().enumerate() {
                ranked.hit.validate()?;
                let rank = position + 1;

                match candidates.entry(ranked.hit.id.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(Candidate {
                            hit: ranked.hit,
                            ranks: BTreeMap::from([(name, rank)]),
                        });
                    }
                    Entry::Occupied(mut slot) => {
                        let candidate = slot.get_mut();
                        candidate.hit.merge_from(&ranked.hit);
                        candidate.ranks.entry(name).or_insert(rank);
                    }
                }
            }
        }

        Ok(candidates)
    }
}

/// Fuse `sources` under `policy` with explicit parameters.
pub fn fuse(
    sources: BTreeMap<SourceName, Vec<RankedHit>>,
    policy: FusionPolicy,
    params: FusionParams,
) -> Result<Vec<RankedHit>> {
    FusionEngine::new(params).fuse(sources, policy)
}
