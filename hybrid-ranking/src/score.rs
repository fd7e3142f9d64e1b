use crate::error::{RankingError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Score substituted for a missing or null semantic reranker score.
///
/// Reranker scores are never negative, so a hit without one sorts below every
/// hit that has one.
pub const DEFAULT_SEMANTIC_SCORE: f64 = 0.0;

/// Named score carried by a [`RawHit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// Full-text relevance (BM25-like)
    Lexical,
    /// Semantic reranker score
    SemanticRerank,
    /// Vector similarity (higher = more similar)
    Vector,
}

impl ScoreKind {
    /// Value used when a hit does not carry this score, if any.
    pub fn sentinel(self) -> Option<f64> {
        match self {
            ScoreKind::SemanticRerank => Some(DEFAULT_SEMANTIC_SCORE),
            ScoreKind::Lexical | ScoreKind::Vector => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScoreKind::Lexical => "lexical",
            ScoreKind::SemanticRerank => "semantic_rerank",
            ScoreKind::Vector => "vector",
        }
    }
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreKind {
    type Err = RankingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" | "bm25" | "search_score" => Ok(ScoreKind::Lexical),
            "semantic" | "semantic_rerank" | "reranker" => Ok(ScoreKind::SemanticRerank),
            "vector" | "similarity" => Ok(ScoreKind::Vector),
            other => Err(RankingError::InvalidStrategy(format!(
                "unknown score kind '{other}'"
            ))),
        }
    }
}

/// Name of a ranked list handed to the fusion engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceName {
    Text,
    Vector,
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceName::Text => f.write_str("text"),
            SourceName::Vector => f.write_str("vector"),
        }
    }
}

/// Where a ranked hit's final position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    /// From the lexical strategy alone
    Text,
    /// From the vector strategy alone
    Vector,
    /// Combined from more than one source
    Hybrid,
}

impl From<SourceName> for SearchSource {
    fn from(name: SourceName) -> Self {
        match name {
            SourceName::Text => SearchSource::Text,
            SourceName::Vector => SearchSource::Vector,
        }
    }
}

/// A document returned by the index search service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHit {
    /// Unique document identifier
    pub id: String,

    /// Requested field values
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,

    /// Lexical relevance score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f64>,

    /// Semantic reranker score. Absent and `null` both deserialize to `None`.
    #[serde(default)]
    pub semantic_rerank_score: Option<f64>,

    /// Vector similarity score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
}

impl RawHit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
            lexical_score: None,
            semantic_rerank_score: None,
            vector_score: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_lexical_score(mut self, score: f64) -> Self {
        self.lexical_score = Some(score);
        self
    }

    pub fn with_semantic_score(mut self, score: Option<f64>) -> Self {
        self.semantic_rerank_score = score;
        self
    }

    pub fn with_vector_score(mut self, score: f64) -> Self {
        self.vector_score = Some(score);
        self
    }

    /// The named score as returned by the service
    pub fn score(&self, kind: ScoreKind) -> Option<f64> {
        match kind {
            ScoreKind::Lexical => self.lexical_score,
            ScoreKind::SemanticRerank => self.semantic_rerank_score,
            ScoreKind::Vector => self.vector_score,
        }
    }

    /// The named score with the sentinel policy applied.
    ///
    /// Fails with [`RankingError::InvalidHit`] when the score is missing and
    /// `kind` has no sentinel.
    pub fn resolved_score(&self, kind: ScoreKind) -> Result<f64> {
        self.score(kind)
            .or_else(|| kind.sentinel())
            .ok_or_else(|| RankingError::InvalidHit {
                id: self.id.clone(),
                reason: format!("missing {kind} score"),
            })
    }

    /// Check the id is non-empty and every present score is finite.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RankingError::InvalidHit {
                id: String::new(),
                reason: "empty document id".to_string(),
            });
        }

        for kind in [ScoreKind::Lexical, ScoreKind::SemanticRerank, ScoreKind::Vector] {
            let Some(score) = self.score(kind) else {
                continue;
            };
            if !score.is_finite() {
                return Err(RankingError::InvalidHit {
                    id: self.id.clone(),
                    reason: format!("{kind} score is not finite: {score}"),
                });
            }
        }

        Ok(())
    }

    /// Fill scores and fields this hit lacks from another response for the
    /// same document. Values already present are kept.
    pub fn merge_from(&mut self, other: &RawHit) {
        self.lexical_score = self.lexical_score.or(other.lexical_score);
        self.semantic_rerank_score = self.semantic_rerank_score.or(other.semantic_rerank_score);
        self.vector_score = self.vector_score.or(other.vector_score);
        for (name, value) in &other.fields {
            self.fields
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// A hit with its position in a final ordering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedHit {
    pub hit: RawHit,

    /// Score the ordering was computed from
    pub final_score: f64,

    /// 1-based position
    pub final_rank: usize,

    pub source: SearchSource,

    /// 1-based rank held in each fused input list
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_ranks: BTreeMap<SourceName, usize>,
}

impl RankedHit {
    pub fn new(hit: RawHit, final_score: f64, source: SearchSource) -> Self {
        Self {
            hit,
            final_score,
            final_rank: 0,
            source,
            source_ranks: BTreeMap::new(),
        }
    }

    pub fn with_rank(mut self, rank: usize) -> Self {
        self.final_rank = rank;
        self
    }

    pub fn id(&self) -> &str {
        &self.hit.id
    }
}

/// Descending by score, then ascending by document id.
pub(crate) fn compare_ranked(a: &RankedHit, b: &RankedHit) -> Ordering {
    b.final_score
        .partial_cmp(&a.final_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.hit.id.cmp(&b.hit.id))
}

/// Sort into the canonical order and number the positions from 1.
pub(crate) fn sort_and_number(hits: &mut [RankedHit]) {
    hits.sort_by(compare_ranked);
    number(hits);
}

pub(crate) fn number(hits: &mut [RankedHit]) {
    for (position, hit) in hits.iter_mut().enumerate() {
        hit.final_rank = position + 1;
    }
}

/// Rank one list of raw hits by a single named score.
///
/// Hits are validated, repeated ids keep their first occurrence, and missing
/// scores follow [`ScoreKind::sentinel`].
pub(crate) fn rank_by_score(
    hits: Vec<RawHit>,
    kind: ScoreKind,
    source: SearchSource,
) -> Result<Vec<RankedHit>> {
    let mut seen = BTreeSet::new();
    let mut ranked = Vec::with_capacity(hits.len());

    for hit in hits {
        hit.validate()?;
        if !seen.insert(hit.id.clone()) {
            continue;
        }
        let score = hit.resolved_score(kind)?;
        ranked.push(RankedHit::new(hit, score, source));
    }

    sort_and_number(&mut ranked);
    Ok(ranked)
}
